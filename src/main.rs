//! Sensor Agent - Entry Point
//!
//! Answers a single query given on the command line, or runs an interactive
//! prompt when no query is given.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use sensor_agent::agent::{WorkflowEngine, WorkflowState};
use sensor_agent::catalog::{SensorSource, StaticSource};
use sensor_agent::core::config::AgentConfig;
use sensor_agent::core::error::Result;

#[derive(Parser, Debug)]
#[command(name = "sensor-agent", version, about = "Ask questions about building sensor data")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON catalog of devices, sensors and readings to answer from
    #[arg(short, long)]
    fixture: PathBuf,

    /// Print the full workflow state as JSON
    #[arg(long)]
    json: bool,

    /// Print the execution trace after the answer
    #[arg(long)]
    trace: bool,

    /// The question; omit for an interactive prompt
    query: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::new(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    tracing::info!("Sensor Agent starting...");

    let rt = Runtime::new()?;
    let source: Arc<dyn SensorSource> = Arc::new(StaticSource::load(&cli.fixture)?);
    let engine = WorkflowEngine::from_config(&config, source)?;

    if !cli.query.is_empty() {
        let query = cli.query.join(" ");
        let state = rt.block_on(engine.execute(&query));
        return report(&cli, &state);
    }

    println!("\n=== SENSOR AGENT ===");
    println!("Ask about temperature, humidity, CO2, moisture or strain readings.");
    println!("Type 'quit' or 'q' to exit.");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        match input {
            "" => continue,
            "quit" | "q" => break,
            _ => {
                let state = rt.block_on(engine.execute(input));
                report(&cli, &state)?;
                println!();
            }
        }
    }

    tracing::info!("Sensor Agent exiting");
    Ok(())
}

fn report(cli: &Cli, state: &WorkflowState) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    let answer = if state.success {
        state.explanation.as_deref()
    } else {
        state.error_explanation.as_deref()
    };
    println!("{}", answer.unwrap_or("No answer was produced."));

    if cli.trace {
        println!();
        println!("{}", state.render_trace());
    }
    Ok(())
}
