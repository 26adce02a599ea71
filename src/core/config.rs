//! Agent configuration with documented defaults
//!
//! Every section can be omitted from the TOML file; missing values fall back
//! to the defaults below. Credentials never live in this file: the model API
//! key is read from `LLM_API_KEY` at client construction time.

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, Result};
use crate::core::types::Timestamp;

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: LlmSettings,
    pub catalog: CatalogSettings,
    pub logging: LoggingSettings,
}

/// Model inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Endpoint of the model server. The wire dialect is detected from the URL
    /// (Anthropic, Ollama, otherwise OpenAI-compatible).
    pub api_url: String,

    pub model: String,

    /// Sampling temperature. Interpretation wants near-deterministic output.
    pub temperature: f32,

    pub max_tokens: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per completion before the client gives up
    pub max_retries: u32,

    /// Interpretations below this confidence are rejected and the user is
    /// asked to rephrase. Set to 0.0 to accept everything.
    pub min_confidence: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/chat".into(),
            model: "llama3.1:8b".into(),
            temperature: 0.1,
            max_tokens: 4096,
            timeout_secs: 30,
            max_retries: 3,
            min_confidence: 0.7,
        }
    }
}

/// Sensor catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Project identifier passed to the sensor source when listing devices
    pub job_id: u32,

    /// Earliest timestamp for which data exists, used when the source does
    /// not report its own bounds
    pub earliest_data: Timestamp,

    pub sensor_mapping: SensorMapping,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            job_id: 0,
            earliest_data: Utc
                .with_ymd_and_hms(2019, 5, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            sensor_mapping: SensorMapping::default(),
        }
    }
}

/// Keyword lists that map raw upstream sensor type names onto normalized types
///
/// Matching is a case-insensitive substring test, checked in field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorMapping {
    pub temperature_keywords: Vec<String>,
    pub humidity_keywords: Vec<String>,
    pub co2_keywords: Vec<String>,
    pub moisture_keywords: Vec<String>,
    pub strain_keywords: Vec<String>,
}

impl Default for SensorMapping {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            temperature_keywords: words(&["temp", "temperature", "tmp"]),
            humidity_keywords: words(&["humidity", "rh", "relative humidity"]),
            co2_keywords: words(&["co2", "carbon dioxide", "carbondioxide"]),
            moisture_keywords: words(&["moisture", "mc", "moisture content"]),
            strain_keywords: words(&["equation", "strain"]),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber` filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "sensor_agent=info".into(),
        }
    }
}

impl AgentConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate().map_err(AgentError::Config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(format!(
                "llm.temperature ({}) must be within 0.0..=2.0",
                self.llm.temperature
            ));
        }

        if !(0.0..=1.0).contains(&self.llm.min_confidence) {
            return Err(format!(
                "llm.min_confidence ({}) must be within 0.0..=1.0",
                self.llm.min_confidence
            ));
        }

        if self.llm.timeout_secs == 0 || self.llm.max_tokens == 0 {
            return Err("llm.timeout_secs and llm.max_tokens must be positive".into());
        }

        let mapping = &self.catalog.sensor_mapping;
        let lists = [
            ("temperature_keywords", &mapping.temperature_keywords),
            ("humidity_keywords", &mapping.humidity_keywords),
            ("co2_keywords", &mapping.co2_keywords),
            ("moisture_keywords", &mapping.moisture_keywords),
            ("strain_keywords", &mapping.strain_keywords),
        ];
        for (name, list) in lists {
            if list.iter().all(|k| k.trim().is_empty()) {
                return Err(format!("catalog.sensor_mapping.{} must not be empty", name));
            }
        }

        Ok(())
    }
}
