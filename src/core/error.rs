use thiserror::Error;

use crate::llm::parser::ParseError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Sensor source error: {0}")]
    Source(String),

    #[error("{0}")]
    Retrieval(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
