//! Sensor Agent - natural language analytics over building sensor data
//!
//! A query is interpreted by a language model into a task specification,
//! checked against the sensor catalog, answered from retrieved readings and
//! explained back in plain language.

pub mod agent;
pub mod analytics;
pub mod catalog;
pub mod core;
pub mod data;
pub mod llm;
pub mod validation;
