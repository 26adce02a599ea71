//! Language-model facing side of the agent: prompts, transport, parsing

pub mod client;
pub mod context;
pub mod dates;
pub mod explainer;
pub mod normalize;
pub mod parser;
pub mod prompts;
pub mod task;

pub use client::{LanguageModel, LlmClient};
pub use context::SystemContext;
pub use explainer::{Explainer, LlmExplainer};
pub use parser::{ParseError, TaskSpecParser};
pub use task::{AggregationLevel, IntentKind, Operation, SpecError, TaskSpecification};
