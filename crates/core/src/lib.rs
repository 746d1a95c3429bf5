// Core types and functionality for the Conductor orchestration engine

pub mod types;
pub mod error;
pub mod store;
pub mod policy;
pub mod executors;
pub mod template;
pub mod workflow;
pub mod engine;

pub use engine::OrchestrationEngine;
pub use error::{EngineError, EngineResult, StepError};
pub use types::*;
