// Dependency-aware workflow execution

pub mod dag;
pub mod executor;
pub mod step_executor;

pub use dag::{ready_steps, validate_dependencies, DependencyGraph};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use step_executor::StepRunner;
