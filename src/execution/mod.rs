//! Workflow execution engine

pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use engine::{EventEmitter, EventHandler, ExecutionEngine, ExecutionEvent};
pub use evaluator::{evaluate, TriggeredJobs};
pub use executor::{JobExecutor, DEFAULT_STEP_TIMEOUT};
pub use scheduler::{next_fire_time, upcoming_fire_times, SchedulingStrategy};
