//! cm-runner - Migration runner for colmig
//!
//! Steps are plain values `{id, file, up, down}` collected in a
//! [`Registry`], frozen, and then applied or reverted by a [`Runner`] one
//! transaction per step.

pub mod cancel;
pub mod error;
pub mod file;
pub mod registry;
pub mod runner;
pub mod step;

pub use cancel::CancelToken;
pub use error::{RunnerError, RunnerResult};
pub use file::{MigrationFile, Op};
pub use registry::{FrozenRegistry, Registry};
pub use runner::{RunReport, Runner, StepState, StepStatus};
pub use step::{parse_id, Migration, StepFn};
