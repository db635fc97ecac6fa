//! Domain model (IDs, task records, outcomes, events, errors).

pub mod errors;
pub mod event;
pub mod ids;
pub mod outcome;
pub mod task;

pub use self::errors::{OrchestratorError, OrchestratorResult};
pub use self::event::{EventKind, OrchestratorEvent};
pub use self::ids::{ExecutorId, TaskId};
pub use self::outcome::TaskOutcome;
pub use self::task::{BlockedReason, Task, TaskSpec, TaskStatus};
