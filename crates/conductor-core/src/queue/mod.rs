//! Task queue: lifecycle, dependency resolution, retry scheduling, dispatch.

mod dependency;
mod engine;
mod retry;

pub use dependency::DependencyGraph;
pub use engine::TaskQueue;
pub use retry::RetryPolicy;
