//! Ports - the engine's seams to external collaborators.
//!
//! The engine never blocks on network or disk I/O; everything it needs from
//! the outside world comes in through these traits:
//! - time (`Clock`) so circuit-breaker windows are testable,
//! - candidate executors with precomputed similarity (`CandidateSource`),
//!   because embedding scoring lives outside the core.

pub mod candidates;
pub mod clock;

pub use self::candidates::{CandidateSource, ExecutorCandidate, StaticCandidates};
pub use self::clock::{Clock, FixedClock, SystemClock};
