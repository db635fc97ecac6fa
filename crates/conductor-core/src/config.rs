//! Engine configuration.
//!
//! One flat struct mirrors the external configuration surface; `split`-style
//! accessors hand each component its own config. Invalid values are fatal at
//! construction time, never at dispatch time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitBreakerConfig;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::matcher::MatcherConfig;
use crate::queue::RetryPolicy;

/// All tuning knobs, with documented defaults. Deserializable so a config
/// file can populate any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Disable to permit every dispatch unconditionally. Default true.
    pub circuit_breaker_enabled: bool,
    /// Failures within the window that trip a circuit. Default 5.
    pub circuit_breaker_threshold: u32,
    /// Rolling failure window, ms. Default 60 000.
    pub circuit_breaker_window_ms: u64,
    /// Open-circuit refusal period, ms. Default 30 000.
    pub circuit_breaker_timeout_ms: u64,
    /// Consecutive half-open successes to close. Default 2.
    pub circuit_breaker_success_threshold: u32,

    /// Record completions and weight matching by history. Default true.
    pub enable_performance_tracking: bool,
    /// Performance share of the weighted match score, [0, 1]. Default 0.3.
    pub performance_weight: f64,
    /// Quality assumed when a report carries none. Default 0.8.
    pub default_quality_score: f64,

    /// Hard ceiling on simultaneously running tasks. Default 10.
    pub max_concurrent: usize,

    /// Retry backoff base delay, ms. Default 0 (retry on the next pass).
    pub retry_base_delay_ms: u64,
    /// Retry backoff multiplier. Default 2.0, unused while base delay is 0.
    pub retry_multiplier: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_window_ms: 60_000,
            circuit_breaker_timeout_ms: 30_000,
            circuit_breaker_success_threshold: 2,
            enable_performance_tracking: true,
            performance_weight: 0.3,
            default_quality_score: 0.8,
            max_concurrent: 10,
            retry_base_delay_ms: 0,
            retry_multiplier: 2.0,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> OrchestratorResult<()> {
        self.circuit_breaker().validate()?;
        self.matcher().validate()?;
        if self.max_concurrent == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: self.circuit_breaker_enabled,
            failure_threshold: self.circuit_breaker_threshold,
            window_ms: self.circuit_breaker_window_ms,
            open_timeout_ms: self.circuit_breaker_timeout_ms,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }

    pub fn matcher(&self) -> MatcherConfig {
        MatcherConfig {
            enable_tracking: self.enable_performance_tracking,
            performance_weight: self.performance_weight,
            default_quality_score: self.default_quality_score,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry_base_delay_ms == 0 {
            RetryPolicy::immediate()
        } else {
            RetryPolicy::exponential(
                Duration::from_millis(self.retry_base_delay_ms),
                self.retry_multiplier,
            )
        }
    }
}
