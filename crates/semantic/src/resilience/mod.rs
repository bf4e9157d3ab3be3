//! API resilience patterns: circuit breaker and retry logic.
//!
//! These handle transient failures of the embedding provider and keep a dead
//! provider from being hammered by every incoming query.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{execute_with_retry_async, is_retryable_error, RetryConfig, RetryResult};
