// Resilience middleware for the collaborator HTTP clients

pub mod api_key_pool;
pub mod circuit_breaker;

pub use api_key_pool::ApiKeyPool;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
