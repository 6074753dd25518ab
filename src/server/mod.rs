//! HTTP surface: shared state, rate limiting and the axum router.

mod rate_limit;
mod router;
mod state;

pub use rate_limit::{RateLimitConfig, RateLimitKind, RateLimiter};
pub use router::build_router;
pub use state::{AppState, HealthSnapshot, ServeHealth};
