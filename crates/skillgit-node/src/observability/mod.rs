//! Structured logging for the skillgit node.
//!
//! Requests are traced by `tower_http::trace::TraceLayer` in the router;
//! this module only sets up the subscriber.

mod logging;

pub use logging::{env_filter, init_logging, LogFormat};
