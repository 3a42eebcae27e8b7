//! # Punchclock API
//!
//! The HTTP edge of the punchclock service: wires the SQLite adapters
//! into the core state machine, exposes the timeclock commands as JSON
//! routes, and runs the rollover sweeper on the request path before any
//! command dispatches.

pub mod context;
pub mod error;
pub mod routes;

pub use context::AppContext;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::router;
