//! # SIEMQ API
//!
//! JSON-over-HTTP surface for the conversational query engine:
//!
//! - `POST /api/v1/query` asks a question within a session
//! - `GET /api/v1/context/:session_id` shows what the session remembers
//! - `DELETE /api/v1/context/:session_id` forgets it
//! - `GET /api/v1/context/:session_id/summary`, `GET /api/v1/sessions`,
//!   `GET /health`

pub mod error;
pub mod rest;
pub mod state;

pub use error::{ApiError, ErrorBody};
pub use rest::router::create_router;
pub use state::AppState;
