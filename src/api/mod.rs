//! HTTP API Handlers and Routes
//!
//! A thin transport over [`ResearchPipeline`](crate::pipeline::ResearchPipeline),
//! built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /api/research?query=...` - Start a run and stream its progress as
//!   server-sent events, one event per progress message. The event name is
//!   the progress tag (`reading`, `section_writing_3`, ...) and the data is
//!   the event as JSON. A final `outcome` event carries the terminal state.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
