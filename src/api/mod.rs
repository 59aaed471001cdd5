//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `DELETE /keys/:key` - Invalidate one key
//! - `POST /invalidate/pattern` - Pattern invalidation
//! - `POST /invalidate/change` - Rule-driven invalidation
//! - `POST /clear` - Drop every entry
//! - `POST /cleanup` - Sweep stale entries

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
