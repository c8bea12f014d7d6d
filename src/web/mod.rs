//! HTTP API for feedmix.
//!
//! Exposes the pagination and refresh core over JSON:
//!
//! - `GET /items` - one page of a column
//! - `POST /refresh` - start a background refresh
//! - `GET /health`, `GET /stats`, `GET /sources` - operational views

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
