//! HTTP surface of the backend
//!
//! Handlers, the session extractor and the route table.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::cors;
pub use routes::configure;
