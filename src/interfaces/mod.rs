//! Inbound surfaces exposed by the service.

pub mod http;

pub use http::router;
