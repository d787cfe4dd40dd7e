//! HTTP API surface.

pub mod server;

pub use server::{AppState, start_http_server};
