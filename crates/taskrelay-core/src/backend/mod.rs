//! Session backends.

mod http;
mod wire;

pub use http::HttpSessionBackend;
