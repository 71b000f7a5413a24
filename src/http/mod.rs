//! HTTP surface: the admission middleware and a host server using it.

mod middleware;
mod server;

pub use middleware::{admission, rate_limit_exceeded_response, REJECTION_BODY};
pub use server::HttpServer;
