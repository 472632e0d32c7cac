//! hello-core: catch-all Hello World HTTP server
//!
//! Every request, whatever its method or path, is answered with
//! `200 OK`, `Content-Type: text/plain` and the body `Hello, World!\n`.
//!
//! ```no_run
//! # async fn run() -> hello_core::Result<()> {
//! let server = hello_core::Server::bind(hello_core::ServerConfig::default())?;
//! server.serve().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod app;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

// Re-exports
pub use app::{App, Handler};
pub use error::{Error, Result};
pub use handler::{hello, GREETING};
pub use request::{Request, RequestBuilder};
pub use response::{Response, ResponseBuilder};
pub use server::{ConnectionTracker, Server, ServerConfig};

pub use middleware::{Middleware, MiddlewareChain};
