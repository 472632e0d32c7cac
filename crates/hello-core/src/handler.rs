//! The catch-all handler

use crate::{Request, Response};
use http::StatusCode;

/// Body returned for every request
pub const GREETING: &str = "Hello, World!\n";

/// Answer any method on any path with `200 OK` and [`GREETING`]
pub fn hello(_req: &Request) -> Response {
    Response::text(StatusCode::OK, GREETING)
}
