//! Access log middleware
//!
//! Tags each request with an ID and logs one line per response.

use super::Middleware;
use crate::{Request, Response};
use std::sync::atomic::{AtomicU64, Ordering};

/// Access log configuration
#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    /// Header carrying the request ID in both directions
    pub header_name: String,
    /// Emit one log event per response
    pub log_responses: bool,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            header_name: "X-Request-ID".to_string(),
            log_responses: true,
        }
    }
}

impl AccessLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    pub fn quiet(mut self) -> Self {
        self.log_responses = false;
        self
    }
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-wide monotonically increasing request ID
pub fn next_request_id() -> String {
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:016x}", count)
}

/// Access log middleware
pub struct AccessLog {
    config: AccessLogConfig,
}

impl AccessLog {
    pub fn new(config: AccessLogConfig) -> Self {
        Self { config }
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(AccessLogConfig::default())
    }
}

impl Middleware for AccessLog {
    fn before(&self, req: &mut Request) -> Option<Response> {
        let id = req
            .header(&self.config.header_name)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(next_request_id);

        tracing::trace!(request_id = %id, method = %req.method, path = %req.path, "request received");
        req.request_id = Some(id);
        None
    }

    fn after(&self, req: &Request, res: &mut Response) {
        if let Some(id) = &req.request_id {
            res.set_header(&self.config.header_name, id.as_str());
        }

        if !self.config.log_responses {
            return;
        }

        let id = req.request_id.as_deref().unwrap_or("-");
        let elapsed_ms = req.received_at.elapsed().as_secs_f64() * 1000.0;
        let status = res.status.as_u16();
        let target = req.target();

        if res.status.is_server_error() {
            tracing::error!(request_id = %id, method = %req.method, path = %target, status, elapsed_ms, "request failed");
        } else if res.status.is_client_error() {
            tracing::warn!(request_id = %id, method = %req.method, path = %target, status, elapsed_ms, "request rejected");
        } else {
            tracing::info!(request_id = %id, method = %req.method, path = %target, status, elapsed_ms, "request served");
        }
    }
}
