//! Security headers middleware
//!
//! Adds hardening headers to every response. None of them touch the
//! status, content type, or body.

use super::Middleware;
use crate::{Request, Response};

/// Security configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Content-Security-Policy
    pub csp: Option<String>,
    /// X-Frame-Options
    pub frame_options: FrameOptions,
    /// X-Content-Type-Options: nosniff
    pub content_type_options: bool,
}

/// X-Frame-Options value
#[derive(Debug, Clone)]
pub enum FrameOptions {
    Deny,
    SameOrigin,
    None,
}

impl FrameOptions {
    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            FrameOptions::Deny => Some("DENY"),
            FrameOptions::SameOrigin => Some("SAMEORIGIN"),
            FrameOptions::None => None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            csp: Some("default-src 'none'".to_string()),
            frame_options: FrameOptions::Deny,
            content_type_options: true,
        }
    }
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No headers at all
    pub fn disabled() -> Self {
        Self {
            csp: None,
            frame_options: FrameOptions::None,
            content_type_options: false,
        }
    }

    pub fn csp(mut self, policy: impl Into<String>) -> Self {
        self.csp = Some(policy.into());
        self
    }

    pub fn frame_options(mut self, options: FrameOptions) -> Self {
        self.frame_options = options;
        self
    }
}

/// Security headers middleware
pub struct Security {
    config: SecurityConfig,
}

impl Security {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }
}

impl Default for Security {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl Middleware for Security {
    fn before(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    fn after(&self, _req: &Request, res: &mut Response) {
        if self.config.content_type_options {
            res.set_header("X-Content-Type-Options", "nosniff");
        }

        if let Some(value) = self.config.frame_options.as_header_value() {
            res.set_header("X-Frame-Options", value);
        }

        if let Some(csp) = &self.config.csp {
            res.set_header("Content-Security-Policy", csp.as_str());
        }
    }
}
