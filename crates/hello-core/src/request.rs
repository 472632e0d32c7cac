//! HTTP Request types

use http::Method;
use smallvec::SmallVec;
use std::time::Instant;

/// HTTP Request
///
/// The body is never read: the catch-all handler answers before it matters.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method (any, including extension methods)
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Request ID assigned by the access log middleware
    pub request_id: Option<String>,
    /// When the request reached the server
    pub received_at: Instant,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
            request_id: None,
            received_at: Instant::now(),
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path plus query, as it appeared on the request line
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Convert a hyper request head into our Request type
    pub fn from_hyper<B>(req: &hyper::Request<B>) -> Self {
        let uri = req.uri();
        let mut request = Request::new(req.method().clone(), uri.path());
        request.query = uri.query().map(|s| s.to_string());

        for (name, value) in req.headers() {
            if let Ok(v) = value.to_str() {
                request.headers.push((name.to_string(), v.to_string()));
            }
        }

        request
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header() {
        let req = RequestBuilder::new(Method::GET, "/")
            .header("X-Request-ID", "abc")
            .build();

        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert_eq!(req.header("X-REQUEST-ID"), Some("abc"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_target_includes_query() {
        let req = RequestBuilder::new(Method::GET, "/search")
            .query("q=hello&page=2")
            .build();
        assert_eq!(req.target(), "/search?q=hello&page=2");
        assert_eq!(RequestBuilder::new(Method::GET, "/").build().target(), "/");
    }

    #[test]
    fn test_from_hyper_keeps_extension_method() {
        let hyper_req = hyper::Request::builder()
            .method(Method::from_bytes(b"PURGE").unwrap())
            .uri("/cache/item?force=1")
            .header("host", "localhost")
            .body(())
            .unwrap();

        let req = Request::from_hyper(&hyper_req);
        assert_eq!(req.method.as_str(), "PURGE");
        assert_eq!(req.path, "/cache/item");
        assert_eq!(req.query.as_deref(), Some("force=1"));
        assert_eq!(req.target(), "/cache/item?force=1");
        assert_eq!(req.header("Host"), Some("localhost"));
    }
}
