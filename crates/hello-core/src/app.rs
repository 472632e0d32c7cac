//! Request pipeline: middleware chain wrapped around a single handler

use crate::handler;
use crate::middleware::{AccessLog, MiddlewareChain, Security};
use crate::{Request, Response};
use bytes::Bytes;
use http_body_util::Full;
use std::sync::Arc;

/// Handler invoked for every request that passes the middleware chain
pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// The application served on every connection
pub struct App {
    handler: Handler,
    middleware: MiddlewareChain,
}

impl App {
    /// Wrap `handler` with an empty middleware chain
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            middleware: MiddlewareChain::new(),
        }
    }

    /// Replace the middleware chain
    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// Run the middleware chain and the handler
    pub fn handle(&self, mut req: Request) -> Response {
        let mut res = match self.middleware.run_before(&mut req) {
            Some(early) => early,
            None => (self.handler)(&req),
        };
        self.middleware.run_after(&req, &mut res);
        res
    }

    /// Handle a hyper request, falling back to a 500 if the response
    /// cannot be expressed in hyper's types
    pub fn respond<B>(&self, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>> {
        let res = self.handle(Request::from_hyper(&req));
        match res.into_hyper() {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = %err, method = %req.method(), path = %req.uri().path(), "failed to build response");
                internal_error()
            }
        }
    }
}

impl Default for App {
    /// The hello handler behind access logging and security headers
    fn default() -> Self {
        let middleware = MiddlewareChain::new()
            .with(AccessLog::default())
            .with(Security::default());
        App::new(Arc::new(handler::hello)).with_middleware(middleware)
    }
}

fn internal_error() -> hyper::Response<Full<Bytes>> {
    Response::internal_error().into_hyper().unwrap_or_else(|_| {
        let mut res = hyper::Response::new(Full::new(Bytes::new()));
        *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        res
    })
}
