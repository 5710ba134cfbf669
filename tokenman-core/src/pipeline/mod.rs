//! The ordered middleware chain. Each middleware implements the
//! request/response contract; the Pipeline runs them forward during the
//! request phase and in reverse during the response phase, recording
//! per-middleware timing and converting panics into tagged errors.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::ApiError,
    types::{CachedResponse, Request, Response},
};

/// Per-request context threaded through every middleware call. Carries
/// the cancellation handle so in-flight store calls, upstream reads, and
/// backoff sleeps can all return promptly on client disconnect.
pub struct RequestContext {
    pub request_id: Uuid,
    pub cancellation: CancellationToken,
}

/// The tagged outcome of a middleware's request phase (Design Notes
/// §9): a plain `Result<Outcome, ApiError>` already gives us the error
/// arm, so this enum only needs to distinguish continuing from
/// short-circuiting with a cached response.
pub enum Outcome {
    Continue(Request),
    ShortCircuit(Request, CachedResponse),
}

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    async fn process_request(
        &self,
        ctx: &RequestContext,
        req: Request,
    ) -> Result<Outcome, ApiError>;

    async fn process_response(
        &self,
        ctx: &RequestContext,
        req: &Request,
        resp: Response,
    ) -> Result<Response, ApiError>;
}

/// What the caller gets back from the request phase.
pub enum PipelineOutcome {
    Continue(Request),
    ShortCircuit(Request, CachedResponse),
}

pub struct Pipeline {
    middlewares: Vec<std::sync::Arc<dyn Middleware>>,
    timings: RwLock<HashMap<String, Duration>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<std::sync::Arc<dyn Middleware>>) -> Self {
        Self {
            middlewares,
            timings: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot-readable concurrently with execution, per §4.1's
    /// invariant.
    pub fn timings(&self) -> HashMap<String, Duration> {
        self.timings
            .read()
            .expect("pipeline timings lock poisoned")
            .clone()
    }

    fn record_timing(&self, key: String, elapsed: Duration) {
        self.timings
            .write()
            .expect("pipeline timings lock poisoned")
            .insert(key, elapsed);
    }

    pub async fn run_request(
        &self,
        ctx: &RequestContext,
        mut req: Request,
    ) -> Result<PipelineOutcome, ApiError> {
        for mw in &self.middlewares {
            if !mw.enabled() {
                continue;
            }
            let span = tracing::info_span!("middleware.request", name = mw.name());
            let start = Instant::now();
            let guarded = std::panic::AssertUnwindSafe(mw.process_request(ctx, req))
                .catch_unwind()
                .instrument(span);
            let result = guarded.await;
            self.record_timing(format!("{}.request", mw.name()), start.elapsed());

            match result {
                Ok(Ok(Outcome::Continue(next))) => req = next,
                Ok(Ok(Outcome::ShortCircuit(next, cached))) => {
                    return Ok(PipelineOutcome::ShortCircuit(next, cached));
                }
                Ok(Err(api_err)) => return Err(api_err),
                Err(_panic) => {
                    tracing::error!(middleware = mw.name(), "middleware panicked");
                    return Err(ApiError::internal(mw.name(), "middleware panicked"));
                }
            }
        }
        Ok(PipelineOutcome::Continue(req))
    }

    pub async fn run_response(
        &self,
        ctx: &RequestContext,
        req: &Request,
        mut resp: Response,
    ) -> Result<Response, ApiError> {
        for mw in self.middlewares.iter().rev() {
            if !mw.enabled() {
                continue;
            }
            let span = tracing::info_span!("middleware.response", name = mw.name());
            let start = Instant::now();
            let guarded = std::panic::AssertUnwindSafe(mw.process_response(ctx, req, resp))
                .catch_unwind()
                .instrument(span);
            let result = guarded.await;
            self.record_timing(format!("{}.response", mw.name()), start.elapsed());

            match result {
                Ok(Ok(next)) => resp = next,
                Ok(Err(api_err)) => return Err(api_err),
                Err(_panic) => {
                    tracing::error!(middleware = mw.name(), "middleware panicked");
                    return Err(ApiError::internal(mw.name(), "middleware panicked"));
                }
            }
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::types::{ResponseBody, WireFormat};

    fn empty_request() -> Request {
        Request {
            id: Uuid::new_v4(),
            wire_format: WireFormat::Anthropic,
            model: "claude-sonnet-4".to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
            stream: false,
            temperature: None,
            tokens_in: 0,
            flags: Map::new(),
            metadata: Map::new(),
            extras: serde_json::Map::new(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    struct PassThrough;

    #[async_trait]
    impl Middleware for PassThrough {
        fn name(&self) -> &'static str {
            "pass_through"
        }

        async fn process_request(
            &self,
            _ctx: &RequestContext,
            req: Request,
        ) -> Result<Outcome, ApiError> {
            Ok(Outcome::Continue(req))
        }

        async fn process_response(
            &self,
            _ctx: &RequestContext,
            _req: &Request,
            resp: Response,
        ) -> Result<Response, ApiError> {
            Ok(resp)
        }
    }

    struct Panics;

    #[async_trait]
    impl Middleware for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn process_request(
            &self,
            _ctx: &RequestContext,
            _req: Request,
        ) -> Result<Outcome, ApiError> {
            panic!("boom");
        }

        async fn process_response(
            &self,
            _ctx: &RequestContext,
            _req: &Request,
            _resp: Response,
        ) -> Result<Response, ApiError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn pass_through_continues_and_records_timing() {
        let pipeline = Pipeline::new(vec![std::sync::Arc::new(PassThrough)]);
        let outcome = pipeline.run_request(&ctx(), empty_request()).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Continue(_)));
        assert!(pipeline.timings().contains_key("pass_through.request"));
    }

    #[tokio::test]
    async fn panic_converts_to_internal_error_and_still_times() {
        let pipeline = Pipeline::new(vec![std::sync::Arc::new(Panics)]);
        let result = pipeline.run_request(&ctx(), empty_request()).await;
        assert!(matches!(result, Err(ApiError::Internal { .. })));
        assert!(pipeline.timings().contains_key("panics.request"));
    }

    #[tokio::test]
    async fn response_phase_runs_in_reverse_order() {
        struct Recorder(&'static str, std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

        #[async_trait]
        impl Middleware for Recorder {
            fn name(&self) -> &'static str {
                self.0
            }

            async fn process_request(
                &self,
                _ctx: &RequestContext,
                req: Request,
            ) -> Result<Outcome, ApiError> {
                Ok(Outcome::Continue(req))
            }

            async fn process_response(
                &self,
                _ctx: &RequestContext,
                _req: &Request,
                resp: Response,
            ) -> Result<Response, ApiError> {
                self.1.lock().unwrap().push(self.0);
                Ok(resp)
            }
        }

        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            std::sync::Arc::new(Recorder("first", order.clone())),
            std::sync::Arc::new(Recorder("second", order.clone())),
        ]);
        let resp = Response {
            status: StatusCode::OK,
            headers: http::HeaderMap::new(),
            body: ResponseBody::Buffered(Bytes::new()),
            tokens_out: 0,
            truncated: false,
        };
        pipeline.run_response(&ctx(), &empty_request(), resp).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }
}
