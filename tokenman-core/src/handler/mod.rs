//! HTTP ingress/egress (§4.9): the axum router, the shared proxy
//! handler that drives a request through the pipeline and dispatcher,
//! and the ancillary `/v1/models`, `/health`, `/health/ready` endpoints.

pub mod egress;
pub mod ingress;

use axum::{
    Router as AxumRouter,
    body::Body,
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt, catch_panic::CatchPanicLayer, sensitive_headers::SetSensitiveHeadersLayer, trace::TraceLayer,
};
use tracing::Instrument;

use crate::{
    app_state::AppState,
    circuit_breaker::CircuitState,
    codec,
    error::ApiError,
    pipeline::{PipelineOutcome, RequestContext},
    types::{InferenceProvider, Request, Response, ResponseBody, StreamHandle, WireFormat},
};

pub fn router(state: AppState) -> AxumRouter {
    let max_body_size = state.config().server.max_body_size;
    let service_stack = ServiceBuilder::new()
        .layer(CatchPanicLayer::new())
        .layer(SetSensitiveHeadersLayer::new(std::iter::once(http::header::AUTHORIZATION)))
        .layer(TraceLayer::new_for_http())
        .set_x_request_id(tower_http::request_id::MakeRequestUuid)
        .propagate_x_request_id()
        .layer(DefaultBodyLimit::max(max_body_size));

    AxumRouter::new()
        .route("/v1/messages", post(messages_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/models", get(models_handler))
        .route("/health", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .layer(service_stack)
        .with_state(state)
}

async fn messages_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> axum::response::Response {
    proxy(state, WireFormat::Anthropic, headers, body).await
}

async fn chat_completions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    proxy(state, WireFormat::OpenAi, headers, body).await
}

async fn proxy(state: AppState, format: WireFormat, headers: HeaderMap, body: Bytes) -> axum::response::Response {
    state.0.metrics.record_request();
    match handle(&state, format, &headers, body).await {
        Ok(response) => response,
        Err(err) => {
            state.0.metrics.record_error((&err).into());
            err.into_response()
        }
    }
}

async fn handle(
    state: &AppState,
    format: WireFormat,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, ApiError> {
    let inner = &state.0;
    let max_body_size = inner.config.server.max_body_size;
    let mut req = ingress::decode(format, &body, max_body_size)?;

    let providers = inner
        .router
        .resolve(&req.model, &inner.breakers)
        .ok_or_else(|| ApiError::NotFound(format!("no route configured for model \"{}\"", req.model)))?;
    ingress::stamp_resolved_provider(&mut req, &providers);

    let ctx = RequestContext {
        request_id: req.id,
        cancellation: CancellationToken::new(),
    };

    let span = tracing::info_span!("request", request_id = %ctx.request_id, model = %req.model);
    async move {
        match inner.pipeline.run_request(&ctx, req).await? {
            PipelineOutcome::ShortCircuit(req, cached) => {
                inner.metrics.record_response(true);
                log_history(&req, None, StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK), true);
                Ok(egress::cached_response_to_axum(cached))
            }
            PipelineOutcome::Continue(req) => dispatch_and_respond(state, req, headers, ctx, providers).await,
        }
    }
    .instrument(span)
    .await
}

async fn dispatch_and_respond(
    state: &AppState,
    req: Request,
    headers: &HeaderMap,
    ctx: RequestContext,
    providers: Vec<InferenceProvider>,
) -> Result<axum::response::Response, ApiError> {
    let inner = &state.0;
    let upstream_body = codec::encode_for_upstream(&req)?;
    let extra_headers = ingress::capture_passthrough_headers(headers);

    let (provider, resp) = inner
        .dispatcher
        .dispatch(
            &providers,
            &inner.provider_configs,
            &inner.breakers,
            &req,
            upstream_body,
            &extra_headers,
            &ctx.cancellation,
        )
        .await
        .inspect_err(|err| {
            if matches!(err, ApiError::CircuitOpen { .. }) {
                if let Some(provider) = providers.first() {
                    inner.metrics.record_circuit_rejection(*provider);
                }
            }
        })?;

    match resp.body {
        ResponseBody::Buffered(ref bytes) => {
            let bytes = bytes.clone();
            let resp = Response {
                tokens_out: egress::tokens_out_from_body(provider, &bytes),
                body: ResponseBody::Buffered(bytes.clone()),
                ..resp
            };
            let resp = inner.pipeline.run_response(&ctx, &req, resp).await?;
            inner.metrics.record_response(false);
            log_history(&req, Some(provider), resp.status, false);
            Ok(egress::buffered_response_to_axum(resp, bytes.clone()))
        }
        ResponseBody::Streaming(stream_handle) => {
            let status = resp.status;
            let response_headers = resp.headers.clone();
            let StreamHandle { forward, accumulated } = stream_handle;
            let leading = Response {
                body: ResponseBody::Buffered(Bytes::new()),
                ..resp
            };
            let state = state.clone();
            let req_for_task = req.clone();
            tokio::spawn(async move {
                account_for_stream(state, req_for_task, ctx, provider, leading, accumulated).await;
            });
            Ok(egress::streaming_response_to_axum(
                status,
                response_headers,
                Body::from_stream(forward),
            ))
        }
    }
}

/// Runs the response-phase pipeline and records accounting once a
/// streamed response finishes, entirely after the client has already
/// received every byte — per §5's "cancellation during streaming still
/// flushes already-emitted bytes" invariant, post-hoc accounting never
/// blocks or alters what was forwarded.
async fn account_for_stream(
    state: AppState,
    req: Request,
    ctx: RequestContext,
    provider: InferenceProvider,
    leading: Response,
    accumulated: tokio::sync::oneshot::Receiver<crate::types::Accumulated>,
) {
    let Ok(accumulated) = accumulated.await else {
        return;
    };
    let synthetic = Response {
        status: leading.status,
        headers: leading.headers,
        body: ResponseBody::Buffered(accumulated.bytes.clone()),
        tokens_out: egress::tokens_out_from_body(provider, &accumulated.bytes),
        truncated: accumulated.truncated,
    };
    let inner = &state.0;
    match inner.pipeline.run_response(&ctx, &req, synthetic).await {
        Ok(resp) => {
            inner.metrics.record_response(false);
            log_history(&req, Some(provider), resp.status, false);
        }
        Err(err) => {
            tracing::warn!(error = %err, "response-phase pipeline failed for streamed request");
        }
    }
}

fn log_history(req: &Request, provider: Option<InferenceProvider>, status: StatusCode, cache_hit: bool) {
    tracing::info!(
        request_id = %req.id,
        model = %req.model,
        provider = provider.map(|p| p.to_string()),
        status = status.as_u16(),
        cache_hit,
        tokens_in = req.tokens_in,
        "request completed"
    );
}

async fn models_handler(State(state): State<AppState>) -> axum::response::Response {
    let inner = &state.0;
    let enabled: Vec<InferenceProvider> = inner.provider_configs.keys().copied().collect();
    let mut models = inner.router.routable_models(&enabled);
    models.sort();
    axum::Json(json!({ "data": models })).into_response()
}

async fn health_handler() -> axum::response::Response {
    axum::Json(json!({ "status": "ok" })).into_response()
}

async fn ready_handler(State(state): State<AppState>) -> axum::response::Response {
    let inner = &state.0;
    let store_reachable = inner.cache_store.get("__tokenman_readiness_probe__").await.is_ok();
    let has_open_provider = inner
        .provider_configs
        .keys()
        .any(|p| inner.breakers.state(*p) != CircuitState::Open);

    if store_reachable && has_open_provider {
        axum::Json(json!({ "status": "ready" })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, axum::Json(json!({ "status": "not_ready" }))).into_response()
    }
}
