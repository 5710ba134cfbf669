//! Resilient upstream dispatch (§4.7-4.8): for each eligible provider,
//! runs the retry+circuit-breaker loop over a pooled HTTP client, then
//! either buffers the response body or opens an SSE passthrough stream.

pub mod client;
pub mod stream;

use std::{collections::HashMap, time::Duration};

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use http::{HeaderMap, StatusCode};
use reqwest_eventsource::RequestBuilderExt;
use tokio_util::sync::CancellationToken;

use crate::{
    circuit_breaker::{self, Admission, AttemptOutcome, CircuitBreakerRegistry},
    config::{DispatcherConfig, ProviderConfig, RetryConfig},
    error::{ApiError, InitError},
    retry_engine::{FullJitterBackoff, capped_retry_after, is_retryable_status},
    types::{InferenceProvider, Request, Response, ResponseBody},
};

pub struct Dispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, retry: RetryConfig) -> Result<Self, InitError> {
        Ok(Self {
            client: client::build_pooled_client(&config)?,
            config,
            retry,
        })
    }

    /// Tries each eligible provider in order, admitting through its
    /// breaker and running the retry loop. Returns the provider that
    /// ultimately served the request alongside its response.
    pub async fn dispatch(
        &self,
        providers: &[InferenceProvider],
        provider_configs: &HashMap<InferenceProvider, ProviderConfig>,
        breakers: &CircuitBreakerRegistry,
        req: &Request,
        body: Bytes,
        extra_headers: &HeaderMap,
        cancellation: &CancellationToken,
    ) -> Result<(InferenceProvider, Response), ApiError> {
        if providers.is_empty() {
            return Err(ApiError::CircuitOpen {
                provider: req.model.clone(),
            });
        }

        let mut last_err = None;
        for provider in providers.iter().copied() {
            let Some(provider_config) = provider_configs.get(&provider) else {
                continue;
            };
            match self
                .dispatch_to_provider(
                    provider,
                    provider_config,
                    breakers,
                    req,
                    body.clone(),
                    extra_headers,
                    cancellation,
                )
                .await
            {
                Ok(resp) => return Ok((provider, resp)),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or(ApiError::CircuitOpen {
            provider: req.model.clone(),
        }))
    }

    async fn dispatch_to_provider(
        &self,
        provider: InferenceProvider,
        provider_config: &ProviderConfig,
        breakers: &CircuitBreakerRegistry,
        req: &Request,
        body: Bytes,
        extra_headers: &HeaderMap,
        cancellation: &CancellationToken,
    ) -> Result<Response, ApiError> {
        let url = format!(
            "{}{}",
            provider_config.base_url(),
            provider.chat_path()
        );
        let mut backoff = FullJitterBackoff::new(self.retry.clone());
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if breakers.admit(provider) == Admission::Reject {
                return Err(ApiError::CircuitOpen {
                    provider: provider.to_string(),
                });
            }

            let mut builder = self
                .client
                .post(&url)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            for (name, value) in extra_headers {
                builder = builder.header(name, value);
            }
            let builder = client::authenticate(builder, provider, provider_config);

            if req.stream {
                return self.attempt_streaming(provider, breakers, builder).await;
            }

            let outcome = self.attempt_buffered(builder, cancellation).await;
            let (attempt_outcome, result) = match &outcome {
                Ok(resp) => (
                    circuit_breaker::classify(Some(resp.status.as_u16()), false, false),
                    None,
                ),
                Err(AttemptError::Transport) => (AttemptOutcome::Failure, None),
                Err(AttemptError::Timeout) => {
                    (circuit_breaker::classify(None, false, true), None)
                }
                Err(AttemptError::RetryAfter(secs)) => {
                    (AttemptOutcome::Success, Some(*secs))
                }
            };
            breakers.record(provider, attempt_outcome);

            match outcome {
                Ok(resp) if !is_retryable_status(resp.status.as_u16()) => return Ok(resp),
                Ok(resp) if attempt == max_attempts => return Ok(resp),
                Ok(_) => {}
                Err(AttemptError::RetryAfter(_)) if attempt == max_attempts => {
                    return Err(ApiError::UpstreamError {
                        status: StatusCode::TOO_MANY_REQUESTS,
                        body: "upstream rate limited".to_string(),
                    });
                }
                Err(AttemptError::Timeout) if attempt == max_attempts => {
                    return Err(ApiError::UpstreamTimeout);
                }
                Err(AttemptError::Transport) if attempt == max_attempts => {
                    return Err(ApiError::UpstreamError {
                        status: StatusCode::BAD_GATEWAY,
                        body: "upstream connection failed".to_string(),
                    });
                }
                Err(_) => {}
            }

            let delay = match result {
                Some(secs) => capped_retry_after(Duration::from_secs(secs), self.retry.max_delay),
                None => backoff.next().unwrap_or(self.retry.base_delay),
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancellation.cancelled() => return Err(ApiError::UpstreamTimeout),
            }
        }

        Err(ApiError::UpstreamTimeout)
    }

    async fn attempt_buffered(
        &self,
        builder: reqwest::RequestBuilder,
        cancellation: &CancellationToken,
    ) -> Result<Response, AttemptError> {
        let send = builder.timeout(self.config.request_timeout).send();
        let response = tokio::select! {
            result = send => result.map_err(|err| {
                if err.is_timeout() { AttemptError::Timeout } else { AttemptError::Transport }
            })?,
            _ = cancellation.cancelled() => return Err(AttemptError::Timeout),
        };

        let status = response.status();
        let headers = response.headers().clone();

        if status.as_u16() == 429 {
            if let Some(retry_after) = parse_retry_after(&headers) {
                return Err(AttemptError::RetryAfter(retry_after));
            }
        }

        let (body, truncated) = read_capped(response, self.config.max_response_size)
            .await
            .map_err(|_| AttemptError::Transport)?;

        Ok(Response {
            status,
            headers,
            body: ResponseBody::Buffered(body),
            tokens_out: 0,
            truncated,
        })
    }

    async fn attempt_streaming(
        &self,
        provider: InferenceProvider,
        breakers: &CircuitBreakerRegistry,
        builder: reqwest::RequestBuilder,
    ) -> Result<Response, ApiError> {
        let mut source = builder.eventsource().map_err(|err| {
            ApiError::internal("dispatcher", format!("failed to open event source: {err}"))
        })?;

        let leading = match stream::poll_first_event(&mut source).await {
            stream::FirstEvent::Connected => {
                breakers.record(provider, AttemptOutcome::Success);
                None
            }
            stream::FirstEvent::Message(data) => {
                breakers.record(provider, AttemptOutcome::Success);
                Some(data)
            }
            stream::FirstEvent::InvalidStatus(status) => {
                breakers.record(
                    provider,
                    circuit_breaker::classify(Some(status.as_u16()), false, false),
                );
                return Err(ApiError::UpstreamError {
                    status,
                    body: "upstream rejected streaming request".to_string(),
                });
            }
            stream::FirstEvent::TransportError => {
                breakers.record(provider, AttemptOutcome::Failure);
                return Err(ApiError::UpstreamTimeout);
            }
        };

        let byte_stream = stream::into_byte_stream(source, leading).map_err(std::io::Error::other);
        let handle = crate::types::body::wrap_stream(
            byte_stream,
            self.config.max_response_size,
            self.config.streaming_deadline,
        );

        Ok(Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Streaming(handle),
            tokens_out: 0,
            truncated: false,
        })
    }
}

enum AttemptError {
    Transport,
    Timeout,
    RetryAfter(u64),
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

async fn read_capped(
    response: reqwest::Response,
    max_size: usize,
) -> Result<(Bytes, bool), reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut acc = BytesMut::new();
    let mut truncated = false;
    while let Some(chunk) = stream.try_next().await? {
        if acc.len() < max_size {
            let remaining = max_size - acc.len();
            if chunk.len() <= remaining {
                acc.extend_from_slice(&chunk);
            } else {
                acc.extend_from_slice(&chunk[..remaining]);
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }
    Ok((acc.freeze(), truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(2));
    }

    #[test]
    fn missing_retry_after_is_none() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }
}
