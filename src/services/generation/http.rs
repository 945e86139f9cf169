use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::provider::{GeneratedArtifact, GenerationProvider, ProviderError};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    context: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    url: String,
}

/// Provider calling a JSON endpoint: `POST {prompt, context}` answered with `{url}`.
#[derive(Clone)]
pub struct HttpImageProvider {
    name: Arc<str>,
    client: Client,
    endpoint: Arc<str>,
}

impl HttpImageProvider {
    /// Build a provider posting to `endpoint`. `timeout` bounds the whole request.
    pub fn new(name: &str, endpoint: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: Arc::from(name),
            client,
            endpoint: Arc::from(endpoint.as_str()),
        })
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::TOO_MANY_REQUESTS
        | StatusCode::SERVICE_UNAVAILABLE => ProviderError::Unavailable(detail),
        _ => ProviderError::Rejected(detail),
    }
}

impl GenerationProvider for HttpImageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        prompt: String,
        context: String,
    ) -> BoxFuture<'static, Result<GeneratedArtifact, ProviderError>> {
        let provider = self.clone();
        Box::pin(async move {
            let response = provider
                .client
                .post(provider.endpoint.as_ref())
                .json(&GenerateRequest {
                    prompt: &prompt,
                    context: &context,
                })
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        ProviderError::Rejected(format!("request timed out: {err}"))
                    } else {
                        ProviderError::Transport(err.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }

            let payload: GenerateResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::Rejected(format!("malformed response: {err}")))?;
            if payload.url.trim().is_empty() {
                return Err(ProviderError::Rejected("response carried an empty url".into()));
            }
            Ok(GeneratedArtifact {
                image_url: payload.url,
            })
        })
    }
}
