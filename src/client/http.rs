use std::time::Duration;

use reqwest::{Client as HttpClient, Method, StatusCode};
use serde_json::Value;
use tracing::Instrument;

use crate::{
    client::{
        mapping,
        request_id::{make_span_with_request_id, RequestId, REQUEST_ID_HEADER},
    },
    config::Config,
    error::{ApiError, AppError, AppResult},
    session::Session,
};

/// Thin HTTP wrapper shared by every typed API call
///
/// Attaches the session's bearer token, turns non-2xx responses into [`AppError`] and
/// tears the session down on 401.
#[derive(Clone)]
pub struct ResourceClient {
    http_client: HttpClient,
    base_url: String,
    session: Session,
}

impl ResourceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, session: Session) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn from_config(config: &Config, session: Session) -> AppResult<Self> {
        Self::new(config.api_url.clone(), config.request_timeout(), session)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> AppResult<Value> {
        self.call(Method::GET, path, params, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> AppResult<Value> {
        self.call(Method::POST, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> AppResult<Value> {
        self.call(Method::DELETE, path, &[], None).await
    }

    /// Issues one request and returns the decoded JSON body
    ///
    /// Empty 2xx bodies decode as `Value::Null`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> AppResult<Value> {
        let request_id = RequestId::new();
        let span = make_span_with_request_id(&method, path, &request_id);

        async move {
            let url = format!("{}{}", self.base_url, path);
            let token = self.session.token();

            let mut request = self
                .http_client
                .request(method, &url)
                .header(REQUEST_ID_HEADER, request_id.as_str());
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(authenticated = token.is_some(), "Sending request");

            let response = request.send().await.map_err(|e| {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "No response received");
                AppError::from(e)
            })?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                tracing::debug!(status = status.as_u16(), "Request succeeded");
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&text).map_err(|e| {
                    tracing::error!(error = %e, "Failed to decode response body");
                    AppError::Decode(format!("Invalid JSON from {}: {}", path, e))
                });
            }

            Err(self.error_from_response(status, &text, token.as_deref()))
        }
        .instrument(span)
        .await
    }

    fn error_from_response(&self, status: StatusCode, text: &str, token: Option<&str>) -> AppError {
        let raw: Option<Value> = serde_json::from_str(text).ok();
        let message = raw
            .as_ref()
            .and_then(mapping::error_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        let error = ApiError {
            status: status.as_u16(),
            message,
            raw,
        };

        if status == StatusCode::UNAUTHORIZED {
            if let Some(token) = token {
                self.session.invalidate(token);
            }
            tracing::warn!(status = error.status, "Request unauthorized");
            return AppError::Auth(error);
        }

        if status.is_server_error() {
            tracing::error!(status = error.status, message = %error.message, "Server error");
            AppError::Server(error)
        } else {
            tracing::info!(status = error.status, message = %error.message, "Request rejected");
            AppError::Client(error)
        }
    }
}
