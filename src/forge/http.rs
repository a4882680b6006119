//! forge::http
//!
//! Authenticated JSON transport shared by the REST adapters.
//!
//! Every request fetches a fresh bearer token from the adapter's
//! [`TokenProvider`] and every non-success response goes through
//! [`classify_status`], so adapters only deal in typed bodies and
//! `ProviderError`s.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::errors::{classify_status, classify_transport, ProviderError};
use crate::auth::TokenProvider;

/// Items requested per page on paginated list endpoints.
const PER_PAGE: usize = 100;

/// Upper bound on pages walked by [`HttpApi::get_paged`].
const MAX_PAGES: usize = 20;

/// One provider REST API reachable with one credential.
#[derive(Clone)]
pub(crate) struct HttpApi {
    client: Client,
    api_base: String,
    token: Arc<dyn TokenProvider>,
    provider: &'static str,
    headers: HeaderMap,
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("provider", &self.provider)
            .field("api_base", &self.api_base)
            .field("token_host", &self.token.host())
            .finish()
    }
}

impl HttpApi {
    pub(crate) fn new(
        client: Client,
        api_base: impl Into<String>,
        token: Arc<dyn TokenProvider>,
        provider: &'static str,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            provider,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header sent with every request.
    pub(crate) fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub(crate) fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Same API, different credential.
    pub(crate) fn with_token(&self, token: Arc<dyn TokenProvider>) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// Absolute URL for `path`; absolute inputs (pagination links) pass through.
    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.api_base, path.trim_start_matches('/'))
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProviderError> {
        self.request_accepting(method, path, None).await
    }

    async fn request_accepting(
        &self,
        method: Method,
        path: &str,
        accept: Option<&'static str>,
    ) -> Result<RequestBuilder, ProviderError> {
        let token = self.token.bearer_token().await?;
        let mut headers = self.headers.clone();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ProviderError::Unauthorized("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(accept) = accept {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }

        Ok(self.client.request(method, self.url(path)).headers(headers))
    }

    /// Send and classify. Only success responses are returned.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let request = builder.build().map_err(|e| classify_transport(&e))?;
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| classify_transport(&e))?;
        let status = response.status();
        debug!(provider = self.provider, %method, %url, status = status.as_u16(), "api request");

        if status.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        response.json().await.map_err(|e| classify_transport(&e))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self.send(self.request(Method::GET, path).await?).await?;
        Self::json(response).await
    }

    /// GET that maps 404 to `None`.
    pub(crate) async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ProviderError> {
        match self.get_json(path).await {
            Ok(value) => Ok(Some(value)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET every page of a `page`/`per_page` paginated list.
    ///
    /// A listing still going at [`MAX_PAGES`] is an error rather than a
    /// partial result.
    pub(crate) async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let items: Vec<T> = self
                .get_json(&format!("{path}{separator}per_page={PER_PAGE}&page={page}"))
                .await?;
            let done = items.len() < PER_PAGE;
            all.extend(items);
            if done {
                return Ok(all);
            }
        }
        Err(page_cap_exceeded(self.provider, path, MAX_PAGES))
    }

    /// GET raw bytes with a specific `Accept`, mapping 404 to `None`.
    pub(crate) async fn get_bytes_opt(
        &self,
        path: &str,
        accept: Option<&'static str>,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let builder = self.request_accepting(Method::GET, path, accept).await?;
        match self.send(builder).await {
            Ok(response) => {
                let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
                Ok(Some(bytes.to_vec()))
            }
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let builder = self.request(Method::POST, path).await?.json(body);
        Self::json(self.send(builder).await?).await
    }

    /// POST whose response body is ignored.
    pub(crate) async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ProviderError> {
        let builder = self.request(Method::POST, path).await?.json(body);
        self.send(builder).await.map(|_| ())
    }

    pub(crate) async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let builder = self.request(Method::PATCH, path).await?.json(body);
        Self::json(self.send(builder).await?).await
    }

    pub(crate) async fn post_multipart(&self, path: &str, form: Form) -> Result<(), ProviderError> {
        let builder = self.request(Method::POST, path).await?.multipart(form);
        self.send(builder).await.map(|_| ())
    }

    /// DELETE; `Ok(false)` when the resource was already gone.
    pub(crate) async fn delete(&self, path: &str) -> Result<bool, ProviderError> {
        match self.send(self.request(Method::DELETE, path).await?).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether an unauthenticated GET of `path` succeeds.
    pub(crate) async fn anonymous_visibility(&self, path: &str) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        debug!(provider = self.provider, url = %response.url(), status = response.status().as_u16(), "anonymous probe");
        visibility_from_response(response.status(), response.headers())
    }
}

/// Visibility of a repository from the response to an unauthenticated read.
///
/// Providers hide private repositories behind 401, 403 or 404. A 403 that
/// reports an exhausted anonymous quota is rate limiting, not privacy.
pub(crate) fn visibility_from_response(
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<bool, ProviderError> {
    if status.is_success() {
        return Ok(true);
    }
    match classify_status(status, headers, "visibility probe failed".into()) {
        ProviderError::Unauthorized(_) | ProviderError::Forbidden(_) | ProviderError::NotFound(_) => {
            Ok(false)
        }
        err => Err(err),
    }
}

/// Error for a listing that did not end within `max_pages`.
pub(crate) fn page_cap_exceeded(provider: &str, path: &str, max_pages: usize) -> ProviderError {
    warn!(provider, path, max_pages, "listing exceeds page cap");
    ProviderError::Unknown(format!(
        "listing '{}' did not end within {} pages",
        path, max_pages
    ))
}

/// Classify a failed response using its headers and error body.
pub(crate) async fn error_from_response(response: Response) -> ProviderError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &headers, error_message(status, &body))
}

/// Pull a human-readable message out of a provider error body.
///
/// GitHub uses `message`, GitLab `message` or `error`, Bitbucket
/// `error.message`.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() || trimmed.len() > 200 {
            fallback()
        } else {
            trimmed.to_string()
        };
    };

    let text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    };

    value
        .get("message")
        .and_then(text)
        .or_else(|| value.pointer("/error/message").and_then(text))
        .or_else(|| value.get("error").and_then(text))
        .unwrap_or_else(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn api() -> HttpApi {
        HttpApi::new(
            Client::new(),
            "https://api.example.com/v1/",
            Arc::new(StaticToken::new("example.com", "secret-token")),
            "test",
        )
    }

    #[test]
    fn url_joins_relative_and_keeps_absolute() {
        let api = api();
        assert_eq!(api.url("/repos/o/r"), "https://api.example.com/v1/repos/o/r");
        assert_eq!(api.url("repos/o/r"), "https://api.example.com/v1/repos/o/r");
        assert_eq!(
            api.url("https://api.example.com/v1/repos?page=2"),
            "https://api.example.com/v1/repos?page=2"
        );
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", api());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("api.example.com"));
    }

    #[test]
    fn visibility_from_probe_status() {
        let none = HeaderMap::new();
        assert!(visibility_from_response(StatusCode::OK, &none).unwrap());
        assert!(!visibility_from_response(StatusCode::NOT_FOUND, &none).unwrap());
        assert!(!visibility_from_response(StatusCode::UNAUTHORIZED, &none).unwrap());
        assert!(!visibility_from_response(StatusCode::FORBIDDEN, &none).unwrap());
        assert!(visibility_from_response(StatusCode::BAD_GATEWAY, &none).is_err());
    }

    #[test]
    fn visibility_surfaces_rate_limits() {
        let mut exhausted = HeaderMap::new();
        exhausted.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        exhausted.insert("retry-after", HeaderValue::from_static("30"));
        let err = visibility_from_response(StatusCode::FORBIDDEN, &exhausted).unwrap_err();
        assert_eq!(err.kind(), crate::forge::ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(30)));

        let err = visibility_from_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::forge::ErrorKind::RateLimited);
    }

    #[test]
    fn error_message_shapes() {
        let s = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(s, r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_message(s, r#"{"error":"invalid_token"}"#), "invalid_token");
        assert_eq!(
            error_message(s, r#"{"type":"error","error":{"message":"Repository not found"}}"#),
            "Repository not found"
        );
        assert_eq!(
            error_message(s, r#"{"message":{"base":["is invalid"]}}"#),
            r#"{"base":["is invalid"]}"#
        );
        assert_eq!(error_message(s, "plain text"), "plain text");
        assert_eq!(error_message(s, ""), "Bad Request");
    }
}
