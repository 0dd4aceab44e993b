//! Client for the remote license service.

#[cfg(test)]
pub(crate) mod fake;

use crate::error::ApiError;
use crate::model::{
    ApplyRequest, ClientConfig, LicensePage, LicensePayload, RenewRequest, ReturnRequest,
    SoftwareLicense,
};
use crate::notify::Notifier;
use crate::query::{ListRequest, LIST_PATH};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use std::time::Instant;

pub const USAGE_APPLY_PATH: &str = "/licenses_usage_records/apply";
pub const USAGE_RENEW_PATH: &str = "/licenses_usage_records/renew";
pub const USAGE_RETURN_PATH: &str = "/licenses_usage_records/return";
pub const LICENSE_RECORD_PATH: &str = "/softwarelicense";

/// Remote operations the license views depend on.
///
/// Usage-record commands only report success; callers re-fetch the license to learn
/// its authoritative status.
#[async_trait]
pub trait LicenseApi: Send + Sync {
    async fn list(&self, request: &ListRequest) -> Result<LicensePage, ApiError>;

    async fn get(&self, license_id: i64) -> Result<SoftwareLicense, ApiError>;

    async fn apply(&self, request: &ApplyRequest) -> Result<(), ApiError>;

    async fn renew(&self, request: &RenewRequest) -> Result<(), ApiError>;

    async fn release(&self, request: &ReturnRequest) -> Result<(), ApiError>;

    async fn create(&self, payload: &LicensePayload) -> Result<SoftwareLicense, ApiError>;

    async fn update(
        &self,
        license_id: i64,
        payload: &LicensePayload,
    ) -> Result<SoftwareLicense, ApiError>;
}

pub struct HttpLicenseApi {
    http: reqwest::Client,
    base_url: String,
    notifier: Option<Notifier>,
}

impl HttpLicenseApi {
    pub fn new(cfg: &ClientConfig, notifier: Option<Notifier>) -> Result<Self> {
        Url::parse(&cfg.base_url).with_context(|| format!("invalid base url {}", cfg.base_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = cfg.token.as_deref().filter(|t| !t.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .default_headers(headers)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            notifier,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::Validation(format!("invalid url for {path}: {e}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<T, ApiError> {
        let result = self.exchange(method.clone(), path, build).await.and_then(|body| {
            serde_json::from_slice::<T>(&body).map_err(ApiError::from)
        });
        if let Err(e) = &result {
            tracing::warn!(%method, path, error = %e, "license api call failed");
            if let Some(notifier) = &self.notifier {
                notifier.error(e.to_string());
            }
        }
        result
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.url(path)?;
        let started = Instant::now();
        let resp = build(self.http.request(method.clone(), url)).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        tracing::debug!(
            %method,
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "license api call"
        );
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), error_detail(&body)));
        }
        Ok(body.to_vec())
    }
}

/// Pull the server's `detail` out of an error body.
fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl LicenseApi for HttpLicenseApi {
    async fn list(&self, request: &ListRequest) -> Result<LicensePage, ApiError> {
        let pairs = request.query_pairs();
        self.send(Method::GET, request.path(), |b| b.query(&pairs))
            .await
    }

    async fn get(&self, license_id: i64) -> Result<SoftwareLicense, ApiError> {
        let path = format!("{LIST_PATH}/{license_id}");
        self.send(Method::GET, &path, |b| b).await
    }

    async fn apply(&self, request: &ApplyRequest) -> Result<(), ApiError> {
        self.send::<IgnoredAny>(Method::POST, USAGE_APPLY_PATH, |b| b.json(request))
            .await
            .map(|_| ())
    }

    async fn renew(&self, request: &RenewRequest) -> Result<(), ApiError> {
        self.send::<IgnoredAny>(Method::POST, USAGE_RENEW_PATH, |b| b.json(request))
            .await
            .map(|_| ())
    }

    async fn release(&self, request: &ReturnRequest) -> Result<(), ApiError> {
        self.send::<IgnoredAny>(Method::POST, USAGE_RETURN_PATH, |b| b.json(request))
            .await
            .map(|_| ())
    }

    async fn create(&self, payload: &LicensePayload) -> Result<SoftwareLicense, ApiError> {
        self.send(Method::POST, LICENSE_RECORD_PATH, |b| b.json(payload))
            .await
    }

    async fn update(
        &self,
        license_id: i64,
        payload: &LicensePayload,
    ) -> Result<SoftwareLicense, ApiError> {
        let path = format!("{LICENSE_RECORD_PATH}/{license_id}");
        self.send(Method::PUT, &path, |b| b.json(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(base_url: &str, token: Option<&str>) -> ClientConfig {
        ClientConfig {
            base_url: base_url.to_string(),
            token: token.map(str::to_string),
            timeout: Duration::from_secs(1),
            page_size: 25,
            grant_days: 60,
            renew_days: 60,
            user_agent: "license-desk/test".into(),
        }
    }

    #[test]
    fn urls_join_without_double_slash() {
        let api = HttpLicenseApi::new(&config("http://127.0.0.1:8000/", Some("t")), None).unwrap();
        let url = api.url("/licenses_with_info/42").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/licenses_with_info/42");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpLicenseApi::new(&config("not a url", None), None).is_err());
    }

    #[test]
    fn error_detail_reads_string_and_structured_bodies() {
        assert_eq!(
            error_detail(r#"{"detail":"此授权已被使用"}"#.as_bytes()).as_deref(),
            Some("此授权已被使用")
        );
        assert!(error_detail(br#"{"detail":[{"loc":["body"]}]}"#)
            .unwrap()
            .contains("loc"));
        assert_eq!(error_detail(b"<html>"), None);
    }

    #[tokio::test]
    async fn unreachable_server_reports_and_propagates() {
        let (notifier, mut rx) = Notifier::channel();
        // Port 9 (discard) on localhost is closed in test environments.
        let api = HttpLicenseApi::new(&config("http://127.0.0.1:9", None), Some(notifier)).unwrap();
        let err = api.get(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_) | ApiError::Timeout));
        assert_eq!(rx.try_recv().unwrap().level, crate::notify::NoticeLevel::Error);
    }
}
