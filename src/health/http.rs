// src/health/http.rs
use std::any::Any;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, ProbeError};

use super::probe::HealthProbe;
use super::retry::{RetryDecision, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpParams {
    pub port: u16,
    pub enable_tls: bool,
    pub uri: String,
    pub method: String,
    pub host: String,
    pub headers: BTreeMap<String, String>,
    #[serde(with = "crate::config::duration::option")]
    pub timeout: Option<Duration>,
    pub expected_code: u16,
    /// Regex matched against the body; empty disables the check.
    pub expected_body: String,
    pub skip_tls_verify: bool,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            port: 443,
            enable_tls: true,
            uri: "/".to_string(),
            method: "GET".to_string(),
            host: "localhost".to_string(),
            headers: BTreeMap::new(),
            timeout: None,
            expected_code: 200,
            expected_body: String::new(),
            skip_tls_verify: false,
        }
    }
}

/// HTTP(S) request against the backend address, judged by status code and
/// optionally by body. Redirects are not followed.
#[derive(Debug)]
pub struct HttpProbe {
    params: HttpParams,
    timeout: Duration,
    method: Method,
    headers: HeaderMap,
    expected_body: Option<Regex>,
    client: Client,
}

impl HttpProbe {
    pub fn new(params: HttpParams, default_timeout: Duration) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCheck {
            kind: "http".to_string(),
            reason,
        };

        let timeout = params.timeout.unwrap_or(default_timeout);
        let method = Method::from_bytes(params.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid(format!("invalid method '{}'", params.method)))?;

        let mut headers = HeaderMap::new();
        let host = HeaderValue::from_str(&params.host)
            .map_err(|_| invalid(format!("invalid host '{}'", params.host)))?;
        headers.insert(HOST, host);
        for (name, value) in &params.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("invalid value for header '{name}'")))?;
            headers.append(name, value);
        }

        let expected_body = if params.expected_body.is_empty() {
            None
        } else {
            Some(
                Regex::new(&params.expected_body)
                    .map_err(|e| invalid(format!("invalid expected_body regex: {e}")))?,
            )
        };

        let probe = Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .danger_accept_invalid_certs(params.skip_tls_verify)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .map_err(|e| invalid(e.to_string()))?,
            params,
            timeout,
            method,
            headers,
            expected_body,
        };

        // Reject a bad uri now rather than on every probe.
        Url::parse(&probe.url(IpAddr::from([127, 0, 0, 1])))
            .map_err(|e| invalid(format!("invalid uri '{}': {e}", probe.params.uri)))?;

        Ok(probe)
    }

    fn scheme(&self) -> &'static str {
        if self.params.enable_tls {
            "https"
        } else {
            "http"
        }
    }

    fn url(&self, address: IpAddr) -> String {
        let uri = &self.params.uri;
        let slash = if uri.starts_with('/') { "" } else { "/" };
        format!(
            "{}://{}{slash}{uri}",
            self.scheme(),
            SocketAddr::new(address, self.params.port)
        )
    }

    async fn attempt(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .request(self.method.clone(), url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        if status != self.params.expected_code {
            return Err(ProbeError::Protocol(format!(
                "unexpected status code: got {status}, want {}",
                self.params.expected_code
            )));
        }

        if let Some(pattern) = &self.expected_body {
            let body = response
                .text()
                .await
                .map_err(|e| ProbeError::Protocol(format!("failed to read response body: {e}")))?;
            if !pattern.is_match(&body) {
                return Err(ProbeError::Protocol(format!(
                    "body does not match '{}'",
                    pattern.as_str()
                )));
            }
        }

        Ok(())
    }
}

fn classify(error: reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout
    } else if error.is_builder() {
        ProbeError::Other(error.to_string())
    } else {
        ProbeError::Connection(error.to_string())
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    fn type_tag(&self) -> String {
        format!("{}/{}", self.scheme(), self.params.port)
    }

    async fn perform(
        &self,
        address: IpAddr,
        record: &str,
        max_retries: u32,
    ) -> Result<(), ProbeError> {
        let url = self.url(address);

        RetryPolicy::new(max_retries)
            .execute(&url, || self.attempt(&url), |error| match error {
                ProbeError::Other(_) => RetryDecision::NoRetry,
                _ => RetryDecision::Retry,
            })
            .await?;

        debug!(
            record = %record,
            backend = %address,
            url = %url,
            method = %self.method,
            host = %self.params.host,
            "http healthcheck passed"
        );
        Ok(())
    }

    fn equivalent(&self, other: &dyn HealthProbe) -> bool {
        other
            .as_any()
            .downcast_ref::<HttpProbe>()
            .map_or(false, |o| o.params == self.params && o.timeout == self.timeout)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
