//! HTTP transport seam.
//!
//! The engine never follows redirects through the client library: every
//! exchange is a single round trip and the worker decides what to do with a
//! `3xx`. A [`Transport`] receives the wire-level request together with the
//! per-exchange options (timeout, proxy) it needs.

use crate::error::CrawlError;
use crate::request::{Headers, Request};
use crate::settings::Settings;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::{HeaderName, HeaderValue, COOKIE, HOST, USER_AGENT};
use http::{HeaderMap, Method};
use std::time::Duration;
use url::Url;

/// A request validated and converted into wire types.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Per-exchange settings handed to the transport alongside the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub timeout: Duration,
    pub proxy: Option<Url>,
}

impl WireRequest {
    /// Converts `request` into wire types, resolving its timeout and proxy.
    pub fn build(
        request: &Request,
        settings: &Settings,
    ) -> Result<(WireRequest, ExchangeOptions), CrawlError> {
        let fail = |reason: String| CrawlError::Build {
            method: request.method.clone(),
            url: request.url.clone(),
            reason,
        };

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| fail(format!("invalid method: {e}")))?;
        let url = Url::parse(&request.url).map_err(|e| fail(format!("invalid url: {e}")))?;

        let mut headers = HeaderMap::with_capacity(request.headers.len() + 3);
        for (name, value) in request.headers.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| fail(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| fail(format!("invalid value for header {name}: {e}")))?;
            headers.append(name, value);
        }

        if !request.cookies.is_empty() {
            let mut cookie = request
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            if let Some(existing) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                cookie = format!("{existing}; {cookie}");
            }
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| fail(format!("invalid cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        if let Some(host) = &request.host {
            let value =
                HeaderValue::from_str(host).map_err(|e| fail(format!("invalid host: {e}")))?;
            headers.insert(HOST, value);
        }

        if let Some(agent) = &settings.user_agent {
            if !headers.contains_key(USER_AGENT) {
                let value = HeaderValue::from_str(agent)
                    .map_err(|e| fail(format!("invalid user agent: {e}")))?;
                headers.insert(USER_AGENT, value);
            }
        }

        let proxy = request
            .proxy()
            .map(|proxy| Url::parse(proxy).map_err(|e| fail(format!("invalid proxy url: {e}"))))
            .transpose()?;

        let wire = WireRequest {
            method,
            url,
            headers,
            body: request.body.clone(),
        };
        let options = ExchangeOptions {
            timeout: request.timeout.unwrap_or(settings.request_timeout),
            proxy,
        };
        Ok((wire, options))
    }
}

/// The raw outcome of one exchange.
#[derive(Debug, Clone, Default)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Headers,
    pub cookies: Vec<(String, String)>,
    pub body: Bytes,
    /// DER-encoded certificates presented by the peer, leaf first.
    pub peer_certificates: Vec<Vec<u8>>,
}

impl WireResponse {
    pub fn new(status: u16) -> Self {
        WireResponse {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Performs single HTTP round trips for the engine.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` once. Redirects must not be followed.
    async fn exchange(
        &self,
        request: WireRequest,
        options: &ExchangeOptions,
    ) -> Result<WireResponse, CrawlError>;
}

/// Default [`Transport`] backed by `reqwest`.
///
/// Exchanges without a proxy share one client; each distinct proxy URL gets
/// its own client, built on first use.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    proxied: DashMap<String, reqwest::Client>,
    skip_tls_verify: bool,
}

impl ReqwestTransport {
    pub fn new(settings: &Settings) -> Result<Self, CrawlError> {
        let client = Self::client_builder(settings.skip_tls_verify)
            .build()
            .map_err(|e| CrawlError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(ReqwestTransport {
            client,
            proxied: DashMap::new(),
            skip_tls_verify: settings.skip_tls_verify,
        })
    }

    fn client_builder(skip_tls_verify: bool) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(skip_tls_verify)
            .tls_info(true)
    }

    fn client_for(&self, proxy: Option<&Url>) -> Result<reqwest::Client, CrawlError> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.proxied.get(proxy.as_str()) {
            return Ok(client.clone());
        }
        let client = reqwest::Proxy::all(proxy.as_str())
            .and_then(|p| Self::client_builder(self.skip_tls_verify).proxy(p).build())
            .map_err(|e| CrawlError::transport(proxy.as_str(), e))?;
        Ok(self
            .proxied
            .entry(proxy.as_str().to_string())
            .or_insert(client)
            .clone())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn exchange(
        &self,
        request: WireRequest,
        options: &ExchangeOptions,
    ) -> Result<WireResponse, CrawlError> {
        let client = self.client_for(options.proxy.as_ref())?;
        let url = request.url.to_string();
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                CrawlError::Timeout {
                    url: url.clone(),
                    timeout: options.timeout,
                }
            } else {
                CrawlError::transport(url.clone(), e)
            }
        };

        let response = client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(&classify)?;

        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let peer_certificates = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .map(|der| vec![der.to_vec()])
            .unwrap_or_default();
        let body = response.bytes().await.map_err(&classify)?;

        Ok(WireResponse {
            status,
            headers,
            cookies,
            body,
            peer_certificates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_folds_cookies_host_and_user_agent() {
        let settings = Settings {
            user_agent: Some("crawlkit-test".into()),
            ..Settings::default()
        };
        let request = Request::get("http://example.com/a")
            .with_header("Cookie", "session=1")
            .with_cookie("b", "2")
            .with_cookie("a", "1")
            .with_host("internal.example")
            .with_timeout(Duration::from_secs(3));

        let (wire, options) = WireRequest::build(&request, &settings).unwrap();
        assert_eq!(wire.method, Method::GET);
        assert_eq!(wire.headers[COOKIE], "session=1; a=1; b=2");
        assert_eq!(wire.headers[HOST], "internal.example");
        assert_eq!(wire.headers[USER_AGENT], "crawlkit-test");
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.proxy, None);
    }

    #[test]
    fn build_uses_default_timeout_and_request_proxy() {
        let request = Request::get("http://example.com/").with_proxy("http://127.0.0.1:3128");
        let (_, options) = WireRequest::build(&request, &Settings::default()).unwrap();
        assert_eq!(options.timeout, Settings::default().request_timeout);
        assert_eq!(
            options.proxy.as_ref().map(Url::as_str),
            Some("http://127.0.0.1:3128/")
        );
    }

    #[test]
    fn malformed_requests_fail_to_build() {
        let settings = Settings::default();
        for request in [
            Request::get("not a url"),
            Request::new("GE T", "http://example.com/", ""),
            Request::get("http://example.com/").with_header("X-Bad", "line\nbreak"),
            Request::get("http://example.com/").with_proxy("::"),
        ] {
            assert!(matches!(
                WireRequest::build(&request, &settings),
                Err(CrawlError::Build { .. })
            ));
        }
    }
}
