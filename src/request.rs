//! HTTP request value type.
//!
//! A `Request` describes one exchange the engine should perform together with
//! the lineage it belongs to. Redirects derive a new request by cloning
//! ([`Request::redirected`]); retries reuse the same value with an incremented
//! `retry_times`.

use crate::context::Context;
use crate::error::CrawlError;
use crate::history::History;
use crate::response::Response;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Meta key under which the per-request proxy URL is stored.
pub const PROXY_META_KEY: &str = "proxy_url";

/// Callback invoked with every successful (non-redirect) response.
pub type ResponseCallback = Arc<dyn Fn(&Response, &Context) + Send + Sync>;

/// Callback invoked when a request fails terminally.
pub type ErrorCallback = Arc<dyn Fn(&Request, &CrawlError, &Context) + Send + Sync>;

/// Callback deciding what happens with a followed redirect. Returning `None`
/// means the callback takes care of the proposed request itself.
pub type RedirectCallback =
    Arc<dyn Fn(&Response, Request, &Context) -> Option<Request> + Send + Sync>;

/// Ordered header multimap with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every value stored under `name` with `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every value stored under `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        headers.extend(iter);
        headers
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Headers {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.append(name, value);
        }
    }
}

impl From<&http::HeaderMap> for Headers {
    fn from(map: &http::HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// One HTTP exchange to perform, plus the lineage it belongs to.
#[derive(Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub body: Bytes,
    pub headers: Headers,
    pub cookies: BTreeMap<String, String>,
    /// Overrides `Settings::request_timeout` for this request.
    pub timeout: Option<Duration>,
    pub meta: HashMap<String, Value>,
    /// URL of the first request in the redirect chain.
    pub origin_url: String,
    /// Sent as the `Host` header when set.
    pub host: Option<String>,
    pub history: History,
    pub retry_times: u32,
    pub redirect_times: u32,
    pub(crate) callback: Option<ResponseCallback>,
    pub(crate) error_callback: Option<ErrorCallback>,
    pub(crate) context: Option<Context>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("meta", &self.meta)
            .field("history", &self.history.len())
            .field("retry_times", &self.retry_times)
            .field("redirect_times", &self.redirect_times)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(method: &str, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let url = url.into();
        Request {
            method: method.to_ascii_uppercase(),
            origin_url: url.clone(),
            url,
            body: body.into(),
            headers: Headers::new(),
            cookies: BTreeMap::new(),
            timeout: None,
            meta: HashMap::new(),
            host: None,
            history: History::new(),
            retry_times: 0,
            redirect_times: 0,
            callback: None,
            error_callback: None,
            context: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url, Bytes::new())
    }

    /// A GET request with `args` url-encoded into the query string.
    pub fn get_with_args<'a, I>(url: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut url = url.into();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(args)
            .finish();
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        Self::get(url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new("POST", url, body)
    }

    /// A POST request carrying `form` as an url-encoded body.
    pub fn form<'a, I>(url: impl Into<String>, form: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        Self::post(url, body).with_content_type("application/x-www-form-urlencoded")
    }

    pub fn get_urls<I, S>(urls: I) -> Vec<Request>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter().map(Self::get).collect()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers.set("Content-Type", content_type);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.set(name, value);
        }
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn with_meta_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Routes this request through `proxy_url`.
    pub fn with_proxy(self, proxy_url: impl Into<String>) -> Self {
        self.with_meta(PROXY_META_KEY, proxy_url)
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_cookies<I, K, V>(mut self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies
            .extend(cookies.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the request-level response callback. It runs before the
    /// crawler-level one.
    pub fn on_response<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Response, &Context) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Sets the request-level error callback. It runs before the
    /// crawler-level one.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request, &CrawlError, &Context) + Send + Sync + 'static,
    {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn proxy(&self) -> Option<&str> {
        self.meta.get(PROXY_META_KEY).and_then(Value::as_str)
    }

    /// The lineage this request was emitted from, once it has been submitted.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// A copy without its lineage, safe to keep around after the exchange.
    pub(crate) fn detached(&self) -> Request {
        Request {
            context: None,
            ..self.clone()
        }
    }

    /// Derives the next hop of a redirect chain.
    ///
    /// The clone keeps headers, cookies, meta, callbacks and lineage, appends
    /// the hop to its history and counts the redirect. A `303 See Other`
    /// switches to a body-less GET.
    pub(crate) fn redirected(&self, location: String, response: Arc<Response>) -> Request {
        let hop = Request {
            history: History::new(),
            ..self.detached()
        };
        let mut next = self.clone();
        next.history = self.history.append(Arc::new(hop), response.clone());
        next.url = location;
        next.redirect_times += 1;
        if response.status() == 303 {
            next.method = "GET".to_string();
            next.body = Bytes::new();
            next.headers.remove("Content-Type");
        }
        next
    }
}
