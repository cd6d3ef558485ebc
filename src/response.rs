//! HTTP response value type with document queries.

use crate::error::QueryError;
use crate::history::History;
use crate::html::{Document, QueryCache, Selector, Selectors};
use crate::request::{Headers, Request};
use crate::transport::WireResponse;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The result of one HTTP exchange.
///
/// Meta and history are copied from the producing request when the response
/// is built and never change afterwards. The HTML document is parsed on
/// first query, or up front when `auto_parse_html` is enabled.
#[derive(Clone)]
pub struct Response {
    url: String,
    status: u16,
    headers: Headers,
    cookies: Vec<(String, String)>,
    body: Bytes,
    request: Arc<Request>,
    meta: HashMap<String, Value>,
    history: History,
    peer_certificates: Vec<Vec<u8>>,
    document: OnceLock<Document>,
    cache: Arc<QueryCache>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("history", &self.history.len())
            .field("parsed", &self.is_parsed())
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn from_wire(
        wire: WireResponse,
        request: Arc<Request>,
        cache: Arc<QueryCache>,
        parse: bool,
    ) -> Self {
        let response = Response {
            url: request.url.clone(),
            status: wire.status,
            headers: wire.headers,
            cookies: wire.cookies,
            body: wire.body,
            meta: request.meta.clone(),
            history: request.history.clone(),
            request,
            peer_certificates: wire.peer_certificates,
            document: OnceLock::new(),
            cache,
        };
        if parse {
            response.document();
        }
        response
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Canonical reason phrase for the status code, or `""` for unknown codes.
    pub fn status_text(&self) -> &'static str {
        http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("")
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Cookies set by this response, in the order the server sent them.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The request that produced this response, without its lineage.
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn meta(&self) -> &HashMap<String, Value> {
        &self.meta
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// DER-encoded peer certificates presented during the TLS handshake.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }

    pub fn is_parsed(&self) -> bool {
        self.document.get().is_some()
    }

    pub fn document(&self) -> &Document {
        self.document
            .get_or_init(|| Document::parse_with_cache(&self.text(), Arc::clone(&self.cache)))
    }

    /// The document root; queries from it run in global scope.
    pub fn selector(&self) -> Selector<'_> {
        self.document().root()
    }

    pub fn css(&self, selector: &str) -> Result<Selectors<'_>, QueryError> {
        self.document().css(selector)
    }

    pub fn xpath(&self, expr: &str) -> Result<Selectors<'_>, QueryError> {
        self.document().xpath(expr)
    }
}
