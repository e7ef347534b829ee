//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use url::form_urlencoded;

use crate::method::Method;

/// An incoming HTTP request with its body fully read.
///
/// Query string and URL captures are decoded up front; form fields are
/// decoded on demand from the body.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        query: Option<&str>,
        headers: Vec<(String, String)>,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let query = query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self { method, path, query, headers, body, params: Vec::new(), remote_addr }
    }

    /// Starts an in-process request, e.g. `Request::builder(Method::Get, "/a?b=1")`.
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named argument: a URL capture, or for GET routes a query
    /// parameter merged in by the registrar.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All named arguments, URL captures first in declaration order.
    pub fn params(&self) -> &[(String, String)] { &self.params }

    /// First value of a query-string parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_pairs(&self) -> &[(String, String)] { &self.query }

    /// Media type of the body without parameters, lowercased:
    /// `Application/JSON; charset=utf-8` yields `application/json`.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|v| v.split_once(';').map_or(v, |(essence, _)| essence).trim().to_ascii_lowercase())
    }

    /// Decoded `application/x-www-form-urlencoded` body fields, in order.
    /// Empty for any other content type.
    pub fn form(&self) -> Vec<(String, String)> {
        if self.content_type().as_deref() != Some(FORM_URLENCODED) {
            return Vec::new();
        }
        form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// First value of a form field.
    pub fn form_value(&self, key: &str) -> Option<String> {
        self.form().into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn referrer(&self) -> Option<&str> { self.header("referer") }

    pub fn user_agent(&self) -> &str { self.header("user-agent").unwrap_or("") }

    /// Value of a cookie from the `cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn set_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    /// Adds a named argument unless one with that key is already present.
    pub(crate) fn insert_param_if_absent(&mut self, key: &str, value: &str) {
        if self.param(key).is_none() {
            self.params.push((key.to_owned(), value.to_owned()));
        }
    }
}

pub(crate) const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Builder for in-process requests. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type.
    pub fn json(self, body: &str) -> Self {
        self.header("content-type", "application/json")
            .body(body.to_owned())
    }

    /// Url-encoded form body with a matching content type.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.header("content-type", FORM_URLENCODED).body(body)
    }

    pub fn build(self) -> Request {
        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query)),
            None => (self.uri.clone(), None),
        };
        Request::new(self.method, path, query, self.headers, self.body, self.remote_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_splits_path_and_query() {
        let req = Request::builder(Method::Get, "/account/login?next=%2Fkeys&next=%2Fother").build();
        assert_eq!(req.path(), "/account/login");
        assert_eq!(req.query("next"), Some("/keys"));
        assert_eq!(req.query_pairs().len(), 2);
    }

    #[test]
    fn content_type_drops_parameters() {
        let req = Request::builder(Method::Post, "/")
            .header("Content-Type", "application/json; charset=utf-8")
            .build();
        assert_eq!(req.content_type().as_deref(), Some("application/json"));

        let req = Request::builder(Method::Post, "/")
            .header("content-type", "Application/JSON")
            .build();
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn form_fields_require_form_content_type() {
        let req = Request::builder(Method::Post, "/")
            .form(&[("email", "a@b.c"), ("password", "p w")])
            .build();
        assert_eq!(req.form_value("password").as_deref(), Some("p w"));

        let req = Request::builder(Method::Post, "/").body("email=a%40b.c").build();
        assert!(req.form().is_empty());
    }

    #[test]
    fn cookies_are_split_across_headers() {
        let req = Request::builder(Method::Get, "/")
            .header("cookie", "theme=dark; session-key=session-abc")
            .header("Cookie", "lang=en")
            .build();
        assert_eq!(req.cookie("session-key"), Some("session-abc"));
        assert_eq!(req.cookie("lang"), Some("en"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn params_keep_first_insertion() {
        let mut req = Request::builder(Method::Get, "/").build();
        req.set_params(vec![("id".into(), "7".into())]);
        req.insert_param_if_absent("id", "9");
        req.insert_param_if_absent("count", "3");
        assert_eq!(req.param("id"), Some("7"));
        assert_eq!(req.param("count"), Some("3"));
    }
}
