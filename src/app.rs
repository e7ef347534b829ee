//! The finished application: route table plus sessions.

use std::collections::BTreeMap;

use http::StatusCode;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::method::Method;
use crate::registrar::api_help;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Matched, Router};
use crate::sessions::SessionManager;

/// Immutable after [`Registrar::finish`](crate::Registrar::finish); shared by
/// every connection.
pub struct App {
    router: Router,
    sessions: SessionManager,
    titles: BTreeMap<String, String>,
    api_docs: BTreeMap<String, String>,
}

impl App {
    pub(crate) fn new(
        router: Router,
        sessions: SessionManager,
        titles: BTreeMap<String, String>,
        api_docs: BTreeMap<String, String>,
    ) -> Self {
        Self { router, sessions, titles, api_docs }
    }

    /// Routes one request and produces one response.
    ///
    /// Unknown paths answer 404; known paths without a route for the method
    /// answer 405 with an `allow` header. HEAD falls back to the GET route
    /// with the body dropped. URL captures are percent-decoded; a capture
    /// that does not decode to UTF-8 answers 400. Otherwise the session is
    /// loaded, the handler runs, and a changed session key is written back
    /// as a cookie.
    pub async fn call(&self, mut req: Request) -> Response {
        let head = req.method() == Method::Head;
        let matched = self.router.lookup(req.method(), req.path())
            .or_else(|| head.then(|| self.router.lookup(Method::Get, req.path())).flatten());
        let Some(Matched { handler, params }) = matched else {
            return self.unrouted(req.path());
        };
        let Some(params) = decode_captures(params) else {
            debug!(path = %req.path(), "URL capture is not valid UTF-8");
            return Response::status(StatusCode::BAD_REQUEST);
        };
        req.set_params(params);

        let ctx = self.sessions.load(&req);
        let mut response = handler.call(req, ctx.clone()).await;
        self.sessions.finish(&ctx, &mut response);
        if head {
            response.body.clear();
        }
        response
    }

    fn unrouted(&self, path: &str) -> Response {
        let mut allowed = self.router.allowed(path);
        if allowed.is_empty() {
            return Response::status(StatusCode::NOT_FOUND);
        }
        if allowed.contains(&Method::Get) && !allowed.contains(&Method::Head) {
            allowed.push(Method::Head);
            allowed.sort();
        }
        let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
        Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header("allow", &allow)
            .no_body()
    }

    /// Page titles keyed by full path.
    pub fn titles(&self) -> &BTreeMap<String, String> { &self.titles }

    pub fn title(&self, path: &str) -> Option<&str> {
        self.titles.get(path).map(String::as_str)
    }

    /// API documentation entries keyed by full path.
    pub fn api_docs(&self) -> &BTreeMap<String, String> { &self.api_docs }

    /// The API documentation as one text, ordered by path.
    pub fn api_help(&self) -> String {
        api_help(&self.api_docs)
    }
}

fn decode_captures(params: Vec<(String, String)>) -> Option<Vec<(String, String)>> {
    params.into_iter()
        .map(|(name, raw)| {
            let value = percent_decode_str(&raw).decode_utf8().ok()?.into_owned();
            Some((name, value))
        })
        .collect()
}
