//! JSON API endpoints.
//!
//! An API handler never touches the raw request. The registrar wraps it in
//! an endpoint that runs one linear pipeline per request:
//!
//! ```text
//! query string ─┐
//!               ├─ decode → ApiCall { method, args, kwargs, ctx } → handler → encode
//! body ─────────┘
//! ```
//!
//! - Every query parameter is parsed as JSON; values that are not valid JSON
//!   are passed as plain strings (`?n=3` is the number 3, `?q=abc` the
//!   string `"abc"`).
//! - POST and PUT bodies are decoded from `application/json` or
//!   `application/x-www-form-urlencoded`. Anything else, or malformed JSON,
//!   answers `400 Bad Request` before the handler runs.
//! - With `split_payload`, an object payload is merged into the keyword
//!   arguments; otherwise the payload is passed whole as `payload`.
//! - The handler's return value is serialized in the route's output format.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::error;

use crate::encoder;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::method::Method;
use crate::request::{FORM_URLENCODED, Request};
use crate::response::{IntoResponse, Response};
use crate::sessions::Context;

pub const JSON: &str = "application/json";

// ── ApiRoute ──────────────────────────────────────────────────────────────────

/// Declaration of an API endpoint, passed to [`Registrar::api`](crate::Registrar::api).
///
/// ```rust
/// use keyring_server::{ApiRoute, Method};
///
/// ApiRoute::new("/register")
///     .name("api_user_register")
///     .methods([Method::Post])
///     .split_payload(true)
///     .doc("Register a new account.\nReturns the created user.");
/// ```
#[derive(Clone, Debug)]
pub struct ApiRoute {
    pub(crate) path: String,
    pub(crate) name: Option<String>,
    pub(crate) doc: Option<String>,
    pub(crate) settings: ApiSettings,
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub(crate) methods: BTreeSet<Method>,
    pub(crate) format: String,
    pub(crate) split_payload: bool,
    pub(crate) pretty_output: bool,
    pub(crate) authenticated: bool,
}

impl ApiRoute {
    /// `GET, POST, PUT`, JSON output, pretty-printed, payload passed whole.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            name: None,
            doc: None,
            settings: ApiSettings {
                methods: [Method::Get, Method::Post, Method::Put].into(),
                format: JSON.to_owned(),
                split_payload: false,
                pretty_output: true,
                authenticated: false,
            },
        }
    }

    /// Handler name, looked up in the registrar's authenticated-methods registry.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Human-readable description for the API index.
    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.settings.methods = methods.into_iter().collect();
        self
    }

    /// Output media type. Only `application/json` output is serialized;
    /// for anything else a string result is sent verbatim.
    pub fn format(mut self, format: &str) -> Self {
        self.settings.format = format.to_owned();
        self
    }

    pub fn split_payload(mut self, split: bool) -> Self {
        self.settings.split_payload = split;
        self
    }

    pub fn pretty_output(mut self, pretty: bool) -> Self {
        self.settings.pretty_output = pretty;
        self
    }
}

/// Builds the API index entry for one endpoint.
pub(crate) fn describe(
    path: &str,
    methods: &BTreeSet<Method>,
    doc: Option<&str>,
    authenticated: bool,
) -> String {
    let methods = methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    let mut docs = match doc {
        None => "    No documentation exists for this method.".to_owned(),
        Some(doc) => doc.split('\n')
            .map(|line| format!("    {}", line.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    if authenticated {
        docs.push_str("\n    Authentication required.");
    }
    format!("{path}  {methods}\n{docs}\n\n")
}

// ── ApiError ──────────────────────────────────────────────────────────────────

/// Aborts an API request with a status and an optional message.
///
/// Rendered as `{"error": "<message>"}`, falling back to the status' reason
/// phrase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode) -> Self {
        Self { status, message: None }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: Some(message.into()) }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> Option<&str> { self.message.as_deref() }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.message
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("error").to_owned());
        let body = serde_json::json!({ "error": message }).to_string();
        Response::builder()
            .status(self.status)
            .json(body.into_bytes())
    }
}

// ── ApiCall ───────────────────────────────────────────────────────────────────

/// Decoded arguments of one API request.
///
/// Mirrors a call `handler(method, *args, **kwargs)`: the HTTP method comes
/// first, then the URL captures in route order, then the keyword arguments
/// built from the query string and the body.
pub struct ApiCall {
    method: Method,
    args: Vec<String>,
    kwargs: Map<String, Value>,
    ctx: Context,
}

impl ApiCall {
    pub fn method(&self) -> Method { self.method }
    pub fn args(&self) -> &[String] { &self.args }
    pub fn kwargs(&self) -> &Map<String, Value> { &self.kwargs }
    pub fn context(&self) -> &Context { &self.ctx }

    /// The undivided request payload, if it was not split into kwargs.
    pub fn payload(&self) -> Option<&Value> { self.kwargs.get("payload") }

    /// Deserializes one keyword argument. Missing or mistyped arguments
    /// answer `400 Bad Request`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let value = self.kwargs.get(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing argument `{name}`")))?;
        T::deserialize(value)
            .map_err(|err| ApiError::bad_request(format!("invalid argument `{name}`: {err}")))
    }

    /// Deserializes all keyword arguments into one struct.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        T::deserialize(&Value::Object(self.kwargs.clone()))
            .map_err(|err| ApiError::bad_request(format!("invalid arguments: {err}")))
    }
}

// ── ApiHandler ────────────────────────────────────────────────────────────────

/// Implemented for every valid API handler:
///
/// ```text
/// async fn name(call: ApiCall) -> Result<impl Serialize, ApiError>
/// ```
pub trait ApiHandler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self, settings: ApiSettings) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(ApiCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
}

impl<F, Fut, R> ApiHandler for F
where
    F: Fn(ApiCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn into_endpoint(self, settings: ApiSettings) -> BoxedHandler {
        Arc::new(ApiEndpoint { handler: self, settings: Arc::new(settings) })
    }
}

// ── ApiEndpoint ───────────────────────────────────────────────────────────────

/// Wraps an API handler with request decoding and response encoding.
pub(crate) struct ApiEndpoint<F> {
    handler: F,
    settings: Arc<ApiSettings>,
}

impl<F, Fut, R> ErasedHandler for ApiEndpoint<F>
where
    F: Fn(ApiCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, req: Request, ctx: Context) -> BoxFuture {
        if self.settings.authenticated && !ctx.is_authenticated() {
            let response = ApiError::with_message(StatusCode::UNAUTHORIZED, "authentication required")
                .into_response();
            return Box::pin(async move { response });
        }

        let call = match decode(&req, ctx, self.settings.split_payload) {
            Ok(call) => call,
            Err(err) => {
                let response = err.into_response();
                return Box::pin(async move { response });
            }
        };

        let fut = (self.handler)(call);
        let settings = Arc::clone(&self.settings);
        Box::pin(async move {
            match fut.await {
                Ok(value) => encode(&value, &settings.format, settings.pretty_output),
                Err(err) => err.into_response(),
            }
        })
    }
}

/// Query string and body → [`ApiCall`].
fn decode(req: &Request, ctx: Context, split_payload: bool) -> Result<ApiCall, ApiError> {
    let args = req.params().iter().map(|(_, value)| value.clone()).collect();

    let mut kwargs = Map::new();
    for (key, raw) in req.query_pairs() {
        if kwargs.contains_key(key) {
            continue;
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        kwargs.insert(key.clone(), value);
    }

    if req.method().has_payload() {
        let payload = match req.content_type().as_deref() {
            Some(JSON) => serde_json::from_slice::<Value>(req.body())
                .map_err(|err| ApiError::bad_request(format!("request body is not valid JSON: {err}")))?,
            Some(FORM_URLENCODED) => Value::Object(
                req.form().into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
            ),
            other => {
                return Err(ApiError::bad_request(format!(
                    "unsupported content type `{}`",
                    other.unwrap_or(""),
                )));
            }
        };

        match payload {
            Value::Object(fields) if split_payload => kwargs.extend(fields),
            payload => {
                kwargs.insert("payload".to_owned(), payload);
            }
        }
    }

    Ok(ApiCall { method: req.method(), args, kwargs, ctx })
}

/// Handler result → response body in the route's output format.
fn encode<R: Serialize>(value: &R, format: &str, pretty: bool) -> Response {
    let body = if format == JSON {
        encoder::dump(value, pretty)
    } else {
        serde_json::to_value(value).map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        })
    };

    match body {
        Ok(body) => Response::builder().body(format, body.into_bytes()),
        Err(err) => {
            error!("failed to encode API response: {err}");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}
