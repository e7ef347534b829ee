use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keyring_server::{
    ApiCall, ApiError, ApiRoute, App, Context, MemoryStore, Method, Registrar, Request, Response,
    SessionManager, StatusCode,
};
use serde_json::{Map, Value, json};

fn finish(registrar: Registrar) -> App {
    let sessions = SessionManager::new(Arc::new(MemoryStore::new()), "session-key");
    registrar.finish(sessions).unwrap()
}

fn body_json(response: &Response) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

async fn echo_param(req: Request, _ctx: Context) -> String {
    format!("{:?}", req.param("count"))
}

async fn echo_kwargs(call: ApiCall) -> Result<Map<String, Value>, ApiError> {
    Ok(call.kwargs().clone())
}

async fn echo_call(call: ApiCall) -> Result<Value, ApiError> {
    Ok(json!({ "method": call.method().as_str(), "args": call.args(), "kwargs": call.kwargs() }))
}

#[tokio::test]
async fn nested_contexts_resolve_most_recent_first() {
    let mut registrar = Registrar::new("/api");
    {
        let mut a = registrar.context("/a");
        let mut b = a.context("/b");
        let mut c = b.context("/c");
        c.get("/s", None, echo_param).unwrap();
    }
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/c/b/a/s").build()).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let response = app.call(Request::builder(Method::Get, "/a/b/c/s").build()).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_query_parameters_arrive_as_raw_strings() {
    let mut registrar = Registrar::new("/api");
    registrar.get("/items", None, echo_param).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/items?count=3").build()).await;
    assert_eq!(response.body(), br#"Some("3")"#);
}

#[tokio::test]
async fn get_url_capture_beats_query_parameter() {
    let mut registrar = Registrar::new("/api");
    registrar.get("/items/{count}", None, echo_param).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/items/7?count=3").build()).await;
    assert_eq!(response.body(), br#"Some("7")"#);
}

#[tokio::test]
async fn post_route_only_answers_post() {
    let mut registrar = Registrar::new("/api");
    registrar.post("/submit", echo_param).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Post, "/submit?count=3").build()).await;
    assert_eq!(response.body(), b"None");

    let response = app.call(Request::builder(Method::Get, "/submit").build()).await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("POST"));
}

#[tokio::test]
async fn api_split_payload_merges_object_into_kwargs() {
    let mut registrar = Registrar::new("/api");
    registrar.api(ApiRoute::new("/echo").split_payload(true), echo_kwargs).unwrap();
    let app = finish(registrar);

    let req = Request::builder(Method::Post, "/api/echo").json(r#"{"a": 1}"#).build();
    let response = app.call(req).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(body_json(&response), json!({"a": 1}));
}

#[tokio::test]
async fn api_without_split_passes_payload_whole() {
    let mut registrar = Registrar::new("/api");
    registrar.api(ApiRoute::new("/echo"), echo_kwargs).unwrap();
    let app = finish(registrar);

    let req = Request::builder(Method::Put, "/api/echo?verbose=true").json(r#"{"a": 1}"#).build();
    let response = app.call(req).await;
    assert_eq!(body_json(&response), json!({"verbose": true, "payload": {"a": 1}}));
}

#[tokio::test]
async fn api_call_carries_method_and_captures() {
    let mut registrar = Registrar::new("/api");
    {
        let mut keys = registrar.context("/keys");
        keys.api(ApiRoute::new("/{owner}/{name}"), echo_call).unwrap();
    }
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/api/keys/alice/laptop?n=3").build()).await;
    assert_eq!(
        body_json(&response),
        json!({"method": "GET", "args": ["alice", "laptop"], "kwargs": {"n": 3}}),
    );
}

#[tokio::test]
async fn malformed_json_is_rejected_before_the_handler() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let handler = move |_call: ApiCall| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, ApiError>(())
        }
    };

    let mut registrar = Registrar::new("/api");
    registrar.api(ApiRoute::new("/strict"), handler).unwrap();
    let app = finish(registrar);

    let req = Request::builder(Method::Post, "/api/strict").json("not-json").build();
    let response = app.call(req).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(body_json(&response)["error"].as_str().unwrap().contains("not valid JSON"));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let mut registrar = Registrar::new("/api");
    registrar.api(ApiRoute::new("/echo"), echo_kwargs).unwrap();
    let app = finish(registrar);

    let req = Request::builder(Method::Post, "/api/echo")
        .header("content-type", "text/plain")
        .body("hello")
        .build();
    assert_eq!(app.call(req).await.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn handler_errors_keep_their_status() {
    let mut registrar = Registrar::new("/api");
    registrar
        .api(ApiRoute::new("/gone").methods([Method::Delete]), |_call: ApiCall| async {
            Err::<(), _>(ApiError::with_message(StatusCode::GONE, "already deleted"))
        })
        .unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Delete, "/api/gone").build()).await;
    assert_eq!(response.status_code(), StatusCode::GONE);
    assert_eq!(body_json(&response), json!({"error": "already deleted"}));
}

#[tokio::test]
async fn compact_and_non_json_output() {
    let mut registrar = Registrar::new("/api");
    registrar
        .api(ApiRoute::new("/compact").pretty_output(false), echo_kwargs)
        .unwrap()
        .api(ApiRoute::new("/plain").format("text/plain"), |_call: ApiCall| async {
            Ok::<_, ApiError>("pong")
        })
        .unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/api/compact?a=1").build()).await;
    assert_eq!(response.body(), br#"{"a":1}"#);

    let response = app.call(Request::builder(Method::Get, "/api/plain").build()).await;
    assert_eq!(response.body(), b"pong");
    assert_eq!(response.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn authenticated_endpoint_rejects_anonymous_caller() {
    let mut registrar = Registrar::new("/api");
    registrar.require_authentication("secret");
    registrar.api(ApiRoute::new("/secret").name("secret"), echo_kwargs).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/api/secret").build()).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(app.api_docs()["/api/secret"].contains("Authentication required."));
}

#[tokio::test]
async fn second_documentation_for_a_path_wins() {
    let mut registrar = Registrar::new("/api");
    registrar
        .api(ApiRoute::new("/x").methods([Method::Get]).doc("Read x."), echo_kwargs)
        .unwrap()
        .api(ApiRoute::new("/x").methods([Method::Post]).doc("Write x."), echo_kwargs)
        .unwrap();
    let app = finish(registrar);

    assert_eq!(app.api_docs()["/api/x"], "/api/x  POST\n    Write x.\n\n");
}

#[tokio::test]
async fn overlapping_api_registration_fails() {
    let mut registrar = Registrar::new("/api");
    registrar.api(ApiRoute::new("/x"), echo_kwargs).unwrap();
    assert!(registrar.api(ApiRoute::new("/x").methods([Method::Put]), echo_kwargs).is_err());
}

#[tokio::test]
async fn api_index_lists_every_endpoint() {
    let mut registrar = Registrar::new("/api");
    registrar.api_index(true);
    registrar
        .api(ApiRoute::new("/b").methods([Method::Get]), echo_kwargs)
        .unwrap()
        .api(ApiRoute::new("/a").methods([Method::Get]).doc("First."), echo_kwargs)
        .unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/api").build()).await;
    assert_eq!(
        std::str::from_utf8(response.body()).unwrap(),
        "/api/a  GET\n    First.\n\n/api/b  GET\n    No documentation exists for this method.\n\n",
    );
    assert_eq!(app.api_help(), std::str::from_utf8(response.body()).unwrap());
}

#[tokio::test]
async fn first_response_sets_session_cookie() {
    let mut registrar = Registrar::new("/api");
    registrar.get("/", Some("Home"), echo_param).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/").build()).await;
    let cookie = response.header("set-cookie").unwrap();
    assert!(cookie.starts_with("session-key=session-"));
    assert_eq!(app.title("/"), Some("Home"));
}

#[tokio::test]
async fn url_captures_are_percent_decoded() {
    let mut registrar = Registrar::new("/api");
    {
        let mut keys = registrar.context("/keys");
        keys.api(ApiRoute::new("/{name}"), echo_call).unwrap();
        keys.get("/show/{count}", None, echo_param).unwrap();
    }
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Get, "/api/keys/my%20laptop").build()).await;
    assert_eq!(body_json(&response)["args"], json!(["my laptop"]));

    let response = app.call(Request::builder(Method::Get, "/keys/show/a%2Fb").build()).await;
    assert_eq!(response.body(), br#"Some("a/b")"#);

    let response = app.call(Request::builder(Method::Get, "/api/keys/%FF").build()).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn head_is_answered_by_get_routes() {
    let mut registrar = Registrar::new("/api");
    registrar.get("/items", None, echo_param).unwrap();
    registrar.post("/submit", echo_param).unwrap();
    let app = finish(registrar);

    let response = app.call(Request::builder(Method::Head, "/items?count=3").build()).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.body().is_empty());

    let response = app.call(Request::builder(Method::Head, "/submit").build()).await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    let response = app.call(Request::builder(Method::Delete, "/items").build()).await;
    assert_eq!(response.header("allow"), Some("GET, HEAD"));
}
