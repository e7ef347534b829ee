//! Minimal keyring-server example — nested contexts, a page and JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:5000/keys?page=2'
//!   curl 'http://localhost:5000/api/keys/laptop?verbose=true'
//!   curl -X POST http://localhost:5000/api/keys/laptop \
//!        -H 'content-type: application/json' \
//!        -d '{"fingerprint":"ab:cd"}'
//!   curl http://localhost:5000/api

use std::sync::Arc;

use keyring_server::{
    ApiCall, ApiError, ApiRoute, Context, MemoryStore, Method, Registrar, Request, Response,
    Server, SessionManager,
};

#[tokio::main]
async fn main() -> Result<(), keyring_server::Error> {
    tracing_subscriber::fmt::init();

    let mut registrar = Registrar::new("/api");
    registrar.api_index(true);
    {
        let mut keys = registrar.context("/keys");
        keys.get("", Some("Keys"), list_keys)?;
        keys.api(
            ApiRoute::new("/{name}")
                .methods([Method::Get, Method::Post, Method::Delete])
                .split_payload(true)
                .doc("Show, store or delete one key.\nPOST takes `fingerprint`."),
            key,
        )?;
    }

    let sessions = SessionManager::new(Arc::new(MemoryStore::new()), "session-key");
    let app = registrar.finish(sessions)?;

    Server::bind("0.0.0.0:5000")?.serve(app).await
}

// GET /keys?page=2 — query parameters arrive as raw strings.
async fn list_keys(req: Request, ctx: Context) -> Response {
    let page = req.param("page").unwrap_or("1");
    let who = ctx.user().email.unwrap_or_else(|| "anonymous".to_owned());
    Response::text(format!("keys of {who}, page {page}"))
}

// GET|POST|DELETE /api/keys/{name} — query values are JSON-decoded, the
// JSON body is merged into the keyword arguments.
async fn key(call: ApiCall) -> Result<serde_json::Value, ApiError> {
    let name = &call.args()[0];
    match call.method() {
        Method::Post => {
            let fingerprint: String = call.get("fingerprint")?;
            Ok(serde_json::json!({ "name": name, "fingerprint": fingerprint }))
        }
        Method::Delete => Ok(serde_json::json!({ "deleted": name })),
        _ => Ok(serde_json::json!({ "name": name, "args": call.kwargs() })),
    }
}
