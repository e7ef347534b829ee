//! # keyring-server
//!
//! The web layer of the keyring service: route registration with nested
//! path contexts, JSON API marshaling, cache-backed sessions and the account
//! views, served by hyper.
//!
//! ## Startup, then serve
//!
//! Routes are registered once, before the first request, by plain function
//! calls on a [`Registrar`]. [`Registrar::finish`] freezes the result into an
//! [`App`]; from then on nothing about routing changes.
//!
//! - Page routes — [`Registrar::get`] / [`Registrar::post`]
//! - JSON API routes — [`Registrar::api`] with an [`ApiRoute`]
//! - Path contexts — [`Registrar::context`], closed when the scope drops
//!
//! Every handler receives the request and an explicit per-request
//! [`Context`] holding the session and the user. There is no global request
//! state.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keyring_server::{
//!     ApiCall, ApiError, ApiRoute, Context, MemoryStore, Registrar, Request, Response,
//!     Server, SessionManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keyring_server::Error> {
//!     let mut registrar = Registrar::new("/api");
//!     {
//!         let mut keys = registrar.context("/keys");
//!         keys.get("", Some("Keys"), list_page)?;
//!         keys.api(ApiRoute::new("/{name}").split_payload(true), key_api)?;
//!     }
//!
//!     let sessions = SessionManager::new(Arc::new(MemoryStore::new()), "session-key");
//!     let app = registrar.finish(sessions)?;
//!     Server::bind("0.0.0.0:5000")?.serve(app).await
//! }
//!
//! async fn list_page(req: Request, ctx: Context) -> Response {
//!     // `?page=2` arrives as the raw string "2"
//!     let page = req.param("page").unwrap_or("1");
//!     Response::text(format!("page {page} for {:?}", ctx.user().email))
//! }
//!
//! async fn key_api(call: ApiCall) -> Result<serde_json::Value, ApiError> {
//!     let name = &call.args()[0];
//!     Ok(serde_json::json!({ "method": call.method().as_str(), "name": name }))
//! }
//! ```

mod accounts;
mod api;
mod app;
mod config;
mod context;
mod encoder;
mod error;
mod handler;
mod method;
mod registrar;
mod request;
mod response;
mod router;
mod server;
mod sessions;
mod users;

pub use accounts::routes as account_routes;
pub use api::{ApiCall, ApiError, ApiHandler, ApiRoute, JSON};
pub use app::App;
pub use config::{AccountsConfig, ApiConfig, Config, SessionConfig};
pub use context::PathStack;
pub use encoder::dump;
pub use error::Error;
pub use handler::Handler;
pub use http::StatusCode;
pub use method::Method;
pub use registrar::{Registrar, Scope};
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use sessions::{Context, Link, MemoryStore, SessionManager, SessionRecord, SessionStore};
pub use users::{MemoryDirectory, User, UserDirectory};
