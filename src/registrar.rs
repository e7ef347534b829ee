//! Route registration.
//!
//! Routes are declared once at startup by ordinary function calls on a
//! [`Registrar`]. Open a path context to group routes under a prefix; the
//! returned [`Scope`] closes it when dropped:
//!
//! ```rust
//! use keyring_server::{ApiCall, ApiError, ApiRoute, Context, Registrar, Request, Response};
//!
//! async fn index(_req: Request, _ctx: Context) -> Response { Response::text("keys") }
//! async fn keys(_call: ApiCall) -> Result<Vec<String>, ApiError> { Ok(Vec::new()) }
//!
//! # fn main() -> Result<(), keyring_server::Error> {
//! let mut registrar = Registrar::new("/api");
//! {
//!     let mut keys_scope = registrar.context("/keys");
//!     keys_scope.get("", Some("Keys"), index)?;          // GET /keys
//!     keys_scope.api(ApiRoute::new("/list"), keys)?;     // GET, POST, PUT /api/keys/list
//! }
//! assert_eq!(registrar.current_path("/x"), "/x");
//! # Ok(())
//! # }
//! ```
//!
//! Nothing here is consulted per request: [`Registrar::finish`] hands the
//! route table, titles and API documentation to an [`App`] and the path
//! stack is dropped with the registrar.

use std::collections::{BTreeMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{self, ApiHandler, ApiRoute};
use crate::app::App;
use crate::context::PathStack;
use crate::error::Error;
use crate::handler::{Handler, MergeQuery};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::sessions::{Context, SessionManager};

/// Builds the route table at startup.
pub struct Registrar {
    router: Router,
    paths: PathStack,
    titles: BTreeMap<String, String>,
    api_docs: BTreeMap<String, String>,
    api_root: String,
    api_index: bool,
    authenticated: HashSet<String>,
}

impl Registrar {
    /// `api_root` is prepended to every API path (e.g. `"/api"`).
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            router: Router::new(),
            paths: PathStack::new(),
            titles: BTreeMap::new(),
            api_docs: BTreeMap::new(),
            api_root: api_root.into(),
            api_index: false,
            authenticated: HashSet::new(),
        }
    }

    /// Opens a path context. Routes declared through the returned scope are
    /// prefixed with `prefix`; the context closes when the scope is dropped.
    pub fn context(&mut self, prefix: &str) -> Scope<'_> {
        self.paths.enter(prefix);
        Scope { registrar: self }
    }

    /// `suffix` resolved against the open path contexts.
    pub fn current_path(&self, suffix: &str) -> String {
        self.paths.current_path(suffix)
    }

    /// Adds a handler name to the authenticated-methods registry. API routes
    /// registered afterwards under that name reject anonymous callers and
    /// are documented as requiring authentication.
    pub fn require_authentication(&mut self, name: &str) -> &mut Self {
        self.authenticated.insert(name.to_owned());
        self
    }

    /// Serves the API documentation as plain text at the API root.
    pub fn api_index(&mut self, enabled: bool) -> &mut Self {
        self.api_index = enabled;
        self
    }

    /// Registers a page for GET.
    ///
    /// A `title` is recorded for the full path, for navigation. Query
    /// parameters are added to the request's named arguments unless the
    /// route already captured one with that name; values stay raw strings.
    pub fn get(
        &mut self,
        suffix: &str,
        title: Option<&str>,
        handler: impl Handler,
    ) -> Result<&mut Self, Error> {
        let path = self.paths.current_path(suffix);
        let handler = Arc::new(MergeQuery(handler.into_boxed_handler()));
        self.router.insert(Method::Get, &path, handler)?;
        if let Some(title) = title {
            self.titles.insert(path.clone(), title.to_owned());
        }
        debug!(%path, "registered GET");
        Ok(self)
    }

    /// Registers a form handler for POST. No marshaling.
    pub fn post(&mut self, suffix: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        let path = self.paths.current_path(suffix);
        self.router.insert(Method::Post, &path, handler.into_boxed_handler())?;
        debug!(%path, "registered POST");
        Ok(self)
    }

    /// Registers a JSON API endpoint under the API root for every method in
    /// `route`. See [`crate::api`] for the marshaling rules.
    pub fn api(&mut self, route: ApiRoute, handler: impl ApiHandler) -> Result<&mut Self, Error> {
        let path = format!("{}{}", self.api_root, self.paths.current_path(&route.path));
        let mut settings = route.settings;
        settings.authenticated = route.name.as_ref()
            .is_some_and(|name| self.authenticated.contains(name));

        let entry = api::describe(&path, &settings.methods, route.doc.as_deref(), settings.authenticated);
        let methods: Vec<Method> = settings.methods.iter().copied().collect();
        let endpoint = handler.into_endpoint(settings);
        self.router.insert_all(methods, &path, endpoint)?;

        if self.api_docs.insert(path.clone(), entry).is_some() {
            warn!(%path, "API documentation replaced by a later registration");
        }
        debug!(%path, "registered API endpoint");
        Ok(self)
    }

    pub fn titles(&self) -> &BTreeMap<String, String> { &self.titles }

    pub fn api_docs(&self) -> &BTreeMap<String, String> { &self.api_docs }

    /// Completes registration.
    ///
    /// Fails if a path context is still open, which only happens when a
    /// [`Scope`] was leaked instead of dropped.
    pub fn finish(mut self, sessions: SessionManager) -> Result<App, Error> {
        if !self.paths.is_empty() {
            return Err(Error::UnbalancedContext(self.paths.depth()));
        }

        if self.api_index {
            let help: Arc<str> = api_help(&self.api_docs).into();
            let root = if self.api_root.is_empty() { "/".to_owned() } else { self.api_root.clone() };
            let index = move |_req: Request, _ctx: Context| {
                let help = Arc::clone(&help);
                async move { Response::text(&*help) }
            };
            self.router.insert(Method::Get, &root, index.into_boxed_handler())?;
        }

        Ok(App::new(self.router, sessions, self.titles, self.api_docs))
    }
}

/// All documentation entries, ordered by path.
pub(crate) fn api_help(docs: &BTreeMap<String, String>) -> String {
    docs.values().map(String::as_str).collect()
}

// ── Scope ─────────────────────────────────────────────────────────────────────

/// An open path context. Derefs to the [`Registrar`]; closes the context
/// on drop.
pub struct Scope<'a> {
    registrar: &'a mut Registrar,
}

impl Deref for Scope<'_> {
    type Target = Registrar;

    fn deref(&self) -> &Registrar {
        self.registrar
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Registrar {
        self.registrar
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.registrar.paths.exit();
    }
}
