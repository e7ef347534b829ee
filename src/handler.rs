//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types in one
//! `HashMap<Method, Tree>`, so every handler is hidden behind the same
//! trait object (`dyn ErasedHandler`). Registrar wrappers (query merging for
//! GET routes, JSON marshaling for API routes) are themselves
//! `ErasedHandler`s around the user's handler.
//!
//! ```text
//! async fn login_form(req: Request, ctx: Context) -> Response { … }
//!        ↓ registrar.get("/login", Some("Login"), login_form)
//! login_form.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Arc::new(MergeQuery(Arc::new(FnHandler(login_form))))
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, ctx)  at request time          ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::sessions::Context;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid page handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, ctx: Context) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, ctx: Context) -> BoxFuture {
        let fut = (self.0)(req, ctx);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// GET wrapper: every query parameter the route did not already capture
/// becomes a named argument, raw string value, no coercion.
pub(crate) struct MergeQuery(pub(crate) BoxedHandler);

impl ErasedHandler for MergeQuery {
    fn call(&self, mut req: Request, ctx: Context) -> BoxFuture {
        let query = std::mem::take(&mut req.query);
        for (key, value) in &query {
            req.insert_param_if_absent(key, value);
        }
        req.query = query;
        self.0.call(req, ctx)
    }
}
