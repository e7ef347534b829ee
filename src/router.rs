//! Radix-tree route table.
//!
//! One tree per HTTP method. O(path-length) lookup. The table is filled by
//! the [`Registrar`](crate::Registrar) at startup and read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::method::Method;

/// A matched route: the handler plus the URL captures in declaration order.
pub(crate) struct Matched {
    pub(crate) handler: BoxedHandler,
    pub(crate) params: Vec<(String, String)>,
}

/// The dispatcher's route table.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers `handler` for `method` + `path`.
    ///
    /// Path parameters use `{name}` syntax. A (path, method) pair can only be
    /// registered once; a second registration, or one that conflicts with an
    /// existing wildcard, fails instead of shadowing the first.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .map_err(|source| Error::Route { method, path: path.to_owned(), source })
    }

    /// Registers one handler for several methods, all or nothing: if any
    /// method's insert fails, no tree is changed.
    pub(crate) fn insert_all(
        &mut self,
        methods: impl IntoIterator<Item = Method>,
        path: &str,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        let mut staged = Vec::new();
        for method in methods {
            let mut tree = self.routes.get(&method).cloned().unwrap_or_default();
            tree.insert(path, Arc::clone(&handler))
                .map_err(|source| Error::Route { method, path: path.to_owned(), source })?;
            staged.push((method, tree));
        }
        self.routes.extend(staged);
        Ok(())
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<Matched> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Matched { handler, params })
    }

    /// Methods with a route matching `path`, sorted. Empty means 404.
    pub fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| *method)
            .collect();
        methods.sort();
        methods
    }
}
