//! Sessions and the per-request [`Context`].
//!
//! A session is a small record kept in a key-value cache ([`SessionStore`])
//! under a random key; the browser only holds the key, in a cookie. Every
//! request gets a [`Context`] built by [`SessionManager::load`] and handed
//! to the handler explicitly. Changes made through the context are written
//! straight to the store, and the server turns a changed session key into a
//! `Set-Cookie` header once the handler returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::request::Request;
use crate::response::Response;
use crate::users::User;

/// Everything kept for one browser session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub user: Option<User>,
    /// One-shot messages shown on the next rendered page.
    #[serde(default)]
    pub flashes: Vec<String>,
}

/// Key-value cache holding session records, e.g. memcache.
pub trait SessionStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<SessionRecord>;
    fn set(&self, key: &str, record: SessionRecord);
    fn delete(&self, key: &str);

    /// Applies `f` to the stored record. Returns `false`, without calling
    /// `f`, when `key` is unknown.
    ///
    /// The default reads and writes the whole record; stores that can
    /// update in place should override it so concurrent requests on one
    /// session only touch the fields they change.
    fn modify(&self, key: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool {
        match self.get(key) {
            Some(mut record) => {
                f(&mut record);
                self.set(key, record);
                true
            }
            None => false,
        }
    }
}

/// Process-local [`SessionStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<SessionRecord> {
        self.entries.get(key).map(|record| record.clone())
    }

    fn set(&self, key: &str, record: SessionRecord) {
        self.entries.insert(key.to_owned(), record);
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn modify(&self, key: &str, f: &mut dyn FnMut(&mut SessionRecord)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut record) => {
                f(&mut record);
                true
            }
            None => false,
        }
    }
}

fn new_session_key() -> String {
    format!("session-{}", uuid::Uuid::new_v4().simple())
}

// ── SessionManager ────────────────────────────────────────────────────────────

/// Loads sessions for incoming requests and writes the session cookie back.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cookie_name: impl Into<String>) -> Self {
        Self { store, cookie_name: cookie_name.into() }
    }

    /// Builds the context for `req`.
    ///
    /// Adopts the session named by the cookie when the store still has it.
    /// A session whose remote address *and* user agent both changed is
    /// treated as hijacked and replaced. Every context ends up with a live
    /// session and a user, anonymous if nobody logged in.
    pub fn load(&self, req: &Request) -> Context {
        let remote_addr = req.remote_addr().map(|addr| addr.ip().to_string()).unwrap_or_default();
        let user_agent = req.user_agent().to_owned();
        let cookie_key = req.cookie(&self.cookie_name).map(str::to_owned);

        let mut session = cookie_key.as_ref()
            .and_then(|key| self.store.get(key).map(|record| (key.clone(), record)));

        let hijacked = session.as_ref().is_some_and(|(_, record)| {
            match (&record.remote_addr, &record.user_agent) {
                (Some(known_addr), Some(known_agent))
                    if *known_addr != remote_addr && *known_agent != user_agent =>
                {
                    warn!(
                        from_addr = %known_addr, to_addr = %remote_addr,
                        from_agent = %known_agent, to_agent = %user_agent,
                        "potential session hijack detected"
                    );
                    true
                }
                _ => false,
            }
        });
        if hijacked {
            if let Some((key, _)) = session.take() {
                self.store.delete(&key);
            }
        }

        let ctx = Context {
            inner: Arc::new(Mutex::new(State {
                session,
                user: User::anonymous(),
                device: None,
            })),
            store: Arc::clone(&self.store),
            cookie_key,
            remote_addr,
            user_agent,
        };

        if ctx.session_key().is_none() {
            ctx.renew_session();
        }
        ctx.adopt_session_user();
        ctx
    }

    /// Emits `Set-Cookie` when the handler started a new session or
    /// destroyed the current one.
    pub fn finish(&self, ctx: &Context, response: &mut Response) {
        let current = ctx.session_key();
        if current == ctx.cookie_key {
            return;
        }
        let cookie = match current {
            Some(key) => format!("{}={key}; Path=/; HttpOnly; SameSite=Lax", self.cookie_name),
            None => format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", self.cookie_name),
        };
        response.append_header("set-cookie", cookie);
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

struct State {
    session: Option<(String, SessionRecord)>,
    user: User,
    device: Option<String>,
}

/// Per-request state handed to every handler: session, user and device.
///
/// Cloning is cheap and clones share state, so the server observes what the
/// handler did to the session after the handler returns. Writes reach the
/// store field by field, so requests sharing a session do not undo each
/// other's changes.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Mutex<State>>,
    store: Arc<dyn SessionStore>,
    cookie_key: Option<String>,
    remote_addr: String,
    user_agent: String,
}

/// A navigation link rendered in the account menu.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    pub title: String,
}

impl Context {
    /// A context with an anonymous user and no session, backed by `store`.
    pub fn detached(store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State { session: None, user: User::anonymous(), device: None })),
            store,
            cookie_key: None,
            remote_addr: String::new(),
            user_agent: String::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_key(&self) -> Option<String> {
        self.state().session.as_ref().map(|(key, _)| key.clone())
    }

    /// Snapshot of the current session record.
    pub fn session(&self) -> Option<SessionRecord> {
        self.state().session.as_ref().map(|(_, record)| record.clone())
    }

    pub fn user(&self) -> User {
        self.state().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        !self.state().user.is_anonymous()
    }

    pub fn device(&self) -> Option<String> {
        self.state().device.clone()
    }

    pub fn set_device(&self, device: Option<String>) {
        self.state().device = device;
    }

    /// Stores `user` in the session and makes it the request's user.
    pub fn set_user(&self, user: User) {
        self.modify(|record| record.user = Some(user.clone()));
        self.state().user = user;
    }

    /// Replaces the current session with a fresh one recording the client's
    /// address and user agent. The old key is removed from the store.
    pub fn renew_session(&self) {
        self.destroy_session();
        let key = new_session_key();
        debug!(session = %key, "new session");
        let record = SessionRecord {
            remote_addr: Some(self.remote_addr.clone()),
            user_agent: Some(self.user_agent.clone()),
            user: Some(User::anonymous()),
            flashes: Vec::new(),
        };
        self.store.set(&key, record.clone());
        self.state().session = Some((key, record));
    }

    /// Deletes the current session from the store. The request continues
    /// as anonymous.
    pub fn destroy_session(&self) {
        let mut state = self.state();
        if let Some((key, _)) = state.session.take() {
            self.store.delete(&key);
        }
        state.user = User::anonymous();
    }

    /// Queues a message for the next rendered page.
    pub fn flash(&self, message: impl Into<String>) {
        let message = message.into();
        self.modify(|record| record.flashes.push(message.clone()));
    }

    /// Removes and returns the queued messages, including ones queued by
    /// other requests on the same session. Nothing is written when the
    /// queue is empty.
    pub fn take_flashes(&self) -> Vec<String> {
        let mut state = self.state();
        let Some((key, record)) = &mut state.session else {
            return Vec::new();
        };
        let local = std::mem::take(&mut record.flashes);
        let Some(stored) = self.store.get(key) else {
            return local;
        };
        if stored.flashes.is_empty() {
            return Vec::new();
        }
        let mut taken = Vec::new();
        self.store.modify(key, &mut |stored: &mut SessionRecord| {
            taken = std::mem::take(&mut stored.flashes);
        });
        taken
    }

    /// Register/Login for anonymous users, profile/Logout otherwise.
    pub fn account_links(&self) -> Vec<Link> {
        let user = self.user();
        let link = |href: &str, title: &str| Link { href: href.to_owned(), title: title.to_owned() };
        match (user.id, user.email) {
            (None, _) => vec![
                link("/account/register", "Register"),
                link("/account/login", "Login"),
            ],
            (Some(_), email) => vec![
                link("/account", email.as_deref().unwrap_or("Account")),
                link("/account/logout", "Logout"),
            ],
        }
    }

    /// Applies `f` to the request's copy of the session record and to the
    /// stored one. A record the store lost is written back whole.
    fn modify(&self, mut f: impl FnMut(&mut SessionRecord)) {
        let mut state = self.state();
        let Some((key, record)) = &mut state.session else {
            return;
        };
        f(record);
        if !self.store.modify(key, &mut f) {
            self.store.set(key, record.clone());
        }
    }

    fn adopt_session_user(&self) {
        let mut state = self.state();
        let user = state.session.as_ref()
            .and_then(|(_, record)| record.user.clone())
            .unwrap_or_else(User::anonymous);
        state.user = user;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), "session-key");
        (store, manager)
    }

    fn request(cookie: Option<&str>, addr: &str, agent: &str) -> Request {
        let mut builder = Request::builder(Method::Get, "/")
            .remote_addr(addr.parse().unwrap())
            .header("user-agent", agent);
        if let Some(key) = cookie {
            builder = builder.header("cookie", &format!("session-key={key}"));
        }
        builder.build()
    }

    #[test]
    fn first_visit_creates_anonymous_session() {
        let (store, manager) = manager();
        let ctx = manager.load(&request(None, "10.0.0.1:5000", "curl"));

        let key = ctx.session_key().unwrap();
        assert!(key.starts_with("session-"));
        let record = store.get(&key).unwrap();
        assert_eq!(record.remote_addr.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.user_agent.as_deref(), Some("curl"));
        assert_eq!(record.user, Some(User::anonymous()));

        let mut response = Response::text("ok");
        manager.finish(&ctx, &mut response);
        assert_eq!(
            response.header("set-cookie"),
            Some(format!("session-key={key}; Path=/; HttpOnly; SameSite=Lax").as_str()),
        );
    }

    #[test]
    fn known_session_is_adopted_without_new_cookie() {
        let (_, manager) = manager();
        let first = manager.load(&request(None, "10.0.0.1:5000", "curl"));
        first.set_user(User { id: Some(4), email: Some("a@b.c".into()) });
        let key = first.session_key().unwrap();

        let second = manager.load(&request(Some(&key), "10.0.0.1:6000", "curl"));
        assert_eq!(second.session_key(), Some(key));
        assert_eq!(second.user().id, Some(4));

        let mut response = Response::text("ok");
        manager.finish(&second, &mut response);
        assert_eq!(response.header("set-cookie"), None);
    }

    #[test]
    fn one_changed_attribute_is_tolerated() {
        let (_, manager) = manager();
        let key = manager.load(&request(None, "10.0.0.1:5000", "curl")).session_key().unwrap();

        let moved = manager.load(&request(Some(&key), "10.9.9.9:5000", "curl"));
        assert_eq!(moved.session_key(), Some(key));
    }

    #[test]
    fn both_changed_attributes_replace_the_session() {
        let (store, manager) = manager();
        let key = manager.load(&request(None, "10.0.0.1:5000", "curl")).session_key().unwrap();

        let hijacked = manager.load(&request(Some(&key), "10.9.9.9:5000", "firefox"));
        assert_ne!(hijacked.session_key(), Some(key.clone()));
        assert!(store.get(&key).is_none());
        assert!(hijacked.user().is_anonymous());
    }

    #[test]
    fn unknown_cookie_gets_a_new_session() {
        let (_, manager) = manager();
        let ctx = manager.load(&request(Some("session-gone"), "10.0.0.1:5000", "curl"));
        assert_ne!(ctx.session_key().as_deref(), Some("session-gone"));
    }

    #[test]
    fn destroy_clears_cookie_and_store() {
        let (store, manager) = manager();
        let key = manager.load(&request(None, "10.0.0.1:5000", "curl")).session_key().unwrap();
        let ctx = manager.load(&request(Some(&key), "10.0.0.1:5000", "curl"));

        ctx.destroy_session();
        assert!(store.get(&key).is_none());

        let mut response = Response::redirect("/");
        manager.finish(&ctx, &mut response);
        assert!(response.header("set-cookie").unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn flashes_are_consumed_once() {
        let (_, manager) = manager();
        let ctx = manager.load(&request(None, "10.0.0.1:5000", "curl"));
        ctx.flash("Passwords do not match");
        assert_eq!(ctx.take_flashes(), ["Passwords do not match"]);
        assert!(ctx.take_flashes().is_empty());
    }

    #[test]
    fn concurrent_requests_keep_each_others_writes() {
        let (store, manager) = manager();
        let key = manager.load(&request(None, "10.0.0.1:5000", "curl")).session_key().unwrap();

        let register = manager.load(&request(Some(&key), "10.0.0.1:5000", "curl"));
        let page = manager.load(&request(Some(&key), "10.0.0.1:5000", "curl"));

        register.set_user(User { id: Some(9), email: Some("a@b.c".into()) });
        assert!(page.take_flashes().is_empty());
        page.flash("Saved");

        let stored = store.get(&key).unwrap();
        assert_eq!(stored.user.and_then(|user| user.id), Some(9));
        assert_eq!(register.take_flashes(), ["Saved"]);
        assert!(store.get(&key).unwrap().flashes.is_empty());
    }

    #[test]
    fn account_links_follow_login_state() {
        let ctx = Context::detached(Arc::new(MemoryStore::new()));
        assert_eq!(ctx.account_links()[1].title, "Login");

        ctx.set_user(User { id: Some(1), email: Some("a@b.c".into()) });
        let links = ctx.account_links();
        assert_eq!(links[0].title, "a@b.c");
        assert_eq!(links[1].href, "/account/logout");
    }
}
