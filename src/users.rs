//! User accounts.
//!
//! The account views only need three things from the user model: check a
//! password, check whether an email is taken, and create an account.
//! [`UserDirectory`] is that seam; [`MemoryDirectory`] keeps bcrypt hashes
//! in memory.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A user as seen by sessions and handlers. The anonymous user has no id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<u64>,
    pub email: Option<String>,
}

impl User {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }
}

/// Account storage used by the account views.
pub trait UserDirectory: Send + Sync + 'static {
    /// Returns the user when `password` matches the account for `email`.
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, Error>;

    fn exists(&self, email: &str) -> bool;

    /// Creates an account. `Ok(None)` when the email is already registered.
    fn create(&self, email: &str, password: &str) -> Result<Option<User>, Error>;
}

struct Account {
    id: u64,
    password_hash: String,
}

/// In-memory [`UserDirectory`] keyed by email.
pub struct MemoryDirectory {
    accounts: DashMap<String, Account>,
    next_id: AtomicU64,
    cost: u32,
}

impl MemoryDirectory {
    /// `cost` is the bcrypt work factor.
    pub fn new(cost: u32) -> Self {
        Self { accounts: DashMap::new(), next_id: AtomicU64::new(1), cost }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self { Self::new(bcrypt::DEFAULT_COST) }
}

impl UserDirectory for MemoryDirectory {
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, Error> {
        let Some((id, hash)) = self.accounts.get(email)
            .map(|account| (account.id, account.password_hash.clone()))
        else {
            return Ok(None);
        };
        if bcrypt::verify(password, &hash)? {
            Ok(Some(User { id: Some(id), email: Some(email.to_owned()) }))
        } else {
            Ok(None)
        }
    }

    fn exists(&self, email: &str) -> bool {
        self.accounts.contains_key(email)
    }

    fn create(&self, email: &str, password: &str) -> Result<Option<User>, Error> {
        // Hash before taking the shard lock; bcrypt is slow on purpose.
        let password_hash = bcrypt::hash(password, self.cost)?;
        match self.accounts.entry(email.to_owned()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(Account { id, password_hash });
                Ok(Some(User { id: Some(id), email: Some(email.to_owned()) }))
            }
        }
    }
}
