//! Unified error type.

use thiserror::Error;

/// The error type returned by the crate's fallible operations.
///
/// Application-level errors (400, 401, 404, ...) are expressed as HTTP
/// [`Response`](crate::Response) values or [`ApiError`](crate::ApiError)s,
/// not as `Error`s. This type surfaces startup and infrastructure failures:
/// configuration, route registration, binding a port, hashing a password.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid bind address `{0}`")]
    Addr(String),

    /// The path is malformed or already registered for this method.
    #[error("route {method} `{path}`: {source}")]
    Route {
        method: crate::Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// Registration finished while path contexts were still open.
    #[error("{0} path context(s) still open at the end of registration")]
    UnbalancedContext(usize),

    #[error("password hashing: {0}")]
    Password(#[from] bcrypt::BcryptError),
}
