//! HTTP method as a typed enum.
//!
//! Only the RFC 9110 methods a form page or JSON API can be registered for.
//! Anything else is answered with `405 Method Not Allowed` by the server
//! before routing.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method.
///
/// `Ord` follows the wire spelling so that sorted method lists read
/// alphabetically (`GET, POST, PUT`), which the API documentation relies on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
        }
    }

    /// Write methods carry a request body the API layer decodes.
    pub fn has_payload(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl PartialOrd for Method {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Method {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            _         => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_spelling_only() {
        assert_eq!("PUT".parse(), Ok(Method::Put));
        assert_eq!("put".parse::<Method>(), Err(()));
        assert_eq!("PURGE".parse::<Method>(), Err(()));
    }

    #[test]
    fn sorts_alphabetically() {
        let mut methods = vec![Method::Put, Method::Get, Method::Post, Method::Delete];
        methods.sort();
        assert_eq!(methods, [Method::Delete, Method::Get, Method::Post, Method::Put]);
    }

    #[test]
    fn converts_from_http() {
        assert_eq!(Method::try_from(&http::Method::POST), Ok(Method::Post));
        assert!(Method::try_from(&http::Method::CONNECT).is_err());
    }
}
