//! HTTP vocabulary shared by endpoints and transports.
//!
//! This module provides the small set of HTTP primitives the cache layer needs
//! to describe a request without performing it: [`Method`], [`Headers`], and
//! [`Params`].

use std::fmt;

pub mod headers;
pub mod params;

pub use headers::Headers;
pub use params::Params;

/// The HTTP verb an endpoint is bound to.
///
/// Besides naming the verb, each method decides whether
/// [`RequestEngine::send`](crate::engine::RequestEngine::send) is cache-first
/// or always re-issues the call by default.
///
/// # Examples
///
/// ```
/// use reqcache::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// assert!(!method.forces_request());
/// assert!(Method::Post.forces_request());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET — retrieve a representation of the target resource.
    Get,
    /// POST — perform resource-specific processing on the request payload.
    Post,
    /// PUT — replace the target resource's current representation.
    Put,
    /// PATCH — apply partial modifications to a resource.
    Patch,
    /// DELETE — remove the association between the target resource and its functionality.
    Delete,
    /// HEAD — identical to GET but without a response body.
    Head,
    /// OPTIONS — describe the communication options for the target resource.
    Options,
}

impl Method {
    /// Every verb an endpoint can be bound to.
    pub const ALL: [Method; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Head,
        Self::Options,
    ];

    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Returns `true` if this method is considered "safe" (no side effects per RFC 9110 §9.2.1).
    ///
    /// Safe methods: GET, HEAD, OPTIONS.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }

    /// Default `force_request` flag for `send` on endpoints bound to this verb.
    ///
    /// Safe verbs are cache-first (`false`); POST, PUT, PATCH and DELETE always
    /// re-issue the call (`true`).
    pub fn forces_request(&self) -> bool {
        !self.is_safe()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a verb the cache layer does not bind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnsupportedMethod(pub String);

impl std::str::FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedMethod(s.to_owned()))
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
