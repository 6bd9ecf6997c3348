//! Query parameters for an outgoing request.

use std::fmt;

/// An ordered, case-sensitive list of query parameters.
///
/// Unlike [`Headers`](super::Headers), parameter names are compared exactly.
/// Repeated names are kept so `?tag=a&tag=b` can be expressed.
///
/// # Examples
///
/// ```
/// use reqcache::http::Params;
///
/// let params = Params::new().with("q", "rust cache").with("page", "2");
/// assert_eq!(params.get("page"), Some("2"));
/// assert_eq!(params.to_string(), "q=rust+cache&page=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Existing values for the same name are kept.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every value for `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| *k != name);
        self.inner.push((name, value.into()));
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the parameters as an `application/x-www-form-urlencoded` query.
    ///
    /// Names and values are percent-encoded, so reserved characters such as
    /// `&`, `=` and `+` survive the round trip. Spaces become `+`.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error; plain string pairs always encode.
    pub fn to_query_string(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(&self.inner)
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = self.to_query_string().map_err(|_| fmt::Error)?;
        f.write_str(&query)
    }
}
