use std::fmt;

use axum::http::Method;
use url::Url;

/// Cache key: method plus normalized absolute URL, optionally the Range value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str(), url))
    }

    /// Secondary key for a ranged request.
    pub fn with_range(&self, range: &str) -> Self {
        Self(format!("{} range={}", self.0, range.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
