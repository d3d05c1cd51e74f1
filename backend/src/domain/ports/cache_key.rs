//! Validated key type for records in the shared store.
use std::fmt::Display;

use thiserror::Error;

/// Key under which a cache record lives in the shared store.
///
/// Keys are namespaced by the caller (for example `cache:shop:42`); the
/// coordinator derives its rebuild lock name from the key, so two logical
/// entities must never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Construct a cache key after validating that it is non-empty and trimmed.
    pub fn new(value: impl Into<String>) -> Result<Self, CacheKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(CacheKeyValidationError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(CacheKeyValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    /// Build the key for one entity under a namespace prefix such as
    /// `cache:shop:`.
    ///
    /// # Examples
    /// ```
    /// use promo_backend::domain::ports::CacheKey;
    ///
    /// let key = CacheKey::for_entity("cache:shop:", 7).expect("valid key");
    /// assert_eq!(key.as_str(), "cache:shop:7");
    /// ```
    pub fn for_entity(
        prefix: &str,
        id: impl Display,
    ) -> Result<Self, CacheKeyValidationError> {
        Self::new(format!("{prefix}{id}"))
    }

    /// Borrow the underlying key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Validation errors returned when constructing [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyValidationError {
    /// Key is empty after trimming whitespace.
    #[error("cache key must not be empty")]
    Empty,
    /// Key contains whitespace, which the store protocol would split on.
    #[error("cache key must not contain whitespace")]
    ContainsWhitespace,
}
