//! Allowed-origin entries: exact strings, regular expressions, or the
//! wildcard `*`.

use regex::Regex;

/// A single entry in the allowed-origins list.
#[derive(Debug, Clone)]
pub enum AllowedOrigin {
    /// Matches only this exact origin string.
    Exact(String),
    /// Matches any origin the pattern matches.
    Pattern(Regex),
    /// Matches any origin.
    Wildcard,
}

impl AllowedOrigin {
    /// Reports whether `origin` satisfies this entry.
    #[must_use]
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            AllowedOrigin::Exact(expected) => expected == origin,
            AllowedOrigin::Pattern(re) => re.is_match(origin),
            AllowedOrigin::Wildcard => true,
        }
    }
}

impl From<&str> for AllowedOrigin {
    fn from(value: &str) -> Self {
        if value == "*" {
            AllowedOrigin::Wildcard
        } else {
            AllowedOrigin::Exact(value.to_owned())
        }
    }
}

impl From<String> for AllowedOrigin {
    fn from(value: String) -> Self {
        AllowedOrigin::from(value.as_str())
    }
}

impl From<Regex> for AllowedOrigin {
    fn from(value: Regex) -> Self {
        AllowedOrigin::Pattern(value)
    }
}

/// An ordered list of [`AllowedOrigin`] entries, evaluated with
/// short-circuiting `any` semantics.
#[derive(Debug, Clone, Default)]
pub struct AllowedOrigins(Vec<AllowedOrigin>);

impl AllowedOrigins {
    /// Builds a list from entries.
    #[must_use]
    pub fn new(entries: Vec<AllowedOrigin>) -> Self {
        Self(entries)
    }

    /// Reports whether any entry matches `origin`.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        self.0.iter().any(|entry| entry.matches(origin))
    }

    /// Reports whether the literal wildcard `"*"` is among the entries.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(|e| matches!(e, AllowedOrigin::Wildcard))
    }
}

impl FromIterator<AllowedOrigin> for AllowedOrigins {
    fn from_iter<T: IntoIterator<Item = AllowedOrigin>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
