use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RateLimitError;

/// Identity a rate budget is counted against.
///
/// Opaque to the limiter. Compose it with [`RateToken::scoped`] so that two
/// routes limiting the same client keep separate buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateToken(String);

impl RateToken {
    /// Validate a raw token. Empty or whitespace-only tokens are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, RateLimitError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(RateLimitError::InvalidToken(
                "token must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// Build a `scope:identity` token, e.g. `votes:create:203.0.113.4`.
    pub fn scoped(scope: &str, identity: &str) -> Result<Self, RateLimitError> {
        if scope.trim().is_empty() {
            return Err(RateLimitError::InvalidToken(
                "scope must not be empty".to_string(),
            ));
        }
        if identity.trim().is_empty() {
            return Err(RateLimitError::InvalidToken(
                "identity must not be empty".to_string(),
            ));
        }
        Ok(Self(format!("{}:{}", scope, identity)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RateToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_tokens() {
        assert!(matches!(
            RateToken::new(""),
            Err(RateLimitError::InvalidToken(_))
        ));
        assert!(matches!(
            RateToken::new("   "),
            Err(RateLimitError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_scoped_namespaces_identity() {
        let votes = RateToken::scoped("votes:create", "203.0.113.4").unwrap();
        let comments = RateToken::scoped("comments:create", "203.0.113.4").unwrap();
        assert_eq!(votes.as_str(), "votes:create:203.0.113.4");
        assert_ne!(votes, comments);
    }

    #[test]
    fn test_scoped_rejects_blank_halves() {
        assert!(RateToken::scoped("", "1.2.3.4").is_err());
        assert!(RateToken::scoped("votes", " ").is_err());
    }
}
