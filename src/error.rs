/// Errors that can occur while configuring or building the [`crate::Registry`]
/// and its backing stores.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a store backend is required")]
    MissingStore,

    #[error("github credentials are required (set GITHUB_TOKEN)")]
    MissingGitHubToken,

    #[error("at least one of the owner and topic filters must be set")]
    MissingRepositoryFilter,

    #[error("github client initialization failed: {0}")]
    GitHubInit(#[from] octocrab::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors produced by store backends.
///
/// `NotFound` and `Unsupported` are converted to 404 by the protocol
/// handlers; the remaining variants describe backend failures that are
/// logged and either surfaced as 5xx or swallowed by the cache refresher.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("store does not support {0}")]
    Unsupported(&'static str),

    #[error("backend rate limit exhausted")]
    RateLimited,

    #[error("backend request failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Whether the error should be treated as "no such entity" rather than
    /// a backend failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(StoreError::not_found("module 'a/b/c'").is_not_found());
        assert!(StoreError::Unsupported("provider registry").is_not_found());
        assert!(!StoreError::RateLimited.is_not_found());

        let io = std::io::Error::other("boom");
        assert!(!StoreError::backend(io).is_not_found());
    }

    #[test]
    fn error_messages_name_the_entity() {
        let err = StoreError::not_found("module 'hashicorp/consul/aws'");
        assert_eq!(err.to_string(), "'module 'hashicorp/consul/aws'' not found");

        let err = StoreError::Unsupported("provider registry");
        assert_eq!(err.to_string(), "store does not support provider registry");
    }
}
