//! Source-of-truth interface consumed by the read helpers.

use async_trait::async_trait;

use crate::model::{Post, UserId, UserProfile};

/// Errors raised by the source of truth.
///
/// These cross the cache layer unchanged and are never cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The requested resource does not exist (distinct from an empty list).
    #[error("{resource} not found: {key}")]
    NotFound { resource: &'static str, key: String },

    /// The relational store failed.
    #[error("Source error: {0}")]
    Backend(String),
}

impl SourceError {
    #[must_use]
    pub fn not_found(resource: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Read queries behind the cached endpoints.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// All posts ordered by like count, then recency.
    async fn fetch_trending_posts(&self) -> Result<Vec<Post>, SourceError>;

    /// Profile with follow counters.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::NotFound` if no user has this handle.
    async fn fetch_user_profile(&self, handle: &str) -> Result<UserProfile, SourceError>;

    /// Bookmarked posts, most recently bookmarked first. Empty is not an error.
    async fn fetch_bookmarks(&self, user_id: UserId) -> Result<Vec<Post>, SourceError>;
}
