//! Relational source of truth as seen by the handlers.
//!
//! Reads behind cached endpoints come from [`FeedSource`]; everything else a
//! handler needs (writes, the uncached home feed, sessions) lives on
//! [`FeedStore`]. Every write returns only after it has committed, so the
//! caller can invalidate right after.

use async_trait::async_trait;
use serde::Deserialize;
use socialfeed_cache::{FeedSort, FeedSource, LikeSummary, Post, PostId, SourceError, UserId, UserProfile};

mod memory;

pub use memory::InMemoryFeedStore;

/// The user behind a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    pub content: String,
    #[serde(default)]
    pub img_content: Option<String>,
}

/// Profile fields a user may change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Result of a follow toggle, with both handles for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOutcome {
    pub following: bool,
    pub follower_handle: String,
    pub followee_handle: String,
}

#[async_trait]
pub trait FeedStore: FeedSource {
    /// This store as the read source for the cache-aside helpers.
    fn source(&self) -> &dyn FeedSource;

    /// # Errors
    ///
    /// `SourceError::Backend` if the handle is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserProfile, SourceError>;

    /// Issue a session token for an existing user.
    async fn open_session(&self, handle: &str) -> Result<String, SourceError>;

    async fn resolve_session(&self, token: &str) -> Option<Identity>;

    async fn close_session(&self, token: &str);

    /// Posts by `user_id` and the users they follow. Not cached.
    async fn fetch_feed(&self, user_id: UserId, sort: FeedSort) -> Result<Vec<Post>, SourceError>;

    async fn create_post(&self, author_id: UserId, draft: PostDraft) -> Result<Post, SourceError>;

    /// # Errors
    ///
    /// `SourceError::NotFound` if the post does not exist or `author_id` does not own it.
    async fn edit_post(
        &self,
        author_id: UserId,
        post_id: PostId,
        draft: PostDraft,
    ) -> Result<Post, SourceError>;

    /// Delete the post and its bookmarks. Returns the users who had it bookmarked.
    async fn delete_post(
        &self,
        author_id: UserId,
        post_id: PostId,
    ) -> Result<Vec<UserId>, SourceError>;

    /// Like the post, or unlike it if `user_id` already does.
    async fn toggle_like(&self, user_id: UserId, post_id: PostId)
    -> Result<LikeSummary, SourceError>;

    /// Idempotent.
    async fn add_bookmark(&self, user_id: UserId, post_id: PostId) -> Result<(), SourceError>;

    async fn remove_bookmark(&self, user_id: UserId, post_id: PostId) -> Result<(), SourceError>;

    async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, SourceError>;

    async fn toggle_follow(
        &self,
        follower_id: UserId,
        following_id: UserId,
    ) -> Result<FollowOutcome, SourceError>;
}
