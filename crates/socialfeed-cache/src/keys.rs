//! Cache key templates.
//!
//! Every key is namespaced by resource; the namespace is the part before the
//! first `:` and doubles as the metrics label.

use crate::model::{FeedSort, UserId};
use crate::rate_limit::RateScope;

/// Trending feed, shared by every user.
pub const TRENDING_POSTS: &str = "trending:posts";

/// `user:<handle>`
pub fn user(handle: &str) -> String {
    format!("user:{handle}")
}

/// `bookmarks:<userId>`
pub fn bookmarks(user_id: UserId) -> String {
    format!("bookmarks:{user_id}")
}

/// `feed:<userId>:<sort>`
pub fn feed(user_id: UserId, sort: FeedSort) -> String {
    format!("feed:{user_id}:{}", sort.as_str())
}

/// Every feed ordering of one user.
pub fn feeds(user_id: UserId) -> impl Iterator<Item = String> {
    FeedSort::ALL.into_iter().map(move |sort| feed(user_id, sort))
}

/// `ratelimit:<scope>:<identity>:<windowIndex>`
pub fn rate_window(scope: RateScope, identity: &str, window_index: u64) -> String {
    format!("ratelimit:{}:{identity}:{window_index}", scope.as_str())
}

/// `blacklist:<token>`
pub fn revoked_token(token: &str) -> String {
    format!("blacklist:{token}")
}
