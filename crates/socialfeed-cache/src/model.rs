//! Payloads stored in the cache.
//!
//! Field names follow the API's JSON wire format so a cached value can be
//! returned to clients verbatim.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type UserId = i64;
pub type PostId = i64;

/// Like counter and likers of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    pub like_count: i64,
    #[serde(default)]
    pub liked_by: Vec<UserId>,
}

/// A post joined with its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: PostId,
    pub content: String,
    #[serde(default)]
    pub img_content: Option<String>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
    pub likes: LikeSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Public profile of a user with follow counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub followers: i64,
    pub followings: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Ordering of a user's home feed; each ordering is cached under its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    Latest,
    #[default]
    Oldest,
    Trending,
}

impl FeedSort {
    pub const ALL: [FeedSort; 3] = [FeedSort::Latest, FeedSort::Oldest, FeedSort::Trending];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSort::Latest => "latest",
            FeedSort::Oldest => "oldest",
            FeedSort::Trending => "trending",
        }
    }
}
