//! Invalidation triggers fired after writes commit.
//!
//! ## Rule table
//!
//! | Mutation                  | Keys deleted                                              |
//! |---------------------------|-----------------------------------------------------------|
//! | post created/edited/deleted (author `u`) | `feed:u:{latest,oldest,trending}`, `trending:posts` |
//! | post deleted, bookmarked by `b` | `bookmarks:b`                                       |
//! | like toggled              | `trending:posts`                                          |
//! | bookmark added/removed (user `u`) | `bookmarks:u`                                     |
//! | profile updated (handle `h`) | `user:h`                                               |
//! | follow toggled (`f` -> `g`) | `feed:f:*`, `user:<f handle>`, `user:<g handle>`        |
//!
//! Deletion is best-effort: a miss or a degraded cache is not an error.

use std::collections::BTreeSet;
use std::future::Future;

use crate::connection::ConnectionManager;
use crate::keys;
use crate::model::{PostId, UserId};

/// A committed write that can stale cached reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PostCreated { author_id: UserId },
    PostEdited { author_id: UserId, post_id: PostId },
    PostDeleted {
        author_id: UserId,
        post_id: PostId,
        /// Users whose bookmark of the post went with it.
        bookmarked_by: Vec<UserId>,
    },
    LikeToggled { post_id: PostId },
    BookmarkAdded { user_id: UserId, post_id: PostId },
    BookmarkRemoved { user_id: UserId, post_id: PostId },
    ProfileUpdated { handle: String },
    FollowToggled {
        follower_id: UserId,
        follower_handle: String,
        followee_handle: String,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::PostCreated { .. } => "post_created",
            Mutation::PostEdited { .. } => "post_edited",
            Mutation::PostDeleted { .. } => "post_deleted",
            Mutation::LikeToggled { .. } => "like_toggled",
            Mutation::BookmarkAdded { .. } => "bookmark_added",
            Mutation::BookmarkRemoved { .. } => "bookmark_removed",
            Mutation::ProfileUpdated { .. } => "profile_updated",
            Mutation::FollowToggled { .. } => "follow_toggled",
        }
    }

    /// Every cache key this write can stale.
    pub fn stale_keys(&self) -> BTreeSet<String> {
        let mut stale = BTreeSet::new();
        match self {
            Mutation::PostCreated { author_id } | Mutation::PostEdited { author_id, .. } => {
                stale.extend(keys::feeds(*author_id));
                stale.insert(keys::TRENDING_POSTS.to_string());
            }
            Mutation::PostDeleted {
                author_id,
                bookmarked_by,
                ..
            } => {
                stale.extend(keys::feeds(*author_id));
                stale.insert(keys::TRENDING_POSTS.to_string());
                stale.extend(bookmarked_by.iter().map(|id| keys::bookmarks(*id)));
            }
            Mutation::LikeToggled { .. } => {
                stale.insert(keys::TRENDING_POSTS.to_string());
            }
            Mutation::BookmarkAdded { user_id, .. } | Mutation::BookmarkRemoved { user_id, .. } => {
                stale.insert(keys::bookmarks(*user_id));
            }
            Mutation::ProfileUpdated { handle } => {
                stale.insert(keys::user(handle));
            }
            Mutation::FollowToggled {
                follower_id,
                follower_handle,
                followee_handle,
            } => {
                stale.extend(keys::feeds(*follower_id));
                stale.insert(keys::user(follower_handle));
                stale.insert(keys::user(followee_handle));
            }
        }
        stale
    }
}

/// Deletes stale keys after writes.
#[derive(Debug, Clone)]
pub struct Invalidator {
    connection: ConnectionManager,
}

impl Invalidator {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Delete `keys`. Repeating the call is harmless.
    pub async fn invalidate<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let client = self.connection.client();
        for key in keys {
            let key = key.as_ref();
            if client.delete(key).await {
                tracing::debug!(key = %key, "cache invalidated");
            }
        }
    }

    /// Fire the triggers of a write that has already committed.
    pub async fn after_commit(&self, mutation: &Mutation) {
        let stale = mutation.stale_keys();
        tracing::debug!(
            mutation = mutation.name(),
            keys = stale.len(),
            "invalidating cache after write"
        );
        self.invalidate(&stale).await;
    }

    /// Run `write`, then invalidate only if it succeeded.
    ///
    /// A failed write leaves the cache untouched and returns its error.
    pub async fn after_write<T, E, Fut>(&self, write: Fut, mutation: Mutation) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let committed = write.await?;
        self.after_commit(&mutation).await;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    async fn seeded(keys: &[&str]) -> (Invalidator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for key in keys {
            store.set_ex(key, "[]", Duration::from_secs(600)).await.unwrap();
        }
        let connection = ConnectionManager::with_store(store.clone(), &RedisConfig::default());
        connection.connect().await;
        (Invalidator::new(connection), store)
    }

    #[test]
    fn test_rule_table() {
        let created: Vec<_> = Mutation::PostCreated { author_id: 7 }
            .stale_keys()
            .into_iter()
            .collect();
        assert_eq!(
            created,
            vec!["feed:7:latest", "feed:7:oldest", "feed:7:trending", "trending:posts"]
        );

        assert_eq!(
            Mutation::LikeToggled { post_id: 3 }.stale_keys(),
            BTreeSet::from(["trending:posts".to_string()])
        );
        assert_eq!(
            Mutation::BookmarkRemoved { user_id: 4, post_id: 3 }.stale_keys(),
            BTreeSet::from(["bookmarks:4".to_string()])
        );
        assert_eq!(
            Mutation::ProfileUpdated { handle: "alice".to_string() }.stale_keys(),
            BTreeSet::from(["user:alice".to_string()])
        );

        let follow = Mutation::FollowToggled {
            follower_id: 1,
            follower_handle: "bob".to_string(),
            followee_handle: "alice".to_string(),
        }
        .stale_keys();
        assert!(follow.contains("user:alice"));
        assert!(follow.contains("user:bob"));
        assert!(follow.contains("feed:1:latest"));
        assert!(!follow.contains("trending:posts"));

        let deleted = Mutation::PostDeleted {
            author_id: 7,
            post_id: 3,
            bookmarked_by: vec![4, 9],
        }
        .stale_keys();
        assert!(deleted.contains("trending:posts"));
        assert!(deleted.contains("feed:7:oldest"));
        assert!(deleted.contains("bookmarks:4"));
        assert!(deleted.contains("bookmarks:9"));
        assert!(!deleted.contains("bookmarks:7"));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (invalidator, store) = seeded(&["bookmarks:4", "user:alice"]).await;

        invalidator.invalidate(["bookmarks:4"]).await;
        assert!(!store.contains("bookmarks:4"));
        assert!(store.contains("user:alice"));

        invalidator.invalidate(["bookmarks:4"]).await;
        assert!(!store.contains("bookmarks:4"));
        assert!(store.contains("user:alice"));
    }

    #[tokio::test]
    async fn test_after_write_invalidates_only_on_success() {
        let (invalidator, store) = seeded(&["trending:posts"]).await;

        let failed: Result<(), &str> = invalidator
            .after_write(async { Err("deadlock") }, Mutation::LikeToggled { post_id: 1 })
            .await;
        assert_eq!(failed, Err("deadlock"));
        assert!(store.contains("trending:posts"));

        let liked: Result<bool, &str> = invalidator
            .after_write(async { Ok(true) }, Mutation::LikeToggled { post_id: 1 })
            .await;
        assert_eq!(liked, Ok(true));
        assert!(!store.contains("trending:posts"));
    }

    #[tokio::test]
    async fn test_degraded_cache_invalidation_is_noop() {
        let invalidator = Invalidator::new(ConnectionManager::disabled());
        invalidator
            .after_commit(&Mutation::PostCreated { author_id: 1 })
            .await;
    }
}
