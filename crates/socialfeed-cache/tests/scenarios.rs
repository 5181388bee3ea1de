//! End-to-end behaviour of the cache layer over the in-process store.
//!
//! The source of truth is a small in-memory table set that counts queries, so
//! each test can tell a cache hit from a fresh read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socialfeed_cache::{
    CacheLayer, CacheSource, CacheTtlConfig, ConnectionManager, ConnectionState, FeedSource,
    KvStore, LikeSummary, MemoryStore, Mutation, Post, RateDecision, RateLimitConfig, RateScope,
    RedisConfig, SourceError, StoreError, UserId, UserProfile,
};
use time::OffsetDateTime;

#[derive(Default)]
struct Tables {
    posts: Mutex<Vec<Post>>,
    users: Mutex<Vec<UserProfile>>,
    trending_queries: AtomicUsize,
    profile_queries: AtomicUsize,
}

impl Tables {
    fn insert_post(&self, author: &str, content: &str) {
        let mut posts = self.posts.lock();
        let id = posts.len() as i64 + 1;
        posts.push(Post {
            id,
            content: content.to_string(),
            img_content: None,
            username: author.to_string(),
            first_name: author.to_string(),
            last_name: "Tester".to_string(),
            email: format!("{author}@example.com"),
            image: None,
            likes: LikeSummary {
                like_count: 0,
                liked_by: vec![],
            },
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        });
    }

    fn insert_user(&self, id: UserId, handle: &str) {
        self.users.lock().push(UserProfile {
            id,
            username: handle.to_string(),
            first_name: handle.to_string(),
            last_name: "Tester".to_string(),
            email: format!("{handle}@example.com"),
            profile_image: None,
            about: None,
            link: None,
            followers: 0,
            followings: 0,
            created_at: OffsetDateTime::now_utc(),
        });
    }
}

#[async_trait]
impl FeedSource for Tables {
    async fn fetch_trending_posts(&self) -> Result<Vec<Post>, SourceError> {
        self.trending_queries.fetch_add(1, Ordering::SeqCst);
        let mut posts = self.posts.lock().clone();
        posts.sort_by(|a, b| b.likes.like_count.cmp(&a.likes.like_count));
        Ok(posts)
    }

    async fn fetch_user_profile(&self, handle: &str) -> Result<UserProfile, SourceError> {
        self.profile_queries.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .iter()
            .find(|u| u.username == handle)
            .cloned()
            .ok_or_else(|| SourceError::not_found("user", handle))
    }

    async fn fetch_bookmarks(&self, _user_id: UserId) -> Result<Vec<Post>, SourceError> {
        Ok(Vec::new())
    }
}

async fn layer_over(store: Arc<dyn KvStore>) -> CacheLayer {
    let connection = ConnectionManager::with_store(store, &RedisConfig::default());
    connection.connect().await;
    CacheLayer::new(connection, &CacheTtlConfig::default(), &RateLimitConfig::default())
}

#[tokio::test]
async fn create_post_invalidates_trending_and_author_feed() {
    let store = Arc::new(MemoryStore::new());
    let layer = layer_over(store.clone()).await;
    let tables = Tables::default();
    tables.insert_post("alice", "first");

    // Warm the trending cache and a feed entry for user 7.
    let warm = layer.reads.trending_posts(&tables).await.unwrap();
    assert_eq!(warm.source, CacheSource::Source);
    store
        .set_ex("feed:7:latest", "[]", Duration::from_secs(600))
        .await
        .unwrap();
    assert!(layer.reads.trending_posts(&tables).await.unwrap().is_from_cache());

    let created: Result<(), SourceError> = layer
        .invalidator
        .after_write(
            async {
                tables.insert_post("bob", "second");
                Ok(())
            },
            Mutation::PostCreated { author_id: 7 },
        )
        .await;
    created.unwrap();

    assert!(!store.contains("trending:posts"));
    assert!(!store.contains("feed:7:latest"));

    let fresh = layer.reads.trending_posts(&tables).await.unwrap();
    assert_eq!(fresh.source, CacheSource::Source);
    assert_eq!(fresh.value.len(), 2);
    assert_eq!(tables.trending_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn profile_lookup_is_cached_until_updated() {
    let store = Arc::new(MemoryStore::new());
    let layer = layer_over(store.clone()).await;
    let tables = Tables::default();
    tables.insert_user(1, "alice");

    let first = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert_eq!(first.source, CacheSource::Source);
    assert!(store.contains("user:alice"));

    let second = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(tables.profile_queries.load(Ordering::SeqCst), 1);

    layer
        .invalidator
        .after_commit(&Mutation::ProfileUpdated {
            handle: "alice".to_string(),
        })
        .await;
    let third = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert_eq!(third.source, CacheSource::Source);
    assert_eq!(tables.profile_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hundred_and_first_request_is_throttled() {
    let layer = layer_over(Arc::new(MemoryStore::new())).await;
    let now = 1_704_067_210;

    for _ in 0..100 {
        assert!(layer.limiter.check_at(RateScope::User, "42", now).await.is_allowed());
    }
    assert!(matches!(
        layer.limiter.check_at(RateScope::User, "42", now).await,
        RateDecision::Throttled { limit: 100, .. }
    ));
}

/// Store that accepts the connection and then fails every command.
struct BrokenStore {
    commands: AtomicUsize,
}

#[async_trait]
impl KvStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection reset by peer".to_string()))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection reset by peer".to_string()))
    }
    async fn del(&self, _key: &str) -> Result<(), StoreError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection reset by peer".to_string()))
    }
    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection reset by peer".to_string()))
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection reset by peer".to_string()))
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn broken_cache_degrades_to_direct_reads_and_open_limiter() {
    let store = Arc::new(BrokenStore {
        commands: AtomicUsize::new(0),
    });
    let layer = layer_over(store.clone()).await;
    assert_eq!(layer.connection.state(), ConnectionState::Connected);

    let tables = Tables::default();
    tables.insert_user(1, "alice");

    for expected in 1..=3 {
        let profile = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
        assert_eq!(profile.source, CacheSource::Source);
        assert_eq!(tables.profile_queries.load(Ordering::SeqCst), expected);
    }
    assert_eq!(layer.connection.state(), ConnectionState::Disabled);

    for _ in 0..200 {
        assert!(layer.limiter.check(RateScope::Ip, "10.0.0.1").await.is_allowed());
    }

    // Only the first GET reached the store; everything after went to the null client.
    assert_eq!(store.commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn not_found_profile_propagates_through_layer() {
    let layer = layer_over(Arc::new(MemoryStore::new())).await;
    let tables = Tables::default();

    let err = layer.reads.user_by_handle(&tables, "nobody").await.unwrap_err();
    assert_eq!(err, SourceError::not_found("user", "nobody"));
}

/// Memory store whose reads can be made to hang.
#[derive(Default)]
struct StallingStore {
    stalled: AtomicBool,
    inner: MemoryStore,
}

#[async_trait]
impl KvStore for StallingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_ex(key, value, ttl).await
    }
    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.inner.del(key).await
    }
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.expire(key, ttl).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test(start_paused = true)]
async fn slow_command_disables_cache_until_reconnect() {
    let store = Arc::new(StallingStore::default());
    let layer = layer_over(store.clone()).await;
    let tables = Tables::default();
    tables.insert_user(1, "alice");

    layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert!(store.inner.contains("user:alice"));

    store.stalled.store(true, Ordering::SeqCst);
    let stalled = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert_eq!(stalled.source, CacheSource::Source);
    assert_eq!(layer.connection.state(), ConnectionState::Disabled);

    store.stalled.store(false, Ordering::SeqCst);
    assert_eq!(layer.connection.reconnect().await, ConnectionState::Connected);
    let recovered = layer.reads.user_by_handle(&tables, "alice").await.unwrap();
    assert_eq!(recovered.source, CacheSource::Cache);
}
