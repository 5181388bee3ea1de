//! In-process store for local runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use socialfeed_cache::{
    FeedSort, FeedSource, LikeSummary, Post, PostId, SourceError, UserId, UserProfile,
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{FeedStore, FollowOutcome, Identity, NewUser, PostDraft, ProfileUpdate};

#[derive(Debug, Clone)]
struct PostRow {
    author_id: UserId,
    content: String,
    img_content: Option<String>,
    liked_by: Vec<UserId>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserProfile>,
    posts: BTreeMap<PostId, PostRow>,
    /// `(follower, following)`
    follows: BTreeSet<(UserId, UserId)>,
    /// `(user, post)` in insertion order.
    bookmarks: Vec<(UserId, PostId)>,
    sessions: HashMap<String, UserId>,
    next_user_id: UserId,
    next_post_id: PostId,
}

impl Tables {
    fn user(&self, id: UserId) -> Result<&UserProfile, SourceError> {
        self.users
            .get(&id)
            .ok_or_else(|| SourceError::not_found("user", id.to_string()))
    }

    fn user_by_handle(&self, handle: &str) -> Option<&UserProfile> {
        self.users.values().find(|u| u.username == handle)
    }

    fn owned_post(&mut self, author_id: UserId, post_id: PostId) -> Result<&mut PostRow, SourceError> {
        match self.posts.get_mut(&post_id) {
            Some(row) if row.author_id == author_id => Ok(row),
            _ => Err(SourceError::not_found("post", post_id.to_string())),
        }
    }

    fn joined(&self, id: PostId, row: &PostRow) -> Post {
        let author = self.users.get(&row.author_id);
        Post {
            id,
            content: row.content.clone(),
            img_content: row.img_content.clone(),
            username: author.map(|a| a.username.clone()).unwrap_or_default(),
            first_name: author.map(|a| a.first_name.clone()).unwrap_or_default(),
            last_name: author.map(|a| a.last_name.clone()).unwrap_or_default(),
            email: author.map(|a| a.email.clone()).unwrap_or_default(),
            image: author.and_then(|a| a.profile_image.clone()),
            likes: LikeSummary {
                like_count: row.liked_by.len() as i64,
                liked_by: row.liked_by.clone(),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn recount_follows(&mut self) {
        for (id, user) in self.users.iter_mut() {
            user.followers = self.follows.iter().filter(|(_, g)| g == id).count() as i64;
            user.followings = self.follows.iter().filter(|(f, _)| f == id).count() as i64;
        }
    }
}

fn sort_posts(posts: &mut [Post], sort: FeedSort) {
    match sort {
        FeedSort::Latest => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
        FeedSort::Oldest => posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
        FeedSort::Trending => posts.sort_by(|a, b| {
            b.likes
                .like_count
                .cmp(&a.likes.like_count)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        }),
    }
}

/// [`FeedStore`] over in-process tables. Every call commits immediately.
#[derive(Debug, Default)]
pub struct InMemoryFeedStore {
    tables: RwLock<Tables>,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedSource for InMemoryFeedStore {
    async fn fetch_trending_posts(&self) -> Result<Vec<Post>, SourceError> {
        let tables = self.tables.read();
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .map(|(id, row)| tables.joined(*id, row))
            .collect();
        sort_posts(&mut posts, FeedSort::Trending);
        Ok(posts)
    }

    async fn fetch_user_profile(&self, handle: &str) -> Result<UserProfile, SourceError> {
        self.tables
            .read()
            .user_by_handle(handle)
            .cloned()
            .ok_or_else(|| SourceError::not_found("user", handle))
    }

    async fn fetch_bookmarks(&self, user_id: UserId) -> Result<Vec<Post>, SourceError> {
        let tables = self.tables.read();
        Ok(tables
            .bookmarks
            .iter()
            .rev()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, post_id)| tables.posts.get(post_id).map(|row| tables.joined(*post_id, row)))
            .collect())
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    fn source(&self) -> &dyn FeedSource {
        self
    }

    async fn create_user(&self, user: NewUser) -> Result<UserProfile, SourceError> {
        let mut tables = self.tables.write();
        if tables.user_by_handle(&user.username).is_some() {
            return Err(SourceError::backend(format!(
                "username {} is already taken",
                user.username
            )));
        }
        tables.next_user_id += 1;
        let profile = UserProfile {
            id: tables.next_user_id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            profile_image: None,
            about: None,
            link: None,
            followers: 0,
            followings: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn open_session(&self, handle: &str) -> Result<String, SourceError> {
        let mut tables = self.tables.write();
        let user_id = tables
            .user_by_handle(handle)
            .map(|u| u.id)
            .ok_or_else(|| SourceError::not_found("user", handle))?;
        let token = Uuid::new_v4().simple().to_string();
        tables.sessions.insert(token.clone(), user_id);
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> Option<Identity> {
        let tables = self.tables.read();
        let user_id = tables.sessions.get(token)?;
        tables.users.get(user_id).map(|u| Identity {
            id: u.id,
            username: u.username.clone(),
        })
    }

    async fn close_session(&self, token: &str) {
        self.tables.write().sessions.remove(token);
    }

    async fn fetch_feed(&self, user_id: UserId, sort: FeedSort) -> Result<Vec<Post>, SourceError> {
        let tables = self.tables.read();
        tables.user(user_id)?;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|(_, row)| {
                row.author_id == user_id || tables.follows.contains(&(user_id, row.author_id))
            })
            .map(|(id, row)| tables.joined(*id, row))
            .collect();
        sort_posts(&mut posts, sort);
        Ok(posts)
    }

    async fn create_post(&self, author_id: UserId, draft: PostDraft) -> Result<Post, SourceError> {
        let mut tables = self.tables.write();
        tables.user(author_id)?;
        tables.next_post_id += 1;
        let id = tables.next_post_id;
        let now = OffsetDateTime::now_utc();
        let row = PostRow {
            author_id,
            content: draft.content,
            img_content: draft.img_content,
            liked_by: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let post = tables.joined(id, &row);
        tables.posts.insert(id, row);
        Ok(post)
    }

    async fn edit_post(
        &self,
        author_id: UserId,
        post_id: PostId,
        draft: PostDraft,
    ) -> Result<Post, SourceError> {
        let mut tables = self.tables.write();
        let row = tables.owned_post(author_id, post_id)?;
        row.content = draft.content;
        if draft.img_content.is_some() {
            row.img_content = draft.img_content;
        }
        row.updated_at = OffsetDateTime::now_utc();
        let row = row.clone();
        Ok(tables.joined(post_id, &row))
    }

    async fn delete_post(
        &self,
        author_id: UserId,
        post_id: PostId,
    ) -> Result<Vec<UserId>, SourceError> {
        let mut tables = self.tables.write();
        tables.owned_post(author_id, post_id)?;
        tables.posts.remove(&post_id);
        let mut bookmarked_by = Vec::new();
        tables.bookmarks.retain(|(user, post)| {
            if *post == post_id {
                bookmarked_by.push(*user);
                return false;
            }
            true
        });
        Ok(bookmarked_by)
    }

    async fn toggle_like(
        &self,
        user_id: UserId,
        post_id: PostId,
    ) -> Result<LikeSummary, SourceError> {
        let mut tables = self.tables.write();
        let row = tables
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| SourceError::not_found("post", post_id.to_string()))?;
        match row.liked_by.iter().position(|id| *id == user_id) {
            Some(index) => {
                row.liked_by.remove(index);
            }
            None => row.liked_by.push(user_id),
        }
        Ok(LikeSummary {
            like_count: row.liked_by.len() as i64,
            liked_by: row.liked_by.clone(),
        })
    }

    async fn add_bookmark(&self, user_id: UserId, post_id: PostId) -> Result<(), SourceError> {
        let mut tables = self.tables.write();
        if !tables.posts.contains_key(&post_id) {
            return Err(SourceError::not_found("post", post_id.to_string()));
        }
        if !tables.bookmarks.contains(&(user_id, post_id)) {
            tables.bookmarks.push((user_id, post_id));
        }
        Ok(())
    }

    async fn remove_bookmark(&self, user_id: UserId, post_id: PostId) -> Result<(), SourceError> {
        let mut tables = self.tables.write();
        let before = tables.bookmarks.len();
        tables.bookmarks.retain(|entry| *entry != (user_id, post_id));
        if tables.bookmarks.len() == before {
            return Err(SourceError::not_found("bookmark", post_id.to_string()));
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, SourceError> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| SourceError::not_found("user", user_id.to_string()))?;
        if update.profile_image.is_some() {
            user.profile_image = update.profile_image;
        }
        if update.about.is_some() {
            user.about = update.about;
        }
        if update.link.is_some() {
            user.link = update.link;
        }
        Ok(user.clone())
    }

    async fn toggle_follow(
        &self,
        follower_id: UserId,
        following_id: UserId,
    ) -> Result<FollowOutcome, SourceError> {
        let mut tables = self.tables.write();
        let follower_handle = tables.user(follower_id)?.username.clone();
        let followee_handle = tables.user(following_id)?.username.clone();

        let edge = (follower_id, following_id);
        let following = if tables.follows.remove(&edge) {
            false
        } else {
            tables.follows.insert(edge);
            true
        };
        tables.recount_follows();

        Ok(FollowOutcome {
            following,
            follower_handle,
            followee_handle,
        })
    }
}
