use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use socialfeed_cache::{Cached, FeedSort, Mutation, PostId, SourceError, UserId};

use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::server::AppState;
use crate::store::{NewUser, PostDraft, ProfileUpdate};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Always ready: the cache is optional, its state is reported for operators.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let connection = &state.cache.connection;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "cache": {
                "backend": connection.backend(),
                "state": connection.state().as_str(),
            }
        })),
    )
}

pub async fn metrics() -> Response {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

/// Explicit reconnect after the cache degraded.
pub async fn reconnect_cache(State(state): State<AppState>) -> impl IntoResponse {
    let connection = &state.cache.connection;
    let cache_state = connection.reconnect().await;
    tracing::info!(state = %cache_state, "cache reconnect requested");
    Json(json!({
        "backend": connection.backend(),
        "state": cache_state.as_str(),
    }))
}

/// JSON body tagged with where it was served from.
fn cached_json<T: Serialize>(cached: Cached<T>) -> Response {
    let tag = if cached.is_from_cache() { "HIT" } else { "MISS" };
    (
        [(X_CACHE, HeaderValue::from_static(tag))],
        Json(cached.into_inner()),
    )
        .into_response()
}

// ---- Auth ----

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    if user.username.trim().is_empty() {
        return Err(ApiError::BadRequest("username is required".into()));
    }
    let profile = state.store.create_user(user).await.map_err(|e| match e {
        SourceError::Backend(message) => ApiError::BadRequest(message),
        other => other.into(),
    })?;
    tracing::info!(user_id = profile.id, "user signed up");
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .store
        .open_session(&body.username)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid credentials"))?;
    Ok(Json(json!({ "token": token, "username": body.username })))
}

/// Puts the token on the revocation list and ends the session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    state.cache.revocations.revoke(&user.token).await;
    state.store.close_session(&user.token).await;
    tracing::info!(user_id = user.id, "user logged out");
    Json(json!({ "message": "Logged out successfully" }))
}

// ---- Cached reads ----

pub async fn trending_posts(State(state): State<AppState>) -> Result<Response, ApiError> {
    let posts = state.cache.reads.trending_posts(state.store.source()).await?;
    Ok(cached_json(posts))
}

pub async fn user_by_handle(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let profile = state
        .cache
        .reads
        .user_by_handle(state.store.source(), &username)
        .await?;
    Ok(cached_json(profile))
}

pub async fn bookmarks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    let posts = state
        .cache
        .reads
        .bookmarks(state.store.source(), user.id)
        .await?;
    Ok(cached_json(posts))
}

// ---- Uncached reads ----

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub sort: FeedSort,
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state.store.fetch_feed(user.id, query.sort).await?;
    Ok(Json(posts))
}

// ---- Writes ----
//
// Each write commits first; the matching invalidation runs only on success.

fn require_content(draft: &PostDraft) -> Result<(), ApiError> {
    if draft.content.trim().is_empty() && draft.img_content.is_none() {
        return Err(ApiError::BadRequest("post content is required".into()));
    }
    Ok(())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(draft): Json<PostDraft>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&draft)?;
    let post = state
        .cache
        .invalidator
        .after_write(
            state.store.create_post(user.id, draft),
            Mutation::PostCreated { author_id: user.id },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn edit_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<PostId>,
    Json(draft): Json<PostDraft>,
) -> Result<impl IntoResponse, ApiError> {
    require_content(&draft)?;
    let post = state
        .cache
        .invalidator
        .after_write(
            state.store.edit_post(user.id, post_id, draft),
            Mutation::PostEdited {
                author_id: user.id,
                post_id,
            },
        )
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<PostId>,
) -> Result<impl IntoResponse, ApiError> {
    // Bookmark lists holding the post are only known once it is gone.
    let bookmarked_by = state.store.delete_post(user.id, post_id).await?;
    state
        .cache
        .invalidator
        .after_commit(&Mutation::PostDeleted {
            author_id: user.id,
            post_id,
            bookmarked_by,
        })
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<PostId>,
) -> Result<impl IntoResponse, ApiError> {
    let likes = state
        .cache
        .invalidator
        .after_write(
            state.store.toggle_like(user.id, post_id),
            Mutation::LikeToggled { post_id },
        )
        .await?;
    Ok(Json(likes))
}

pub async fn add_bookmark(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<PostId>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .cache
        .invalidator
        .after_write(
            state.store.add_bookmark(user.id, post_id),
            Mutation::BookmarkAdded {
                user_id: user.id,
                post_id,
            },
        )
        .await?;
    Ok(Json(json!({ "message": "Post bookmarked" })))
}

pub async fn remove_bookmark(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<PostId>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .cache
        .invalidator
        .after_write(
            state.store.remove_bookmark(user.id, post_id),
            Mutation::BookmarkRemoved {
                user_id: user.id,
                post_id,
            },
        )
        .await?;
    Ok(Json(json!({ "message": "Bookmark removed" })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .cache
        .invalidator
        .after_write(
            state.store.update_profile(user.id, update),
            Mutation::ProfileUpdated {
                handle: user.username,
            },
        )
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub following_id: UserId,
}

pub async fn toggle_follow(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<FollowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.following_id == user.id {
        return Err(ApiError::BadRequest("cannot follow yourself".into()));
    }

    // Handles are only known once the write returns.
    let outcome = state
        .store
        .toggle_follow(user.id, body.following_id)
        .await?;
    state
        .cache
        .invalidator
        .after_commit(&Mutation::FollowToggled {
            follower_id: user.id,
            follower_handle: outcome.follower_handle,
            followee_handle: outcome.followee_handle,
        })
        .await;

    Ok(Json(json!({ "following": outcome.following })))
}
