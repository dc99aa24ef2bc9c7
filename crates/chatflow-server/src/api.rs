//! REST surface over message history and mutations.
//!
//! Every `/api` route requires an `Authorization: Bearer <token>` header;
//! handlers are thin wrappers over the store and pipeline with the same
//! validation rules as the socket surface.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use chatflow_shared::constants::{DEFAULT_PAGE_SIZE, MIN_SEARCH_QUERY_LEN};
use chatflow_shared::types::FileAttachment;
use chatflow_store::{Message, MessageKind, Page, User};

use crate::auth;
use crate::error::ServerError;
use crate::pipeline;
use crate::socket::ws_handler;
use crate::state::AppState;

const MAX_PAGE_LIMIT: u32 = 100;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .route("/api/chat/messages", post(create_message))
        .route("/api/chat/messages/general", get(general_history))
        .route("/api/chat/messages/private/:email", get(private_history))
        .route("/api/chat/messages/group/:group_id", get(group_history))
        .route("/api/chat/messages/unread", get(unread_count))
        .route("/api/chat/messages/search/:query", get(search))
        .route("/api/chat/messages/:id", put(edit_message))
        .route("/api/chat/messages/:id", delete(delete_message))
        .route("/api/chat/messages/:id/react", post(react))
        .route(
            "/api/chat/messages/:id/react/:emoji",
            delete(remove_reaction),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and run the HTTP/WebSocket server. `ConnectInfo` is needed so the
/// socket layer can derive hotspot networks from client addresses.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    tracing::info!(addr = %addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Resolve the bearer token in `headers` to a user record.
async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ServerError> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    let token = auth::bearer_token(header)?;
    let db = state.db.lock().await;
    auth::authenticate(&db, token, &state.config.jwt_secret)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageRequest {
    content: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    recipient_email: Option<String>,
    group_id: Option<Uuid>,
    file: Option<FileAttachment>,
}

#[derive(Debug, Deserialize)]
struct EditMessageRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ReactRequest {
    emoji: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct UnreadResponse {
    count: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn general_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, ServerError> {
    require_user(&state, &headers).await?;
    let db = state.db.lock().await;
    let page = db.general_messages(query.page(), query.limit())?;
    Ok(Json(page))
}

/// Fetching a private conversation doubles as reading it: incoming unread
/// messages from the other party are marked read.
async fn private_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let db = state.db.lock().await;
    let other = db.find_user_by_email(&email)?;
    let marked = db.mark_private_read(other.id, me.id)?;
    if marked > 0 {
        tracing::debug!(reader = %me.email, sender = %other.email, marked, "marked private messages read");
    }
    let page = db.private_messages(me.id, other.id, query.page(), query.limit())?;
    Ok(Json(page))
}

async fn group_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<chatflow_store::GroupMessage>>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let db = state.db.lock().await;
    let group = db.find_group_by_id(group_id)?;
    if !group.is_member(&me.email) {
        return Err(ServerError::Forbidden(
            "not a member of this group".into(),
        ));
    }
    let page = db.group_messages(group_id, query.page(), query.limit())?;
    Ok(Json(page))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadResponse>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let db = state.db.lock().await;
    let count = db.unread_count(me.id)?;
    Ok(Json(UnreadResponse { count }))
}

/// Create a standalone message record without the realtime fan-out.
async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let me = require_user(&state, &headers).await?;
    pipeline::validate_content(&req.content, req.file.as_ref())?;

    let mut record = Message::new(me.id, &me.username, &me.email, &req.content, req.kind);
    record.file = req.file;

    let db = state.db.lock().await;
    match req.kind {
        MessageKind::General => {}
        MessageKind::Private => {
            let email = req.recipient_email.as_deref().ok_or_else(|| {
                ServerError::Validation("recipientEmail is required for private messages".into())
            })?;
            let recipient = db.find_user_by_email(email)?;
            record.recipient_id = Some(recipient.id);
            record.recipient_email = Some(recipient.email);
        }
        MessageKind::Group => {
            let group_id = req.group_id.ok_or_else(|| {
                ServerError::Validation("groupId is required for group messages".into())
            })?;
            let group = db.find_group_by_id(group_id)?;
            if !group.is_member(&me.email) {
                return Err(ServerError::Forbidden("not a member of this group".into()));
            }
            record.group_id = Some(group.id);
            record.group_name = Some(group.name);
        }
        MessageKind::Hotspot => {
            return Err(ServerError::Validation(
                "hotspot messages are ephemeral and cannot be stored".into(),
            ));
        }
    }

    db.insert_message(&record)?;
    Ok(Json(record))
}

async fn edit_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let updated = pipeline::edit_message(&state, me.id, id, &req.content).await?;
    Ok(Json(updated))
}

async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let updated = pipeline::delete_message(&state, me.id, id).await?;
    Ok(Json(updated))
}

async fn react(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ReactRequest>,
) -> Result<Json<Message>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let updated = pipeline::toggle_reaction(&state, &me, id, &req.emoji).await?;
    Ok(Json(updated))
}

async fn remove_reaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, emoji)): Path<(Uuid, String)>,
) -> Result<Json<Message>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let updated = pipeline::remove_reaction(&state, me.id, id, &emoji).await?;
    Ok(Json(updated))
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(query): Path<String>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let me = require_user(&state, &headers).await?;
    let query = query.trim();
    if query.chars().count() < MIN_SEARCH_QUERY_LEN {
        return Err(ServerError::Validation(format!(
            "search query must be at least {MIN_SEARCH_QUERY_LEN} characters"
        )));
    }
    let kind = match params.kind.as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(
            MessageKind::parse(raw)
                .ok_or_else(|| ServerError::Validation(format!("unknown message type: {raw}")))?,
        ),
    };
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_LIMIT);

    let db = state.db.lock().await;
    let results = db.search_messages(query, kind, me.id, limit)?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use crate::auth::Claims;

    fn bearer_headers(state: &AppState, user_id: Uuid) -> HeaderMap {
        let claims = Claims {
            user_id,
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    async fn seed(state: &AppState, username: &str, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some("x".into()),
            google_id: None,
            is_online: false,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        };
        let db = state.db.lock().await;
        db.create_user(&user).unwrap();
        user
    }

    #[tokio::test]
    async fn missing_or_garbage_token_is_unauthenticated() {
        let state = AppState::for_tests();
        let err = require_user(&state, &HeaderMap::new()).await;
        assert!(matches!(err, Err(ServerError::Unauthenticated(_))));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not-a-jwt".parse().unwrap());
        let err = require_user(&state, &headers).await;
        assert!(matches!(err, Err(ServerError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn token_for_deleted_account_is_rejected() {
        let state = AppState::for_tests();
        let headers = bearer_headers(&state, Uuid::new_v4());
        let err = require_user(&state, &headers).await;
        assert!(matches!(err, Err(ServerError::IdentityNotFound(_))));
    }

    #[tokio::test]
    async fn private_fetch_marks_incoming_read() {
        let state = AppState::for_tests();
        let alice = seed(&state, "alice", "a@x.com").await;
        let bob = seed(&state, "bob", "b@x.com").await;
        {
            let db = state.db.lock().await;
            let mut m = Message::new(alice.id, "alice", "a@x.com", "hi bob", MessageKind::Private);
            m.recipient_id = Some(bob.id);
            m.recipient_email = Some(bob.email.clone());
            db.insert_message(&m).unwrap();
            assert_eq!(db.unread_count(bob.id).unwrap(), 1);
        }

        let headers = bearer_headers(&state, bob.id);
        let page = private_history(
            State(state.clone()),
            headers.clone(),
            Path("a@x.com".to_string()),
            Query(PageQuery {
                page: None,
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.0.items.len(), 1);

        let unread = unread_count(State(state.clone()), headers).await.unwrap();
        assert_eq!(unread.0.count, 0);
    }

    #[tokio::test]
    async fn create_message_validates_targeting() {
        let state = AppState::for_tests();
        let alice = seed(&state, "alice", "a@x.com").await;
        let headers = bearer_headers(&state, alice.id);

        // Private without a recipient.
        let err = create_message(
            State(state.clone()),
            headers.clone(),
            Json(CreateMessageRequest {
                content: "hi".into(),
                kind: MessageKind::Private,
                recipient_email: None,
                group_id: None,
                file: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        // Hotspot messages never persist.
        let err = create_message(
            State(state.clone()),
            headers.clone(),
            Json(CreateMessageRequest {
                content: "hi".into(),
                kind: MessageKind::Hotspot,
                recipient_email: None,
                group_id: None,
                file: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        // General is fine.
        let created = create_message(
            State(state.clone()),
            headers,
            Json(CreateMessageRequest {
                content: "hello".into(),
                kind: MessageKind::General,
                recipient_email: None,
                group_id: None,
                file: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.0.content, "hello");
    }

    #[tokio::test]
    async fn group_history_requires_membership() {
        let state = AppState::for_tests();
        let alice = seed(&state, "alice", "a@x.com").await;
        let eve = seed(&state, "eve", "e@x.com").await;
        let group = chatflow_store::Group {
            id: Uuid::new_v4(),
            name: "Team".into(),
            members: vec!["a@x.com".into()],
            created_by: "a@x.com".into(),
            created_at: Utc::now(),
            last_activity: Utc::now(),
        };
        {
            let db = state.db.lock().await;
            db.create_group(&group).unwrap();
        }

        let ok = group_history(
            State(state.clone()),
            bearer_headers(&state, alice.id),
            Path(group.id),
            Query(PageQuery {
                page: None,
                limit: None,
            }),
        )
        .await;
        assert!(ok.is_ok());

        let err = group_history(
            State(state.clone()),
            bearer_headers(&state, eve.id),
            Path(group.id),
            Query(PageQuery {
                page: None,
                limit: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(ServerError::Forbidden(_))));
    }

    #[tokio::test]
    async fn search_enforces_minimum_query_length_and_type() {
        let state = AppState::for_tests();
        let alice = seed(&state, "alice", "a@x.com").await;
        let headers = bearer_headers(&state, alice.id);

        let err = search(
            State(state.clone()),
            headers.clone(),
            Path("x".to_string()),
            Query(SearchQuery {
                kind: None,
                limit: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        let err = search(
            State(state.clone()),
            headers.clone(),
            Path("hello".to_string()),
            Query(SearchQuery {
                kind: Some("broadcast".into()),
                limit: None,
            }),
        )
        .await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        let ok = search(
            State(state.clone()),
            headers,
            Path("hello".to_string()),
            Query(SearchQuery {
                kind: Some("general".into()),
                limit: None,
            }),
        )
        .await;
        assert!(ok.unwrap().0.is_empty());
    }
}
