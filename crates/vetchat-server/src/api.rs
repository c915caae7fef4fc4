//! HTTP surface of the conversation store.
//!
//! The routes mirror what `vetchat_store::HttpStore` speaks, so a client
//! engine can point `VETCHAT_STORE_URL` at this server.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use vetchat_shared::constants::MAX_MESSAGE_SIZE;
use vetchat_shared::{
    resolve, AppendReceipt, ConversationKey, Message, ParticipantId, ParticipantProfile, RawBag,
    RecordId, RecordPatch, Role,
};
use vetchat_store::{ConversationStore, ParticipantDirectory, SqliteStore};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/:key",
            get(get_conversation)
                .post(append_message)
                .patch(patch_conversation),
        )
        .route(
            "/participants/:collection/:id",
            get(get_participant).put(put_participant),
        )
        .route("/admin/block", post(admin_block))
        .route("/admin/unblock", post(admin_unblock))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_SIZE * 4))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct BlockRequest {
    role: Role,
    id: ParticipantId,
}

#[derive(Serialize)]
struct BlockResponse {
    role: Role,
    id: ParticipantId,
    block: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn parse_key(raw: &str) -> Result<ConversationKey, ServerError> {
    ConversationKey::parse(raw)
        .ok_or_else(|| ServerError::BadRequest(format!("Invalid conversation key: {raw}")))
}

fn parse_role(collection: &str) -> Result<Role, ServerError> {
    Role::from_collection(collection)
        .ok_or_else(|| ServerError::NotFound(format!("Unknown collection: {collection}")))
}

/// Reject messages that could not have been composed by a client for this
/// conversation.
fn validate_message(key: &ConversationKey, message: &Message) -> Result<(), ServerError> {
    if &resolve(&message.sender_id, &message.receiver_id)? != key {
        return Err(ServerError::BadRequest(format!(
            "Message between {} and {} does not belong to {key}",
            message.sender_id, message.receiver_id
        )));
    }
    if message.text.trim().is_empty() {
        return Err(ServerError::BadRequest("Message text is empty".into()));
    }
    if message.text.len() > MAX_MESSAGE_SIZE {
        return Err(ServerError::BadRequest(format!(
            "Message text is {} bytes (max {MAX_MESSAGE_SIZE})",
            message.text.len()
        )));
    }
    Ok(())
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<ConversationKey, RawBag>>, ServerError> {
    Ok(Json(state.store.fetch_all().await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<RawBag>, ServerError> {
    let key = parse_key(&key)?;
    Ok(Json(state.store.fetch(&key).await?))
}

async fn append_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(message): Json<Message>,
) -> Result<Json<AppendReceipt>, ServerError> {
    let key = parse_key(&key)?;
    validate_message(&key, &message)?;

    let name = state.store.append(&key, &message).await?;
    info!(key = %key, record = %name, "Message appended");
    Ok(Json(AppendReceipt { name }))
}

async fn patch_conversation(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(patches): Json<BTreeMap<RecordId, RecordPatch>>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let key = parse_key(&key)?;
    let patches: BTreeMap<RecordId, RecordPatch> =
        patches.into_iter().filter(|(_, p)| !p.is_empty()).collect();

    if !patches.is_empty() {
        state.store.patch(&key, &patches).await?;
    }
    Ok(Json(serde_json::json!({ "patched": patches.len() })))
}

async fn get_participant(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Option<ParticipantProfile>>, ServerError> {
    let role = parse_role(&collection)?;
    let profile = state.store.lookup(role, &ParticipantId::from(id)).await?;
    Ok(Json(profile))
}

async fn put_participant(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(profile): Json<ParticipantProfile>,
) -> Result<Json<ParticipantProfile>, ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let role = parse_role(&collection)?;
    let id = ParticipantId::from(id);
    if id.is_empty() {
        return Err(ServerError::BadRequest("Participant id is empty".into()));
    }

    state.store.upsert_participant(role, &id, &profile)?;
    info!(role = %role, id = %id, "Participant saved");
    Ok(Json(profile))
}

async fn admin_block(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, ServerError> {
    set_blocked(&headers, &state, req, true)
}

async fn admin_unblock(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, ServerError> {
    set_blocked(&headers, &state, req, false)
}

fn set_blocked(
    headers: &HeaderMap,
    state: &AppState,
    req: BlockRequest,
    block: bool,
) -> Result<Json<BlockResponse>, ServerError> {
    verify_admin_token(headers, &state.config)?;
    state.store.set_blocked(req.role, &req.id, block)?;

    info!(role = %req.role, id = %req.id, block, "Admin changed block flag");
    Ok(Json(BlockResponse {
        role: req.role,
        id: req.id,
        block,
    }))
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // ct_eq on slices of different length is already false.
    if presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }
    Ok(())
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
