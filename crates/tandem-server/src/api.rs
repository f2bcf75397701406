use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRef, Path, Query, State},
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_shared::api::{
    AckResponse, AuthResponse, ConversationResponse, LogInRequest, PendingRequestsResponse,
    ProfileResponse, SearchQuery, SearchResponse, SendMessageRequest, SendMessageResponse,
    SidebarResponse, SignUpRequest, UpdateProfileRequest,
};
use tandem_shared::constants::WS_PATH;
use tandem_shared::types::{MessageId, RequestId, UserId};

use crate::accounts::AccountService;
use crate::auth::{AuthUser, TokenKeys};
use crate::config::ServerConfig;
use crate::db::SharedDb;
use crate::error::{ServiceError, ServiceResult};
use crate::friends::FriendService;
use crate::messaging::MessagingService;
use crate::realtime::{socket, Dispatcher};

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub friends: FriendService,
    pub messaging: MessagingService,
    pub dispatcher: Dispatcher,
    pub keys: TokenKeys,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: SharedDb, config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new();
        let accounts = AccountService::new(
            db.clone(),
            TokenKeys::new(&config.jwt_secret, config.token_ttl_hours),
        );
        Self {
            keys: accounts.keys().clone(),
            accounts,
            friends: FriendService::new(db.clone(), dispatcher.clone(), config.search_limit),
            messaging: MessagingService::new(db, dispatcher.clone()),
            dispatcher,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    let max_body = state.config.max_body_bytes;

    Router::new()
        .route("/api/status", get(status))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(log_in))
        .route("/api/auth/check", get(check_auth))
        .route("/api/auth/update-profile", put(update_profile))
        .route("/api/messages/user", get(sidebar))
        .route("/api/messages/mark/:id", put(mark_seen))
        .route("/api/messages/send/:id", post(send_message))
        .route("/api/messages/:id", get(conversation))
        .route("/api/friends/search", get(search))
        .route("/api/friends/requests", get(pending_requests))
        .route("/api/friends/request/:user_id", post(send_request))
        .route("/api/friends/accept/:request_id", put(accept_request))
        .route("/api/friends/reject/:request_id", put(reject_request))
        .route(WS_PATH, get(socket::ws_handler))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unwrap a JSON body, reporting malformed input in the usual envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ServiceResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ServiceError::BadRequest(e.body_text()))
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> ServiceResult<T> {
    raw.parse()
        .map_err(|_| ServiceError::BadRequest(format!("Invalid {what} id")))
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    status: &'static str,
    version: &'static str,
    online: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online: state.dispatcher.online_users().await.len(),
    })
}

// ─── Accounts ───

async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> ServiceResult<Json<AuthResponse>> {
    let (user, token) = state.accounts.sign_up(body(payload)?).await?;
    Ok(Json(AuthResponse {
        success: true,
        user_data: user,
        token,
        message: "Account created successfully".to_string(),
    }))
}

async fn log_in(
    State(state): State<AppState>,
    payload: Result<Json<LogInRequest>, JsonRejection>,
) -> ServiceResult<Json<AuthResponse>> {
    let (user, token) = state.accounts.log_in(body(payload)?).await?;
    Ok(Json(AuthResponse {
        success: true,
        user_data: user,
        token,
        message: "Login successful".to_string(),
    }))
}

async fn check_auth(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> ServiceResult<Json<ProfileResponse>> {
    let user = state.accounts.current_user(me).await?;
    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ServiceResult<Json<ProfileResponse>> {
    let user = state.accounts.update_profile(me, body(payload)?).await?;
    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

// ─── Messages ───

async fn sidebar(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> ServiceResult<Json<SidebarResponse>> {
    let (users, unseen_messages) = state.messaging.list_friends_with_unseen_counts(me).await?;
    Ok(Json(SidebarResponse {
        success: true,
        users,
        unseen_messages,
    }))
}

async fn conversation(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<String>,
) -> ServiceResult<Json<ConversationResponse>> {
    let other: UserId = parse_id(&id, "user")?;
    let messages = state.messaging.list_conversation(me, other).await?;
    Ok(Json(ConversationResponse {
        success: true,
        messages,
    }))
}

async fn mark_seen(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<String>,
) -> ServiceResult<Json<AckResponse>> {
    let message: MessageId = parse_id(&id, "message")?;
    state.messaging.mark_seen(me, message).await?;
    Ok(Json(AckResponse {
        success: true,
        message: None,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ServiceResult<Json<SendMessageResponse>> {
    let receiver: UserId = parse_id(&id, "user")?;
    let req = body(payload)?;
    let new_message = state
        .messaging
        .send_message(me, receiver, req.text, req.image)
        .await?;
    Ok(Json(SendMessageResponse {
        success: true,
        new_message,
    }))
}

// ─── Friends ───

async fn search(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Query(params): Query<SearchQuery>,
) -> ServiceResult<Json<SearchResponse>> {
    let query = params.query.unwrap_or_default();
    let users = state
        .friends
        .search_candidates(me, &query, params.include_friends)
        .await?;
    Ok(Json(SearchResponse {
        success: true,
        users,
    }))
}

async fn pending_requests(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> ServiceResult<Json<PendingRequestsResponse>> {
    let requests = state.friends.list_pending_requests(me).await?;
    Ok(Json(PendingRequestsResponse {
        success: true,
        requests,
    }))
}

async fn send_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(user_id): Path<String>,
) -> ServiceResult<Json<AckResponse>> {
    let target: UserId = parse_id(&user_id, "user")?;
    state.friends.send_request(me, target).await?;
    Ok(Json(AckResponse::ok("Friend request sent")))
}

async fn accept_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(request_id): Path<String>,
) -> ServiceResult<Json<AckResponse>> {
    let id: RequestId = parse_id(&request_id, "request")?;
    state.friends.accept_request(me, id).await?;
    Ok(Json(AckResponse::ok("Friend request accepted")))
}

async fn reject_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(request_id): Path<String>,
) -> ServiceResult<Json<AckResponse>> {
    let id: RequestId = parse_id(&request_id, "request")?;
    state.friends.reject_request(me, id).await?;
    Ok(Json(AckResponse::ok("Friend request rejected")))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
