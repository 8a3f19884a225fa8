// libs/chat-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::policy::{AccessScope, Action, Resource};

use crate::models::{ChatError, SendMessageRequest, StartConversationRequest};
use crate::services::ChatService;

fn map_chat_error(e: ChatError) -> AppError {
    match e {
        ChatError::ConversationNotFound => AppError::NotFound(e.to_string()),
        ChatError::Forbidden(msg) => AppError::Forbidden(msg),
        ChatError::ValidationError(msg) => AppError::ValidationError(msg),
        ChatError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn scope_for(user: &User, action: Action) -> Result<AccessScope, AppError> {
    let actor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;
    let scope = AccessScope::for_actor(actor_id, user.clinic_role(), Resource::Conversation, action);
    if scope.is_denied() {
        return Err(AppError::Forbidden("Not authorized for this operation".to_string()));
    }
    Ok(scope)
}

#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Action::List)?;
    let conversations = ChatService::new(&state)
        .list_conversations(&scope, auth.token())
        .await
        .map_err(map_chat_error)?;

    Ok(Json(json!({
        "success": true,
        "count": conversations.len(),
        "conversations": conversations
    })))
}

#[axum::debug_handler]
pub async fn start_conversation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<StartConversationRequest>,
) -> Result<Json<Value>, AppError> {
    let conversation = ChatService::new(&state)
        .start_conversation(request, &user, auth.token())
        .await
        .map_err(map_chat_error)?;

    Ok(Json(json!({ "success": true, "conversation": conversation })))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<Arc<AppConfig>>,
    Path(conversation_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Action::Read)?;
    let messages = ChatService::new(&state)
        .list_messages(conversation_id, &user, &scope, auth.token())
        .await
        .map_err(map_chat_error)?;

    Ok(Json(json!({
        "success": true,
        "count": messages.len(),
        "messages": messages
    })))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppConfig>>,
    Path(conversation_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_for(&user, Action::Create)?;
    let message = ChatService::new(&state)
        .send_message(conversation_id, request, &user, &scope, auth.token())
        .await
        .map_err(map_chat_error)?;

    Ok(Json(json!({ "success": true, "message": message })))
}
