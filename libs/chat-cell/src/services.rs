// libs/chat-cell/src/services.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;
use shared_models::policy::{AccessScope, Role};

use crate::models::{
    Attachment, ChatError, Conversation, Message, MessageWithAttachments, SendMessageRequest,
    StartConversationRequest,
};

/// Patient/physiotherapist messaging.
pub struct ChatService {
    supabase: Arc<SupabaseClient>,
}

impl ChatService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub async fn list_conversations(
        &self,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<Conversation>, ChatError> {
        let mut parts = Vec::new();
        if let Some(filter) = scope.query_filter("patient_id", "physiotherapist_id") {
            parts.push(filter);
        }
        parts.push("order=updated_at.desc".to_string());

        let path = format!("/rest/v1/conversations?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))
    }

    /// Open (or return the existing) thread between the caller and the other
    /// party. The unique pair index keeps concurrent opens down to one row.
    pub async fn start_conversation(
        &self,
        request: StartConversationRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Conversation, ChatError> {
        let actor_id = actor_uuid(actor)?;
        let (patient_id, physiotherapist_id) = match actor.clinic_role() {
            Role::Patient => (actor_id, request.participant_id),
            Role::Physiotherapist => (request.participant_id, actor_id),
            Role::Admin => {
                return Err(ChatError::Forbidden(
                    "Conversations are between a patient and a physiotherapist".to_string(),
                ))
            }
        };

        if let Some(existing) = self
            .find_conversation(patient_id, physiotherapist_id, auth_token)
            .await?
        {
            debug!("Reusing conversation {}", existing.id);
            return Ok(existing);
        }

        let now = Utc::now();
        let inserted = self
            .supabase
            .insert_returning::<Conversation>(
                "conversations",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "patient_id": patient_id,
                    "physiotherapist_id": physiotherapist_id,
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await;

        match inserted {
            Ok(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| ChatError::DatabaseError("Insert returned no row".to_string())),
            // Unique pair index: someone opened it concurrently, use theirs.
            Err(DbError::Conflict(_)) => self
                .find_conversation(patient_id, physiotherapist_id, auth_token)
                .await?
                .ok_or(ChatError::ConversationNotFound),
            Err(e) => Err(ChatError::DatabaseError(e.to_string())),
        }
    }

    /// Fetch a thread's messages oldest-first and mark the other party's
    /// unread messages as read.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        actor: &User,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<Vec<MessageWithAttachments>, ChatError> {
        let conversation = self.get_conversation(conversation_id, auth_token).await?;
        if !scope.permits_row(conversation.patient_id, conversation.physiotherapist_id) {
            return Err(ChatError::Forbidden(
                "Not a participant in this conversation".to_string(),
            ));
        }

        let messages: Vec<Message> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/messages?conversation_id=eq.{}&order=created_at.asc",
                    conversation_id
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))?;

        let actor_id = actor_uuid(actor)?;
        let has_unread_from_other = messages
            .iter()
            .any(|m| !m.is_read && m.sender_id != actor_id);
        if has_unread_from_other {
            self.supabase
                .update_returning::<Message>(
                    "messages",
                    &format!(
                        "conversation_id=eq.{}&sender_id=neq.{}&is_read=eq.false",
                        conversation_id, actor_id
                    ),
                    auth_token,
                    json!({ "is_read": true }),
                )
                .await
                .map_err(|e| ChatError::DatabaseError(e.to_string()))?;
        }

        let mut result = Vec::with_capacity(messages.len());
        for message in messages {
            let attachments = self.list_attachments(message.id, auth_token).await?;
            result.push(MessageWithAttachments {
                message,
                attachments,
            });
        }
        Ok(result)
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        request: SendMessageRequest,
        actor: &User,
        scope: &AccessScope,
        auth_token: &str,
    ) -> Result<MessageWithAttachments, ChatError> {
        if request.content.trim().is_empty() && request.attachments.is_empty() {
            return Err(ChatError::ValidationError(
                "Message must have content or an attachment".to_string(),
            ));
        }

        let conversation = self.get_conversation(conversation_id, auth_token).await?;
        if !scope.permits_row(conversation.patient_id, conversation.physiotherapist_id) {
            return Err(ChatError::Forbidden(
                "Not a participant in this conversation".to_string(),
            ));
        }

        let sender_id = actor_uuid(actor)?;
        let now = Utc::now();
        let inserted: Vec<Message> = self
            .supabase
            .insert_returning(
                "messages",
                auth_token,
                json!({
                    "id": Uuid::new_v4(),
                    "conversation_id": conversation_id,
                    "sender_id": sender_id,
                    "content": request.content,
                    "is_read": false,
                    "created_at": now.to_rfc3339(),
                }),
            )
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))?;
        let message = inserted
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::DatabaseError("Insert returned no row".to_string()))?;

        let mut attachments = Vec::with_capacity(request.attachments.len());
        for upload in request.attachments {
            let rows: Vec<Attachment> = self
                .supabase
                .insert_returning(
                    "attachments",
                    auth_token,
                    json!({
                        "id": Uuid::new_v4(),
                        "message_id": message.id,
                        "file_url": upload.file_url,
                        "file_name": upload.file_name,
                        "content_type": upload.content_type,
                    }),
                )
                .await
                .map_err(|e| ChatError::DatabaseError(e.to_string()))?;
            attachments.extend(rows);
        }

        // Bump the thread so conversation lists sort by activity.
        self.supabase
            .update_returning::<Conversation>(
                "conversations",
                &format!("id=eq.{}", conversation_id),
                auth_token,
                json!({ "updated_at": now.to_rfc3339() }),
            )
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))?;

        info!("Message {} sent in conversation {}", message.id, conversation_id);
        Ok(MessageWithAttachments {
            message,
            attachments,
        })
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
        auth_token: &str,
    ) -> Result<Conversation, ChatError> {
        let path = format!("/rest/v1/conversations?id=eq.{}", conversation_id);
        let result: Vec<Conversation> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(ChatError::ConversationNotFound)
    }

    async fn find_conversation(
        &self,
        patient_id: Uuid,
        physiotherapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let path = format!(
            "/rest/v1/conversations?patient_id=eq.{}&physiotherapist_id=eq.{}",
            patient_id, physiotherapist_id
        );
        let result: Vec<Conversation> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))?;
        Ok(result.into_iter().next())
    }

    async fn list_attachments(
        &self,
        message_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Attachment>, ChatError> {
        self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/attachments?message_id=eq.{}", message_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ChatError::DatabaseError(e.to_string()))
    }
}

fn actor_uuid(user: &User) -> Result<Uuid, ChatError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| ChatError::ValidationError("Invalid user id".to_string()))
}
