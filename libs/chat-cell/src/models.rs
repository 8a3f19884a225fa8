// libs/chat-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One patient/physiotherapist thread. The pair is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub physiotherapist_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_url: String,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartConversationRequest {
    /// The other party. The caller's own side is taken from their role.
    pub participant_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUpload {
    pub file_url: String,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageWithAttachments {
    #[serde(flatten)]
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
