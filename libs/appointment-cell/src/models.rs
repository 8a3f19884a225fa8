// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// One scheduled session between a patient and a physiotherapist.
/// Times are clinic-local wall-clock values, stored as date + time-of-day the
/// way the scheduling tables key them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub physiotherapist_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub notes: Option<String>,
    pub treatment_plan: Option<String>,
    pub prescription: Option<String>,
    pub cost: Option<f64>,
    pub payment_status: PaymentStatus,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 240;
pub const CANCELLATION_NOTICE_HOURS: i64 = 24;

impl Appointment {
    pub fn start_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_time).and_utc()
    }

    pub fn end_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.end_time).and_utc()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_datetime() - self.start_datetime()).num_minutes()
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start_datetime() > now && self.status.is_active()
    }

    /// Patient-side cancellation window: at least 24 hours of notice.
    pub fn can_be_cancelled(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active()
            && now < self.start_datetime() - Duration::hours(CANCELLATION_NOTICE_HOURS)
    }

    pub fn to_view(&self, now: DateTime<Utc>) -> AppointmentView {
        AppointmentView {
            duration_minutes: self.duration_minutes(),
            is_upcoming: self.is_upcoming(now),
            can_be_cancelled: self.can_be_cancelled(now),
            appointment: self.clone(),
        }
    }
}

/// Serialized appointment plus the derived fields every response carries.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub duration_minutes: i64,
    pub is_upcoming: bool,
    pub can_be_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    /// Statuses that occupy the physiotherapist's calendar slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
                | AppointmentStatus::Rescheduled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Rescheduled => "rescheduled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    InitialAssessment,
    FollowUp,
    TreatmentSession,
    Reassessment,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentType::InitialAssessment => "initial_assessment",
            AppointmentType::FollowUp => "follow_up",
            AppointmentType::TreatmentSession => "treatment_session",
            AppointmentType::Reassessment => "reassessment",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Waived,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    /// Omitted when a patient books for themselves; staff must supply it.
    pub patient_id: Option<Uuid>,
    pub physiotherapist_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub notes: Option<String>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl UpdateAppointmentRequest {
    pub fn reschedules(&self) -> bool {
        self.date.is_some() || self.start_time.is_some() || self.end_time.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub treatment_plan: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub physiotherapist_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub appointment_type: Option<AppointmentType>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictCheckQuery {
    pub physiotherapist_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentStats {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
    pub upcoming: usize,
    pub average_duration_minutes: f64,
}

// ==============================================================================
// FEEDBACK MODELS
// ==============================================================================

/// One-to-one with a completed appointment, written once by its patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentFeedback {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub overall_rating: i16,
    pub professionalism_rating: i16,
    pub communication_rating: i16,
    pub effectiveness_rating: i16,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub overall_rating: i16,
    pub professionalism_rating: i16,
    pub communication_rating: i16,
    pub effectiveness_rating: i16,
    pub comments: Option<String>,
}

impl FeedbackRequest {
    pub fn ratings(&self) -> [i16; 4] {
        [
            self.overall_rating,
            self.professionalism_rating,
            self.communication_rating,
            self.effectiveness_rating,
        ]
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Cannot transition appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointments must be cancelled at least 24 hours in advance")]
    CancellationWindowExpired,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Feedback already submitted for this appointment")]
    FeedbackExists,

    #[error("Feedback can only be submitted for completed appointments")]
    AppointmentNotCompleted,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
