//! Role-based row access policy.
//!
//! Every cell derives its list filters and ownership checks from the single
//! `AccessScope::for_actor` table below instead of branching on the user role
//! inside each handler.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Physiotherapist,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Appointment,
    AppointmentFeedback,
    ExerciseCatalog,
    ExercisePlan,
    ExerciseProgress,
    Notification,
    Conversation,
    Book,
    BookReview,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
}

/// Which rows of a resource an actor may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// No row restriction.
    All,
    /// Rows whose patient column equals the actor.
    OwnedByPatient(Uuid),
    /// Rows whose physiotherapist column equals the actor.
    AssignedToPhysio(Uuid),
    /// Rows whose owner column (recipient, user, sender) equals the actor.
    OwnedByUser(Uuid),
    /// Rows where the actor appears on either side (chat).
    Participant(Uuid),
    Denied,
}

impl AccessScope {
    /// Row predicate for (actor, resource, action).
    pub fn for_actor(actor_id: Uuid, role: Role, resource: Resource, action: Action) -> AccessScope {
        use Action::*;
        use Resource::*;

        match (resource, role) {
            (_, Role::Admin) => AccessScope::All,

            (Appointment, Role::Patient) => AccessScope::OwnedByPatient(actor_id),
            (Appointment, Role::Physiotherapist) => AccessScope::AssignedToPhysio(actor_id),

            (AppointmentFeedback, Role::Patient) => AccessScope::OwnedByPatient(actor_id),
            (AppointmentFeedback, Role::Physiotherapist) => match action {
                List | Read => AccessScope::AssignedToPhysio(actor_id),
                _ => AccessScope::Denied,
            },

            // The exercise catalog is readable by everyone; only clinicians
            // maintain it.
            (ExerciseCatalog, _) => match action {
                List | Read => AccessScope::All,
                _ if role == Role::Physiotherapist => AccessScope::All,
                _ => AccessScope::Denied,
            },

            (ExercisePlan, Role::Patient) => match action {
                List | Read => AccessScope::OwnedByPatient(actor_id),
                _ => AccessScope::Denied,
            },
            (ExercisePlan, Role::Physiotherapist) => AccessScope::AssignedToPhysio(actor_id),

            (ExerciseProgress, Role::Patient) => AccessScope::OwnedByPatient(actor_id),
            (ExerciseProgress, Role::Physiotherapist) => match action {
                List | Read => AccessScope::AssignedToPhysio(actor_id),
                _ => AccessScope::Denied,
            },

            (Notification, _) => AccessScope::OwnedByUser(actor_id),

            (Conversation, _) => AccessScope::Participant(actor_id),

            (Book, _) => match action {
                List | Read => AccessScope::All,
                _ if role == Role::Physiotherapist => AccessScope::All,
                _ => AccessScope::Denied,
            },
            (BookReview, _) => match action {
                List | Read => AccessScope::All,
                _ => AccessScope::OwnedByUser(actor_id),
            },

            (Profile, _) => AccessScope::OwnedByUser(actor_id),
        }
    }

    /// Render the scope as a PostgREST filter clause, given the column names
    /// the resource table uses for the patient and physiotherapist sides.
    /// `None` means no filter is needed.
    pub fn query_filter(&self, patient_col: &str, physio_col: &str) -> Option<String> {
        match self {
            AccessScope::All => None,
            AccessScope::OwnedByPatient(id) | AccessScope::OwnedByUser(id) => {
                Some(format!("{}=eq.{}", patient_col, id))
            }
            AccessScope::AssignedToPhysio(id) => Some(format!("{}=eq.{}", physio_col, id)),
            AccessScope::Participant(id) => Some(format!(
                "or=({}.eq.{},{}.eq.{})",
                patient_col, id, physio_col, id
            )),
            AccessScope::Denied => None,
        }
    }

    /// Ownership check for a single fetched row.
    pub fn permits_row(&self, patient_id: Uuid, physio_id: Uuid) -> bool {
        match self {
            AccessScope::All => true,
            AccessScope::OwnedByPatient(id) | AccessScope::OwnedByUser(id) => *id == patient_id,
            AccessScope::AssignedToPhysio(id) => *id == physio_id,
            AccessScope::Participant(id) => *id == patient_id || *id == physio_id,
            AccessScope::Denied => false,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessScope::Denied)
    }
}
