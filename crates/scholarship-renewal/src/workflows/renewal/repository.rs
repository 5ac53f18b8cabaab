use chrono::NaiveDate;

use super::domain::{
    Application, ApplicationId, ApplicationState, ApplicationStatus, NewApplication,
    NewScholarship, Notification, NotificationRecord, Scholarship, ScholarshipId, UserId,
};

/// Storage abstraction for applications, scholarships, and the notification ledger.
///
/// Every method is one transaction. Implementations must give `insert_notification` a
/// uniqueness guarantee on `(application_id, kind)` and must apply `commit_rollover` either
/// completely or not at all.
pub trait RenewalStore: Send + Sync {
    fn insert_scholarship(&self, draft: NewScholarship) -> Result<Scholarship, RepositoryError>;
    fn fetch_scholarship(&self, id: ScholarshipId)
        -> Result<Option<Scholarship>, RepositoryError>;
    fn update_scholarship(&self, scholarship: Scholarship) -> Result<(), RepositoryError>;

    /// Assigns the next id. Rejects a back-reference that is missing or not strictly earlier.
    /// A renewal is also rejected unless its tip is still approved and active, and while that
    /// tip already has an inactive pending/approved renewal.
    fn insert_application(&self, draft: NewApplication) -> Result<Application, RepositoryError>;
    fn fetch_application(&self, id: ApplicationId)
        -> Result<Option<Application>, RepositoryError>;
    /// Writes `next` only if the stored row still matches `expected`. Returns whether it wrote.
    fn compare_and_update(
        &self,
        expected: ApplicationState,
        next: Application,
    ) -> Result<bool, RepositoryError>;
    /// [`compare_and_update`](Self::compare_and_update) for a renewal that also requires
    /// `predecessor` to still be approved and active when the write lands.
    fn approve_renewal(
        &self,
        expected: ApplicationState,
        next: Application,
        predecessor: ApplicationId,
    ) -> Result<RenewalApproval, RepositoryError>;
    fn applications_for_user(&self, user_id: UserId) -> Result<Vec<Application>, RepositoryError>;
    /// Applications whose `original_application_id` points at `tip`.
    fn renewals_of(&self, tip: ApplicationId) -> Result<Vec<Application>, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when the `(application_id, kind)` key exists.
    fn insert_notification(&self, record: NotificationRecord) -> Result<(), RepositoryError>;
    fn notifications_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError>;

    fn commit_rollover(&self, plan: &RolloverPlan) -> Result<RolloverCommit, RepositoryError>;
}

/// Post-transition rows for one rollover.
///
/// Guards: the stored row for `retired` must still be approved and active, and the stored row
/// for `activated` must still be approved, inactive, and linked to `retired`. If either guard
/// fails nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverPlan {
    pub retired: Application,
    pub activated: Option<Application>,
    pub semester_advance: Option<SemesterAdvance>,
    /// Ledger rows to claim inside the same commit; already-present keys are skipped.
    pub notifications: Vec<NotificationRecord>,
}

/// Moves a scholarship onto its next term, if it still sits on `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterAdvance {
    pub scholarship_id: ScholarshipId,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RolloverCommit {
    Applied {
        semester_advanced: bool,
        /// Records this commit inserted; only these may be dispatched.
        claimed: Vec<NotificationRecord>,
    },
    /// A guard no longer held; nothing was written.
    Stale,
}

/// Result of a guarded renewal approval. Only `Approved` wrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalApproval {
    Approved,
    /// The renewal row no longer matched the expected state.
    RenewalChanged,
    /// The predecessor rolled over (or was otherwise retired) first.
    PredecessorRetired { status: ApplicationStatus },
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (in-app inbox, e-mail adapters).
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Dispatch failure; logged and swallowed by the engine.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
