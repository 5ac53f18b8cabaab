use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for scholarship applications. Assigned from a monotonic sequence,
/// so a smaller id always belongs to an earlier application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{:06}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScholarshipId(pub u64);

impl fmt::Display for ScholarshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scholarship-{}", self.0)
    }
}

/// High level status tracked throughout the application lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Archived,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Archived => "archived",
        }
    }
}

/// Persisted scholarship application, including its position in a renewal chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub scholarship_id: ScholarshipId,
    pub status: ApplicationStatus,
    pub is_active: bool,
    /// Set once at creation for renewals and never cleared, even after activation.
    pub is_renewal: bool,
    /// Back-reference to the chain tip this renewal was filed against.
    pub original_application_id: Option<ApplicationId>,
    pub renewal_failed: bool,
    pub application_date: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Application {
    /// Approved and active: the one application in a lineage currently funded.
    pub fn is_current(&self) -> bool {
        self.status == ApplicationStatus::Approved && self.is_active
    }

    pub fn state(&self) -> ApplicationState {
        ApplicationState {
            status: self.status,
            is_active: self.is_active,
        }
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }

    pub fn view(&self) -> ApplicationView {
        ApplicationView {
            application_id: self.id,
            user_id: self.user_id,
            scholarship_id: self.scholarship_id,
            status: self.status.label(),
            is_active: self.is_active,
            is_renewal: self.is_renewal,
            original_application_id: self.original_application_id,
            renewal_failed: self.renewal_failed,
        }
    }
}

/// The pair of columns every conditional update compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub status: ApplicationStatus,
    pub is_active: bool,
}

impl ApplicationState {
    pub const CURRENT: ApplicationState = ApplicationState {
        status: ApplicationStatus::Approved,
        is_active: true,
    };
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub user_id: UserId,
    pub scholarship_id: ScholarshipId,
    pub status: ApplicationStatus,
    pub is_active: bool,
    pub is_renewal: bool,
    pub original_application_id: Option<ApplicationId>,
    pub application_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scholarship {
    pub id: ScholarshipId,
    pub title: String,
    /// Date the current term ends.
    pub semester_date: NaiveDate,
    /// Term the next rollover moves into. Required before any renewal is approved.
    pub next_last_semester_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Scholarship {
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.semester_date - today).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScholarship {
    pub title: String,
    pub semester_date: NaiveDate,
    #[serde(default)]
    pub next_last_semester_date: Option<NaiveDate>,
}

/// Kinds of notification tracked in the dedupe ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[serde(rename = "advance_30")]
    Advance30,
    #[serde(rename = "advance_14")]
    Advance14,
    #[serde(rename = "advance_7")]
    Advance7,
    #[serde(rename = "advance_3")]
    Advance3,
    Expired,
    RenewalActivated,
}

impl NotificationKind {
    /// Advance thresholds, farthest first.
    pub const ADVANCE: [NotificationKind; 4] = [
        NotificationKind::Advance30,
        NotificationKind::Advance14,
        NotificationKind::Advance7,
        NotificationKind::Advance3,
    ];

    /// Day count that triggers an advance notice, if this is one.
    pub const fn threshold_days(self) -> Option<i64> {
        match self {
            NotificationKind::Advance30 => Some(30),
            NotificationKind::Advance14 => Some(14),
            NotificationKind::Advance7 => Some(7),
            NotificationKind::Advance3 => Some(3),
            NotificationKind::Expired | NotificationKind::RenewalActivated => None,
        }
    }

    /// Advance notice due when exactly `days_remaining` days are left.
    pub fn advance_for(days_remaining: i64) -> Option<NotificationKind> {
        Self::ADVANCE
            .into_iter()
            .find(|kind| kind.threshold_days() == Some(days_remaining))
    }

    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::Advance30 => "advance_30",
            NotificationKind::Advance14 => "advance_14",
            NotificationKind::Advance7 => "advance_7",
            NotificationKind::Advance3 => "advance_3",
            NotificationKind::Expired => "expired",
            NotificationKind::RenewalActivated => "renewal_activated",
        }
    }
}

/// Append-only ledger row; unique on `(application_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub application_id: ApplicationId,
    pub kind: NotificationKind,
    pub sent_at: DateTime<Utc>,
}

/// Payload handed to the outbound sink (in-app and/or e-mail adapters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub application_id: ApplicationId,
    pub scholarship_id: ScholarshipId,
    pub title: String,
    pub message: String,
}

/// Sanitized representation of an application for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationView {
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub scholarship_id: ScholarshipId,
    pub status: &'static str,
    pub is_active: bool,
    pub is_renewal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_application_id: Option<ApplicationId>,
    pub renewal_failed: bool,
}
