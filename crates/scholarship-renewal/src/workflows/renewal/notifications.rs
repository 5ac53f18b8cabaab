use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{Application, Notification, NotificationKind, NotificationRecord, Scholarship};
use super::repository::{NotificationSink, RenewalStore, RepositoryError};

/// Result of attempting to claim a ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller inserted the row and owns the dispatch.
    Fresh,
    AlreadySent,
}

/// What happened to a notification the engine decided was due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    AlreadySent,
    /// Recorded, but the sink failed. Not retried.
    DispatchFailed,
}

/// Idempotent send: the `(application_id, kind)` ledger key is claimed before dispatch, and a
/// uniqueness conflict means someone else already sent it.
pub struct NotificationDeduper<R, N> {
    store: Arc<R>,
    sink: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<R, N> Clone for NotificationDeduper<R, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, N> NotificationDeduper<R, N>
where
    R: RenewalStore,
    N: NotificationSink,
{
    pub fn new(store: Arc<R>, sink: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self { store, sink, clock }
    }

    pub fn record(&self, application: &Application, kind: NotificationKind) -> NotificationRecord {
        NotificationRecord {
            application_id: application.id,
            kind,
            sent_at: self.clock.now(),
        }
    }

    /// Attempt-insert of the ledger key. Conflicts are not errors.
    pub fn claim(
        &self,
        application: &Application,
        kind: NotificationKind,
    ) -> Result<Claim, RepositoryError> {
        match self.store.insert_notification(self.record(application, kind)) {
            Ok(()) => Ok(Claim::Fresh),
            Err(RepositoryError::Conflict) => Ok(Claim::AlreadySent),
            Err(other) => Err(other),
        }
    }

    /// Claim then dispatch.
    pub fn notify(
        &self,
        application: &Application,
        scholarship: &Scholarship,
        kind: NotificationKind,
    ) -> Result<Delivery, RepositoryError> {
        match self.claim(application, kind)? {
            Claim::Fresh => Ok(self.dispatch(compose(application, scholarship, kind))),
            Claim::AlreadySent => {
                debug!(
                    application = %application.id,
                    kind = kind.label(),
                    "notification already sent"
                );
                Ok(Delivery::AlreadySent)
            }
        }
    }

    /// Hands an already-claimed notification to the sink. Failures are logged and swallowed.
    pub fn dispatch(&self, notification: Notification) -> Delivery {
        let application_id = notification.application_id;
        let kind = notification.kind;
        match self.sink.send(notification) {
            Ok(()) => Delivery::Sent,
            Err(error) => {
                warn!(
                    application = %application_id,
                    kind = kind.label(),
                    %error,
                    "notification dispatch failed"
                );
                Delivery::DispatchFailed
            }
        }
    }
}

/// Builds the user-facing text for a notification.
pub fn compose(
    application: &Application,
    scholarship: &Scholarship,
    kind: NotificationKind,
) -> Notification {
    let expires_on = scholarship.semester_date.format("%B %d, %Y");
    let (title, message) = match kind {
        NotificationKind::Advance30
        | NotificationKind::Advance14
        | NotificationKind::Advance7
        | NotificationKind::Advance3 => {
            let (span, relative) = match kind {
                NotificationKind::Advance30 => ("1 Month", "1 month from now"),
                NotificationKind::Advance14 => ("2 Weeks", "2 weeks from now"),
                NotificationKind::Advance7 => ("1 Week", "1 week from now"),
                _ => ("3 Days", "3 days from now"),
            };
            (
                format!("Scholarship Semester Expiring in {span}: {}", scholarship.title),
                format!(
                    "The semester for your approved scholarship '{}' will expire on {expires_on} ({relative}). Please prepare accordingly.",
                    scholarship.title
                ),
            )
        }
        NotificationKind::Expired => (
            format!("Scholarship Semester Completed: {}", scholarship.title),
            format!(
                "The semester for your approved scholarship '{}' has been completed. Your application status has been updated.",
                scholarship.title
            ),
        ),
        NotificationKind::RenewalActivated => (
            format!("Renewal Activated: {}", scholarship.title),
            format!(
                "Your renewal for '{}' is now active. Your scholarship continues for the next semester.",
                scholarship.title
            ),
        ),
    };

    Notification {
        user_id: application.user_id,
        kind,
        application_id: application.id,
        scholarship_id: scholarship.id,
        title,
        message,
    }
}
