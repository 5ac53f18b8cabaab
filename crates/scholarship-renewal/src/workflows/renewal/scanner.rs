use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{Application, ApplicationId, NotificationKind, UserId};
use super::notifications::{Delivery, NotificationDeduper};
use super::repository::{NotificationSink, RenewalStore};
use super::rollover::{DataIntegrityError, EngineError, RolloverOutcome, RolloverTransition};

/// Per-user sweep run on login and dashboard/application page views.
pub struct ExpirationScanner<R, N> {
    store: Arc<R>,
    deduper: NotificationDeduper<R, N>,
    rollover: RolloverTransition<R, N>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub user_id: UserId,
    pub scanned_on: NaiveDate,
    pub examined: usize,
    pub advance_notices: Vec<AdvanceNotice>,
    pub rollovers: Vec<RolloverOutcome>,
    pub skipped: Vec<SkippedApplication>,
    /// The user's applications could not be listed; nothing was examined.
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceNotice {
    pub application_id: ApplicationId,
    pub kind: NotificationKind,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedApplication {
    pub application_id: ApplicationId,
    pub reason: String,
}

enum Step {
    Idle,
    Notice(AdvanceNotice),
    Rollover(RolloverOutcome),
}

impl<R, N> ExpirationScanner<R, N>
where
    R: RenewalStore,
    N: NotificationSink,
{
    pub fn new(
        store: Arc<R>,
        deduper: NotificationDeduper<R, N>,
        rollover: RolloverTransition<R, N>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            deduper,
            rollover,
            clock,
        }
    }

    /// Never fails: per-application errors are logged and reported as skipped.
    pub fn scan(&self, user_id: UserId) -> ScanReport {
        let today = self.clock.today();
        let mut report = ScanReport {
            user_id,
            scanned_on: today,
            examined: 0,
            advance_notices: Vec::new(),
            rollovers: Vec::new(),
            skipped: Vec::new(),
            aborted: false,
        };

        let current: Vec<Application> = match self.store.applications_for_user(user_id) {
            Ok(applications) => applications
                .into_iter()
                .filter(Application::is_current)
                .collect(),
            Err(error) => {
                warn!(user = %user_id, %error, "expiration scan skipped: applications unavailable");
                report.aborted = true;
                return report;
            }
        };

        for application in &current {
            report.examined += 1;
            match self.process(application, today) {
                Ok(Step::Idle) => {}
                Ok(Step::Notice(notice)) => report.advance_notices.push(notice),
                Ok(Step::Rollover(outcome)) => report.rollovers.push(outcome),
                Err(error) => {
                    warn!(
                        user = %user_id,
                        application = %application.id,
                        %error,
                        "expiration scan skipped application"
                    );
                    report.skipped.push(SkippedApplication {
                        application_id: application.id,
                        reason: error.to_string(),
                    });
                }
            }
        }

        debug!(
            user = %user_id,
            examined = report.examined,
            notices = report.advance_notices.len(),
            rollovers = report.rollovers.len(),
            skipped = report.skipped.len(),
            "expiration scan finished"
        );
        report
    }

    fn process(&self, application: &Application, today: NaiveDate) -> Result<Step, EngineError> {
        let scholarship = self
            .store
            .fetch_scholarship(application.scholarship_id)?
            .ok_or(DataIntegrityError::MissingScholarship {
                application_id: application.id,
                scholarship_id: application.scholarship_id,
            })?;

        let days_remaining = scholarship.days_remaining(today);
        if days_remaining < 0 {
            return Ok(Step::Rollover(self.rollover.execute(application.id)?));
        }

        // Exact-day thresholds only; a missed day is not caught up later.
        match NotificationKind::advance_for(days_remaining) {
            Some(kind) => {
                let delivery = self.deduper.notify(application, &scholarship, kind)?;
                Ok(Step::Notice(AdvanceNotice {
                    application_id: application.id,
                    kind,
                    delivery,
                }))
            }
            None => Ok(Step::Idle),
        }
    }
}
