use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::clock::Clock;
use super::domain::{
    Application, ApplicationId, ApplicationStatus, NotificationKind, Scholarship, ScholarshipId,
};
use super::notifications::{compose, NotificationDeduper};
use super::repository::{
    NotificationSink, RenewalStore, RepositoryError, RolloverCommit, RolloverPlan,
    SemesterAdvance,
};

/// Stored data that breaks a chain invariant. Fatal for the one record only.
#[derive(Debug, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("{application_id} references missing {scholarship_id}")]
    MissingScholarship {
        application_id: ApplicationId,
        scholarship_id: ScholarshipId,
    },
    #[error("renewal {renewal_id} is not a valid successor of {tip_id}")]
    BrokenChainLink {
        tip_id: ApplicationId,
        renewal_id: ApplicationId,
    },
    #[error("renewal {renewal_id} has no original application link")]
    MissingChainLink { renewal_id: ApplicationId },
    #[error("{tip_id} has more than one waiting renewal: {renewals:?}")]
    DuplicateWaitingRenewals {
        tip_id: ApplicationId,
        renewals: Vec<ApplicationId>,
    },
    #[error("{scholarship_id} has an approved renewal waiting but no next semester date")]
    MissingNextSemester { scholarship_id: ScholarshipId },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// Retired the application and activated its waiting renewal.
    Renewed {
        retired: ApplicationId,
        activated: ApplicationId,
        semester_date: NaiveDate,
        semester_advanced: bool,
    },
    /// Dead end: no renewal was waiting.
    Completed { retired: ApplicationId },
    /// Another request already moved this application on.
    AlreadyTransitioned { application_id: ApplicationId },
    NotDue {
        application_id: ApplicationId,
        days_remaining: i64,
    },
}

/// Retires an expired application and activates its approved renewal in one commit.
pub struct RolloverTransition<R, N> {
    store: Arc<R>,
    deduper: NotificationDeduper<R, N>,
    clock: Arc<dyn Clock>,
}

impl<R, N> Clone for RolloverTransition<R, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deduper: self.deduper.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, N> RolloverTransition<R, N>
where
    R: RenewalStore,
    N: NotificationSink,
{
    pub fn new(store: Arc<R>, deduper: NotificationDeduper<R, N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            deduper,
            clock,
        }
    }

    pub fn execute(&self, application_id: ApplicationId) -> Result<RolloverOutcome, EngineError> {
        let application = self
            .store
            .fetch_application(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        if !application.is_current() {
            return Ok(RolloverOutcome::AlreadyTransitioned { application_id });
        }

        let scholarship = self
            .store
            .fetch_scholarship(application.scholarship_id)?
            .ok_or(DataIntegrityError::MissingScholarship {
                application_id,
                scholarship_id: application.scholarship_id,
            })?;

        let days_remaining = scholarship.days_remaining(self.clock.today());
        if days_remaining >= 0 {
            return Ok(RolloverOutcome::NotDue {
                application_id,
                days_remaining,
            });
        }

        let waiting = self.waiting_renewal(&application)?;
        let plan = self.plan(&application, &scholarship, waiting)?;

        match self.store.commit_rollover(&plan)? {
            RolloverCommit::Stale => {
                info!(
                    application = %application_id,
                    "rollover already performed by a concurrent request"
                );
                Ok(RolloverOutcome::AlreadyTransitioned { application_id })
            }
            RolloverCommit::Applied {
                semester_advanced,
                claimed,
            } => {
                for record in &claimed {
                    let subject = match (&plan.activated, record.kind) {
                        (Some(activated), NotificationKind::RenewalActivated) => activated,
                        _ => &plan.retired,
                    };
                    self.deduper
                        .dispatch(compose(subject, &scholarship, record.kind));
                }
                Ok(self.outcome(&plan, &scholarship, semester_advanced))
            }
        }
    }

    /// The approved, not-yet-active renewal hanging off `tip`, after checking every link.
    fn waiting_renewal(&self, tip: &Application) -> Result<Option<Application>, EngineError> {
        let renewals = self.store.renewals_of(tip.id)?;
        for renewal in &renewals {
            let linked = renewal.id > tip.id
                && renewal.user_id == tip.user_id
                && renewal.scholarship_id == tip.scholarship_id
                && renewal.is_renewal;
            if !linked {
                return Err(DataIntegrityError::BrokenChainLink {
                    tip_id: tip.id,
                    renewal_id: renewal.id,
                }
                .into());
            }
        }

        let mut waiting: Vec<Application> = renewals
            .into_iter()
            .filter(|renewal| renewal.status == ApplicationStatus::Approved && !renewal.is_active)
            .collect();
        match waiting.len() {
            0 => Ok(None),
            1 => Ok(waiting.pop()),
            _ => Err(DataIntegrityError::DuplicateWaitingRenewals {
                tip_id: tip.id,
                renewals: waiting.iter().map(|renewal| renewal.id).collect(),
            }
            .into()),
        }
    }

    fn plan(
        &self,
        application: &Application,
        scholarship: &Scholarship,
        waiting: Option<Application>,
    ) -> Result<RolloverPlan, DataIntegrityError> {
        let now = self.clock.now();

        let mut retired = application.clone();
        retired.status = ApplicationStatus::Completed;
        retired.is_active = false;
        retired.reviewed_at = Some(now);

        let mut notifications = vec![self.deduper.record(&retired, NotificationKind::Expired)];

        let Some(mut activated) = waiting else {
            return Ok(RolloverPlan {
                retired,
                activated: None,
                semester_advance: None,
                notifications,
            });
        };

        let next = scholarship
            .next_last_semester_date
            .ok_or(DataIntegrityError::MissingNextSemester {
                scholarship_id: scholarship.id,
            })?;

        activated.is_active = true;
        activated.append_note(&format!(
            "[RENEWED] This application became active when the previous semester ended.\n\
             [Semester Transition] Previous semester ended: {}. New semester date: {}.",
            scholarship.semester_date.format("%B %d, %Y"),
            next.format("%B %d, %Y"),
        ));
        notifications.push(
            self.deduper
                .record(&activated, NotificationKind::RenewalActivated),
        );

        Ok(RolloverPlan {
            retired,
            activated: Some(activated),
            semester_advance: Some(SemesterAdvance {
                scholarship_id: scholarship.id,
                from: scholarship.semester_date,
                to: next,
            }),
            notifications,
        })
    }

    fn outcome(
        &self,
        plan: &RolloverPlan,
        scholarship: &Scholarship,
        semester_advanced: bool,
    ) -> RolloverOutcome {
        match (&plan.activated, plan.semester_advance) {
            (Some(activated), Some(advance)) => {
                info!(
                    retired = %plan.retired.id,
                    activated = %activated.id,
                    scholarship = %scholarship.id,
                    semester_date = %advance.to,
                    semester_advanced,
                    "renewal activated by rollover"
                );
                RolloverOutcome::Renewed {
                    retired: plan.retired.id,
                    activated: activated.id,
                    semester_date: advance.to,
                    semester_advanced,
                }
            }
            _ => {
                info!(
                    retired = %plan.retired.id,
                    scholarship = %scholarship.id,
                    "application completed with no renewal waiting"
                );
                RolloverOutcome::Completed {
                    retired: plan.retired.id,
                }
            }
        }
    }
}
