use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::chain::{RenewalChainLinker, RenewalForm};
use super::clock::Clock;
use super::domain::{
    Application, ApplicationId, ApplicationState, ApplicationStatus, ApplicationView,
    NewApplication, NewScholarship, Scholarship, ScholarshipId, UserId,
};
use super::eligibility::{Eligibility, EligibilityEvaluator, EligibilityReason};
use super::notifications::NotificationDeduper;
use super::repository::{NotificationSink, RenewalApproval, RenewalStore, RepositoryError};
use super::rollover::{DataIntegrityError, RolloverTransition};
use super::scanner::{ExpirationScanner, ScanReport};

/// Facade composing the store, sink, clock, and the renewal engine components.
pub struct RenewalService<R, N> {
    store: Arc<R>,
    clock: Arc<dyn Clock>,
    evaluator: EligibilityEvaluator,
    scanner: ExpirationScanner<R, N>,
}

impl<R, N> RenewalService<R, N>
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        store: Arc<R>,
        sink: Arc<N>,
        clock: Arc<dyn Clock>,
        evaluator: EligibilityEvaluator,
    ) -> Self {
        let deduper = NotificationDeduper::new(store.clone(), sink, clock.clone());
        let rollover = RolloverTransition::new(store.clone(), deduper.clone(), clock.clone());
        let scanner = ExpirationScanner::new(store.clone(), deduper, rollover, clock.clone());

        Self {
            store,
            clock,
            evaluator,
            scanner,
        }
    }

    /// Lazily applies due notices and rollovers for one user. Never fails the caller.
    pub fn trigger_scan(&self, user_id: UserId) -> ScanReport {
        self.scanner.scan(user_id)
    }

    /// Gate run before a provider approves a renewal.
    pub fn validate_approval(
        &self,
        scholarship_id: ScholarshipId,
    ) -> Result<(), RenewalServiceError> {
        let scholarship = self.scholarship(scholarship_id)?;
        validate_approval(&scholarship)?;
        Ok(())
    }

    pub fn is_eligible_for_renewal(
        &self,
        application_id: ApplicationId,
    ) -> Result<Eligibility, RenewalServiceError> {
        let application = self.application_record(application_id)?;
        let scholarship = self.scholarship_of(&application)?;
        let renewals = self.store.renewals_of(application.id)?;
        Ok(self
            .evaluator
            .evaluate(&application, &scholarship, &renewals, self.clock.today()))
    }

    /// Files a renewal against the tip of the lineage `original_application_id` belongs to.
    pub fn create_renewal(
        &self,
        original_application_id: ApplicationId,
        form: RenewalForm,
    ) -> Result<Application, RenewalServiceError> {
        let original = self.application_record(original_application_id)?;
        let lineage = self.store.applications_for_user(original.user_id)?;
        let tip =
            RenewalChainLinker::resolve_tip(&lineage, original.user_id, original.scholarship_id)
                .ok_or(ValidationError::NoActiveAward {
                    user_id: original.user_id,
                    scholarship_id: original.scholarship_id,
                })?;

        let scholarship = self.scholarship_of(tip)?;
        let renewals = self.store.renewals_of(tip.id)?;
        let eligibility = self
            .evaluator
            .evaluate(tip, &scholarship, &renewals, self.clock.today());
        if !eligibility.eligible {
            return Err(ValidationError::NotEligible(eligibility.reason).into());
        }

        let draft = RenewalChainLinker::link(tip, form, self.clock.now());
        let renewal = self.store.insert_application(draft)?;
        info!(
            renewal = %renewal.id,
            tip = %tip.id,
            user = %renewal.user_id,
            scholarship = %renewal.scholarship_id,
            "renewal submitted"
        );
        Ok(renewal)
    }

    pub fn register_scholarship(
        &self,
        draft: NewScholarship,
    ) -> Result<Scholarship, RenewalServiceError> {
        if let Some(next) = draft.next_last_semester_date {
            if next <= draft.semester_date {
                return Err(ValidationError::NextSemesterNotAfterCurrent {
                    semester_date: draft.semester_date,
                    next_last_semester_date: next,
                }
                .into());
            }
        }
        Ok(self.store.insert_scholarship(draft)?)
    }

    /// Sets the term the next rollover moves into.
    pub fn schedule_next_semester(
        &self,
        scholarship_id: ScholarshipId,
        next_last_semester_date: NaiveDate,
    ) -> Result<Scholarship, RenewalServiceError> {
        let mut scholarship = self.scholarship(scholarship_id)?;
        if next_last_semester_date <= scholarship.semester_date {
            return Err(ValidationError::NextSemesterNotAfterCurrent {
                semester_date: scholarship.semester_date,
                next_last_semester_date,
            }
            .into());
        }
        scholarship.next_last_semester_date = Some(next_last_semester_date);
        self.store.update_scholarship(scholarship.clone())?;
        Ok(scholarship)
    }

    /// Plain (non-renewal) submission, created pending and active.
    pub fn submit_application(
        &self,
        user_id: UserId,
        scholarship_id: ScholarshipId,
    ) -> Result<Application, RenewalServiceError> {
        let scholarship = self.scholarship(scholarship_id)?;
        if !scholarship.is_active {
            return Err(ValidationError::ScholarshipClosed { scholarship_id }.into());
        }

        let existing = self.store.applications_for_user(user_id)?;
        let duplicate = existing.iter().find(|application| {
            application.scholarship_id == scholarship_id
                && application.is_active
                && matches!(
                    application.status,
                    ApplicationStatus::Pending | ApplicationStatus::Approved
                )
        });
        if let Some(duplicate) = duplicate {
            return Err(ValidationError::DuplicateApplication {
                existing: duplicate.id,
                status: duplicate.status,
            }
            .into());
        }

        Ok(self.store.insert_application(NewApplication {
            user_id,
            scholarship_id,
            status: ApplicationStatus::Pending,
            is_active: true,
            is_renewal: false,
            original_application_id: None,
            application_date: self.clock.now(),
            notes: None,
        })?)
    }

    /// Provider approval. Renewals stay inactive until their predecessor rolls over.
    pub fn approve_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Application, RenewalServiceError> {
        let application = self.application_record(application_id)?;
        if application.status != ApplicationStatus::Pending {
            return Err(ValidationError::NotPending {
                application_id,
                status: application.status,
            }
            .into());
        }

        let mut approved = application.clone();
        approved.status = ApplicationStatus::Approved;
        approved.reviewed_at = Some(self.clock.now());

        if application.is_renewal {
            let scholarship = self.scholarship_of(&application)?;
            validate_approval(&scholarship)?;

            let tip_id = application
                .original_application_id
                .ok_or(DataIntegrityError::MissingChainLink {
                    renewal_id: application_id,
                })?;
            let tip = self.application_record(tip_id)?;
            if !tip.is_current() {
                return Err(ValidationError::PredecessorRetired {
                    renewal_id: application_id,
                    tip_id,
                    status: tip.status,
                }
                .into());
            }
            approved.is_active = false;
            return self.approve_behind(application.state(), approved, tip_id);
        }

        self.conditional_write(application.state(), approved)
    }

    pub fn reject_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Application, RenewalServiceError> {
        let application = self.application_record(application_id)?;
        if application.status != ApplicationStatus::Pending {
            return Err(ValidationError::NotPending {
                application_id,
                status: application.status,
            }
            .into());
        }

        let mut rejected = application.clone();
        rejected.status = ApplicationStatus::Rejected;
        rejected.is_active = false;
        rejected.reviewed_at = Some(self.clock.now());
        self.conditional_write(application.state(), rejected)
    }

    /// Student declined or missed the renewal prompt for their current award.
    pub fn record_renewal_failure(
        &self,
        user_id: UserId,
        scholarship_id: ScholarshipId,
    ) -> Result<Application, RenewalServiceError> {
        let lineage = self.store.applications_for_user(user_id)?;
        let current = RenewalChainLinker::resolve_tip(&lineage, user_id, scholarship_id)
            .ok_or(RepositoryError::NotFound)?;

        let mut flagged = current.clone();
        flagged.renewal_failed = true;
        self.conditional_write(current.state(), flagged)
    }

    pub fn application(
        &self,
        application_id: ApplicationId,
    ) -> Result<ApplicationView, RenewalServiceError> {
        Ok(self.application_record(application_id)?.view())
    }

    pub fn applications_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ApplicationView>, RenewalServiceError> {
        Ok(self
            .store
            .applications_for_user(user_id)?
            .iter()
            .map(Application::view)
            .collect())
    }

    fn conditional_write(
        &self,
        expected: ApplicationState,
        next: Application,
    ) -> Result<Application, RenewalServiceError> {
        let application_id = next.id;
        if self.store.compare_and_update(expected, next.clone())? {
            return Ok(next);
        }
        let current = self.application_record(application_id)?;
        Err(ValidationError::ConcurrentChange {
            application_id,
            status: current.status,
        }
        .into())
    }

    /// Approves a renewal in the same store transaction that re-checks its predecessor, so a
    /// rollover landing after the checks above cannot leave the renewal stranded.
    fn approve_behind(
        &self,
        expected: ApplicationState,
        next: Application,
        tip_id: ApplicationId,
    ) -> Result<Application, RenewalServiceError> {
        let renewal_id = next.id;
        match self.store.approve_renewal(expected, next.clone(), tip_id)? {
            RenewalApproval::Approved => Ok(next),
            RenewalApproval::PredecessorRetired { status } => {
                Err(ValidationError::PredecessorRetired {
                    renewal_id,
                    tip_id,
                    status,
                }
                .into())
            }
            RenewalApproval::RenewalChanged => {
                let current = self.application_record(renewal_id)?;
                Err(ValidationError::ConcurrentChange {
                    application_id: renewal_id,
                    status: current.status,
                }
                .into())
            }
        }
    }

    fn application_record(&self, id: ApplicationId) -> Result<Application, RenewalServiceError> {
        Ok(self
            .store
            .fetch_application(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn scholarship(&self, id: ScholarshipId) -> Result<Scholarship, RenewalServiceError> {
        Ok(self
            .store
            .fetch_scholarship(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn scholarship_of(
        &self,
        application: &Application,
    ) -> Result<Scholarship, RenewalServiceError> {
        Ok(self
            .store
            .fetch_scholarship(application.scholarship_id)?
            .ok_or(DataIntegrityError::MissingScholarship {
                application_id: application.id,
                scholarship_id: application.scholarship_id,
            })?)
    }
}

/// Approval precondition: a renewal can only be approved once the term it rolls into is known.
pub fn validate_approval(scholarship: &Scholarship) -> Result<(), ValidationError> {
    match scholarship.next_last_semester_date {
        Some(_) => Ok(()),
        None => Err(ValidationError::MissingNextSemesterDate {
            scholarship_id: scholarship.id,
        }),
    }
}

/// Caller-facing rejection; no state was changed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{scholarship_id} has no next semester date; set it before approving renewals")]
    MissingNextSemesterDate { scholarship_id: ScholarshipId },
    #[error("next semester date {next_last_semester_date} must be after the current semester date {semester_date}")]
    NextSemesterNotAfterCurrent {
        semester_date: NaiveDate,
        next_last_semester_date: NaiveDate,
    },
    #[error("not eligible for renewal: {}", .0.summary())]
    NotEligible(EligibilityReason),
    #[error("{user_id} has no approved, active award for {scholarship_id}")]
    NoActiveAward {
        user_id: UserId,
        scholarship_id: ScholarshipId,
    },
    #[error("{application_id} is {}, only pending applications can be reviewed", .status.label())]
    NotPending {
        application_id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("renewal {renewal_id} cannot be approved: predecessor {tip_id} is {}", .status.label())]
    PredecessorRetired {
        renewal_id: ApplicationId,
        tip_id: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("{scholarship_id} is not accepting applications")]
    ScholarshipClosed { scholarship_id: ScholarshipId },
    #[error("application {existing} is already {} for this scholarship", .status.label())]
    DuplicateApplication {
        existing: ApplicationId,
        status: ApplicationStatus,
    },
    #[error("{application_id} changed concurrently and is now {}", .status.label())]
    ConcurrentChange {
        application_id: ApplicationId,
        status: ApplicationStatus,
    },
}

/// Error raised by the renewal service.
#[derive(Debug, thiserror::Error)]
pub enum RenewalServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

