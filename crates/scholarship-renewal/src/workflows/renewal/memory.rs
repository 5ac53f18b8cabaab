use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Application, ApplicationId, ApplicationState, ApplicationStatus, NewApplication,
    NewScholarship, NotificationKind, NotificationRecord, Scholarship, ScholarshipId, UserId,
};
use super::repository::{
    RenewalApproval, RenewalStore, RepositoryError, RolloverCommit, RolloverPlan,
};

/// In-process store. One mutex guards every table, so each trait call is a transaction.
#[derive(Debug, Default, Clone)]
pub struct MemoryRenewalStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    last_application_id: u64,
    last_scholarship_id: u64,
    applications: BTreeMap<ApplicationId, Application>,
    scholarships: BTreeMap<ScholarshipId, Scholarship>,
    notifications: BTreeMap<(ApplicationId, NotificationKind), NotificationRecord>,
}

impl MemoryRenewalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl Tables {
    fn blocking_renewal(&self, tip: ApplicationId) -> Option<&Application> {
        self.applications.values().find(|candidate| {
            candidate.original_application_id == Some(tip)
                && !candidate.is_active
                && matches!(
                    candidate.status,
                    ApplicationStatus::Pending | ApplicationStatus::Approved
                )
        })
    }

    fn check_link(&self, draft: &NewApplication, id: ApplicationId) -> Result<(), RepositoryError> {
        let Some(tip_id) = draft.original_application_id else {
            return Ok(());
        };
        if tip_id >= id || !self.applications.contains_key(&tip_id) {
            return Err(RepositoryError::Constraint(format!(
                "original_application_id {tip_id} must reference an earlier application"
            )));
        }
        if draft.is_renewal {
            let tip_state = self.applications.get(&tip_id).map(Application::state);
            if tip_state != Some(ApplicationState::CURRENT) {
                return Err(RepositoryError::Constraint(format!(
                    "renewal predecessor {tip_id} is no longer the current award"
                )));
            }
            if let Some(existing) = self.blocking_renewal(tip_id) {
                return Err(RepositoryError::Constraint(format!(
                    "{tip_id} already has inactive renewal {}",
                    existing.id
                )));
            }
        }
        Ok(())
    }
}

impl RenewalStore for MemoryRenewalStore {
    fn insert_scholarship(&self, draft: NewScholarship) -> Result<Scholarship, RepositoryError> {
        let mut tables = self.lock()?;
        tables.last_scholarship_id += 1;
        let scholarship = Scholarship {
            id: ScholarshipId(tables.last_scholarship_id),
            title: draft.title,
            semester_date: draft.semester_date,
            next_last_semester_date: draft.next_last_semester_date,
            is_active: true,
        };
        tables
            .scholarships
            .insert(scholarship.id, scholarship.clone());
        Ok(scholarship)
    }

    fn fetch_scholarship(
        &self,
        id: ScholarshipId,
    ) -> Result<Option<Scholarship>, RepositoryError> {
        Ok(self.lock()?.scholarships.get(&id).cloned())
    }

    fn update_scholarship(&self, scholarship: Scholarship) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        match tables.scholarships.get_mut(&scholarship.id) {
            Some(stored) => {
                *stored = scholarship;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn insert_application(&self, draft: NewApplication) -> Result<Application, RepositoryError> {
        let mut tables = self.lock()?;
        let id = ApplicationId(tables.last_application_id + 1);
        tables.check_link(&draft, id)?;
        tables.last_application_id = id.0;

        let application = Application {
            id,
            user_id: draft.user_id,
            scholarship_id: draft.scholarship_id,
            status: draft.status,
            is_active: draft.is_active,
            is_renewal: draft.is_renewal,
            original_application_id: draft.original_application_id,
            renewal_failed: false,
            application_date: draft.application_date,
            reviewed_at: None,
            notes: draft.notes,
        };
        tables.applications.insert(id, application.clone());
        Ok(application)
    }

    fn fetch_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock()?.applications.get(&id).cloned())
    }

    fn compare_and_update(
        &self,
        expected: ApplicationState,
        next: Application,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables
            .applications
            .get_mut(&next.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.state() != expected {
            return Ok(false);
        }
        if stored.is_renewal && !next.is_renewal {
            return Err(RepositoryError::Constraint(format!(
                "is_renewal cannot be cleared on {}",
                next.id
            )));
        }
        *stored = next;
        Ok(true)
    }

    fn approve_renewal(
        &self,
        expected: ApplicationState,
        next: Application,
        predecessor: ApplicationId,
    ) -> Result<RenewalApproval, RepositoryError> {
        let mut tables = self.lock()?;
        let predecessor_state = tables
            .applications
            .get(&predecessor)
            .map(Application::state)
            .ok_or(RepositoryError::NotFound)?;
        if predecessor_state != ApplicationState::CURRENT {
            return Ok(RenewalApproval::PredecessorRetired {
                status: predecessor_state.status,
            });
        }

        let stored = tables
            .applications
            .get_mut(&next.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.state() != expected || stored.original_application_id != Some(predecessor) {
            return Ok(RenewalApproval::RenewalChanged);
        }
        *stored = next;
        Ok(RenewalApproval::Approved)
    }

    fn applications_for_user(&self, user_id: UserId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .lock()?
            .applications
            .values()
            .filter(|application| application.user_id == user_id)
            .cloned()
            .collect())
    }

    fn renewals_of(&self, tip: ApplicationId) -> Result<Vec<Application>, RepositoryError> {
        Ok(self
            .lock()?
            .applications
            .values()
            .filter(|application| application.original_application_id == Some(tip))
            .cloned()
            .collect())
    }

    fn insert_notification(&self, record: NotificationRecord) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let key = (record.application_id, record.kind);
        if tables.notifications.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        tables.notifications.insert(key, record);
        Ok(())
    }

    fn notifications_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .notifications
            .values()
            .filter(|record| record.application_id == application_id)
            .cloned()
            .collect())
    }

    fn commit_rollover(&self, plan: &RolloverPlan) -> Result<RolloverCommit, RepositoryError> {
        let mut tables = self.lock()?;

        let retired_is_current = tables
            .applications
            .get(&plan.retired.id)
            .map(|stored| stored.state() == ApplicationState::CURRENT)
            .unwrap_or(false);
        if !retired_is_current {
            return Ok(RolloverCommit::Stale);
        }

        if let Some(activated) = &plan.activated {
            let waiting = tables
                .applications
                .get(&activated.id)
                .map(|stored| {
                    stored.status == ApplicationStatus::Approved
                        && !stored.is_active
                        && stored.original_application_id == Some(plan.retired.id)
                })
                .unwrap_or(false);
            if !waiting {
                return Ok(RolloverCommit::Stale);
            }
        }

        // All guards held; from here on every write lands.
        tables
            .applications
            .insert(plan.retired.id, plan.retired.clone());
        if let Some(activated) = &plan.activated {
            tables.applications.insert(activated.id, activated.clone());
        }

        let mut semester_advanced = false;
        if let Some(advance) = plan.semester_advance {
            if let Some(scholarship) = tables.scholarships.get_mut(&advance.scholarship_id) {
                if scholarship.semester_date == advance.from
                    && scholarship.next_last_semester_date == Some(advance.to)
                {
                    scholarship.semester_date = advance.to;
                    scholarship.next_last_semester_date = None;
                    semester_advanced = true;
                }
            }
        }

        let mut claimed = Vec::new();
        for record in &plan.notifications {
            let key = (record.application_id, record.kind);
            if !tables.notifications.contains_key(&key) {
                tables.notifications.insert(key, record.clone());
                claimed.push(record.clone());
            }
        }

        Ok(RolloverCommit::Applied {
            semester_advanced,
            claimed,
        })
    }
}
