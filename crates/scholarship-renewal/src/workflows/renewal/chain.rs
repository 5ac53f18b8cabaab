use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationStatus, NewApplication, ScholarshipId, UserId};

/// Free-form renewal form fields the engine carries through to the new application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalForm {
    #[serde(default)]
    pub statement: Option<String>,
}

/// Anchors a new renewal to the tip of its (user, scholarship) lineage.
pub struct RenewalChainLinker;

impl RenewalChainLinker {
    /// Most recent approved, active application in the lineage.
    pub fn resolve_tip(
        lineage: &[Application],
        user_id: UserId,
        scholarship_id: ScholarshipId,
    ) -> Option<&Application> {
        lineage
            .iter()
            .filter(|application| {
                application.user_id == user_id
                    && application.scholarship_id == scholarship_id
                    && application.is_current()
            })
            .max_by_key(|application| (application.application_date, application.id))
    }

    pub fn link(
        tip: &Application,
        form: RenewalForm,
        submitted_at: DateTime<Utc>,
    ) -> NewApplication {
        NewApplication {
            user_id: tip.user_id,
            scholarship_id: tip.scholarship_id,
            status: ApplicationStatus::Pending,
            is_active: false,
            is_renewal: true,
            original_application_id: Some(tip.id),
            application_date: submitted_at,
            notes: form.statement.filter(|statement| !statement.trim().is_empty()),
        }
    }
}
