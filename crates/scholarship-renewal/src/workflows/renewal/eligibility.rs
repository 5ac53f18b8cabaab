use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Application, ApplicationId, ApplicationStatus, Scholarship};

pub const DEFAULT_RENEWAL_WINDOW_DAYS: i64 = 30;

/// Pure renewal gate for a chain tip.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    window_days: i64,
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_RENEWAL_WINDOW_DAYS)
    }
}

impl EligibilityEvaluator {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days: window_days.max(0),
        }
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    /// `renewals` are the applications linked to `application` through
    /// `original_application_id`; anything else in the slice is ignored.
    pub fn evaluate(
        &self,
        application: &Application,
        scholarship: &Scholarship,
        renewals: &[Application],
        today: NaiveDate,
    ) -> Eligibility {
        Eligibility::from(self.reason(application, scholarship, renewals, today))
    }

    fn reason(
        &self,
        application: &Application,
        scholarship: &Scholarship,
        renewals: &[Application],
        today: NaiveDate,
    ) -> EligibilityReason {
        if application.status != ApplicationStatus::Approved {
            return EligibilityReason::NotApproved {
                status: application.status,
            };
        }
        if !application.is_active {
            return EligibilityReason::NotActive;
        }
        if !scholarship.is_active {
            return EligibilityReason::ScholarshipInactive;
        }

        let days_remaining = scholarship.days_remaining(today);
        if days_remaining < 0 {
            return EligibilityReason::SemesterElapsed { days_remaining };
        }
        if days_remaining > self.window_days {
            return EligibilityReason::WindowNotOpen {
                days_remaining,
                window_days: self.window_days,
            };
        }

        let blocking = renewals.iter().find(|renewal| {
            renewal.original_application_id == Some(application.id)
                && renewal.id != application.id
                && !renewal.is_active
                && matches!(
                    renewal.status,
                    ApplicationStatus::Pending | ApplicationStatus::Approved
                )
        });
        if let Some(renewal) = blocking {
            return EligibilityReason::RenewalInFlight {
                renewal_id: renewal.id,
                status: renewal.status,
            };
        }

        EligibilityReason::Eligible { days_remaining }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: EligibilityReason,
}

impl Eligibility {
    pub fn summary(&self) -> String {
        self.reason.summary()
    }
}

impl From<EligibilityReason> for Eligibility {
    fn from(reason: EligibilityReason) -> Self {
        Self {
            eligible: matches!(reason, EligibilityReason::Eligible { .. }),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum EligibilityReason {
    Eligible {
        days_remaining: i64,
    },
    NotApproved {
        status: ApplicationStatus,
    },
    NotActive,
    ScholarshipInactive,
    WindowNotOpen {
        days_remaining: i64,
        window_days: i64,
    },
    SemesterElapsed {
        days_remaining: i64,
    },
    /// An inactive pending or approved renewal already hangs off this tip.
    RenewalInFlight {
        renewal_id: ApplicationId,
        status: ApplicationStatus,
    },
}

impl EligibilityReason {
    pub fn summary(&self) -> String {
        match self {
            EligibilityReason::Eligible { days_remaining } => {
                format!("eligible for renewal; semester ends in {days_remaining} day(s)")
            }
            EligibilityReason::NotApproved { status } => {
                format!("application is {}, not approved", status.label())
            }
            EligibilityReason::NotActive => "application is not the active award".to_string(),
            EligibilityReason::ScholarshipInactive => "scholarship is no longer active".to_string(),
            EligibilityReason::WindowNotOpen {
                days_remaining,
                window_days,
            } => format!(
                "renewal opens {window_days} day(s) before the semester ends ({days_remaining} remaining)"
            ),
            EligibilityReason::SemesterElapsed { days_remaining } => format!(
                "semester ended {} day(s) ago; awaiting rollover",
                days_remaining.abs()
            ),
            EligibilityReason::RenewalInFlight { renewal_id, status } => format!(
                "renewal {renewal_id} is already {} and waiting",
                status.label()
            ),
        }
    }
}
