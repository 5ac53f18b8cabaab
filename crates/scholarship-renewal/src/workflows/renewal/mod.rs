//! Scholarship renewal chains and semester expiration.
//!
//! A student's funding for one scholarship is a chain of applications linked through
//! `original_application_id`. At most one link is current (approved and active). When the
//! scholarship's semester ends, the [`ExpirationScanner`] retires the current link and
//! activates the approved renewal waiting behind it, sending each notification at most once.
//! Work is lazy: nothing runs until a caller triggers a scan for a user.

pub mod chain;
pub mod clock;
pub mod domain;
pub mod eligibility;
pub mod memory;
pub mod notifications;
pub mod repository;
pub mod rollover;
pub mod router;
pub mod scanner;
pub mod service;

#[cfg(test)]
mod tests;

pub use chain::{RenewalChainLinker, RenewalForm};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Application, ApplicationId, ApplicationState, ApplicationStatus, ApplicationView,
    NewApplication, NewScholarship, Notification, NotificationKind, NotificationRecord,
    Scholarship, ScholarshipId, UserId,
};
pub use eligibility::{
    Eligibility, EligibilityEvaluator, EligibilityReason, DEFAULT_RENEWAL_WINDOW_DAYS,
};
pub use memory::MemoryRenewalStore;
pub use notifications::{Claim, Delivery, NotificationDeduper};
pub use repository::{
    NotificationError, NotificationSink, RenewalApproval, RenewalStore, RepositoryError,
    RolloverCommit, RolloverPlan, SemesterAdvance,
};
pub use rollover::{DataIntegrityError, EngineError, RolloverOutcome, RolloverTransition};
pub use router::renewal_router;
pub use scanner::{AdvanceNotice, ExpirationScanner, ScanReport, SkippedApplication};
pub use service::{RenewalService, RenewalServiceError, ValidationError};
