use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::Value;

use crate::workflows::renewal::clock::FixedClock;
use crate::workflows::renewal::domain::{
    Application, ApplicationId, ApplicationState, ApplicationStatus, NewApplication,
    NewScholarship, Notification, NotificationKind, NotificationRecord, Scholarship,
    ScholarshipId, UserId,
};
use crate::workflows::renewal::eligibility::EligibilityEvaluator;
use crate::workflows::renewal::memory::MemoryRenewalStore;
use crate::workflows::renewal::repository::{
    NotificationError, NotificationSink, RenewalApproval, RenewalStore, RepositoryError,
    RolloverCommit, RolloverPlan,
};
use crate::workflows::renewal::service::RenewalService;

pub(super) const STUDENT: UserId = UserId(7);
pub(super) const OTHER_STUDENT: UserId = UserId(8);

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date")
}

pub(super) fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

#[derive(Default, Clone)]
pub(super) struct RecordingSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn count(&self, application_id: ApplicationId, kind: NotificationKind) -> usize {
        self.sent()
            .iter()
            .filter(|notification| {
                notification.application_id == application_id && notification.kind == kind
            })
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn send(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) struct Harness<N = RecordingSink> {
    pub(super) service: RenewalService<MemoryRenewalStore, N>,
    pub(super) store: Arc<MemoryRenewalStore>,
    pub(super) sink: Arc<N>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn build_service() -> Harness {
    build_service_with_sink(RecordingSink::default())
}

pub(super) fn build_service_with_sink<N: NotificationSink + 'static>(sink: N) -> Harness<N> {
    let store = Arc::new(MemoryRenewalStore::new());
    let sink = Arc::new(sink);
    let clock = Arc::new(FixedClock::new(today()));
    let service = RenewalService::new(
        store.clone(),
        sink.clone(),
        clock.clone(),
        EligibilityEvaluator::default(),
    );
    Harness {
        service,
        store,
        sink,
        clock,
    }
}

pub(super) fn scholarship(
    store: &MemoryRenewalStore,
    semester_in_days: i64,
    next_in_days: Option<i64>,
) -> Scholarship {
    store
        .insert_scholarship(NewScholarship {
            title: "STEM Excellence Grant".to_string(),
            semester_date: days_from_today(semester_in_days),
            next_last_semester_date: next_in_days.map(days_from_today),
        })
        .expect("scholarship inserted")
}

/// Approved, active award inserted directly, as if reviewed in an earlier term.
pub(super) fn award(
    store: &MemoryRenewalStore,
    user_id: UserId,
    scholarship: &Scholarship,
) -> Application {
    store
        .insert_application(NewApplication {
            user_id,
            scholarship_id: scholarship.id,
            status: ApplicationStatus::Approved,
            is_active: true,
            is_renewal: false,
            original_application_id: None,
            application_date: (today() - Duration::days(120))
                .and_time(NaiveTime::MIN)
                .and_utc(),
            notes: None,
        })
        .expect("award inserted")
}

pub(super) fn renewal_of(
    store: &MemoryRenewalStore,
    tip: &Application,
    status: ApplicationStatus,
) -> Application {
    store
        .insert_application(NewApplication {
            user_id: tip.user_id,
            scholarship_id: tip.scholarship_id,
            status,
            is_active: false,
            is_renewal: true,
            original_application_id: Some(tip.id),
            application_date: today().and_time(NaiveTime::MIN).and_utc(),
            notes: None,
        })
        .expect("renewal inserted")
}

pub(super) fn reload(store: &MemoryRenewalStore, id: ApplicationId) -> Application {
    store
        .fetch_application(id)
        .expect("store readable")
        .expect("application exists")
}

pub(super) fn reload_scholarship(store: &MemoryRenewalStore, id: ScholarshipId) -> Scholarship {
    store
        .fetch_scholarship(id)
        .expect("store readable")
        .expect("scholarship exists")
}

pub(super) fn set_semester(store: &MemoryRenewalStore, id: ScholarshipId, semester_in_days: i64) {
    let mut scholarship = reload_scholarship(store, id);
    scholarship.semester_date = days_from_today(semester_in_days);
    store
        .update_scholarship(scholarship)
        .expect("scholarship updated");
}

/// Forces a stored row into `state`, bypassing the service's review rules.
pub(super) fn force_state(store: &MemoryRenewalStore, id: ApplicationId, state: ApplicationState) {
    let mut application = reload(store, id);
    let expected = application.state();
    application.status = state.status;
    application.is_active = state.is_active;
    assert!(store
        .compare_and_update(expected, application)
        .expect("store writable"));
}

pub(super) fn ledger(store: &MemoryRenewalStore, id: ApplicationId) -> Vec<NotificationKind> {
    store
        .notifications_for(id)
        .expect("store readable")
        .into_iter()
        .map(|record| record.kind)
        .collect()
}

pub(super) struct UnavailableStore;

impl RenewalStore for UnavailableStore {
    fn insert_scholarship(&self, _draft: NewScholarship) -> Result<Scholarship, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_scholarship(
        &self,
        _id: ScholarshipId,
    ) -> Result<Option<Scholarship>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_scholarship(&self, _scholarship: Scholarship) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_application(&self, _draft: NewApplication) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_application(
        &self,
        _id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn compare_and_update(
        &self,
        _expected: ApplicationState,
        _next: Application,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn approve_renewal(
        &self,
        _expected: ApplicationState,
        _next: Application,
        _predecessor: ApplicationId,
    ) -> Result<RenewalApproval, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn applications_for_user(&self, _user_id: UserId) -> Result<Vec<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn renewals_of(&self, _tip: ApplicationId) -> Result<Vec<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_notification(&self, _record: NotificationRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn notifications_for(
        &self,
        _application_id: ApplicationId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit_rollover(&self, _plan: &RolloverPlan) -> Result<RolloverCommit, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn unavailable_service() -> RenewalService<UnavailableStore, RecordingSink> {
    RenewalService::new(
        Arc::new(UnavailableStore),
        Arc::new(RecordingSink::default()),
        Arc::new(FixedClock::new(today())),
        EligibilityEvaluator::default(),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

type Interleaving = Box<dyn FnOnce() + Send>;

/// Memory store that runs one queued step right before its next write, standing in for a
/// concurrent request that lands between a caller's reads and its write.
pub(super) struct InterleavedStore {
    inner: Arc<MemoryRenewalStore>,
    pending: Mutex<Option<Interleaving>>,
}

impl InterleavedStore {
    pub(super) fn new(inner: Arc<MemoryRenewalStore>) -> Self {
        Self {
            inner,
            pending: Mutex::new(None),
        }
    }

    pub(super) fn before_next_write(&self, step: impl FnOnce() + Send + 'static) {
        *self.pending.lock().expect("interleave mutex poisoned") = Some(Box::new(step));
    }

    fn interleave(&self) {
        let step = self.pending.lock().expect("interleave mutex poisoned").take();
        if let Some(step) = step {
            step();
        }
    }
}

impl RenewalStore for InterleavedStore {
    fn insert_scholarship(&self, draft: NewScholarship) -> Result<Scholarship, RepositoryError> {
        self.inner.insert_scholarship(draft)
    }

    fn fetch_scholarship(
        &self,
        id: ScholarshipId,
    ) -> Result<Option<Scholarship>, RepositoryError> {
        self.inner.fetch_scholarship(id)
    }

    fn update_scholarship(&self, scholarship: Scholarship) -> Result<(), RepositoryError> {
        self.inner.update_scholarship(scholarship)
    }

    fn insert_application(&self, draft: NewApplication) -> Result<Application, RepositoryError> {
        self.interleave();
        self.inner.insert_application(draft)
    }

    fn fetch_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch_application(id)
    }

    fn compare_and_update(
        &self,
        expected: ApplicationState,
        next: Application,
    ) -> Result<bool, RepositoryError> {
        self.interleave();
        self.inner.compare_and_update(expected, next)
    }

    fn approve_renewal(
        &self,
        expected: ApplicationState,
        next: Application,
        predecessor: ApplicationId,
    ) -> Result<RenewalApproval, RepositoryError> {
        self.interleave();
        self.inner.approve_renewal(expected, next, predecessor)
    }

    fn applications_for_user(&self, user_id: UserId) -> Result<Vec<Application>, RepositoryError> {
        self.inner.applications_for_user(user_id)
    }

    fn renewals_of(&self, tip: ApplicationId) -> Result<Vec<Application>, RepositoryError> {
        self.inner.renewals_of(tip)
    }

    fn insert_notification(&self, record: NotificationRecord) -> Result<(), RepositoryError> {
        self.inner.insert_notification(record)
    }

    fn notifications_for(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<NotificationRecord>, RepositoryError> {
        self.inner.notifications_for(application_id)
    }

    fn commit_rollover(&self, plan: &RolloverPlan) -> Result<RolloverCommit, RepositoryError> {
        self.inner.commit_rollover(plan)
    }
}

/// Service over `store` whose clock reads `today() + days`; used to race rollovers.
pub(super) fn service_on(
    store: Arc<MemoryRenewalStore>,
    days: i64,
) -> RenewalService<MemoryRenewalStore, RecordingSink> {
    RenewalService::new(
        store,
        Arc::new(RecordingSink::default()),
        Arc::new(FixedClock::new(days_from_today(days))),
        EligibilityEvaluator::default(),
    )
}
