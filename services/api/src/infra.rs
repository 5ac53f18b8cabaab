use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use scholarship_renewal::config::RenewalConfig;
use scholarship_renewal::workflows::renewal::{
    Clock, EligibilityEvaluator, FixedClock, MemoryRenewalStore, Notification, NotificationError,
    NotificationSink, RenewalService, SystemClock,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type RenewalEngine = RenewalService<MemoryRenewalStore, InMemoryNotificationOutbox>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Outbound notifications kept in process and echoed to the log, standing in for the
/// in-app inbox and e-mail relay.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationOutbox {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for InMemoryNotificationOutbox {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            user = %notification.user_id,
            application = %notification.application_id,
            kind = notification.kind.label(),
            title = %notification.title,
            "notification delivered"
        );
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationOutbox {
    pub(crate) fn delivered(&self) -> Vec<Notification> {
        match self.delivered.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub(crate) fn clock_from(config: &RenewalConfig) -> Arc<dyn Clock> {
    match config.fixed_today {
        Some(today) => Arc::new(FixedClock::new(today)),
        None => Arc::new(SystemClock),
    }
}

pub(crate) fn build_renewal_service(config: &RenewalConfig) -> Arc<RenewalEngine> {
    Arc::new(RenewalService::new(
        Arc::new(MemoryRenewalStore::new()),
        Arc::new(InMemoryNotificationOutbox::default()),
        clock_from(config),
        EligibilityEvaluator::new(config.window_days),
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
