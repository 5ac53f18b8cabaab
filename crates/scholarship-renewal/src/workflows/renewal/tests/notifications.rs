use std::sync::{Arc, Barrier};
use std::thread;

use super::common::*;

use crate::workflows::renewal::clock::FixedClock;
use crate::workflows::renewal::domain::NotificationKind;
use crate::workflows::renewal::memory::MemoryRenewalStore;
use crate::workflows::renewal::notifications::{compose, Claim, Delivery, NotificationDeduper};

fn deduper_with<N>(
    store: &Arc<MemoryRenewalStore>,
    sink: N,
) -> (NotificationDeduper<MemoryRenewalStore, N>, Arc<N>)
where
    N: crate::workflows::renewal::repository::NotificationSink,
{
    let sink = Arc::new(sink);
    let deduper = NotificationDeduper::new(
        store.clone(),
        sink.clone(),
        Arc::new(FixedClock::new(today())),
    );
    (deduper, sink)
}

#[test]
fn advance_thresholds_match_exact_days_only() {
    assert_eq!(NotificationKind::advance_for(30), Some(NotificationKind::Advance30));
    assert_eq!(NotificationKind::advance_for(14), Some(NotificationKind::Advance14));
    assert_eq!(NotificationKind::advance_for(7), Some(NotificationKind::Advance7));
    assert_eq!(NotificationKind::advance_for(3), Some(NotificationKind::Advance3));
    for days in [31, 29, 15, 8, 4, 2, 0, -1] {
        assert_eq!(NotificationKind::advance_for(days), None, "day {days}");
    }
}

#[test]
fn second_notify_is_deduplicated() {
    let store = Arc::new(MemoryRenewalStore::new());
    let scholarship = scholarship(&store, 7, None);
    let tip = award(&store, STUDENT, &scholarship);
    let (deduper, sink) = deduper_with(&store, RecordingSink::default());

    let first = deduper
        .notify(&tip, &scholarship, NotificationKind::Advance7)
        .expect("ledger writable");
    let second = deduper
        .notify(&tip, &scholarship, NotificationKind::Advance7)
        .expect("ledger writable");

    assert_eq!(first, Delivery::Sent);
    assert_eq!(second, Delivery::AlreadySent);
    assert_eq!(sink.count(tip.id, NotificationKind::Advance7), 1);
    assert_eq!(ledger(&store, tip.id), vec![NotificationKind::Advance7]);
}

#[test]
fn failed_dispatch_keeps_the_record_and_is_not_retried() {
    let store = Arc::new(MemoryRenewalStore::new());
    let scholarship = scholarship(&store, 3, None);
    let tip = award(&store, STUDENT, &scholarship);
    let (deduper, _) = deduper_with(&store, FailingSink);

    let first = deduper
        .notify(&tip, &scholarship, NotificationKind::Advance3)
        .expect("ledger writable");
    let retry = deduper
        .notify(&tip, &scholarship, NotificationKind::Advance3)
        .expect("ledger writable");

    assert_eq!(first, Delivery::DispatchFailed);
    assert_eq!(retry, Delivery::AlreadySent);
    assert_eq!(ledger(&store, tip.id), vec![NotificationKind::Advance3]);
}

#[test]
fn concurrent_claims_produce_one_owner() {
    let store = Arc::new(MemoryRenewalStore::new());
    let scholarship = scholarship(&store, 14, None);
    let tip = award(&store, STUDENT, &scholarship);
    let (deduper, _) = deduper_with(&store, RecordingSink::default());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let deduper = deduper.clone();
            let barrier = barrier.clone();
            let tip = tip.clone();
            thread::spawn(move || {
                barrier.wait();
                deduper
                    .claim(&tip, NotificationKind::Advance14)
                    .expect("ledger writable")
            })
        })
        .collect();

    let claims: Vec<Claim> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    assert_eq!(claims.iter().filter(|claim| **claim == Claim::Fresh).count(), 1);
    assert_eq!(
        claims
            .iter()
            .filter(|claim| **claim == Claim::AlreadySent)
            .count(),
        3
    );
}

#[test]
fn composes_user_facing_text() {
    let store = MemoryRenewalStore::new();
    let scholarship = scholarship(&store, 30, None);
    let tip = award(&store, STUDENT, &scholarship);

    let advance = compose(&tip, &scholarship, NotificationKind::Advance30);
    assert_eq!(advance.user_id, STUDENT);
    assert_eq!(
        advance.title,
        "Scholarship Semester Expiring in 1 Month: STEM Excellence Grant"
    );
    assert!(advance.message.contains("December 31, 2025"));
    assert!(advance.message.contains("1 month from now"));

    let expired = compose(&tip, &scholarship, NotificationKind::Expired);
    assert_eq!(
        expired.title,
        "Scholarship Semester Completed: STEM Excellence Grant"
    );
    assert!(expired.message.contains("has been completed"));
}
