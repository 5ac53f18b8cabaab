use crate::infra::InMemoryNotificationOutbox;
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use scholarship_renewal::error::AppError;
use scholarship_renewal::workflows::renewal::{
    Clock, EligibilityEvaluator, FixedClock, MemoryRenewalStore, NewScholarship, RenewalForm,
    RenewalService, RolloverOutcome, ScanReport, UserId, DEFAULT_RENEWAL_WINDOW_DAYS,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Days before the semester end during which renewals may be filed.
    #[arg(long)]
    pub(crate) window_days: Option<u32>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start = args.today.unwrap_or_else(|| Local::now().date_naive());
    let window_days = args
        .window_days
        .map(i64::from)
        .unwrap_or(DEFAULT_RENEWAL_WINDOW_DAYS);

    let store = Arc::new(MemoryRenewalStore::new());
    let outbox = Arc::new(InMemoryNotificationOutbox::default());
    let clock = Arc::new(FixedClock::new(start));
    let service = RenewalService::new(
        store,
        outbox.clone(),
        clock.clone(),
        EligibilityEvaluator::new(window_days),
    );
    let student = UserId(1);

    println!("Scholarship renewal demo (starting {start}, {window_days}-day renewal window)");

    let scholarship = service.register_scholarship(NewScholarship {
        title: "STEM Excellence Grant".to_string(),
        semester_date: start + Duration::days(10),
        next_last_semester_date: None,
    })?;
    println!(
        "- Registered {} '{}', semester ends {}",
        scholarship.id, scholarship.title, scholarship.semester_date
    );

    let award = service.submit_application(student, scholarship.id)?;
    let award = service.approve_application(award.id)?;
    println!("- {} awarded {} ({})", student, scholarship.id, award.id);

    let eligibility = service.is_eligible_for_renewal(award.id)?;
    println!("- Renewal prompt: {}", eligibility.summary());

    let renewal = service.create_renewal(
        award.id,
        RenewalForm {
            statement: Some("Maintained a 3.8 GPA and joined the robotics lab.".to_string()),
        },
    )?;
    println!(
        "- Submitted renewal {} linked to {}",
        renewal.id, award.id
    );

    if let Err(err) = service.approve_application(renewal.id) {
        println!("  Approval blocked: {err}");
    }

    let next_semester = start + Duration::days(190);
    service.schedule_next_semester(scholarship.id, next_semester)?;
    println!("- Provider scheduled the next semester to end {next_semester}");
    let approved = service.approve_application(renewal.id)?;
    println!(
        "  Renewal {} approved, active: {}",
        approved.id, approved.is_active
    );

    for offset in [3, 7, 11, 11] {
        clock.set(start + Duration::days(offset));
        let report = service.trigger_scan(student);
        render_scan(&report, clock.today());
    }

    println!("\nNotifications delivered");
    for notification in outbox.delivered() {
        println!(
            "- [{}] {}: {}",
            notification.kind.label(),
            notification.application_id,
            notification.title
        );
    }

    println!("\nApplications for {student}");
    for view in service.applications_for(student)? {
        let link = view
            .original_application_id
            .map(|id| format!(" <- {id}"))
            .unwrap_or_default();
        println!(
            "- {} | {} | active {}{}",
            view.application_id, view.status, view.is_active, link
        );
    }

    Ok(())
}

fn render_scan(report: &ScanReport, today: NaiveDate) {
    println!(
        "\nScan on {today}: {} current application(s) examined",
        report.examined
    );
    for notice in &report.advance_notices {
        println!(
            "- {} notice for {}: {:?}",
            notice.kind.label(),
            notice.application_id,
            notice.delivery
        );
    }
    for outcome in &report.rollovers {
        match outcome {
            RolloverOutcome::Renewed {
                retired,
                activated,
                semester_date,
                ..
            } => println!(
                "- Rollover: {retired} completed, {activated} now active until {semester_date}"
            ),
            RolloverOutcome::Completed { retired } => {
                println!("- Rollover: {retired} completed with no renewal waiting")
            }
            RolloverOutcome::AlreadyTransitioned { application_id } => {
                println!("- {application_id} already transitioned")
            }
            RolloverOutcome::NotDue {
                application_id,
                days_remaining,
            } => println!("- {application_id} not due ({days_remaining} day(s) left)"),
        }
    }
    for skipped in &report.skipped {
        println!("- Skipped {}: {}", skipped.application_id, skipped.reason);
    }
    if report.advance_notices.is_empty() && report.rollovers.is_empty() {
        println!("- Nothing due");
    }
}
