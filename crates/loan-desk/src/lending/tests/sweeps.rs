use super::common::*;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use crate::lending::domain::LoanApplicationStatus;
use crate::lending::intake::InMemoryDocumentIntake;
use crate::lending::memory::InMemoryLendingStore;
use crate::lending::notify::NotificationKind;
use crate::lending::repository::LendingStore;
use crate::lending::scheduler::{self, SchedulerConfig};
use crate::lending::{
    CollateralSweepReport, LendingPolicy, LendingService, SchedulePeriod, SweepKind, SweepSummary,
};

#[test]
fn three_overdue_installments_flag_the_application() {
    let fixture = build_service_with(daily_policy());
    let receipt = fixture.approved(12_000.0);
    let id = receipt.application.id;

    let report = fixture
        .service
        .sweep_npa(Utc::now() + Duration::hours(84))
        .expect("sweep");
    assert_eq!(report.examined, 1);
    assert_eq!(report.flagged, 1);
    assert!(fixture.application(id).is_npa);
}

#[test]
fn two_overdue_installments_are_not_enough() {
    let fixture = build_service_with(daily_policy());
    let receipt = fixture.approved(12_000.0);

    let report = fixture
        .service
        .sweep_npa(Utc::now() + Duration::hours(60))
        .expect("sweep");
    assert_eq!(report.flagged, 0);
    assert!(!fixture.application(receipt.application.id).is_npa);
}

#[test]
fn catching_up_on_payments_clears_the_flag() {
    let fixture = build_service_with(daily_policy());
    let receipt = fixture.approved(12_000.0);
    let id = receipt.application.id;
    let later = Utc::now() + Duration::hours(84);

    fixture.service.sweep_npa(later).expect("first sweep");
    assert!(fixture.application(id).is_npa);

    fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), id)
        .expect("payment");
    let report = fixture.service.sweep_npa(later).expect("second sweep");
    assert_eq!(report.cleared, 1);
    assert!(!fixture.application(id).is_npa);

    let report = fixture.service.sweep_npa(later).expect("third sweep");
    assert_eq!((report.flagged, report.cleared), (0, 0));
}

#[test]
fn npa_sweep_ignores_applications_without_installments() {
    let fixture = build_service_with(daily_policy());
    fixture.apply(1_000.0);
    fixture.awaiting_collateral(2_000.0);

    let report = fixture
        .service
        .sweep_npa(Utc::now() + Duration::days(30))
        .expect("sweep");
    assert_eq!(report.examined, 0);
}

#[test]
fn expired_collateral_requests_are_rejected_and_notified() {
    let fixture = build_service();
    let stale = fixture.awaiting_collateral(5_000.0);
    let fresh = fixture.awaiting_collateral(6_000.0);
    fixture.set_decision_date(stale.id, Utc::now() - Duration::days(8));
    fixture.set_decision_date(fresh.id, Utc::now() - Duration::days(6));

    let report = fixture
        .service
        .sweep_collateral_expiry(Utc::now())
        .expect("sweep");

    assert_eq!(
        report,
        CollateralSweepReport {
            examined: 1,
            rejected: 1,
            notifications_failed: 0,
            failed: 0,
        }
    );
    assert_eq!(
        fixture.application(stale.id).status,
        LoanApplicationStatus::Rejected
    );
    assert_eq!(
        fixture.application(fresh.id).status,
        LoanApplicationStatus::PendingCollateral
    );
    let expired: Vec<_> = fixture
        .notifier
        .sent()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::CollateralExpired)
        .collect();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].application_id, stale.id);
}

#[test]
fn collateral_request_expires_just_past_seven_days() {
    let fixture = build_service();
    let application = fixture.awaiting_collateral(5_000.0);
    let now = Utc::now();
    fixture.set_decision_date(application.id, now - Duration::days(7) - Duration::minutes(1));

    let report = fixture.service.sweep_collateral_expiry(now).expect("sweep");
    assert_eq!((report.examined, report.rejected), (1, 1));
    assert_eq!(
        fixture.application(application.id).status,
        LoanApplicationStatus::Rejected
    );
}

#[test]
fn collateral_deadline_is_exclusive_of_uploaded_applications() {
    let fixture = build_service();
    let uploaded = fixture.collateral_uploaded(5_000.0);
    fixture.set_decision_date(uploaded.id, Utc::now() - Duration::days(30));

    let report = fixture
        .service
        .sweep_collateral_expiry(Utc::now())
        .expect("sweep");
    assert_eq!(report.rejected, 0);
    assert_eq!(
        fixture.application(uploaded.id).status,
        LoanApplicationStatus::CollateralUploaded
    );
}

#[test]
fn collateral_expiry_survives_notification_failure() {
    let store = InMemoryLendingStore::new();
    let seed = seed(&store);
    let service = LendingService::new(
        Arc::new(store.clone()),
        Arc::new(FailingNotifier),
        Arc::new(InMemoryDocumentIntake::new()),
        LendingPolicy::default(),
    );
    let application = service
        .apply_for_loan(seed.customer.id, seed.scheme.id, 5_000.0, personal_documents())
        .expect("apply")
        .application;
    service
        .approve_initial(application.id, application.loan_officer_id, true)
        .expect("approve");

    let report = service
        .sweep_collateral_expiry(Utc::now() + Duration::days(8))
        .expect("sweep");
    assert_eq!(report.rejected, 1);
    assert_eq!(report.notifications_failed, 1);
    let listed = service.customer_applications(seed.customer.id).expect("list");
    assert_eq!(listed[0].application.status, LoanApplicationStatus::Rejected);
}

#[test]
fn reminders_go_out_for_installments_due_that_day() {
    let fixture = build_service_with(daily_policy());
    let receipt = fixture.approved(12_000.0);
    let first_due = receipt.installments[0].due_date;

    let report = fixture.service.sweep_reminders(first_due).expect("sweep");
    assert_eq!(report.examined, 1);
    assert_eq!(report.sent, 1);
    let reminder = fixture
        .notifier
        .sent()
        .into_iter()
        .find(|n| n.kind == NotificationKind::InstallmentDue)
        .expect("reminder sent");
    assert_eq!(reminder.recipient, "asha@example.com");
    assert!(reminder
        .body
        .contains(&first_due.format("%Y-%m-%d").to_string()));

    let quiet = fixture
        .service
        .sweep_reminders(first_due - Duration::days(3))
        .expect("sweep");
    assert_eq!(quiet.examined, 0);
}

#[test]
fn one_bounced_reminder_does_not_stop_the_others() {
    let store = InMemoryLendingStore::new();
    let seed = seed(&store);
    let notifier = Arc::new(BouncingNotifier::new("asha@example.com"));
    let service = LendingService::new(
        Arc::new(store.clone()),
        notifier.clone(),
        Arc::new(InMemoryDocumentIntake::new()),
        daily_policy(),
    );
    let mut first_installments = Vec::new();
    for customer in [&seed.customer, &seed.second_customer] {
        let application = service
            .apply_for_loan(customer.id, seed.scheme.id, 12_000.0, personal_documents())
            .expect("apply")
            .application;
        service
            .approve_initial(application.id, application.loan_officer_id, true)
            .expect("initial");
        service
            .upload_collateral(application.id, customer.id, collateral_documents())
            .expect("upload");
        let receipt = service
            .approve_collateral(application.id, application.loan_officer_id, true)
            .expect("final");
        first_installments.push(receipt.installments[0].clone());
    }

    let due = first_installments[0].due_date;
    let mut aligned = first_installments[1].clone();
    aligned.due_date = due;
    let mut tx = store.begin().expect("begin");
    tx.update_installment(&aligned).expect("update");
    tx.commit().expect("commit");

    let report = service.sweep_reminders(due).expect("sweep");
    assert_eq!(report.examined, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    let delivered: Vec<_> = notifier
        .delivered
        .sent()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::InstallmentDue)
        .map(|n| n.recipient)
        .collect();
    assert_eq!(delivered, vec!["kabir@example.com".to_string()]);
}

#[test]
fn paid_installments_get_no_reminder() {
    let fixture = build_service_with(daily_policy());
    let receipt = fixture.approved(12_000.0);
    fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), receipt.application.id)
        .expect("payment");

    let report = fixture
        .service
        .sweep_reminders(receipt.installments[0].due_date)
        .expect("sweep");
    assert_eq!(report.examined, 0);
}

#[test]
fn run_sweep_dispatches_by_kind() {
    let fixture = build_service();
    for kind in SweepKind::ALL {
        let summary = fixture.service.run_sweep(kind, Utc::now()).expect("sweep");
        match (kind, summary) {
            (SweepKind::Npa, SweepSummary::Npa(_))
            | (SweepKind::Reminders, SweepSummary::Reminders(_))
            | (SweepKind::CollateralExpiry, SweepSummary::CollateralExpiry(_)) => {}
            (kind, summary) => panic!("{kind:?} produced {summary:?}"),
        }
    }
}

#[tokio::test]
async fn scheduler_flags_delinquent_loans_in_the_background() {
    let fixture = build_service_with(LendingPolicy {
        installment_period: SchedulePeriod::Fixed(Duration::milliseconds(1)),
        ..LendingPolicy::default()
    });
    let receipt = fixture.approved(12_000.0);
    let config = SchedulerConfig {
        enabled: true,
        npa_interval: StdDuration::from_millis(20),
        reminder_interval: StdDuration::from_secs(3600),
        collateral_interval: StdDuration::from_secs(3600),
    };

    let handle = scheduler::spawn(fixture.service.clone(), &config);
    assert_eq!(handle.task_count(), 3);

    let mut flagged = false;
    for _ in 0..100 {
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        if fixture.application(receipt.application.id).is_npa {
            flagged = true;
            break;
        }
    }
    handle.shutdown().await;
    assert!(flagged, "background sweep never flagged the application");
}

#[tokio::test]
async fn disabled_scheduler_spawns_nothing() {
    let fixture = build_service();
    let config = SchedulerConfig {
        enabled: false,
        ..SchedulerConfig::default()
    };
    let handle = scheduler::spawn(fixture.service.clone(), &config);
    assert_eq!(handle.task_count(), 0);
    handle.shutdown().await;
}
