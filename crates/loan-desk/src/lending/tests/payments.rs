use super::common::*;

use crate::lending::domain::{ApplicationId, InstallmentStatus, LoanApplicationStatus};
use crate::lending::{ErrorClass, LendingError, PaymentOutcome};

#[test]
fn pays_the_earliest_pending_installment_first() {
    let fixture = build_service();
    let receipt = fixture.approved(12_000.0);
    let application_id = receipt.application.id;

    let outcome = fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), application_id)
        .expect("payment");

    let (installment, remaining) = match outcome {
        PaymentOutcome::Paid {
            installment,
            remaining,
        } => (installment, remaining),
        other => panic!("expected a paid installment, got {other:?}"),
    };
    assert_eq!(installment.id, receipt.installments[0].id);
    assert_eq!(installment.status, InstallmentStatus::Paid);
    assert!(installment.payment_date.is_some());
    assert_eq!(remaining, 11);

    let stored = fixture.installments(application_id);
    assert_eq!(
        stored
            .iter()
            .filter(|row| row.status == InstallmentStatus::Paid)
            .count(),
        1
    );
}

#[test]
fn settling_every_installment_pays_off_the_loan() {
    let fixture = build_service();
    let receipt = fixture.approved(12_000.0);
    let application_id = receipt.application.id;

    for expected in &receipt.installments {
        match fixture
            .service
            .pay_nearest_installment(fixture.customer_id(), application_id)
            .expect("payment")
        {
            PaymentOutcome::Paid { installment, .. } => assert_eq!(installment.id, expected.id),
            other => panic!("expected paid installment, got {other:?}"),
        }
    }

    let closing = fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), application_id)
        .expect("closing call");
    match closing {
        PaymentOutcome::NoPendingInstallments { application } => {
            assert_eq!(application.status, LoanApplicationStatus::PaidOff)
        }
        other => panic!("expected payoff, got {other:?}"),
    }

    let version = fixture.application(application_id).version;
    let again = fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), application_id)
        .expect("repeat call");
    assert!(matches!(
        again,
        PaymentOutcome::NoPendingInstallments { .. }
    ));
    assert_eq!(fixture.application(application_id).version, version);
    assert_eq!(fixture.installments(application_id).len(), 12);
}

#[test]
fn payments_require_ownership() {
    let fixture = build_service();
    let receipt = fixture.approved(12_000.0);

    match fixture
        .service
        .pay_nearest_installment(fixture.seed.second_customer.id, receipt.application.id)
    {
        Err(error @ LendingError::NotOwner { .. }) => {
            assert_eq!(error.class(), ErrorClass::Forbidden)
        }
        other => panic!("expected not owner, got {other:?}"),
    }
    assert!(fixture
        .installments(receipt.application.id)
        .iter()
        .all(|row| row.status == InstallmentStatus::Pending));
}

#[test]
fn unapproved_applications_cannot_be_paid() {
    let fixture = build_service();
    let application = fixture.apply(12_000.0);

    let result = fixture
        .service
        .pay_nearest_installment(fixture.customer_id(), application.id);
    assert!(matches!(
        result,
        Err(LendingError::InvalidState {
            expected: LoanApplicationStatus::Approved,
            actual: LoanApplicationStatus::Pending,
            ..
        })
    ));
    assert_eq!(
        fixture.application(application.id).status,
        LoanApplicationStatus::Pending
    );

    assert!(matches!(
        fixture
            .service
            .pay_nearest_installment(fixture.customer_id(), ApplicationId(404)),
        Err(LendingError::ApplicationNotFound(_))
    ));
}
