use super::common::*;

use crate::lending::domain::{Identity, NewLoanScheme, OfficerId, SchemeCategory, SchemeId};
use crate::lending::{ErrorClass, LendingError, RepositoryError, SchemeChanges};

fn new_scheme(rate: f64, tenure: u32) -> NewLoanScheme {
    NewLoanScheme {
        name: "Gold Loan".to_string(),
        category: SchemeCategory::Retail,
        interest_rate: rate,
        tenure,
    }
}

#[test]
fn scheme_tenure_must_exceed_three_months() {
    let fixture = build_service();

    match fixture.service.create_scheme(new_scheme(9.0, 3)) {
        Err(error @ LendingError::InvalidScheme(_)) => {
            assert_eq!(error.class(), ErrorClass::Validation)
        }
        other => panic!("expected invalid scheme, got {other:?}"),
    }
    assert!(matches!(
        fixture.service.create_scheme(new_scheme(0.0, 24)),
        Err(LendingError::InvalidScheme(_))
    ));

    let created = fixture
        .service
        .create_scheme(new_scheme(9.0, 4))
        .expect("four months is enough");
    assert_eq!(created.id, SchemeId(2));
}

#[test]
fn schemes_with_live_applications_are_locked() {
    let fixture = build_service();
    let receipt = fixture.approved(12_000.0);
    let scheme_id = fixture.seed.scheme.id;

    let update = fixture.service.update_scheme(
        scheme_id,
        SchemeChanges {
            interest_rate: Some(14.0),
            ..SchemeChanges::default()
        },
    );
    match update {
        Err(error @ LendingError::DependentApplications { count: 1 }) => {
            assert_eq!(error.class(), ErrorClass::Conflict)
        }
        other => panic!("expected dependent applications, got {other:?}"),
    }
    assert!(matches!(
        fixture.service.delete_scheme(scheme_id),
        Err(LendingError::DependentApplications { .. })
    ));

    for _ in 0..receipt.installments.len() + 1 {
        fixture
            .service
            .pay_nearest_installment(fixture.customer_id(), receipt.application.id)
            .expect("payment");
    }
    let updated = fixture
        .service
        .update_scheme(
            scheme_id,
            SchemeChanges {
                interest_rate: Some(14.0),
                ..SchemeChanges::default()
            },
        )
        .expect("paid off loans release the scheme");
    assert_eq!(updated.interest_rate, 14.0);
    assert_eq!(updated.tenure, 12);
    fixture.service.delete_scheme(scheme_id).expect("delete");
    assert!(matches!(
        fixture.service.delete_scheme(scheme_id),
        Err(LendingError::SchemeNotFound(_))
    ));
}

#[test]
fn scheme_updates_are_validated() {
    let fixture = build_service();
    let result = fixture.service.update_scheme(
        fixture.seed.scheme.id,
        SchemeChanges {
            tenure: Some(2),
            ..SchemeChanges::default()
        },
    );
    assert!(matches!(result, Err(LendingError::InvalidScheme(_))));
}

#[test]
fn officers_with_open_work_cannot_be_deleted() {
    let fixture = build_service();
    let application = fixture.apply(5_000.0);

    assert!(matches!(
        fixture.service.delete_officer(application.loan_officer_id),
        Err(LendingError::DependentApplications { count: 1 })
    ));

    let idle = if application.loan_officer_id == OfficerId(1) {
        OfficerId(2)
    } else {
        OfficerId(1)
    };
    fixture.service.delete_officer(idle).expect("idle officer removed");
    assert!(matches!(
        fixture.service.delete_officer(idle),
        Err(LendingError::OfficerNotFound(_))
    ));
}

#[test]
fn registration_validates_and_deduplicates_emails() {
    let fixture = build_service();

    assert!(matches!(
        fixture
            .service
            .register_customer(Identity::new("No Mail", "not-an-email")),
        Err(LendingError::InvalidIdentity(_))
    ));
    assert!(matches!(
        fixture
            .service
            .register_officer(Identity::new("  ", "blank@bank.example")),
        Err(LendingError::InvalidIdentity(_))
    ));

    match fixture
        .service
        .register_officer(Identity::new("Asha Again", "Asha@Example.com"))
    {
        Err(error @ LendingError::Repository(RepositoryError::Conflict)) => {
            assert_eq!(error.class(), ErrorClass::Conflict)
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let officer = fixture
        .service
        .register_officer(Identity::new(" Dev Patel ", "dev@bank.example"))
        .expect("registered");
    assert_eq!(officer.identity.name, "Dev Patel");
    assert!(officer.is_active());
}

#[test]
fn reactivated_officers_receive_work_again() {
    let fixture = build_service();
    fixture
        .service
        .set_officer_active(OfficerId(1), false)
        .expect("deactivate");
    let first = fixture.apply(1_000.0);
    assert_eq!(first.loan_officer_id, OfficerId(2));

    let officer = fixture
        .service
        .set_officer_active(OfficerId(1), true)
        .expect("reactivate");
    assert!(officer.is_active());
    let second = fixture.apply(2_000.0);
    assert_eq!(second.loan_officer_id, OfficerId(1));
}
