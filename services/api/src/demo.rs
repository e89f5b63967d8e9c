use crate::infra::{seed_desk, InMemoryOutbox};
use chrono::Utc;
use clap::Args;
use loan_desk::error::AppError;
use loan_desk::lending::{
    ApplicationDetails, InMemoryDocumentIntake, InMemoryLendingStore, Installment,
    LendingPolicy, LendingService, LoanApplicationStatus, Notification, PaymentOutcome,
    SweepKind, SweepSummary, UploadedFile,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Principal requested by the sample customer.
    #[arg(long, default_value_t = 12_000.0)]
    pub(crate) amount: f64,
    /// Installments to pay before stopping. Defaults to the whole schedule.
    #[arg(long)]
    pub(crate) payments: Option<u32>,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            amount: 12_000.0,
            payments: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DemoOutcome {
    pub(crate) submitted: ApplicationDetails,
    pub(crate) schedule: Vec<Installment>,
    pub(crate) paid: usize,
    pub(crate) final_status: LoanApplicationStatus,
    pub(crate) sweeps: Vec<SweepSummary>,
    pub(crate) notifications: Vec<Notification>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Loan desk demo");
    let outcome = walk_loan(args)?;
    render(&outcome);
    Ok(())
}

/// Drive one application through submission, both approvals and repayment.
pub(crate) fn walk_loan(args: DemoArgs) -> Result<DemoOutcome, AppError> {
    let outbox = Arc::new(InMemoryOutbox::default());
    let service = LendingService::new(
        Arc::new(InMemoryLendingStore::new()),
        outbox.clone(),
        Arc::new(InMemoryDocumentIntake::new()),
        LendingPolicy::default(),
    );
    let seed = seed_desk(&service)?;
    let scheme = seed
        .schemes
        .first()
        .ok_or_else(|| AppError::Demo("no loan schemes were seeded".to_string()))?;
    let customer_id = seed.customer.id;

    let submitted = service.apply_for_loan(
        customer_id,
        scheme.id,
        args.amount,
        vec![
            UploadedFile::new("identity-proof.pdf", b"identity".to_vec()),
            UploadedFile::new("salary-slip.pdf", b"salary".to_vec()),
        ],
    )?;
    let application_id = submitted.application.id;
    let officer_id = submitted.application.loan_officer_id;

    service.approve_initial(application_id, officer_id, true)?;
    service.upload_collateral(
        application_id,
        customer_id,
        vec![UploadedFile::new("property-deed.pdf", b"deed".to_vec())],
    )?;
    let approved = service.approve_collateral(application_id, officer_id, true)?;
    let schedule = approved.installments;

    let budget = args
        .payments
        .map_or(schedule.len(), |count| (count as usize).min(schedule.len()));
    let mut paid = 0;
    let mut final_status = approved.application.status;
    for _ in 0..budget {
        match service.pay_nearest_installment(customer_id, application_id)? {
            PaymentOutcome::Paid { .. } => paid += 1,
            PaymentOutcome::NoPendingInstallments { application } => {
                final_status = application.status;
                break;
            }
        }
    }
    if paid == schedule.len() {
        if let PaymentOutcome::NoPendingInstallments { application } =
            service.pay_nearest_installment(customer_id, application_id)?
        {
            final_status = application.status;
        }
    }

    let now = Utc::now();
    let sweeps = SweepKind::ALL
        .into_iter()
        .map(|kind| service.run_sweep(kind, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DemoOutcome {
        submitted,
        schedule,
        paid,
        final_status,
        sweeps,
        notifications: outbox.notifications(),
    })
}

fn render(outcome: &DemoOutcome) {
    let application = &outcome.submitted.application;
    println!(
        "- Application {} for {:.2} assigned to officer {}",
        application.id, application.amount, application.loan_officer_id
    );
    println!(
        "  {} personal documents stored",
        outcome.submitted.documents.len()
    );

    let total: f64 = outcome
        .schedule
        .iter()
        .map(|row| row.amount_to_be_paid)
        .sum();
    match outcome.schedule.first() {
        Some(first) => println!(
            "\nRepayment schedule: {} installments of {:.2} (total {:.2})",
            outcome.schedule.len(),
            first.amount_to_be_paid,
            total
        ),
        None => println!("\nRepayment schedule: empty"),
    }
    for row in &outcome.schedule {
        println!(
            "  - {} | due {} | {:.2}",
            row.id,
            row.due_date.format("%Y-%m-%d"),
            row.amount_to_be_paid
        );
    }

    println!(
        "\nPaid {} of {} installments, application is now {}",
        outcome.paid,
        outcome.schedule.len(),
        outcome.final_status
    );

    println!("\nSweeps");
    for summary in &outcome.sweeps {
        println!("- {summary}");
    }

    if outcome.notifications.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications");
        for notification in &outcome.notifications {
            println!(
                "- {} -> {}: {}",
                notification.application_id, notification.recipient, notification.subject
            );
        }
    }
}
