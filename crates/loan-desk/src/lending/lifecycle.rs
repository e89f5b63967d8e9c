//! Customer submissions and officer decisions.

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::balancer;
use super::domain::{
    ApplicationDetails, ApplicationId, CustomerId, Document, DocumentCategory, LoanApplication,
    LoanApplicationStatus, NewDocument, NewLoanApplication, OfficerId, SchemeId, UploadedFile,
};
use super::intake::DocumentIntake;
use super::notify::{self, NotificationStatus, Notifier};
use super::repository::{ApplicationFilter, LendingStore, LendingTransaction};
use super::schedule;
use super::service::{
    advance, load_application, load_customer, load_details, LendingError, LendingService,
    TransitionReceipt,
};

impl<S, N, D> LendingService<S, N, D>
where
    S: LendingStore + 'static,
    N: Notifier + 'static,
    D: DocumentIntake + 'static,
{
    /// Create a `Pending` application, assign the least-loaded officer and attach the personal
    /// documents, all in one unit of work.
    #[instrument(skip(self, personal_documents), fields(documents = personal_documents.len()))]
    pub fn apply_for_loan(
        &self,
        customer_id: CustomerId,
        scheme_id: SchemeId,
        amount: f64,
        personal_documents: Vec<UploadedFile>,
    ) -> Result<ApplicationDetails, LendingError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LendingError::InvalidAmount(amount));
        }
        if personal_documents.is_empty() {
            return Err(LendingError::NoDocumentsProvided);
        }

        let mut tx = self.store().begin()?;
        load_customer(&mut *tx, customer_id)?;
        tx.scheme(scheme_id)?
            .ok_or(LendingError::SchemeNotFound(scheme_id))?;

        let open = tx
            .applications(&ApplicationFilter::default().customer(customer_id).open())?
            .len();
        let limit = self.policy().max_open_applications;
        if open >= limit {
            return Err(LendingError::TooManyOpenApplications { open, limit });
        }

        let officer =
            balancer::pick_officer(&mut *tx)?.ok_or(LendingError::NoEligibleOfficer)?;
        let application = tx.insert_application(NewLoanApplication {
            customer_id,
            loan_scheme_id: scheme_id,
            loan_officer_id: officer.id,
            amount,
            application_date: Utc::now(),
        })?;
        let documents = self.attach_documents(
            &mut *tx,
            application.id,
            DocumentCategory::Personal,
            &personal_documents,
        )?;
        if let Err(error) = tx.commit() {
            self.discard_documents(&documents);
            return Err(error.into());
        }

        info!(
            application_id = %application.id,
            officer_id = %officer.id,
            "loan application submitted"
        );
        Ok(ApplicationDetails {
            application,
            documents,
            installments: Vec::new(),
        })
    }

    /// First officer decision: `Pending -> PendingCollateral` or `Pending -> Rejected`.
    #[instrument(skip(self))]
    pub fn approve_initial(
        &self,
        application_id: ApplicationId,
        officer_id: OfficerId,
        approve: bool,
    ) -> Result<TransitionReceipt, LendingError> {
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        ensure_assigned(&application, officer_id)?;
        if application.status != LoanApplicationStatus::Pending {
            return Err(LendingError::AlreadyProcessed {
                application_id,
                status: application.status,
            });
        }
        let customer = load_customer(&mut *tx, application.customer_id)?;

        let next = if approve {
            LoanApplicationStatus::PendingCollateral
        } else {
            LoanApplicationStatus::Rejected
        };
        advance(&mut application, next)?;
        application.decision_date = Some(Utc::now());
        let application = tx.update_application(&application)?;
        tx.commit()?;
        info!(%application_id, status = %application.status, "initial decision recorded");

        let notification = if approve {
            notify::collateral_requested(
                &customer,
                application_id,
                self.policy().collateral_deadline.num_days(),
            )
        } else {
            notify::application_rejected(&customer, application_id)
        };
        Ok(TransitionReceipt {
            application,
            documents: Vec::new(),
            installments: Vec::new(),
            notification: notify::dispatch(self.notifier(), notification),
        })
    }

    /// Customer collateral upload: `PendingCollateral -> CollateralUploaded`.
    #[instrument(skip(self, collateral_documents), fields(documents = collateral_documents.len()))]
    pub fn upload_collateral(
        &self,
        application_id: ApplicationId,
        customer_id: CustomerId,
        collateral_documents: Vec<UploadedFile>,
    ) -> Result<TransitionReceipt, LendingError> {
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        ensure_owner(&application, customer_id)?;
        if application.status != LoanApplicationStatus::PendingCollateral {
            return Err(LendingError::InvalidState {
                application_id,
                expected: LoanApplicationStatus::PendingCollateral,
                actual: application.status,
            });
        }
        if collateral_documents.is_empty() {
            return Err(LendingError::NoDocumentsProvided);
        }

        advance(&mut application, LoanApplicationStatus::CollateralUploaded)?;
        let documents = self.attach_documents(
            &mut *tx,
            application_id,
            DocumentCategory::Collateral,
            &collateral_documents,
        )?;
        let application = match commit_update(tx, &application) {
            Ok(application) => application,
            Err(error) => {
                self.discard_documents(&documents);
                return Err(error);
            }
        };
        info!(%application_id, "collateral uploaded");

        Ok(TransitionReceipt {
            application,
            documents,
            installments: Vec::new(),
            notification: NotificationStatus::NotRequired,
        })
    }

    /// Final officer decision. Approval writes the full installment schedule in the same unit of
    /// work as the status change; if any row fails nothing is kept.
    #[instrument(skip(self))]
    pub fn approve_collateral(
        &self,
        application_id: ApplicationId,
        officer_id: OfficerId,
        approve: bool,
    ) -> Result<TransitionReceipt, LendingError> {
        let mut tx = self.store().begin()?;
        let mut application = load_application(&mut *tx, application_id)?;
        ensure_assigned(&application, officer_id)?;
        if application.status != LoanApplicationStatus::CollateralUploaded {
            return Err(LendingError::InvalidState {
                application_id,
                expected: LoanApplicationStatus::CollateralUploaded,
                actual: application.status,
            });
        }
        let customer = load_customer(&mut *tx, application.customer_id)?;

        let now = Utc::now();
        let mut installments = Vec::new();
        if approve {
            let scheme = tx
                .scheme(application.loan_scheme_id)?
                .ok_or(LendingError::SchemeNotFound(application.loan_scheme_id))?;
            advance(&mut application, LoanApplicationStatus::Approved)?;
            installments = schedule::materialize(
                &mut *tx,
                &application,
                &scheme,
                now,
                self.policy().installment_period,
            )?;
        } else {
            advance(&mut application, LoanApplicationStatus::Rejected)?;
        }
        application.decision_date = Some(now);
        let application = tx.update_application(&application)?;
        tx.commit()?;
        info!(
            %application_id,
            status = %application.status,
            installments = installments.len(),
            "collateral decision recorded"
        );

        let notification = if approve {
            notify::loan_approved(&customer, application_id)
        } else {
            notify::application_rejected(&customer, application_id)
        };
        Ok(TransitionReceipt {
            application,
            documents: Vec::new(),
            installments,
            notification: notify::dispatch(self.notifier(), notification),
        })
    }

    /// Every application the customer submitted, with documents and installments.
    pub fn customer_applications(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<ApplicationDetails>, LendingError> {
        let mut tx = self.store().begin()?;
        load_customer(&mut *tx, customer_id)?;
        let applications =
            tx.applications(&ApplicationFilter::default().customer(customer_id))?;
        applications
            .into_iter()
            .map(|application| load_details(&mut *tx, application))
            .collect()
    }

    /// Every application assigned to the officer, with documents and installments.
    pub fn officer_applications(
        &self,
        officer_id: OfficerId,
    ) -> Result<Vec<ApplicationDetails>, LendingError> {
        let mut tx = self.store().begin()?;
        tx.officer(officer_id)?
            .ok_or(LendingError::OfficerNotFound(officer_id))?;
        let applications = tx.applications(&ApplicationFilter::default().officer(officer_id))?;
        applications
            .into_iter()
            .map(|application| load_details(&mut *tx, application))
            .collect()
    }

    /// Store every file and add its document row. The whole upload is checked before the first
    /// file is stored; if a later step fails, files stored so far are discarded again.
    fn attach_documents(
        &self,
        tx: &mut dyn LendingTransaction,
        application_id: ApplicationId,
        category: DocumentCategory,
        files: &[UploadedFile],
    ) -> Result<Vec<Document>, LendingError> {
        for file in files {
            self.intake().validate(file)?;
        }

        let mut stored = Vec::with_capacity(files.len());
        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let attached = self
                .intake()
                .store(application_id, category, file)
                .map_err(LendingError::from)
                .and_then(|url| {
                    stored.push(url.clone());
                    tx.insert_document(NewDocument {
                        loan_application_id: application_id,
                        document_type: category,
                        url,
                    })
                    .map_err(LendingError::from)
                });
            match attached {
                Ok(document) => documents.push(document),
                Err(error) => {
                    self.discard_locations(&stored);
                    return Err(error);
                }
            }
        }
        Ok(documents)
    }

    fn discard_documents(&self, documents: &[Document]) {
        for document in documents {
            self.discard_location(&document.url);
        }
    }

    fn discard_locations(&self, locations: &[String]) {
        for location in locations {
            self.discard_location(location);
        }
    }

    fn discard_location(&self, location: &str) {
        if let Err(error) = self.intake().discard(location) {
            warn!(%location, %error, "failed to discard uncommitted upload");
        }
    }
}

fn commit_update(
    mut tx: Box<dyn LendingTransaction + '_>,
    application: &LoanApplication,
) -> Result<LoanApplication, LendingError> {
    let updated = tx.update_application(application)?;
    tx.commit()?;
    Ok(updated)
}

pub(crate) fn ensure_assigned(
    application: &LoanApplication,
    officer_id: OfficerId,
) -> Result<(), LendingError> {
    if application.loan_officer_id != officer_id {
        return Err(LendingError::NotAssignedOfficer {
            application_id: application.id,
            officer_id,
        });
    }
    Ok(())
}

pub(crate) fn ensure_owner(
    application: &LoanApplication,
    customer_id: CustomerId,
) -> Result<(), LendingError> {
    if application.customer_id != customer_id {
        return Err(LendingError::NotOwner {
            application_id: application.id,
            customer_id,
        });
    }
    Ok(())
}
