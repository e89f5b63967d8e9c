use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of a loan application row.
    ApplicationId
);
row_id!(
    /// Identifier of a customer record.
    CustomerId
);
row_id!(
    /// Identifier of a loan officer record.
    OfficerId
);
row_id!(
    /// Identifier of a loan scheme.
    SchemeId
);
row_id!(InstallmentId);
row_id!(DocumentId);

/// Lifecycle status of a loan application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanApplicationStatus {
    Pending,
    PendingCollateral,
    CollateralUploaded,
    Approved,
    Rejected,
    PaidOff,
}

impl LoanApplicationStatus {
    /// Statuses counted as open work for officers and against the customer limit.
    pub const OPEN: [LoanApplicationStatus; 3] = [
        LoanApplicationStatus::Pending,
        LoanApplicationStatus::PendingCollateral,
        LoanApplicationStatus::CollateralUploaded,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LoanApplicationStatus::Pending => "pending",
            LoanApplicationStatus::PendingCollateral => "pending_collateral",
            LoanApplicationStatus::CollateralUploaded => "collateral_uploaded",
            LoanApplicationStatus::Approved => "approved",
            LoanApplicationStatus::Rejected => "rejected",
            LoanApplicationStatus::PaidOff => "paid_off",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(
            self,
            LoanApplicationStatus::Pending
                | LoanApplicationStatus::PendingCollateral
                | LoanApplicationStatus::CollateralUploaded
        )
    }

    /// Open work plus live loans; schemes backing these cannot change.
    pub const fn holds_scheme(self) -> bool {
        self.is_open() || matches!(self, LoanApplicationStatus::Approved)
    }

    /// Forward edges of the lifecycle graph.
    pub const fn can_transition_to(self, next: LoanApplicationStatus) -> bool {
        use LoanApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, PendingCollateral)
                | (Pending, Rejected)
                | (PendingCollateral, CollateralUploaded)
                | (PendingCollateral, Rejected)
                | (CollateralUploaded, Approved)
                | (CollateralUploaded, Rejected)
                | (Approved, PaidOff)
        )
    }
}

impl fmt::Display for LoanApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One customer's request against one scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: ApplicationId,
    pub customer_id: CustomerId,
    pub loan_scheme_id: SchemeId,
    pub loan_officer_id: OfficerId,
    pub amount: f64,
    pub status: LoanApplicationStatus,
    pub application_date: DateTime<Utc>,
    pub decision_date: Option<DateTime<Utc>>,
    pub is_npa: bool,
    /// Bumped by the store on every successful update.
    pub version: u64,
}

/// Insert payload for [`LoanApplication`]; the store assigns id and version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoanApplication {
    pub customer_id: CustomerId,
    pub loan_scheme_id: SchemeId,
    pub loan_officer_id: OfficerId,
    pub amount: f64,
    pub application_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

/// One scheduled payment obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_application_id: ApplicationId,
    pub amount_to_be_paid: f64,
    pub due_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub status: InstallmentStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInstallment {
    pub loan_application_id: ApplicationId,
    pub amount_to_be_paid: f64,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Personal,
    Collateral,
}

impl DocumentCategory {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentCategory::Personal => "personal_documents",
            DocumentCategory::Collateral => "collateral_documents",
        }
    }
}

/// Uploaded file reference attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub loan_application_id: ApplicationId,
    pub document_type: DocumentCategory,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub loan_application_id: ApplicationId,
    pub document_type: DocumentCategory,
    pub url: String,
}

/// A named byte stream handed over by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Identity fields shared by every kind of user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub is_active: bool,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(flatten)]
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOfficer {
    pub id: OfficerId,
    #[serde(flatten)]
    pub identity: Identity,
}

impl LoanOfficer {
    pub fn is_active(&self) -> bool {
        self.identity.is_active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeCategory {
    Retail,
    Corporate,
}

/// Product definition feeding the installment generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanScheme {
    pub id: SchemeId,
    pub name: String,
    pub category: SchemeCategory,
    /// Annual rate in percent.
    pub interest_rate: f64,
    /// Months.
    pub tenure: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoanScheme {
    pub name: String,
    pub category: SchemeCategory,
    pub interest_rate: f64,
    pub tenure: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    LoanOfficer,
    Customer,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "loan_officer" | "loanofficer" | "officer" => Some(Role::LoanOfficer),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

/// Authenticated caller resolved by the identity provider for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u64,
    pub role: Role,
}

/// Application together with its attached rows, as returned by the read operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationDetails {
    #[serde(flatten)]
    pub application: LoanApplication,
    pub documents: Vec<Document>,
    pub installments: Vec<Installment>,
}
