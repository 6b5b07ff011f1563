//! Model-backed tasks other than question answering

use super::answer::AnswerStatus;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which task produced a `TaskRecord`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summary,
    Analysis,
    Drafting,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Summary => "summary",
            TaskKind::Analysis => "analysis",
            TaskKind::Drafting => "drafting",
        }
    }
}

/// Legal instruments Counsel can draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Contract,
    Agreement,
    Notice,
    Petition,
    Affidavit,
    Memorandum,
    Lease,
    Will,
    PowerOfAttorney,
    EmploymentContract,
    ServiceAgreement,
    NonDisclosureAgreement,
    PartnershipAgreement,
    SaleAgreement,
    RentalAgreement,
    LoanAgreement,
    LicenseAgreement,
    FranchiseAgreement,
    JointVentureAgreement,
    ShareholderAgreement,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 20] = [
        DocumentKind::Contract,
        DocumentKind::Agreement,
        DocumentKind::Notice,
        DocumentKind::Petition,
        DocumentKind::Affidavit,
        DocumentKind::Memorandum,
        DocumentKind::Lease,
        DocumentKind::Will,
        DocumentKind::PowerOfAttorney,
        DocumentKind::EmploymentContract,
        DocumentKind::ServiceAgreement,
        DocumentKind::NonDisclosureAgreement,
        DocumentKind::PartnershipAgreement,
        DocumentKind::SaleAgreement,
        DocumentKind::RentalAgreement,
        DocumentKind::LoanAgreement,
        DocumentKind::LicenseAgreement,
        DocumentKind::FranchiseAgreement,
        DocumentKind::JointVentureAgreement,
        DocumentKind::ShareholderAgreement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Contract => "contract",
            DocumentKind::Agreement => "agreement",
            DocumentKind::Notice => "notice",
            DocumentKind::Petition => "petition",
            DocumentKind::Affidavit => "affidavit",
            DocumentKind::Memorandum => "memorandum",
            DocumentKind::Lease => "lease",
            DocumentKind::Will => "will",
            DocumentKind::PowerOfAttorney => "power_of_attorney",
            DocumentKind::EmploymentContract => "employment_contract",
            DocumentKind::ServiceAgreement => "service_agreement",
            DocumentKind::NonDisclosureAgreement => "non_disclosure_agreement",
            DocumentKind::PartnershipAgreement => "partnership_agreement",
            DocumentKind::SaleAgreement => "sale_agreement",
            DocumentKind::RentalAgreement => "rental_agreement",
            DocumentKind::LoanAgreement => "loan_agreement",
            DocumentKind::LicenseAgreement => "license_agreement",
            DocumentKind::FranchiseAgreement => "franchise_agreement",
            DocumentKind::JointVentureAgreement => "joint_venture_agreement",
            DocumentKind::ShareholderAgreement => "shareholder_agreement",
        }
    }

    /// Name as written in prose, e.g. "power of attorney"
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; spaces and hyphens count as underscores
impl FromStr for DocumentKind {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        if normalized.is_empty() {
            return Err(AppError::InvalidInput {
                message: "Document type cannot be empty".to_string(),
                field: Some("document_type".to_string()),
            });
        }

        DocumentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = DocumentKind::ALL.iter().map(|k| k.as_str()).collect();
                AppError::InvalidInput {
                    message: format!(
                        "Invalid document type '{}'. Must be one of: {}",
                        name.trim(),
                        valid.join(", ")
                    ),
                    field: Some("document_type".to_string()),
                }
            })
    }
}

/// Result of a summary, analysis or drafting request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,

    pub task: TaskKind,

    /// Model output, or an apology when degraded
    pub output: String,

    /// `None` when every candidate failed
    pub model_used: Option<String>,

    pub success: bool,

    pub status: AnswerStatus,

    pub completed_at: DateTime<Utc>,

    pub processing_time_ms: u64,
}

impl TaskRecord {
    pub fn is_degraded(&self) -> bool {
        self.status == AnswerStatus::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_parsing_normalizes() {
        assert_eq!("Contract".parse::<DocumentKind>().unwrap(), DocumentKind::Contract);
        assert_eq!(
            "  Power of Attorney ".parse::<DocumentKind>().unwrap(),
            DocumentKind::PowerOfAttorney
        );
        assert_eq!(
            "non-disclosure-agreement".parse::<DocumentKind>().unwrap(),
            DocumentKind::NonDisclosureAgreement
        );
        assert_eq!(DocumentKind::PowerOfAttorney.label(), "power of attorney");
    }

    #[test]
    fn test_document_kind_rejects_unknown_and_empty() {
        for name in ["", "   ", "prenup"] {
            match name.parse::<DocumentKind>() {
                Err(AppError::InvalidInput { field, .. }) => assert_eq!(field.as_deref(), Some("document_type")),
                other => panic!("expected InvalidInput for {:?}, got {:?}", name, other),
            }
        }

        let err = "prenup".parse::<DocumentKind>().unwrap_err();
        assert!(err.to_string().contains("shareholder_agreement"));
    }

    #[test]
    fn test_every_kind_round_trips_through_its_name() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }
}
