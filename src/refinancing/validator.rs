use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::RefinancingPolicy;
use crate::decimal::Money;

/// a single validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// structured validation result: hard errors block creation, warnings are
/// informational only. expected validation failures never surface as Err.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(field, message));
    }
}

/// validate refinancing parameters before a draft is persisted.
/// pure and side-effect free; date comparison is date-only.
pub fn validate(
    principal: Money,
    down_payment_percent: u32,
    installments: u32,
    start_due_date: Option<NaiveDate>,
    policy: &RefinancingPolicy,
    today: NaiveDate,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !principal.is_positive() {
        report.error("principal", format!("principal must be positive, got {}", principal));
    }

    if !policy.installments_in_range(installments) {
        report.error(
            "installments",
            format!(
                "installments must be between {} and {}, got {}",
                policy.min_installments, policy.max_installments, installments
            ),
        );
    } else if installments == 1 {
        report.warn(
            "installments",
            "a single installment defers the whole debt to one date",
        );
    }

    if !policy.down_payment_in_range(down_payment_percent) {
        report.error(
            "down_payment_percent",
            format!(
                "down payment percent must be at most {}, got {}",
                policy.max_down_payment_percent, down_payment_percent
            ),
        );
    } else if down_payment_percent > policy.high_down_payment_percent {
        report.warn(
            "down_payment_percent",
            format!(
                "down payment of {}% leaves little to defer",
                down_payment_percent
            ),
        );
    }

    match start_due_date {
        None => report.error("start_due_date", "start due date is required"),
        Some(date) if date < today => {
            report.error(
                "start_due_date",
                format!("start due date {} is earlier than today {}", date, today),
            );
        }
        Some(_) => {}
    }

    report
}
