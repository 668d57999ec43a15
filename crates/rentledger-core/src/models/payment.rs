use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Tenant, ValidationError};
use crate::utils::{blank_to_none, format_currency};

/// How a rent payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Check,
    BankTransfer,
    Online,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Check,
        PaymentMethod::BankTransfer,
        PaymentMethod::Online,
    ];

    /// Value stored in the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Check => "Check",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::Online => "Online Payment",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| ValidationError::Invalid {
                field: "payment method",
                value: s.to_string(),
            })
    }
}

/// Settlement state of a rent payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Completed,
    Pending,
    Failed,
    /// Any status this client does not know about
    #[serde(other)]
    Other,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Other => "other",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "completed" => Ok(PaymentStatus::Completed),
            "pending" => Ok(PaymentStatus::Pending),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(ValidationError::Invalid {
                field: "payment status",
                value: s.to_string(),
            }),
        }
    }
}

/// Embedded tenant columns selected alongside a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRef {
    pub name: String,
}

/// Row of the `rent_payments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentPayment {
    pub id: String,
    pub tenant_id: String,
    pub amount_paid: f64,
    pub date_paid: NaiveDate,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, rename = "tenants", skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantRef>,
}

impl RentPayment {
    pub fn tenant_name(&self) -> &str {
        self.tenant
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("Unknown tenant")
    }

    pub fn amount_display(&self) -> String {
        format_currency(self.amount_paid)
    }

    pub fn notes_display(&self) -> &str {
        self.notes.as_deref().unwrap_or("No notes")
    }
}

/// Insert/update payload for the `rent_payments` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentDraft {
    pub tenant_id: String,
    pub amount_paid: f64,
    pub date_paid: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

impl PaymentDraft {
    /// New payment for a tenant, prefilled with their monthly rent and
    /// today's date.
    pub fn for_tenant(tenant: &Tenant) -> Self {
        Self {
            tenant_id: tenant.id.clone(),
            amount_paid: tenant.rent_amount,
            date_paid: Utc::now().date_naive(),
            payment_method: PaymentMethod::default(),
            status: PaymentStatus::default(),
            notes: None,
        }
    }

    /// Editable copy of an existing payment.
    pub fn from_payment(payment: &RentPayment) -> Self {
        Self {
            tenant_id: payment.tenant_id.clone(),
            amount_paid: payment.amount_paid,
            date_paid: payment.date_paid,
            payment_method: payment.payment_method,
            status: payment.status,
            notes: payment.notes.clone(),
        }
    }

    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.notes = blank_to_none(self.notes);
        if self.tenant_id.trim().is_empty() {
            return Err(ValidationError::Required("Tenant"));
        }
        if !self.amount_paid.is_finite() {
            return Err(ValidationError::Invalid {
                field: "amount paid",
                value: self.amount_paid.to_string(),
            });
        }
        if self.amount_paid < 0.0 {
            return Err(ValidationError::Negative("Amount paid"));
        }
        if self.status == PaymentStatus::Other {
            return Err(ValidationError::Invalid {
                field: "payment status",
                value: self.status.to_string(),
            });
        }
        Ok(self)
    }
}
