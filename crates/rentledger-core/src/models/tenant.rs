use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ValidationError;
use crate::utils::{blank_to_none, format_currency, format_phone};

/// Tenant record owned by a landlord account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub rent_amount: f64,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Monthly rent formatted for listings, e.g. `$1200.00/month`
    pub fn rent_display(&self) -> String {
        format!("{}/month", format_currency(self.rent_amount))
    }

    /// Best available contact line: email, then formatted phone
    pub fn contact_display(&self) -> String {
        match (&self.email, &self.phone) {
            (Some(email), Some(phone)) => format!("{} / {}", email, format_phone(phone)),
            (Some(email), None) => email.clone(),
            (None, Some(phone)) => format_phone(phone),
            (None, None) => "-".to_string(),
        }
    }
}

/// Insert/update payload for the `tenants` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantDraft {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub rent_amount: f64,
    pub move_in_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub owner_id: String,
}

impl TenantDraft {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, rent_amount: f64) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            rent_amount,
            move_in_date: None,
            notes: None,
            owner_id: owner_id.into(),
        }
    }

    /// Prefill a draft from an existing record for editing.
    pub fn from_tenant(tenant: &Tenant, owner_id: impl Into<String>) -> Self {
        Self {
            name: tenant.name.clone(),
            email: tenant.email.clone(),
            phone: tenant.phone.clone(),
            rent_amount: tenant.rent_amount,
            move_in_date: tenant.move_in_date,
            notes: tenant.notes.clone(),
            owner_id: owner_id.into(),
        }
    }

    /// Trim text fields and turn blank optional fields into nulls, then
    /// check the required ones.
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.email = blank_to_none(self.email);
        self.phone = blank_to_none(self.phone);
        self.notes = blank_to_none(self.notes);

        if self.name.is_empty() {
            return Err(ValidationError::Required("Name"));
        }
        if !self.rent_amount.is_finite() {
            return Err(ValidationError::Invalid {
                field: "monthly rent",
                value: self.rent_amount.to_string(),
            });
        }
        if self.rent_amount < 0.0 {
            return Err(ValidationError::Negative("Monthly rent"));
        }
        if let Some(ref email) = self.email {
            if !email.contains('@') {
                return Err(ValidationError::Invalid {
                    field: "email",
                    value: email.clone(),
                });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_tenant(id: &str, name: &str, rent: f64) -> Tenant {
        Tenant {
            id: id.to_string(),
            owner_id: Some("owner-1".to_string()),
            name: name.to_string(),
            email: None,
            phone: None,
            rent_amount: rent,
            move_in_date: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_tenant_row() {
        let json = r#"{
            "id": "t-1",
            "owner_id": "owner-1",
            "name": "Jane Renter",
            "email": null,
            "phone": "5551234567",
            "rent_amount": 1250.5,
            "move_in_date": "2024-02-01",
            "notes": null,
            "created_at": "2024-01-20T08:00:00+00:00"
        }"#;
        let tenant: Tenant = serde_json::from_str(json).expect("Failed to parse tenant JSON");
        assert_eq!(tenant.name, "Jane Renter");
        assert_eq!(tenant.move_in_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(tenant.rent_display(), "$1250.50/month");
        assert_eq!(tenant.contact_display(), "(555) 123-4567");
    }

    #[test]
    fn test_draft_normalizes_blank_fields() {
        let mut draft = TenantDraft::new("owner-1", "  Jane  ", 900.0);
        draft.email = Some("   ".to_string());
        draft.notes = Some("".to_string());
        draft.phone = Some(" 555 ".to_string());

        let draft = draft.normalized().expect("valid draft");
        assert_eq!(draft.name, "Jane");
        assert_eq!(draft.email, None);
        assert_eq!(draft.notes, None);
        assert_eq!(draft.phone.as_deref(), Some("555"));
    }

    #[test]
    fn test_draft_rejects_missing_name_and_negative_rent() {
        assert_eq!(
            TenantDraft::new("o", " ", 10.0).normalized(),
            Err(ValidationError::Required("Name"))
        );
        assert_eq!(
            TenantDraft::new("o", "Jane", -1.0).normalized(),
            Err(ValidationError::Negative("Monthly rent"))
        );
        assert!(TenantDraft::new("o", "Jane", f64::NAN).normalized().is_err());
    }

    #[test]
    fn test_draft_serializes_nulls() {
        let draft = TenantDraft::new("owner-1", "Jane", 100.0);
        let value = serde_json::to_value(&draft).expect("serialize draft");
        assert_eq!(value["email"], serde_json::Value::Null);
        assert_eq!(value["owner_id"], "owner-1");
    }

    #[test]
    fn test_from_tenant_keeps_fields() {
        let mut tenant = sample_tenant("t-1", "Jane", 700.0);
        tenant.notes = Some("pays early".to_string());
        let draft = TenantDraft::from_tenant(&tenant, "owner-1");
        assert_eq!(draft.name, "Jane");
        assert_eq!(draft.rent_amount, 700.0);
        assert_eq!(draft.notes.as_deref(), Some("pays early"));
    }
}
