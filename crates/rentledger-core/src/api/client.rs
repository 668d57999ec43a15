//! Client for the backend's REST data API (`/rest/v1`).
//!
//! Every call is authorised with the caller's session, so row-level
//! security on the backend decides what an owner can see.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::auth::{ProfileLookup, Session};
use crate::config::BackendSettings;
use crate::models::{DashboardStats, PaymentDraft, Profile, RentPayment, Tenant, TenantDraft};

// ============================================================================
// Constants
// ============================================================================

/// Path of the data API below the backend URL
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Columns selected for the payments listing, with the tenant's name embedded
const PAYMENT_COLUMNS: &str = "*,tenants(name)";

/// Data API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Arc<str>,
    anon_key: Arc<str>,
}

impl RestClient {
    pub fn new(backend: &BackendSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/{}", backend.url.trim_end_matches('/'), REST_PATH).into(),
            anon_key: backend.anon_key.as_str().into(),
        })
    }

    fn request(&self, method: Method, table: &str, session: Option<&Session>) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, table);
        let token = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(&*self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &*self.anon_key)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request built by `build`, backing off while rate limited.
    async fn execute<F>(&self, what: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;
            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(request = what, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn fetch<T: DeserializeOwned, F>(&self, what: &str, build: F) -> Result<T, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.execute(what, build).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    /// Write `body` and return the stored row.
    async fn write_one<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        table: &str,
        id: Option<&str>,
        body: &B,
        session: &Session,
    ) -> Result<T, ApiError> {
        let what = format!("{} {}", method, table);
        let rows: Vec<T> = self
            .fetch(&what, || {
                let mut request = self
                    .request(method.clone(), table, Some(session))
                    .header("Prefer", "return=representation")
                    .json(body);
                if let Some(id) = id {
                    request = request.query(&[("id", format!("eq.{}", id))]);
                }
                request
            })
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("{} row was not returned", table)))
    }

    // ===== Profiles =====

    pub async fn find_profile(&self, user_id: &str, session: &Session) -> Result<Option<Profile>, ApiError> {
        let rows: Vec<Profile> = self
            .fetch("profile", || {
                self.request(Method::GET, "profiles", Some(session))
                    .query(&[("id", format!("eq.{}", user_id)), ("select", "*".to_string())])
            })
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Whether an account with this email has a profile. `None` when the
    /// lookup itself failed, which is not the same as "no account".
    pub async fn profile_email_exists(&self, email: &str) -> Option<bool> {
        let result: Result<Vec<Profile>, ApiError> = self
            .fetch("profile email", || self.email_lookup(email))
            .await;
        match result {
            Ok(rows) => Some(!rows.is_empty()),
            Err(e) => {
                debug!(error = %e, "Email lookup failed");
                None
            }
        }
    }

    /// Exact match on the stored address, surrounding whitespace ignored.
    fn email_lookup(&self, email: &str) -> RequestBuilder {
        self.request(Method::GET, "profiles", None)
            .query(&[("email", format!("eq.{}", email.trim())), ("select", "id".to_string())])
    }

    // ===== Tenants =====

    /// Owner's tenants, newest first.
    pub async fn list_tenants(&self, owner_id: &str, session: &Session) -> Result<Vec<Tenant>, ApiError> {
        let tenants: Vec<Tenant> = self
            .fetch("tenants", || {
                self.request(Method::GET, "tenants", Some(session)).query(&[
                    ("select", "*".to_string()),
                    ("owner_id", format!("eq.{}", owner_id)),
                    ("order", "created_at.desc".to_string()),
                ])
            })
            .await?;
        debug!(count = tenants.len(), "Fetched tenants");
        Ok(tenants)
    }

    pub async fn get_tenant(&self, id: &str, session: &Session) -> Result<Tenant, ApiError> {
        let rows: Vec<Tenant> = self
            .fetch("tenant", || {
                self.request(Method::GET, "tenants", Some(session))
                    .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            })
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("tenant {}", id)))
    }

    pub async fn create_tenant(&self, draft: &TenantDraft, session: &Session) -> Result<Tenant, ApiError> {
        let tenant: Tenant = self.write_one(Method::POST, "tenants", None, draft, session).await?;
        info!(tenant_id = %tenant.id, "Tenant added");
        Ok(tenant)
    }

    pub async fn update_tenant(&self, id: &str, draft: &TenantDraft, session: &Session) -> Result<Tenant, ApiError> {
        let tenant: Tenant = self.write_one(Method::PATCH, "tenants", Some(id), draft, session).await?;
        info!(tenant_id = %tenant.id, "Tenant updated");
        Ok(tenant)
    }

    pub async fn delete_tenant(&self, id: &str, session: &Session) -> Result<(), ApiError> {
        self.execute("delete tenant", || {
            self.request(Method::DELETE, "tenants", Some(session))
                .query(&[("id", format!("eq.{}", id))])
        })
        .await?;
        info!(tenant_id = %id, "Tenant deleted");
        Ok(())
    }

    // ===== Payments =====

    /// Payments visible to the session, most recent first.
    pub async fn list_payments(&self, session: &Session) -> Result<Vec<RentPayment>, ApiError> {
        let payments: Vec<RentPayment> = self
            .fetch("payments", || {
                self.request(Method::GET, "rent_payments", Some(session)).query(&[
                    ("select", PAYMENT_COLUMNS),
                    ("order", "date_paid.desc"),
                ])
            })
            .await?;
        debug!(count = payments.len(), "Fetched payments");
        Ok(payments)
    }

    pub async fn record_payment(&self, draft: &PaymentDraft, session: &Session) -> Result<RentPayment, ApiError> {
        let payment: RentPayment = self
            .write_one(Method::POST, "rent_payments", None, draft, session)
            .await?;
        info!(payment_id = %payment.id, tenant_id = %payment.tenant_id, "Payment recorded");
        Ok(payment)
    }

    pub async fn update_payment(
        &self,
        id: &str,
        draft: &PaymentDraft,
        session: &Session,
    ) -> Result<RentPayment, ApiError> {
        let payment: RentPayment = self
            .write_one(Method::PATCH, "rent_payments", Some(id), draft, session)
            .await?;
        info!(payment_id = %payment.id, "Payment updated");
        Ok(payment)
    }

    pub async fn delete_payment(&self, id: &str, session: &Session) -> Result<(), ApiError> {
        self.execute("delete payment", || {
            self.request(Method::DELETE, "rent_payments", Some(session))
                .query(&[("id", format!("eq.{}", id))])
        })
        .await?;
        info!(payment_id = %id, "Payment deleted");
        Ok(())
    }

    // ===== Dashboard =====

    pub async fn dashboard_stats(&self, owner_id: &str, session: &Session) -> Result<DashboardStats, ApiError> {
        let (tenants, payments) = futures::try_join!(
            self.list_tenants(owner_id, session),
            self.list_payments(session)
        )?;
        Ok(DashboardStats::compute(&tenants, &payments))
    }
}

#[async_trait]
impl ProfileLookup for RestClient {
    async fn find_profile_by_id(&self, user_id: &str, session: &Session) -> Result<Option<Profile>, ApiError> {
        self.find_profile(user_id, session).await
    }
}
