use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use tracing::{debug, warn};

use rentledger_core::auth::{AuthState, CallbackLink, OtpType};
use rentledger_core::models::{
    DashboardStats, PaymentDraft, PaymentMethod, PaymentStatus, RentPayment, Tenant, TenantDraft,
};
use rentledger_core::utils::{format_currency, format_date, format_optional, truncate_string};
use rentledger_core::{AuthClient, Config, RestClient, Session, SessionManager};

use crate::prompt;

/// Landing path for emailed auth links
const CALLBACK_PATH: &str = "/auth/callback";

/// Column widths for listings
const NAME_WIDTH: usize = 24;
const CONTACT_WIDTH: usize = 32;
const NOTES_WIDTH: usize = 30;

/// Login failures are reported the same way whatever the cause
const CREDENTIALS_MISMATCH: &str = "Credentials not matched. Please check your email and password.";

pub struct Context {
    pub config: Config,
    pub auth: Arc<AuthClient>,
    pub rest: RestClient,
    pub manager: SessionManager,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account
    Signup {
        email: String,
        /// Name shown in the app
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign in with email and password
    Signin { email: Option<String> },
    Signout,
    /// Show the signed-in account
    Whoami,
    /// Email a password reset link
    ResetPassword { email: String },
    /// Email a one-time sign-in link
    MagicLink { email: String },
    /// Confirm an emailed token hash
    Verify {
        token_hash: String,
        #[arg(long = "type", default_value = "signup")]
        otp_type: OtpType,
    },
    /// Complete sign-in from a callback link pasted from the browser
    Callback { link: String },
    UpdatePassword,
    /// Request an email address change
    UpdateEmail { email: String },
    #[command(subcommand)]
    Tenants(TenantCommand),
    #[command(subcommand)]
    Payments(PaymentCommand),
    /// Summary of tenants and payments
    Dashboard,
}

#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    List,
    Add(TenantFields),
    Edit {
        id: String,
        #[command(flatten)]
        fields: TenantFields,
    },
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct TenantFields {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    /// Monthly rent
    #[arg(long)]
    pub rent: Option<f64>,
    /// Move-in date (YYYY-MM-DD)
    #[arg(long)]
    pub move_in: Option<NaiveDate>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl TenantFields {
    /// Apply the given fields on top of `draft`.
    fn apply(self, mut draft: TenantDraft) -> TenantDraft {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(email) = self.email {
            draft.email = Some(email);
        }
        if let Some(phone) = self.phone {
            draft.phone = Some(phone);
        }
        if let Some(rent) = self.rent {
            draft.rent_amount = rent;
        }
        if let Some(move_in) = self.move_in {
            draft.move_in_date = Some(move_in);
        }
        if let Some(notes) = self.notes {
            draft.notes = Some(notes);
        }
        draft
    }
}

#[derive(Subcommand, Debug)]
pub enum PaymentCommand {
    List,
    /// Record a payment; amount defaults to the tenant's monthly rent
    Record {
        tenant_id: String,
        #[arg(long)]
        amount: Option<f64>,
        /// Date paid (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long, default_value = "completed")]
        status: PaymentStatus,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change an existing payment
    Edit {
        id: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        method: Option<PaymentMethod>,
        #[arg(long)]
        status: Option<PaymentStatus>,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(ctx: &mut Context, command: Command) -> Result<()> {
    debug!(?command, "Running command");
    match command {
        Command::Signup { email, name } => sign_up(ctx, &email, name.as_deref()).await,
        Command::Signin { email } => sign_in(ctx, email).await,
        Command::Signout => {
            ctx.manager.sign_out().await?;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            print_account(&ctx.manager.state());
            Ok(())
        }
        Command::ResetPassword { email } => {
            let redirect = ctx.config.redirect_target(CALLBACK_PATH);
            ctx.auth.reset_password_for_email(email.trim(), &redirect).await?;
            println!("Check your email for password reset instructions.");
            Ok(())
        }
        Command::MagicLink { email } => {
            let redirect = ctx.config.redirect_target(CALLBACK_PATH);
            ctx.auth.sign_in_with_otp(email.trim(), &redirect).await?;
            println!("Check your email for a magic link to sign in.");
            Ok(())
        }
        Command::Verify { token_hash, otp_type } => {
            ctx.auth.verify_otp(&token_hash, otp_type).await?;
            println!("{}", otp_type.success_message());
            Ok(())
        }
        Command::Callback { link } => callback(ctx, &link).await,
        Command::UpdatePassword => {
            require_session(&ctx.manager.state())?;
            let password = prompt::new_password()?;
            ctx.auth.update_password(&password).await?;
            println!("Password updated successfully.");
            Ok(())
        }
        Command::UpdateEmail { email } => {
            require_session(&ctx.manager.state())?;
            let redirect = ctx.config.redirect_target(CALLBACK_PATH);
            ctx.auth.update_email(email.trim(), &redirect).await?;
            println!("Check both your old and new email for confirmation links.");
            Ok(())
        }
        Command::Tenants(command) => tenants(ctx, command).await,
        Command::Payments(command) => payments(ctx, command).await,
        Command::Dashboard => {
            let session = require_session(&ctx.manager.state())?;
            let stats = ctx
                .rest
                .dashboard_stats(&session.user.id, &session)
                .await
                .context("Failed to load dashboard")?;
            print_dashboard(&stats);
            Ok(())
        }
    }
}

// ===== Account =====

async fn sign_up(ctx: &mut Context, email: &str, name: Option<&str>) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = prompt::password("Password")?;
    let confirmation = prompt::password("Confirm password")?;
    let password = prompt::check_confirmation(password, &confirmation)?;

    ctx.manager.sign_up(email, &password, name).await?;
    ctx.config.last_email = Some(email.to_string());

    let state = ctx.manager.wait_until_resolved().await;
    match state.user() {
        Some(user) => println!("Account created. Signed in as {}.", user.display_name()),
        None => println!("Check your email to confirm your account."),
    }
    Ok(())
}

async fn sign_in(ctx: &mut Context, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email.trim().to_string(),
        None => prompt::line("Email", ctx.config.last_email.as_deref())?,
    };

    if ctx.rest.profile_email_exists(&email).await == Some(false) {
        bail!("Credentials not matched. Please check your email and try again.");
    }

    let password = prompt::password("Password")?;
    if let Err(e) = ctx.manager.sign_in(&email, &password).await {
        warn!(error = %e, "Sign-in failed");
        if e.is_rejection() {
            bail!(CREDENTIALS_MISMATCH);
        }
        return Err(e.into());
    }
    ctx.config.last_email = Some(email);

    let state = ctx.manager.wait_until_resolved().await;
    match state.user() {
        Some(user) => {
            println!("Signed in as {}.", user.display_name());
            Ok(())
        }
        // The profile check signed the session out again
        None => bail!("This account has no profile. Please contact support."),
    }
}

async fn callback(ctx: &mut Context, link: &str) -> Result<()> {
    let parsed = CallbackLink::parse(link).map_err(anyhow::Error::msg)?;
    match parsed {
        CallbackLink::Verify { token_hash, otp_type } => {
            ctx.auth
                .verify_otp(&token_hash, otp_type)
                .await
                .context("Authentication failed. Please try again.")?;
            println!("{}", otp_type.success_message());
        }
        CallbackLink::Tokens {
            access_token,
            refresh_token,
        } => {
            ctx.auth
                .set_session(&access_token, &refresh_token)
                .await
                .context("Authentication failed. Please try again.")?;
            println!("Successfully signed in with magic link!");
        }
    }
    Ok(())
}

fn require_session(state: &AuthState) -> Result<Session> {
    state
        .session()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Not signed in. Run `rentledger signin` first."))
}

fn print_account(state: &AuthState) {
    match state.session() {
        Some(session) => {
            println!("Name:     {}", session.user.display_name());
            println!("Email:    {}", format_optional(&session.user.email, "-"));
            println!("User ID:  {}", session.user.id);
            println!("Since:    {}", format_date(session.user.created_at.date_naive()));
            println!("Session:  expires in {} min", session.minutes_until_expiry());
        }
        None => println!("Not signed in."),
    }
}

// ===== Tenants =====

async fn tenants(ctx: &mut Context, command: TenantCommand) -> Result<()> {
    let session = require_session(&ctx.manager.state())?;
    let owner_id = session.user.id.clone();

    match command {
        TenantCommand::List => {
            let tenants = ctx
                .rest
                .list_tenants(&owner_id, &session)
                .await
                .context("Failed to fetch tenants")?;
            print_tenants(&tenants);
        }
        TenantCommand::Add(fields) => {
            let name = fields.name.clone().unwrap_or_default();
            let draft = fields
                .apply(TenantDraft::new(owner_id.as_str(), name, 0.0))
                .normalized()?;
            let tenant = ctx
                .rest
                .create_tenant(&draft, &session)
                .await
                .context("Failed to add tenant")?;
            println!("Tenant added successfully ({}).", tenant.id);
        }
        TenantCommand::Edit { id, fields } => {
            let existing = ctx.rest.get_tenant(&id, &session).await?;
            let draft = fields
                .apply(TenantDraft::from_tenant(&existing, owner_id.as_str()))
                .normalized()?;
            ctx.rest
                .update_tenant(&id, &draft, &session)
                .await
                .context("Failed to update tenant")?;
            println!("Tenant updated successfully.");
        }
        TenantCommand::Delete { id, yes } => {
            if !yes && !prompt::confirm("Delete this tenant and their payment history?")? {
                println!("Cancelled.");
                return Ok(());
            }
            ctx.rest
                .delete_tenant(&id, &session)
                .await
                .context("Failed to delete tenant")?;
            println!("Tenant deleted successfully.");
        }
    }
    Ok(())
}

fn print_tenants(tenants: &[Tenant]) {
    if tenants.is_empty() {
        println!("No tenants yet. Add one with `rentledger tenants add --name <NAME> --rent <AMOUNT>`.");
        return;
    }
    println!(
        "{:<36}  {:<name$}  {:<contact$}  {:>14}  {}",
        "ID",
        "NAME",
        "CONTACT",
        "RENT",
        "MOVE-IN",
        name = NAME_WIDTH,
        contact = CONTACT_WIDTH
    );
    for tenant in tenants {
        println!(
            "{:<36}  {:<name$}  {:<contact$}  {:>14}  {}",
            tenant.id,
            truncate_string(&tenant.name, NAME_WIDTH),
            truncate_string(&tenant.contact_display(), CONTACT_WIDTH),
            tenant.rent_display(),
            tenant.move_in_date.map(format_date).unwrap_or_else(|| "-".to_string()),
            name = NAME_WIDTH,
            contact = CONTACT_WIDTH
        );
    }
}

// ===== Payments =====

async fn payments(ctx: &mut Context, command: PaymentCommand) -> Result<()> {
    let session = require_session(&ctx.manager.state())?;

    match command {
        PaymentCommand::List => {
            let payments = ctx
                .rest
                .list_payments(&session)
                .await
                .context("Failed to fetch payments")?;
            print_payments(&payments);
        }
        PaymentCommand::Record {
            tenant_id,
            amount,
            date,
            method,
            status,
            notes,
        } => {
            let tenant = ctx.rest.get_tenant(&tenant_id, &session).await?;
            let mut draft = PaymentDraft::for_tenant(&tenant);
            if let Some(amount) = amount {
                draft.amount_paid = amount;
            }
            if let Some(date) = date {
                draft.date_paid = date;
            }
            draft.payment_method = method;
            draft.status = status;
            draft.notes = notes;
            let draft = draft.normalized()?;

            ctx.rest
                .record_payment(&draft, &session)
                .await
                .context("Failed to record payment")?;
            println!(
                "Recorded {} from {} on {}.",
                format_currency(draft.amount_paid),
                tenant.name,
                format_date(draft.date_paid)
            );
        }
        PaymentCommand::Edit {
            id,
            amount,
            date,
            method,
            status,
            notes,
        } => {
            let payments = ctx.rest.list_payments(&session).await?;
            let existing = payments
                .iter()
                .find(|p| p.id == id)
                .ok_or_else(|| anyhow::anyhow!("Payment {} not found", id))?;
            let mut draft = PaymentDraft::from_payment(existing);
            if let Some(amount) = amount {
                draft.amount_paid = amount;
            }
            if let Some(date) = date {
                draft.date_paid = date;
            }
            if let Some(method) = method {
                draft.payment_method = method;
            }
            if let Some(status) = status {
                draft.status = status;
            }
            if notes.is_some() {
                draft.notes = notes;
            }
            let draft = draft.normalized()?;
            ctx.rest
                .update_payment(&id, &draft, &session)
                .await
                .context("Failed to update payment")?;
            println!("Payment updated successfully.");
        }
        PaymentCommand::Delete { id, yes } => {
            if !yes && !prompt::confirm("Delete this payment?")? {
                println!("Cancelled.");
                return Ok(());
            }
            ctx.rest
                .delete_payment(&id, &session)
                .await
                .context("Failed to delete payment")?;
            println!("Payment deleted successfully.");
        }
    }
    Ok(())
}

fn print_payments(payments: &[RentPayment]) {
    if payments.is_empty() {
        println!("No payments recorded yet.");
        return;
    }
    println!(
        "{:<12}  {:<name$}  {:>12}  {:<14}  {:<9}  {}",
        "DATE",
        "TENANT",
        "AMOUNT",
        "METHOD",
        "STATUS",
        "NOTES",
        name = NAME_WIDTH
    );
    for payment in payments {
        println!(
            "{:<12}  {:<name$}  {:>12}  {:<14}  {:<9}  {}",
            format_date(payment.date_paid),
            truncate_string(payment.tenant_name(), NAME_WIDTH),
            payment.amount_display(),
            payment.payment_method.display_name(),
            payment.status,
            truncate_string(payment.notes_display(), NOTES_WIDTH),
            name = NAME_WIDTH
        );
    }
}

fn print_dashboard(stats: &DashboardStats) {
    println!("Total tenants:     {}", stats.total_tenants);
    println!("Total revenue:     {}", format_currency(stats.total_revenue));
    println!("Pending payments:  {}", stats.pending_payments);
    println!("Failed payments:   {}", stats.failed_payments);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_fields_override_only_given_values() {
        let draft = TenantDraft::new("owner-1", "Jane", 900.0);
        let fields = TenantFields {
            rent: Some(950.0),
            notes: Some("renewed".to_string()),
            ..Default::default()
        };
        let draft = fields.apply(draft);
        assert_eq!(draft.name, "Jane");
        assert_eq!(draft.rent_amount, 950.0);
        assert_eq!(draft.notes.as_deref(), Some("renewed"));
        assert_eq!(draft.email, None);
    }

    #[test]
    fn test_add_without_name_fails_validation() {
        let fields = TenantFields {
            rent: Some(100.0),
            ..Default::default()
        };
        let name = fields.name.clone().unwrap_or_default();
        let result = fields.apply(TenantDraft::new("owner-1", name, 0.0)).normalized();
        assert!(result.is_err());
    }

    #[test]
    fn test_payment_record_defaults() {
        #[derive(clap::Parser)]
        struct Harness {
            #[command(subcommand)]
            command: PaymentCommand,
        }
        let parsed = <Harness as clap::Parser>::try_parse_from([
            "payments", "record", "t-1", "--amount", "650.5", "--method", "bank transfer",
        ])
        .expect("valid arguments");
        match parsed.command {
            PaymentCommand::Record {
                tenant_id,
                amount,
                date,
                method,
                status,
                ..
            } => {
                assert_eq!(tenant_id, "t-1");
                assert_eq!(amount, Some(650.5));
                assert_eq!(date, None);
                assert_eq!(method, PaymentMethod::BankTransfer);
                assert_eq!(status, PaymentStatus::Completed);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_require_session_when_signed_out() {
        let state = AuthState::initial();
        let err = require_session(&state).unwrap_err();
        assert!(err.to_string().contains("Not signed in"));
    }
}
