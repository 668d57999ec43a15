//! Terminal prompts.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use rentledger_core::models::ValidationError;

/// Ask for a line of input, falling back to `default` on an empty answer.
pub fn line(label: &str, default: Option<&str>) -> Result<String> {
    let mut stderr = io::stderr();
    match default {
        Some(default) => write!(stderr, "{} [{}]: ", label, default)?,
        None => write!(stderr, "{}: ", label)?,
    }
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read input")?;
    let answer = answer.trim();

    match (answer.is_empty(), default) {
        (true, Some(default)) => Ok(default.to_string()),
        (true, None) => anyhow::bail!("{} is required", label),
        (false, _) => Ok(answer.to_string()),
    }
}

pub fn password(label: &str) -> Result<String> {
    let value = rpassword::prompt_password(format!("{}: ", label)).context("Failed to read password")?;
    if value.is_empty() {
        return Err(ValidationError::Required("Password").into());
    }
    Ok(value)
}

/// Ask for a new password twice.
pub fn new_password() -> Result<String> {
    let first = password("New password")?;
    let second = password("Confirm password")?;
    check_confirmation(first, &second)
}

pub fn check_confirmation(password: String, confirmation: &str) -> Result<String> {
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch.into());
    }
    Ok(password)
}

/// Yes/no question, defaulting to no.
pub fn confirm(question: &str) -> Result<bool> {
    let answer = line(&format!("{} (y/N)", question), Some("n"))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_confirmation() {
        assert_eq!(check_confirmation("secret".into(), "secret").ok(), Some("secret".to_string()));
        let err = check_confirmation("secret".into(), "secreT").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::PasswordMismatch)
        );
    }
}
