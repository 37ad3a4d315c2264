//! Authentication commands run against the backend and the local store.

use super::ClientSetup;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_backend::AuthApiError;
use chrono::SecondsFormat;
use session_model::SessionRecord;
use session_store::SessionStore;
use std::io::{self, Write};

/// Log in with email and password.
pub async fn login(
    setup: &ClientSetup,
    email: Option<&str>,
    password: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    if let Ok(Some(record)) = setup.store.get() {
        if record.is_valid() {
            output::print_success(
                &format!("Already logged in as {}", record.user.email),
                format,
            );
            return Ok(());
        }
    }

    let email = match email {
        Some(email) => email.to_string(),
        None => prompt_line("Email")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = match password {
        Some(password) => password.to_string(),
        None => rpassword::prompt_password("Password: ")?,
    };
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    println!("Logging in...");
    match setup.service.login(&email, &password).await {
        Ok(record) => {
            output::print_success(&format!("Logged in as {}", record.user.email), format);
        }
        Err(e) => {
            output::print_error(&format!("Login failed: {}", e), format);
        }
    }

    Ok(())
}

/// Create an account and log in.
pub async fn register(
    setup: &ClientSetup,
    email: Option<&str>,
    password: Option<&str>,
    name: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let email = match email {
        Some(email) => email.to_string(),
        None => prompt_line("Email")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = match password {
        Some(password) => password.to_string(),
        None => {
            let entered = rpassword::prompt_password("Password: ")?;
            if !entered.is_empty() {
                let confirmed = rpassword::prompt_password("Confirm password: ")?;
                if confirmed != entered {
                    output::print_error("Passwords do not match", format);
                    return Ok(());
                }
            }
            entered
        }
    };
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    println!("Creating account...");
    match setup.service.register(&email, &password, name).await {
        Ok(record) => {
            output::print_success(&format!("Registered as {}", record.user.email), format);
        }
        Err(e) => {
            output::print_error(&format!("Registration failed: {}", e), format);
        }
    }

    Ok(())
}

/// Log out and clear the stored session.
pub async fn logout(setup: &ClientSetup, format: &OutputFormat) -> Result<()> {
    if !setup.store.has().unwrap_or(true) {
        output::print_success("Not logged in", format);
        return Ok(());
    }

    match setup.service.logout().await {
        Ok(()) => output::print_success("Logged out successfully", format),
        Err(e) => output::print_error(&format!("Logout failed: {}", e), format),
    }

    Ok(())
}

/// Show the stored session. Reads only the local store; tokens are never
/// printed.
pub async fn status(setup: &ClientSetup, format: &OutputFormat) -> Result<()> {
    let record = match setup.store.get() {
        Ok(record) => record,
        Err(e) => {
            output::print_error(&format!("Could not read session: {}", e), format);
            return Ok(());
        }
    };

    match record {
        None => match format {
            OutputFormat::Text => println!("Auth:     not logged in"),
            OutputFormat::Json => println!(r#"{{"logged_in":false}}"#),
        },
        Some(record) => print_record(&record, format)?,
    }

    Ok(())
}

/// Exchange the refresh token for new session tokens.
pub async fn refresh(setup: &ClientSetup, format: &OutputFormat) -> Result<()> {
    match setup.service.refresh().await {
        Ok(record) => {
            output::print_success(
                &format!("Session refreshed; expires {}", format_epoch_ms(record.expires_at_epoch_ms)),
                format,
            );
        }
        Err(AuthApiError::NotAuthenticated) => {
            output::print_error("Not logged in", format);
        }
        Err(AuthApiError::SessionExpired) => {
            // The refresh token is dead; completing the forced logout
            // locally keeps the next `status` honest.
            let _ = setup.store.clear();
            output::print_error("Session expired. Please sign in again.", format);
        }
        Err(e) => {
            output::print_error(&format!("Refresh failed: {}", e), format);
        }
    }

    Ok(())
}

fn print_record(record: &SessionRecord, format: &OutputFormat) -> Result<()> {
    let valid = record.is_valid();
    let expires = format_epoch_ms(record.expires_at_epoch_ms);

    match format {
        OutputFormat::Text => {
            if valid {
                println!("Auth:     logged in");
            } else {
                println!("Auth:     logged in (expired)");
            }
            output::print_row("User ID", &record.user.user_id);
            output::print_row("Email", &record.user.email);
            if let Some(name) = &record.user.display_name {
                output::print_row("Name", name);
            }
            output::print_row("Plan", &record.user.plan_tier.to_string());
            output::print_row("Credits", &record.user.credit_balance.to_string());
            output::print_row("Expires", &expires);
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "logged_in": true,
                "valid": valid,
                "user_id": record.user.user_id,
                "email": record.user.email,
                "display_name": record.user.display_name,
                "plan_tier": record.user.plan_tier,
                "credit_balance": record.user.credit_balance,
                "expires_at": expires,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn format_epoch_ms(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| format!("epoch_ms {}", epoch_ms))
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_epoch_ms_renders_rfc3339() {
        assert_eq!(format_epoch_ms(4_102_444_800_000), "2100-01-01T00:00:00Z");
    }

    #[test]
    fn format_epoch_ms_survives_out_of_range() {
        let rendered = format_epoch_ms(i64::MAX);
        assert!(rendered.contains("epoch_ms"));
    }
}
