//! login / logout / status commands

use anyhow::{Context, Result};

use super::{open_session, HttpTransport, Provider, SessionState, TokenStore};
use crate::config::Config;

/// Drive the provider's session to a valid token, prompting if needed.
pub async fn login(config: &Config, provider: Provider, force: bool) -> Result<()> {
    let transport = HttpTransport::new(config.http_timeout())?;
    let mut session = open_session(config, provider, transport)?;

    if force {
        tracing::info!("Discarding cached {} credential", provider.label());
        session.reset()?;
    } else if session.inspect().0 == SessionState::Valid {
        println!(
            "Already logged in to {} (token valid). Use --force to re-authenticate.",
            provider.label()
        );
        return Ok(());
    }

    session
        .acquire()
        .await
        .with_context(|| format!("{} login failed", provider.label()))?;
    println!("Logged in to {}.", provider.label());
    Ok(())
}

/// Clear stored credentials
pub async fn logout(config: &Config, provider: Provider) -> Result<()> {
    let store = super::JsonFileStore::new(config.token_file(provider));
    store.clear()?;
    println!("Logged out of {}.", provider.label());
    Ok(())
}

/// Display current auth status
pub async fn status(config: &Config) -> Result<()> {
    let transport = HttpTransport::new(config.http_timeout())?;

    for provider in Provider::ALL {
        let target = config.target(provider);
        let label = format!("{}:", provider.label());
        if !target.enabled {
            println!("{:<14}disabled", label);
            continue;
        }

        let session = match open_session(config, provider, transport.clone()) {
            Ok(session) => session,
            Err(e) => {
                println!("{:<14}not configured ({})", label, e);
                continue;
            }
        };

        let (state, record) = session.inspect();
        let summary = match state {
            SessionState::Valid => "valid",
            SessionState::Expired => "expired",
            _ => "none",
        };
        println!("{:<14}{}", label, summary);

        if let Some(record) = record {
            if let Some(exp) = record.expires_at.and_then(format_timestamp) {
                println!("  expires_at:  {}", exp);
            }
            let refresh = if record.refresh_token().is_some() {
                "present"
            } else {
                "none"
            };
            println!("  refresh tok: {}", refresh);
        }
        println!("  token file:  {}", session.store().path().display());
    }

    Ok(())
}

fn format_timestamp(secs: f64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.with_timezone(&chrono::Local).to_rfc3339())
}
