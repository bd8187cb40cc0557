use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, bail};
use mph::{AccountProfile, LoginState, SessionRecord};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::context::CommandContext;

pub async fn execute(ctx: &CommandContext, wait: bool, qr_timeout: u64) -> anyhow::Result<Value> {
	let orchestrator = ctx.orchestrator()?;

	let ticket = orchestrator
		.request_login(
			Some(Box::new(|record: &SessionRecord, profile: Option<&AccountProfile>| {
				let name = profile.and_then(|p| p.name.as_deref()).unwrap_or("unknown");
				info!(target = "mph", account = name, token = %record.token, "login completed");
			})),
			Some(Box::new(|path: &Path| {
				eprintln!("Scan the QR code saved at {}", path.display());
			})),
		)
		.await?;

	if ticket.already_running && orchestrator.state() != LoginState::Attempting {
		// the attempt belongs to another process, nothing here to wait on
		info!(target = "mph", attempt = ?ticket.attempt_id, "another process is running a login attempt");
		orchestrator.shutdown().await;
		return Ok(json!({
			"attemptId": ticket.attempt_id,
			"alreadyRunning": true,
			"qrPath": ticket.qr_path,
			"qrReady": ticket.qr_ready,
		}));
	}

	if ticket.already_running {
		info!(target = "mph", attempt = ?ticket.attempt_id, "another login attempt is running, waiting for it");
	} else if !orchestrator.wait_for_qr(Duration::from_secs(qr_timeout)).await {
		if orchestrator.state() == LoginState::Attempting {
			orchestrator.shutdown().await;
			bail!("QR code was not captured within {qr_timeout}s");
		}
		// attempt already ended, its error says why
		let err = orchestrator.wait_for_attempt().await.err();
		orchestrator.shutdown().await;
		match err {
			Some(err) => return Err(err).context("QR code was not captured"),
			None => bail!("login finished without a QR code"),
		}
	}

	let record = match orchestrator.wait_for_attempt().await {
		Ok(record) => record,
		Err(err) => {
			orchestrator.shutdown().await;
			return Err(err.into());
		}
	};

	let data = json!({
		"attemptId": ticket.attempt_id,
		"alreadyRunning": ticket.already_running,
		"qrPath": ticket.qr_path,
		"token": record.token,
		"expiry": record.expiry,
		"account": record.ext,
	});

	if wait {
		info!(target = "mph", "keeping the session alive, press Ctrl-C to stop");
		if let Err(err) = tokio::signal::ctrl_c().await {
			warn!(target = "mph", error = %err, "could not listen for Ctrl-C");
		}
	}
	orchestrator.shutdown().await;
	Ok(data)
}
