use mph::HarvestError;
use serde_json::{Value, json};
use tracing::info;

use crate::context::CommandContext;

pub async fn status(ctx: &CommandContext) -> anyhow::Result<Value> {
	let orchestrator = ctx.orchestrator()?;
	let session = orchestrator.session();
	let data = json!({
		"state": orchestrator.state(),
		"loggedIn": orchestrator.is_logged_in(),
		"token": session.as_ref().map(|s| s.token.as_str()),
		"expiry": session.as_ref().and_then(|s| s.expiry.as_ref()),
		"account": session.as_ref().and_then(|s| s.ext.as_ref()),
		"qr": orchestrator.qr_status(),
		"lastError": orchestrator.last_error(),
	});
	orchestrator.shutdown().await;
	Ok(data)
}

pub async fn token_login(ctx: &CommandContext, token: Option<&str>) -> anyhow::Result<Value> {
	let orchestrator = ctx.orchestrator()?;
	let ok = orchestrator.login_with_token(token).await;
	let session = orchestrator.session();
	orchestrator.shutdown().await;
	if !ok {
		return Err(HarvestError::NotLoggedIn.into());
	}
	Ok(json!({
		"loggedIn": true,
		"token": session.as_ref().map(|s| s.token.as_str()),
		"expiry": session.as_ref().and_then(|s| s.expiry.as_ref()),
	}))
}

pub async fn logout(ctx: &CommandContext) -> anyhow::Result<Value> {
	let orchestrator = ctx.orchestrator()?;
	let was_logged_in = orchestrator.is_logged_in();
	orchestrator.logout().await?;
	info!(target = "mph", was_logged_in, "session cleared");
	Ok(json!({ "loggedIn": false, "wasLoggedIn": was_logged_in }))
}
