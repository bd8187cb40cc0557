use std::path::Path;

use anyhow::{Context as _, bail};
use mph::FetchOutcome;
use serde_json::{Value, json};
use tracing::info;

use crate::context::CommandContext;
use crate::store::JsonlArticleStore;

pub async fn execute_one(ctx: &CommandContext, url: &str, with_session: bool, mobile: bool) -> anyhow::Result<Value> {
	let fetcher = ctx.fetcher(with_session, mobile)?;
	info!(target = "mph", url, with_session, mobile, "fetch");

	match fetcher.fetch_one(url).await {
		FetchOutcome::Fetched(article) => Ok(json!({ "outcome": "fetched", "article": article })),
		FetchOutcome::TransientError(message) => bail!("fetching {url} failed: {message}"),
		terminal => Ok(json!({ "outcome": terminal.label(), "article": Value::Null })),
	}
}

/// Positional URLs followed by the non-blank lines of `file`.
pub async fn collect_urls(mut urls: Vec<String>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
	if let Some(file) = file {
		let raw = tokio::fs::read_to_string(file).await.with_context(|| format!("reading {}", file.display()))?;
		urls.extend(raw.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')).map(str::to_string));
	}
	if urls.iter().all(|u| u.trim().is_empty()) {
		bail!("no article URLs given");
	}
	Ok(urls)
}

pub async fn execute_batch(ctx: &CommandContext, urls: &[String], account_id: Option<&str>, output: &Path) -> anyhow::Result<Value> {
	let store = JsonlArticleStore::open(output).await?;
	let fetcher = ctx.fetcher(false, false)?;
	let stored = fetcher.fetch_batch(urls, account_id, &store).await;
	Ok(json!({
		"requested": urls.len(),
		"stored": stored,
		"output": store.path(),
	}))
}
