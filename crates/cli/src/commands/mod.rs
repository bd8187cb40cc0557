mod fetch;
mod login;
mod session;

use serde_json::Value;

use crate::cli::Commands;
use crate::context::CommandContext;

/// Runs `command` and returns the `data` part of its result envelope.
pub async fn dispatch(command: Commands, ctx: &CommandContext) -> anyhow::Result<Value> {
	match command {
		Commands::Login { wait, qr_timeout } => login::execute(ctx, wait, qr_timeout).await,
		Commands::TokenLogin { token } => session::token_login(ctx, token.as_deref()).await,
		Commands::Fetch { url, with_session, mobile } => fetch::execute_one(ctx, &url, with_session, mobile).await,
		Commands::FetchBatch {
			urls,
			file,
			account_id,
			output,
		} => {
			let urls = fetch::collect_urls(urls, file.as_deref()).await?;
			fetch::execute_batch(ctx, &urls, account_id.as_deref(), &output).await
		}
		Commands::Status => session::status(ctx).await,
		Commands::Logout => session::logout(ctx).await,
	}
}
