use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mph::BrowserKind;

#[derive(Parser, Debug)]
#[command(name = "mph")]
#[command(about = "QR-code login and article harvesting for the mp publishing platform")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file; defaults apply when it does not exist
	#[arg(short, long, global = true, value_name = "FILE", default_value = "mph.json")]
	pub config: PathBuf,

	/// Show the browser window
	#[arg(long, global = true)]
	pub headful: bool,

	/// Browser to drive, overrides the configuration file
	#[arg(short, long, global = true, value_enum)]
	pub browser: Option<BrowserArg>,

	/// Webhook receiving login notifications (falls back to MPH_WEBHOOK_URL)
	#[arg(long, global = true, value_name = "URL")]
	pub webhook: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Start a QR-code login and wait until it completes
	Login {
		/// Stay running afterwards and keep the session alive until Ctrl-C
		#[arg(long)]
		wait: bool,
		/// Seconds to wait for the QR snapshot
		#[arg(long, default_value = "60")]
		qr_timeout: u64,
	},

	/// Re-establish a session from a stored or explicit token
	TokenLogin {
		/// Token to use instead of the stored one
		token: Option<String>,
	},

	/// Fetch a single article and print it
	Fetch {
		url: String,
		/// Browse with the persisted session cookies
		#[arg(long)]
		with_session: bool,
		/// Use a phone viewport and user agent
		#[arg(long)]
		mobile: bool,
	},

	/// Fetch many articles into a JSON Lines file
	FetchBatch {
		urls: Vec<String>,
		/// Read additional URLs from a file, one per line
		#[arg(short, long, value_name = "FILE")]
		file: Option<PathBuf>,
		/// Account id recorded on every stored article
		#[arg(long)]
		account_id: Option<String>,
		/// Article store file
		#[arg(short, long, default_value = "articles.jsonl")]
		output: PathBuf,
	},

	/// Show login state and the stored session
	Status,

	/// Stop background work and forget the stored session
	Logout,
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Login { .. } => "login",
			Commands::TokenLogin { .. } => "token-login",
			Commands::Fetch { .. } => "fetch",
			Commands::FetchBatch { .. } => "fetch-batch",
			Commands::Status => "status",
			Commands::Logout => "logout",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowserArg {
	Chromium,
	Chrome,
	Edge,
}

impl From<BrowserArg> for BrowserKind {
	fn from(arg: BrowserArg) -> Self {
		match arg {
			BrowserArg::Chromium => BrowserKind::Chromium,
			BrowserArg::Chrome => BrowserKind::Chrome,
			BrowserArg::Edge => BrowserKind::Edge,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_login_defaults() {
		let cli = Cli::try_parse_from(["mph", "login"]).unwrap();
		match cli.command {
			Commands::Login { wait, qr_timeout } => {
				assert!(!wait);
				assert_eq!(qr_timeout, 60);
			}
			other => panic!("unexpected command {other:?}"),
		}
		assert_eq!(cli.config, PathBuf::from("mph.json"));
		assert!(cli.browser.is_none());
	}

	#[test]
	fn parse_fetch_batch_with_globals_after_subcommand() {
		let cli = Cli::try_parse_from([
			"mph",
			"fetch-batch",
			"https://mp.weixin.qq.com/s/a",
			"https://mp.weixin.qq.com/s/b",
			"--account-id",
			"MP_WXS_1",
			"-vv",
			"--browser",
			"edge",
		])
		.unwrap();
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.browser.map(BrowserKind::from), Some(BrowserKind::Edge));
		match cli.command {
			Commands::FetchBatch { urls, account_id, output, file } => {
				assert_eq!(urls.len(), 2);
				assert_eq!(account_id.as_deref(), Some("MP_WXS_1"));
				assert_eq!(output, PathBuf::from("articles.jsonl"));
				assert!(file.is_none());
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn token_login_token_is_optional() {
		let cli = Cli::try_parse_from(["mph", "token-login"]).unwrap();
		assert!(matches!(cli.command, Commands::TokenLogin { token: None }));
		assert_eq!(cli.command.name(), "token-login");
	}

	#[test]
	fn fetch_requires_url() {
		assert!(Cli::try_parse_from(["mph", "fetch"]).is_err());
	}
}
