use std::time::Instant;

use clap::Parser;
use mph_cli::cli::Cli;
use mph_cli::output::{CommandResult, print_result};
use mph_cli::{commands, context::CommandContext, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let started = Instant::now();
	let name = cli.command.name();

	let result = match CommandContext::load(&cli) {
		Ok(ctx) => commands::dispatch(cli.command, &ctx).await,
		Err(err) => Err(err),
	};

	match result {
		Ok(data) => print_result(&CommandResult::success(name, data, started)),
		Err(err) => {
			error!(target = "mph", command = name, error = %format!("{err:#}"), "command failed");
			print_result(&CommandResult::failure(name, &err, started));
			std::process::exit(1);
		}
	}
}
