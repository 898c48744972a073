use clap::Parser;
use embed_cli::cli::Cli;
use embed_cli::output::Reporter;
use embed_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let reporter = Reporter::new(cli.command.name(), cli.format);
	if let Err(err) = commands::dispatch(cli, &reporter).await {
		tracing::debug!(error = ?err, "Command failed");
		reporter.failure(err.to_failure());
		std::process::exit(1);
	}
}
