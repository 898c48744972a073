use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};
use embed::ContentKind;

use crate::output::OutputFormat;
use crate::settings::HostSettings;

/// Cargo-style help colors.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.error(AnsiColor::Red.on_default().bold())
}

#[derive(Parser, Debug)]
#[command(name = "embedctl")]
#[command(about = "Acquire cookieless embed sessions and build embed URLs")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Json)]
	pub format: OutputFormat,

	/// Settings file (default: $XDG_CONFIG_HOME/embedctl/config.json)
	#[arg(long, global = true, value_name = "PATH")]
	pub config: Option<PathBuf>,

	#[command(flatten)]
	pub host: HostArgs,

	#[command(subcommand)]
	pub command: Commands,
}

impl Commands {
	/// Name reported in the result envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Session(SessionCommand::Acquire) => "session acquire",
			Commands::Session(SessionCommand::Refresh { .. }) => "session refresh",
			Commands::Session(SessionCommand::Watch { .. }) => "session watch",
			Commands::Url(_) => "url",
		}
	}
}

/// Overrides for values normally read from the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct HostArgs {
	/// Host serving the embedded application
	#[arg(long, global = true, value_name = "HOST")]
	pub api_host: Option<String>,

	/// Origin of the page hosting the frames
	#[arg(long, global = true, value_name = "ORIGIN")]
	pub embed_domain: Option<String>,

	/// Session acquire endpoint of the host backend
	#[arg(long, global = true, value_name = "URL")]
	pub acquire_url: Option<String>,

	/// Session refresh endpoint (default: `refresh` next to the acquire endpoint)
	#[arg(long, global = true, value_name = "URL")]
	pub refresh_url: Option<String>,

	#[arg(long, global = true, value_name = "AGENT")]
	pub user_agent: Option<String>,
}

impl HostArgs {
	/// Applies the flags that were given on top of `settings`.
	pub fn apply(&self, settings: &mut HostSettings) {
		let overrides = [
			(&self.api_host, &mut settings.api_host),
			(&self.embed_domain, &mut settings.embed_domain),
			(&self.acquire_url, &mut settings.acquire_url),
			(&self.refresh_url, &mut settings.refresh_url),
			(&self.user_agent, &mut settings.user_agent),
		];
		for (flag, setting) in overrides {
			if let Some(value) = flag {
				*setting = Some(value.clone());
			}
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Cookieless session operations
	#[command(subcommand)]
	Session(SessionCommand),

	/// Print the frame URL for a piece of content
	Url(UrlArgs),
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
	/// Acquire a session and print its tokens
	Acquire,

	/// Exchange a session's tokens for fresh ones
	Refresh {
		#[arg(long, value_name = "TOKEN")]
		api_token: String,

		#[arg(long, value_name = "TOKEN")]
		navigation_token: String,

		#[arg(long = "reference-token", value_name = "TOKEN")]
		session_reference_token: String,
	},

	/// Acquire a session and print every refresh until interrupted
	Watch {
		/// Stop after this many seconds
		#[arg(long, value_name = "SECS")]
		duration: Option<u64>,
	},
}

#[derive(Args, Debug)]
pub struct UrlArgs {
	#[arg(value_enum)]
	pub kind: ContentArg,

	/// Content id, or a host-relative URL starting with '/'
	pub target: String,

	/// Filter applied to the content (repeatable)
	#[arg(long = "filter", value_name = "NAME=VALUE", value_parser = parse_pair)]
	pub filters: Vec<(String, String)>,

	/// Extra query parameter for the frame URL (repeatable)
	#[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_pair)]
	pub params: Vec<(String, String)>,

	/// Frame sandbox flag (repeatable)
	#[arg(long, value_name = "FLAG")]
	pub sandbox: Vec<String>,

	/// Acquire a cookieless session and include its navigation token
	#[arg(long)]
	pub cookieless: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ContentArg {
	Dashboard,
	Explore,
	Look,
	Extension,
}

impl From<ContentArg> for ContentKind {
	fn from(kind: ContentArg) -> Self {
		match kind {
			ContentArg::Dashboard => ContentKind::Dashboard,
			ContentArg::Explore => ContentKind::Explore,
			ContentArg::Look => ContentKind::Look,
			ContentArg::Extension => ContentKind::Extension,
		}
	}
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
	match value.split_once('=') {
		Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
		_ => Err(format!("expected NAME=VALUE, got '{value}'")),
	}
}
