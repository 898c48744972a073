//! Command execution.

mod embed_url;
mod session;

use crate::cli::{Cli, Commands, SessionCommand};
use crate::error::Result;
use crate::output::Reporter;
use crate::settings::HostSettings;

pub use embed_url::{NoFrames, embed_url};
pub use session::{SessionData, WatchUpdate};

pub async fn dispatch(cli: Cli, reporter: &Reporter) -> Result<()> {
	let mut settings = HostSettings::load(cli.config.as_deref())?;
	cli.host.apply(&mut settings);

	match cli.command {
		Commands::Session(SessionCommand::Acquire) => session::acquire(&settings, reporter).await,
		Commands::Session(SessionCommand::Refresh {
			api_token,
			navigation_token,
			session_reference_token,
		}) => {
			let request = embed_protocol::RefreshRequest {
				api_token,
				navigation_token,
				session_reference_token,
			};
			session::refresh(&settings, request, reporter).await
		}
		Commands::Session(SessionCommand::Watch { duration }) => {
			session::watch(&settings, duration, reporter).await
		}
		Commands::Url(args) => embed_url::execute(&settings, args, reporter).await,
	}
}
