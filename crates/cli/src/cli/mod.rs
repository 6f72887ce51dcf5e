#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kf::ConfigOverrides;

/// Tail the dashboard event stream.
#[derive(Parser, Debug)]
#[command(name = "kf")]
#[command(about = "Subscribe to dashboard topics and print what arrives as NDJSON")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to $XDG_CONFIG_HOME/kf/config.json)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Dashboard URL, overrides the config file
	#[arg(long, global = true, value_name = "URL")]
	pub url: Option<String>,

	/// Bearer token
	#[arg(long, global = true, env = "KF_TOKEN", hide_env_values = true)]
	pub token: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Subscribe to a topic and stream dispatch calls to stdout.
	Tail(TailArgs),
	/// Inspect or create the config file.
	Config(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct TailArgs {
	/// Namespace to subscribe to
	#[arg(value_name = "NAMESPACE", required_unless_present_any = ["all_namespaces", "issues"])]
	pub namespace: Option<String>,

	/// Subscribe to every known namespace
	#[arg(short = 'A', long, conflicts_with = "namespace")]
	pub all_namespaces: bool,

	/// Known namespaces, used to expand --all-namespaces
	#[arg(long, value_name = "NS", value_delimiter = ',')]
	pub namespaces: Vec<String>,

	/// Server-side filter expression
	#[arg(long, value_name = "EXPR")]
	pub filter: Option<String>,

	/// Tail the issue topic instead of entities (needs --admin)
	#[arg(long, requires = "admin")]
	pub issues: bool,

	/// Treat the caller as privileged
	#[arg(long)]
	pub admin: bool,

	/// Follow comments of one item, given as NAMESPACE/NAME
	#[arg(long, value_name = "NAMESPACE/NAME", requires = "issues")]
	pub comments: Option<String>,

	/// Coalescing window in milliseconds
	#[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
	pub window_ms: Option<u64>,

	/// Give up instead of reconnecting when the connection drops
	#[arg(long)]
	pub no_reconnect: bool,
}

impl TailArgs {
	/// Splits `--comments` into `(namespace, name)`.
	pub fn comment_item(&self) -> Option<(&str, &str)> {
		self.comments.as_deref()?.split_once('/')
	}
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
	#[command(subcommand)]
	pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
	/// Print the effective configuration.
	Show,
	/// Print where the config file is read from.
	Path,
	/// Write a config file with default values.
	Init {
		/// Overwrite an existing file
		#[arg(long)]
		force: bool,
	},
}

impl Cli {
	/// Config values given as flags.
	pub fn overrides(&self) -> ConfigOverrides {
		let mut overrides = ConfigOverrides {
			url: self.url.clone(),
			..ConfigOverrides::default()
		};
		if let Commands::Tail(tail) = &self.command {
			overrides.coalesce_window_ms = tail.window_ms;
			overrides.no_reconnect = tail.no_reconnect;
		}
		overrides
	}
}
