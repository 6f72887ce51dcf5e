use std::path::PathBuf;

use clap::Parser;

use super::*;

fn parse(args: &[&str]) -> Cli {
	Cli::try_parse_from(args).unwrap()
}

fn tail(cli: Cli) -> TailArgs {
	match cli.command {
		Commands::Tail(args) => args,
		other => panic!("Expected Tail command, got {other:?}"),
	}
}

#[test]
fn parse_tail_namespace() {
	let args = tail(parse(&["kf", "tail", "garden-dev", "--filter", "healthy"]));
	assert_eq!(args.namespace.as_deref(), Some("garden-dev"));
	assert_eq!(args.filter.as_deref(), Some("healthy"));
	assert!(!args.all_namespaces);
	assert!(!args.issues);
}

#[test]
fn parse_tail_all_namespaces() {
	let args = tail(parse(&["kf", "tail", "-A", "--namespaces", "a,b,c"]));
	assert!(args.all_namespaces);
	assert_eq!(args.namespace, None);
	assert_eq!(args.namespaces, ["a", "b", "c"]);
}

#[test]
fn tail_needs_a_selection() {
	assert!(Cli::try_parse_from(["kf", "tail"]).is_err());
}

#[test]
fn namespace_conflicts_with_all() {
	assert!(Cli::try_parse_from(["kf", "tail", "garden-dev", "-A"]).is_err());
}

#[test]
fn issues_require_admin() {
	assert!(Cli::try_parse_from(["kf", "tail", "--issues"]).is_err());

	let args = tail(parse(&["kf", "tail", "--issues", "--admin", "--comments", "garden-dev/shoot-1"]));
	assert!(args.issues);
	assert_eq!(args.comment_item(), Some(("garden-dev", "shoot-1")));
}

#[test]
fn comments_require_issues() {
	assert!(Cli::try_parse_from(["kf", "tail", "a", "--comments", "ns/name"]).is_err());
}

#[test]
fn zero_window_is_rejected() {
	assert!(Cli::try_parse_from(["kf", "tail", "a", "--window-ms", "0"]).is_err());
}

#[test]
fn global_flags_after_subcommand() {
	let cli = parse(&[
		"kf",
		"tail",
		"a",
		"-vv",
		"--config",
		"/tmp/kf.json",
		"--url",
		"https://dash.example.com",
		"--window-ms",
		"250",
		"--no-reconnect",
	]);
	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.config, Some(PathBuf::from("/tmp/kf.json")));

	let overrides = cli.overrides();
	assert_eq!(overrides.url.as_deref(), Some("https://dash.example.com"));
	assert_eq!(overrides.coalesce_window_ms, Some(250));
	assert!(overrides.no_reconnect);
}

#[test]
fn parse_config_init() {
	let cli = parse(&["kf", "config", "init", "--force"]);
	assert!(matches!(
		cli.command,
		Commands::Config(ConfigArgs {
			action: ConfigAction::Init { force: true }
		})
	));
	assert_eq!(cli.overrides(), ConfigOverrides::default());
}
