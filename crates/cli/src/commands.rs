use std::sync::Arc;

use anyhow::{Context, Result, bail};
use kf::{
	ClientConfig, Collaborators, Credential, EventSession, SessionEvent, SessionRegistry,
	StaticNamespaces, SubscriptionTarget,
};
use tracing::{info, warn};

use crate::cli::{Cli, Commands, ConfigAction, TailArgs};
use crate::output::NdjsonDispatch;

pub async fn run(cli: Cli) -> Result<()> {
	let mut config = ClientConfig::load(cli.config.as_deref())?;
	config.apply(&cli.overrides());

	match cli.command {
		Commands::Tail(args) => tail(config, args, cli.token).await,
		Commands::Config(args) => match args.action {
			ConfigAction::Show => {
				println!("{}", serde_json::to_string_pretty(&config)?);
				Ok(())
			}
			ConfigAction::Path => {
				let path = cli.config.unwrap_or_else(ClientConfig::default_path);
				println!("{}", path.display());
				Ok(())
			}
			ConfigAction::Init { force } => {
				let path = cli.config.unwrap_or_else(ClientConfig::default_path);
				if path.exists() && !force {
					bail!("{} already exists (use --force to overwrite)", path.display());
				}
				ClientConfig::default().save(&path)?;
				eprintln!("wrote {}", path.display());
				Ok(())
			}
		},
	}
}

fn target(args: &TailArgs) -> SubscriptionTarget {
	let target = match (&args.namespace, args.all_namespaces) {
		(Some(namespace), _) => SubscriptionTarget::new(namespace.as_str()),
		(None, true) => SubscriptionTarget::all_namespaces(),
		(None, false) => SubscriptionTarget::default(),
	};
	match &args.filter {
		Some(filter) => target.with_filter(filter.as_str()),
		None => target,
	}
}

async fn tail(config: ClientConfig, args: TailArgs, token: Option<String>) -> Result<()> {
	config.validate()?;
	if args.all_namespaces && args.namespaces.is_empty() {
		warn!("--all-namespaces without --namespaces subscribes to nothing");
	}

	let namespaces = Arc::new(StaticNamespaces::new(args.namespaces.iter().map(String::as_str)));
	let admin = args.admin;
	let collaborators = Collaborators::new(Arc::new(NdjsonDispatch::stdout()), namespaces)
		.with_privilege(move || admin);

	let registry = SessionRegistry::connect(&config, collaborators)
		.context("failed to set up sessions")?;

	let session: &dyn EventSession = if args.issues {
		registry.issues().context("issue session missing")?
	} else {
		registry.entities().context("entity session missing")?
	};
	let mut events = session.subscribe_events();

	match Credential::from_token(token) {
		Some(credential) => registry.set_credential(Some(credential)),
		None => {
			warn!("no token given, connecting unauthenticated");
			registry.connect_all()?;
		}
	}

	session.set_target(target(&args));
	if let (Some((namespace, name)), Some(issues)) = (args.comment_item(), registry.issues()) {
		issues.subscribe_comments(name, namespace);
	}
	info!(topic = session.topic(), "tailing, press Ctrl-C to stop");

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			event = events.recv() => match event {
				Some(SessionEvent::Authenticated) => info!(topic = session.topic(), "authenticated"),
				Some(SessionEvent::Disconnected { reason }) => {
					warn!(topic = session.topic(), %reason, "disconnected");
				}
				Some(SessionEvent::Loaded { kind, scopes }) => {
					info!(%kind, scopes = scopes.len(), "initial load done");
				}
				Some(_) => {}
				None => break,
			},
		}
	}

	info!("shutting down");
	registry.set_credential(None);
	Ok(())
}
