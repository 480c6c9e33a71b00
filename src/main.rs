use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use leasesync::arbitration::{ArbitrationClient, HttpArbitrationClient};
use leasesync::logging::*;
use leasesync::state::LeaseStore;
use leasesync::utils::TerminalDecider;
use leasesync::{Config, SessionContext, SyncCoordinator};

///////////////////////
// Utility functions //
///////////////////////

/// `~/.leasesync/config.toml`, else `config.json`, if either exists
fn default_config_file() -> Option<PathBuf> {
	let home = std::env::var("HOME").ok()?;
	let dir = Path::new(&home).join(".leasesync");
	["config.toml", "config.json"].iter().map(|name| dir.join(name)).find(|p| p.is_file())
}

/// Defaults → config file → environment → command line
fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let file = matches.get_one::<String>("config").map(PathBuf::from).or_else(default_config_file);
	let mut config = match file {
		Some(path) => Config::from_file(&path)?,
		None => Config::default(),
	};
	config.apply_env()?;

	if let Some(v) = matches.get_one::<String>("share-root") {
		config.share_root = PathBuf::from(v);
	}
	if let Some(v) = matches.get_one::<String>("db") {
		config.db_name = v.clone();
	}
	if let Some(v) = matches.get_one::<String>("temp-dir") {
		config.temp_dir = PathBuf::from(v);
	}
	if matches.get_flag("sandbox") {
		config.force_sandbox = true;
	}
	Ok(config)
}

//////////////
// Commands //
//////////////

async fn cmd_status(ctx: &SessionContext) -> Result<(), Box<dyn Error>> {
	let lease = LeaseStore::new(ctx.paths.lease.clone()).load_if_present()?;
	match lease {
		Some(record) if record.held => {
			println!(
				"local checkout:  held (key {}, {} → {})",
				record.key, record.current_filename, record.next_filename
			)
		}
		_ => println!("local checkout:  none"),
	}

	let client = HttpArbitrationClient::from_config(&ctx.config)?;
	let status = client.probe(ctx.db_name(), &ctx.identity).await?;
	println!("current snapshot: {}", status.filename.as_deref().unwrap_or("(unknown)"));
	match status.possessor {
		Some(p) => println!("lease:           held by {}", p),
		None => println!("lease:           available"),
	}
	Ok(())
}

fn cmd_snapshots(ctx: &SessionContext) -> Result<(), Box<dyn Error>> {
	let snapshots = ctx.naming.list_snapshots(ctx.share_root())?;
	if snapshots.is_empty() {
		println!("no snapshots in {}", ctx.share_root().display());
	}
	for snapshot in &snapshots {
		println!("{}", snapshot.id);
	}
	let next = match snapshots.last() {
		Some(last) => last.id.next()?,
		None => ctx.naming.first(),
	};
	println!("next: {}", next);
	Ok(())
}

async fn cmd_open(ctx: SessionContext) -> Result<(), Box<dyn Error>> {
	let decider = Arc::new(TerminalDecider::new());
	let mut coordinator = SyncCoordinator::builder(ctx).decider(decider.clone()).build()?;

	let opened = coordinator.open().await?;
	println!("{}", coordinator.mirror_root().display());
	eprintln!(
		"Opened {} ({}). Press Enter when you are done.",
		opened.snapshot,
		if coordinator.is_sandbox() { "sandbox" } else { "read-write" }
	);
	decider.pause();

	let outcome = coordinator.shutdown_and_commit().await?;
	info!("Finished with {:?}", outcome);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("leasesync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Single-writer checkout of a database shared through a synced folder")
		.subcommand_required(true)
		.arg(Arg::new("config").short('c').long("config").value_name("FILE").help("Config file"))
		.arg(Arg::new("share-root").long("share-root").value_name("DIR").help("Synced share folder"))
		.arg(Arg::new("db").short('d').long("db").value_name("NAME").help("Database name"))
		.arg(Arg::new("temp-dir").long("temp-dir").value_name("DIR").help("Local state directory"))
		.arg(
			Arg::new("sandbox")
				.long("sandbox")
				.action(ArgAction::SetTrue)
				.help("Open without taking the lease"),
		)
		.subcommand(Command::new("status").about("Show lease status without changing it"))
		.subcommand(Command::new("snapshots").about("List local snapshots and the next name"))
		.subcommand(Command::new("open").about("Open a session, wait, then commit or discard"))
		.get_matches();

	let config = load_config(&matches)?;
	leasesync::logging::init_tracing(&config);
	let ctx = SessionContext::from_config(config)?;

	match matches.subcommand_name() {
		Some("status") => cmd_status(&ctx).await,
		Some("snapshots") => cmd_snapshots(&ctx),
		Some("open") => cmd_open(ctx).await,
		_ => Err("unknown command".into()),
	}
}

// vim: ts=4
