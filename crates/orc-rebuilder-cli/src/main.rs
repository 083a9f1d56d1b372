use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use orc_rebuilder_core::{
	rebuild_with_backend, ProgressCallback, RebuildConfig, RebuildOptions, SevenZipBackend,
	WalkProgress,
};
use tracing_subscriber::EnvFilter;

const KNOWN_LIMITATIONS: &str = "\
Known limitations:
  - Creation dates of rebuilt files reflect the time of extraction
  - Modification and access times are restored to the second only
  - Paths longer than the operating system limit cannot be written and are
    listed in artefacts_non_extracted.csv";

#[derive(Parser, Debug)]
#[command(
	name = "orc-rebuilder",
	version,
	about = "Rebuild the original file tree of a DFIR-ORC collection",
	after_help = KNOWN_LIMITATIONS
)]
struct Cli {
	/// DFIR-ORC archive to rebuild
	archive: PathBuf,
	/// Directory receiving the rebuilt tree
	destination: PathBuf,
	/// TOML file with archive passwords and report files
	#[arg(short = 'c', long = "conf", alias = "conf-file")]
	conf: Option<PathBuf>,
	/// Keep volume ID folders instead of renaming them to drive letters
	#[arg(long)]
	no_rename: bool,
	/// Walk sibling nested archives concurrently
	#[arg(long)]
	parallel: bool,
	/// Also write the run report as JSON
	#[arg(long, value_name = "FILE")]
	report_json: Option<PathBuf>,
	/// More logging (-v info, -vv debug)
	#[arg(short, long, action = ArgAction::Count)]
	verbose: u8,
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_logging(cli.verbose);

	let config = match &cli.conf {
		Some(path) => RebuildConfig::load(path)?,
		None => RebuildConfig::default(),
	};
	let options = RebuildOptions {
		rename_volumes: !cli.no_rename,
		parallel: cli.parallel,
	};

	println!("📦 Rebuilding {}", cli.archive.display());

	let spinner = ProgressBar::new_spinner();
	spinner.set_style(
		ProgressStyle::default_spinner()
			.template("{spinner:.green} [{elapsed_precise}] {pos} archives {msg}")
			.context("invalid progress template")?,
	);
	spinner.enable_steady_tick(Duration::from_millis(100));

	let on_progress = |progress: WalkProgress| {
		spinner.inc(1);
		spinner.set_message(format!(
			"{}{} ({} entries)",
			"  ".repeat(progress.depth),
			progress.archive_name,
			progress.entries
		));
	};
	let callback: ProgressCallback = &on_progress;

	let result = rebuild_with_backend(
		&SevenZipBackend::new(),
		&cli.archive,
		&cli.destination,
		&config,
		options,
		Some(callback),
	);
	spinner.finish_and_clear();
	let report = result.with_context(|| format!("failed to rebuild {}", cli.archive.display()))?;

	let stats = &report.stats;
	println!("✅ Rebuild completed");
	println!("📊 Run ID: {}", report.run_id);
	println!("📁 Destination: {}", report.destination.display());
	println!(
		"🗜️  Archives: {} opened, {} unreadable",
		stats.archives_opened, stats.archives_failed
	);
	println!("📄 Artifacts written: {}", stats.artifacts_written);
	if stats.reports_written > 0 {
		println!("📋 Reports written: {}", stats.reports_written);
	}
	for (volume_id, letter) in report.volume_labels.iter() {
		println!("💽 {} -> {}:", volume_id, letter);
	}
	if !report.renames.merged.is_empty() {
		println!(
			"🔀 {} volume folders merged into existing drive folders",
			report.renames.merged.len()
		);
	}
	if !report.renames.skipped.is_empty() || !report.renames.failed.is_empty() {
		println!(
			"⚠️  {} volume folders kept their ID ({} with leftover files, {} failed)",
			report.renames.skipped.len() + report.renames.failed.len(),
			report.renames.skipped.len(),
			report.renames.failed.len()
		);
	}
	if stats.times_not_restored > 0 {
		println!("🕒 {} files written without their original times", stats.times_not_restored);
	}
	if stats.failed_writes() > 0 {
		println!(
			"⚠️  {} files not extracted, see {}",
			stats.failed_writes(),
			report.non_extracted_log.display()
		);
	}

	if let Some(path) = &cli.report_json {
		report
			.export_json(path)
			.with_context(|| format!("failed to write {}", path.display()))?;
		println!("💾 Report saved to {}", path.display());
	}

	Ok(())
}

fn setup_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
		0 => EnvFilter::new("warn"),
		1 => EnvFilter::new("orc_rebuilder_core=info,warn"),
		_ => EnvFilter::new("orc_rebuilder_core=debug,info"),
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}
