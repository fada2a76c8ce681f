//! Ray-Admin: operator tool for the Ray index engine.
//!
//! ```text
//! ray-admin add --target 42 --attr bout=7 --attr author=jeff
//! ray-admin build
//! ray-admin seek --attr bout --value 7
//! ray-admin rollback
//! ray-admin status
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ray_index::{
    AuditOptions, BaselineStore, DirStash, IndexBuilder, IndexConfig, Notice, Stash,
    SystemTimeSource, TimeSource,
};

/// Ray-Admin: operator tool for the Ray index engine
#[derive(Parser, Debug)]
#[command(name = "ray-admin")]
#[command(about = "Enqueue notices, build, query and roll back index baselines")]
struct Args {
    /// Data directory (overrides `root` from the config file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a notice to the stash
    Add {
        /// Entity the notice is about
        #[arg(short, long)]
        target: u64,

        /// Attribute assignment `name=value`; an empty value clears it
        #[arg(short, long = "attr", value_parser = parse_attribute, required = true)]
        attributes: Vec<(String, String)>,

        /// Seconds since epoch (default: now)
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Fold pending notices into a new baseline
    Build {
        /// Publish without auditing. For performance runs only.
        #[arg(long)]
        skip_audit: bool,
    },
    /// Look up a value in the current baseline
    Seek {
        #[arg(short, long)]
        attr: String,

        #[arg(short, long)]
        value: String,
    },
    /// Restore the previous baseline
    Rollback,
    /// Show baselines and pending notices
    Status,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, _)) if name.is_empty() => Err(format!("missing attribute name in '{}'", raw)),
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Err(format!("expected name=value, got '{}'", raw)),
    }
}

fn load_config(args: &Args) -> Result<IndexConfig> {
    let mut config = match &args.config {
        Some(path) => IndexConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => IndexConfig::default(),
    };
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Add {
            target,
            attributes,
            timestamp,
        } => add(&config, target, attributes, timestamp),
        Command::Build { skip_audit } => build(&config, skip_audit),
        Command::Seek { attr, value } => seek(&config, &attr, &value),
        Command::Rollback => rollback(&config),
        Command::Status => status(&config),
    }
}

fn add(
    config: &IndexConfig,
    target: u64,
    attributes: Vec<(String, String)>,
    timestamp: Option<u64>,
) -> Result<()> {
    let timestamp = timestamp.unwrap_or_else(|| SystemTimeSource.now());
    let notice = attributes
        .into_iter()
        .fold(Notice::new(target, timestamp), |notice, (name, value)| {
            notice.with(name, value)
        });

    let stash = DirStash::open(&config.stash_dir()).context("opening stash")?;
    stash.add(&notice).context("adding notice")?;
    println!("added {}", notice);
    stash.close()?;
    Ok(())
}

fn build(config: &IndexConfig, skip_audit: bool) -> Result<()> {
    let stash = DirStash::open(&config.stash_dir()).context("opening stash")?;
    let mut builder = IndexBuilder::from_config(config)?;
    if skip_audit {
        builder = builder.with_options(AuditOptions::skipping());
    }

    let report = builder.build(&stash).context("building baseline")?;
    match report.version {
        Some(version) => {
            println!(
                "published v{}: {} notice(s), {} attribute(s), {} value(s) in {}ms",
                version, report.notices, report.attributes, report.values, report.duration_ms
            );
            if let Some(audit) = &report.audit {
                if audit.skipped {
                    println!("audit skipped");
                } else {
                    println!(
                        "audit passed: {} record(s) in {}ms",
                        audit.records_checked, audit.duration_ms
                    );
                }
            }
        }
        None => println!("nothing to build"),
    }
    if report.rejected > 0 {
        println!("dropped {} notice(s) that cannot be indexed", report.rejected);
    }
    stash.close()?;
    Ok(())
}

fn seek(config: &IndexConfig, attribute: &str, value: &str) -> Result<()> {
    let store = BaselineStore::open_read_only(config.baselines_dir())?;
    let Some(baseline) = store.current()? else {
        println!("no baseline published yet");
        return Ok(());
    };

    let position = baseline.seek(attribute, value)?;
    let targets = baseline.targets(attribute, value)?;
    println!(
        "v{} {}={:?}: position {}, targets {:?}",
        baseline.version(),
        attribute,
        value,
        position,
        targets
    );
    Ok(())
}

fn rollback(config: &IndexConfig) -> Result<()> {
    let mut store = BaselineStore::open(config.baselines_dir(), config.retained_baselines)?;
    let baseline = store.rollback().context("rolling back")?;
    println!("current baseline is now v{}", baseline.version());
    Ok(())
}

fn status(config: &IndexConfig) -> Result<()> {
    let store = BaselineStore::open_read_only(config.baselines_dir())?;
    match store.current()? {
        Some(baseline) => {
            let manifest = baseline.manifest();
            println!(
                "current: v{} ({} attribute(s), {} bytes of postings, built from {} notice(s))",
                manifest.version,
                manifest.attributes.len(),
                manifest.data_len,
                manifest.notices
            );
        }
        None => println!("current: none"),
    }
    println!("retained: {:?}", store.versions()?);

    // Done marks belong to whichever process owns the stash, so this counts
    // every entry file on disk.
    let entries = DirStash::count_entries(&config.stash_dir())?;
    println!(
        "stash: {} entr{} in {}",
        entries,
        if entries == 1 { "y" } else { "ies" },
        config.stash_dir().display()
    );
    Ok(())
}
