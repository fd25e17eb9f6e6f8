pub mod cli;
pub mod compare;
pub mod config;
pub mod error;
pub mod metadata;
pub mod postgres;
pub mod report;
pub mod snapshot;
pub mod table;
pub mod yaml;

use std::{
    env,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, ReportFormat, SourceArgs},
    compare::{Comparator, history_table_name},
    config::{AuditConfig, ConfigOverrides},
    metadata::MetadataProvider,
    postgres::PgProvider,
    snapshot::SnapshotProvider,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("hisaudit", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Compare(args) => handle_compare(&args),
        Commands::Describe(args) => handle_describe(&args),
        Commands::Snapshot(args) => handle_snapshot(&args),
        Commands::HistoryName(args) => {
            let mut stdout = io::stdout().lock();
            for table in &args.tables {
                writeln!(stdout, "{}", history_table_name(table))?;
            }
            Ok(())
        }
    }
}

fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<AuditConfig> {
    let config = AuditConfig::load_or_default(path)?.apply(overrides);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// The provider a command reads from. A live session is closed explicitly
/// once the command is done.
enum Source {
    Live(PgProvider),
    Offline(SnapshotProvider),
}

impl Source {
    fn open(args: &SourceArgs, config: &AuditConfig) -> Result<Self> {
        match (&args.snapshot, &args.database_url) {
            (Some(path), _) => {
                info!("Reading catalog snapshot {:?}", path);
                Ok(Source::Offline(SnapshotProvider::load(path, &config.registry)?))
            }
            (None, Some(url)) => Ok(Source::Live(
                PgProvider::connect(url, config).context("Opening database session")?,
            )),
            (None, None) => bail!("Either --database-url or --snapshot is required"),
        }
    }

    fn provider(&mut self) -> &mut dyn MetadataProvider {
        match self {
            Source::Live(provider) => provider,
            Source::Offline(provider) => provider,
        }
    }

    fn close(self) {
        if let Source::Live(provider) = self {
            provider.close();
        }
    }
}

fn handle_compare(args: &cli::CompareArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref(), &args.overrides())?;
    info!(
        "Ignoring column(s) [{}]{}",
        config.ignore_fields.join(", "),
        if config.quiet { " in quiet mode" } else { "" }
    );
    let mut source = Source::open(&args.source, &config)?;
    let mut comparator = Comparator::new(source.provider(), &config);
    let report = match args.format {
        ReportFormat::Text => {
            let mut stdout = io::stdout().lock();
            comparator.compare(&mut stdout)?
        }
        ReportFormat::Json => {
            let audit = comparator.run()?;
            println!("{}", report::render_json(&audit, config.quiet)?);
            audit
        }
    };
    source.close();

    if args.fail_on_drift && report.has_drift() {
        bail!(
            "{} of {} table pair(s) are inconsistent or could not be compared",
            report.inconsistent_count() + report.unavailable_count(),
            report.tables.len()
        );
    }
    Ok(())
}

fn handle_describe(args: &cli::DescribeArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        schema: args.schema.clone(),
        ..ConfigOverrides::default()
    };
    let config = resolve_config(args.config.as_deref(), &overrides)?;
    let mut source = Source::open(&args.source, &config)?;
    let schema = source
        .provider()
        .table_struct(&args.table)
        .with_context(|| format!("Describing {}", args.table))?;
    source.close();
    print!("{}", table::render_schema(&schema));
    Ok(())
}

fn handle_snapshot(args: &cli::SnapshotArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        schema: args.schema.clone(),
        ..ConfigOverrides::default()
    };
    let config = resolve_config(args.config.as_deref(), &overrides)?;
    let mut provider =
        PgProvider::connect(&args.database_url, &config).context("Opening database session")?;
    let snapshot = snapshot::capture(&mut provider).context("Capturing catalog snapshot")?;
    provider.close();
    snapshot.save(&args.output)?;
    info!(
        "Snapshot of {} registry row(s) and {} table(s) written to {:?}",
        snapshot.registry.len(),
        snapshot.tables.len(),
        args.output
    );
    Ok(())
}
