use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use censusload::{
    db::SqliteStore,
    import::{self, ImportSummary},
    ImportConfig, LoadStrategy, Tolerance,
};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Load an American Community Survey release into SQLite.
#[derive(Parser, Debug)]
#[command(name = "censusload", version)]
struct Args {
    /// YAML file with import settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the unpacked census release
    #[arg(long)]
    census_dir: Option<PathBuf>,

    /// SQLite database to write
    #[arg(long)]
    database: Option<PathBuf>,

    /// Lookup file, relative to the census dir
    #[arg(long)]
    lookup_file: Option<PathBuf>,

    #[arg(long)]
    geography_glob: Option<String>,

    #[arg(long)]
    sequence_glob: Option<String>,

    /// Only load these census tables (comma separated)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Insert one row at a time instead of one batch per table
    #[arg(long)]
    row_by_row: bool,

    /// Skip duplicate keys instead of failing
    #[arg(long)]
    ignore_dups: bool,

    #[arg(long)]
    skip_geoheader: bool,

    /// Also create and load the margin of error tables
    #[arg(long)]
    margins: bool,
}

impl Args {
    fn into_config(self) -> Result<ImportConfig> {
        let mut cfg = match &self.config {
            Some(path) => ImportConfig::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ImportConfig::default(),
        };
        if let Some(dir) = self.census_dir {
            cfg.census_dir = dir;
        }
        if let Some(db) = self.database {
            cfg.database = db;
        }
        if let Some(lookup) = self.lookup_file {
            cfg.lookup_file = lookup;
        }
        if let Some(pattern) = self.geography_glob {
            cfg.geography_glob = pattern;
        }
        if let Some(pattern) = self.sequence_glob {
            cfg.sequence_glob = pattern;
        }
        if !self.tables.is_empty() {
            cfg.tables = self.tables;
        }
        if self.row_by_row {
            cfg.load.strategy = LoadStrategy::RowByRow;
        }
        if self.ignore_dups {
            cfg.load.tolerance = Tolerance::SkipDuplicates;
        }
        cfg.skip_geoheader |= self.skip_geoheader;
        cfg.margins |= self.margins;
        Ok(cfg)
    }
}

fn report(summary: &ImportSummary) {
    if let Some(geo) = &summary.geoheader {
        info!(files = geo.files, rows = geo.rows, "geoheader");
    }
    info!(
        tables = summary.tables_created,
        files = summary.sequences.len(),
        rows = summary.rows_loaded(),
        "sequence files"
    );
    for failed in summary.failed() {
        if let Some(f) = &failed.failure {
            error!(path = %failed.path.display(), phase = ?f.after, error = %f.error, "failed");
        }
    }
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Args::parse().into_config()?;
    info!(?cfg, "configuration");

    // ─── 3) discover inputs ──────────────────────────────────────────
    let files = import::discover(&cfg)?;
    if files.sequences.is_empty() {
        info!(dir = %cfg.census_dir.display(), "no sequence files found");
    }

    // ─── 4) load ─────────────────────────────────────────────────────
    let mut store = SqliteStore::open(&cfg.database)
        .with_context(|| format!("opening {}", cfg.database.display()))?;
    let summary = import::run(&mut store, &cfg, &files)?;
    report(&summary);

    let failed = summary.failed().count();
    if failed > 0 {
        bail!("{} of {} sequence files failed", failed, summary.sequences.len());
    }
    info!("done");
    Ok(())
}
