// src/import.rs
use std::path::PathBuf;

use glob::glob;
use tracing::{info, warn};

use crate::{
    config::ImportConfig,
    db::Store,
    decode::{parse_sequence_filename, FileKind},
    error::{ImportError, ImportResult},
    lookup::LookupMetadataStore,
    process::{
        geoheader::{GeoheaderLoader, GeoheaderReport},
        SequenceFileLoader, SequenceLoadReport,
    },
    schema::SchemaDeriver,
};

/// Input files of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportFiles {
    pub lookup: PathBuf,
    pub geography: Vec<PathBuf>,
    pub sequences: Vec<PathBuf>,
}

fn expand(pattern: &str) -> ImportResult<Vec<PathBuf>> {
    let entries =
        glob(pattern).map_err(|e| ImportError::Config(format!("bad glob `{}`: {}", pattern, e)))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "unreadable path skipped");
                None
            }
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Find the lookup, geography and sequence files below `census_dir`.
pub fn discover(config: &ImportConfig) -> ImportResult<ImportFiles> {
    let files = ImportFiles {
        lookup: config.lookup_path(),
        geography: if config.skip_geoheader {
            Vec::new()
        } else {
            expand(&config.geography_pattern())?
        },
        sequences: expand(&config.sequence_pattern())?,
    };
    info!(
        geography = files.geography.len(),
        sequences = files.sequences.len(),
        "discovered census files"
    );
    Ok(files)
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub geoheader: Option<GeoheaderReport>,
    pub tables_created: usize,
    pub sequences: Vec<SequenceLoadReport>,
    /// Margin files left out because margins were not requested.
    pub skipped_margin_files: usize,
}

impl ImportSummary {
    pub fn failed(&self) -> impl Iterator<Item = &SequenceLoadReport> {
        self.sequences.iter().filter(|r| r.is_failed())
    }

    pub fn rows_loaded(&self) -> usize {
        self.sequences.iter().map(SequenceLoadReport::rows_loaded).sum()
    }
}

/// Run a whole import: geoheader, lookup relations, destination tables, then
/// every sequence file in path order. A failing sequence file is recorded in
/// the summary and the run moves on to the next one.
pub fn run<S: Store>(
    store: &mut S,
    config: &ImportConfig,
    files: &ImportFiles,
) -> ImportResult<ImportSummary> {
    let mut summary = ImportSummary::default();

    if !config.skip_geoheader {
        let loader = GeoheaderLoader::new(config.load);
        summary.geoheader = Some(loader.load(store, &files.geography)?);
    }

    let lookup = LookupMetadataStore::from_path(&files.lookup)?;
    lookup.persist(store)?;

    let filter = config.table_filter();
    let deriver = SchemaDeriver::new(&lookup, filter.clone());
    summary.tables_created += deriver.create_estimate_tables(store)?;
    if config.margins {
        summary.tables_created += deriver.create_margin_tables(store)?;
    }

    let loader = SequenceFileLoader::new(&lookup, config.load, filter);
    let mut sequences = files.sequences.clone();
    sequences.sort();
    for path in &sequences {
        if !config.margins {
            if let Ok(file) = parse_sequence_filename(path) {
                if file.kind == FileKind::Margin {
                    summary.skipped_margin_files += 1;
                    continue;
                }
            }
        }
        summary.sequences.push(loader.load(store, path));
    }

    info!(
        files = summary.sequences.len(),
        failed = summary.failed().count(),
        rows = summary.rows_loaded(),
        "import finished"
    );
    Ok(summary)
}
