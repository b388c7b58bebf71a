// src/process/mod.rs
use tracing::{debug, info, warn};

use crate::{
    db::{Row, Store},
    error::{ImportError, ImportResult},
};

pub mod geoheader;
pub mod sequence;
pub mod utils;

pub use crate::config::{LoadOptions, LoadStrategy, Tolerance};
pub use geoheader::{GeoheaderLoader, GEOHEADER_TABLE};
pub use sequence::{LoadFailure, LoadPhase, SequenceFileLoader, SequenceLoadReport};

/// Result of loading one table's rows from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Loaded {
        rows: usize,
        duplicates_skipped: usize,
    },
    /// Nothing was written (bulk load failed under `SkipDuplicates`).
    Skipped { reason: String },
}

impl TableOutcome {
    pub fn rows(&self) -> usize {
        match self {
            TableOutcome::Loaded { rows, .. } => *rows,
            TableOutcome::Skipped { .. } => 0,
        }
    }
}

/// Load `rows` as one batch. A failure is a load error; under
/// `SkipDuplicates` it is logged and the whole table is skipped, since a
/// batch cannot drop just the offending rows.
pub fn bulk_rows<S: Store>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    tolerance: Tolerance,
) -> ImportResult<TableOutcome> {
    match store.bulk_load(table, rows) {
        Ok(n) => Ok(TableOutcome::Loaded {
            rows: n,
            duplicates_skipped: 0,
        }),
        Err(e) if tolerance == Tolerance::SkipDuplicates => {
            warn!(table, rows = rows.len(), error = %e, "bulk load failed, skipping table");
            Ok(TableOutcome::Skipped {
                reason: e.to_string(),
            })
        }
        Err(e) => Err(ImportError::Load {
            table: table.to_string(),
            source: e,
        }),
    }
}

/// Insert `rows` one at a time. Must run inside a transaction.
///
/// With `SkipDuplicates` every insert gets its own savepoint so a duplicate
/// key only rolls back that row; any other error ends the load.
pub fn insert_rows<S: Store>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    tolerance: Tolerance,
) -> ImportResult<TableOutcome> {
    let mut loaded = 0;
    let mut skipped = 0;

    for row in rows {
        match tolerance {
            Tolerance::Strict => {
                store
                    .insert(table, row)
                    .map_err(|e| ImportError::from_store(table, e))?;
                loaded += 1;
            }
            Tolerance::SkipDuplicates => match store.savepoint(|s| s.insert(table, row)) {
                Ok(()) => loaded += 1,
                Err(e) if e.is_duplicate_key() => {
                    debug!(table, error = %e, "duplicate row skipped");
                    skipped += 1;
                }
                Err(e) => return Err(ImportError::from_store(table, e)),
            },
        }
    }

    if skipped > 0 {
        warn!(table, skipped, loaded, "duplicate rows skipped");
    }
    Ok(TableOutcome::Loaded {
        rows: loaded,
        duplicates_skipped: skipped,
    })
}

/// Write `rows` with the configured strategy, without opening a transaction
/// of its own.
pub fn write_rows<S: Store>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    options: &LoadOptions,
) -> ImportResult<TableOutcome> {
    match options.strategy {
        LoadStrategy::Bulk => bulk_rows(store, table, rows, options.tolerance),
        LoadStrategy::RowByRow => insert_rows(store, table, rows, options.tolerance),
    }
}

/// Persist one table's rows. Row-by-row loads run in their own transaction
/// so a fatal error leaves the table as it was.
pub fn persist_rows<S: Store>(
    store: &mut S,
    table: &str,
    rows: &[Row],
    options: &LoadOptions,
) -> ImportResult<TableOutcome> {
    info!(table, rows = rows.len(), strategy = ?options.strategy, "loading table");
    let outcome = match options.strategy {
        LoadStrategy::Bulk => write_rows(store, table, rows, options),
        LoadStrategy::RowByRow => store.transaction(|s| write_rows(s, table, rows, options)),
    };
    match &outcome {
        Ok(TableOutcome::Loaded {
            rows,
            duplicates_skipped,
        }) => info!(table, rows, duplicates_skipped, "table loaded"),
        Ok(TableOutcome::Skipped { .. }) => {}
        Err(e) => warn!(table, error = %e, "table load failed"),
    }
    outcome
}
