// src/config.rs
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ImportError, ImportResult},
    lookup::TableFilter,
};

/// How rows reach the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// One atomic batch per table.
    #[default]
    Bulk,
    /// One transaction per table, one insert per row.
    RowByRow,
}

/// What to do about duplicate keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tolerance {
    #[default]
    Strict,
    /// Row-by-row: skip the duplicate row. Bulk: skip the whole table.
    SkipDuplicates,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadOptions {
    pub strategy: LoadStrategy,
    pub tolerance: Tolerance,
}

impl LoadOptions {
    pub fn new(strategy: LoadStrategy, tolerance: Tolerance) -> Self {
        Self {
            strategy,
            tolerance,
        }
    }
}

/// Settings of one import run. Every field has a default so a YAML file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Root of the unpacked census release.
    pub census_dir: PathBuf,
    pub database: PathBuf,
    /// Relative to `census_dir` unless absolute.
    pub lookup_file: PathBuf,
    /// Glob patterns, relative to `census_dir`.
    pub geography_glob: String,
    pub sequence_glob: String,
    /// Census table ids to load; empty means every table.
    pub tables: Vec<String>,
    pub load: LoadOptions,
    pub skip_geoheader: bool,
    /// Also create the `_moe` tables.
    pub margins: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            census_dir: PathBuf::from("census"),
            database: PathBuf::from("census.sqlite"),
            lookup_file: PathBuf::from("Sequence_Number_and_Table_Number_Lookup.txt"),
            geography_glob: "**/g20*.txt".to_string(),
            sequence_glob: "**/[em]20*.txt".to_string(),
            tables: Vec::new(),
            load: LoadOptions::default(),
            skip_geoheader: false,
            margins: false,
        }
    }
}

impl ImportConfig {
    pub fn from_yaml_str(yaml: &str) -> ImportResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ImportError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
        Self::from_yaml_str(&text)
            .map_err(|e| ImportError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn table_filter(&self) -> TableFilter {
        if self.tables.is_empty() {
            TableFilter::All
        } else {
            TableFilter::only(self.tables.iter().cloned())
        }
    }

    pub fn lookup_path(&self) -> PathBuf {
        self.census_dir.join(&self.lookup_file)
    }

    pub fn geography_pattern(&self) -> String {
        self.census_dir.join(&self.geography_glob).display().to_string()
    }

    pub fn sequence_pattern(&self) -> String {
        self.census_dir.join(&self.sequence_glob).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    #[test]
    fn defaults_load_everything_in_bulk() {
        let cfg = ImportConfig::default();
        assert_eq!(cfg.load.strategy, LoadStrategy::Bulk);
        assert_eq!(cfg.load.tolerance, Tolerance::Strict);
        assert_eq!(cfg.table_filter(), TableFilter::All);
        assert_eq!(
            cfg.lookup_path(),
            PathBuf::from("census/Sequence_Number_and_Table_Number_Lookup.txt")
        );
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = ImportConfig::from_yaml_str(
            "census_dir: /data/acs2010\ntables: [B01001, B19013]\nload:\n  strategy: row_by_row\n  tolerance: skip_duplicates\n",
        )?;
        assert_eq!(cfg.census_dir, PathBuf::from("/data/acs2010"));
        assert_eq!(cfg.load, LoadOptions::new(LoadStrategy::RowByRow, Tolerance::SkipDuplicates));
        assert!(cfg.table_filter().matches("B19013"));
        assert!(!cfg.table_filter().matches("B01002"));
        assert_eq!(cfg.database, PathBuf::from("census.sqlite"));
        assert_eq!(cfg.sequence_pattern(), "/data/acs2010/**/[em]20*.txt");
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ImportConfig::from_yaml_str("censusdir: x\n").unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }

    #[test]
    fn reads_from_file() -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        writeln!(tmp, "margins: true")?;
        writeln!(tmp, "skip_geoheader: true")?;
        let cfg = ImportConfig::from_yaml_file(tmp.path())?;
        assert!(cfg.margins);
        assert!(cfg.skip_geoheader);

        assert!(matches!(
            ImportConfig::from_yaml_file("/nonexistent/censusload.yaml"),
            Err(ImportError::Io { .. })
        ));
        Ok(())
    }
}
