use std::{fs, path::Path};

use anyhow::Result;
use censusload::{
    db::{SqliteStore, Store},
    decode::Width,
    import,
    lookup::{LookupMetadataStore, TableFilter},
    process::{geoheader::GEOHEADER_LAYOUT, SequenceFileLoader, TableOutcome},
    ImportConfig, LoadOptions, LoadStrategy, Tolerance,
};
use tempfile::TempDir;
use tracing_subscriber::{fmt, EnvFilter};

fn init_test_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,censusload::process=debug")),
        )
        .with_test_writer()
        .finish();
    // already set by another test in this binary
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn geo_line(logrecno: &str, sumlevel: &str, geoid: &str, name: &str) -> String {
    GEOHEADER_LAYOUT
        .fields()
        .iter()
        .map(|field| {
            let Width::Fixed(width) = field.width else {
                unreachable!("geoheader fields are fixed")
            };
            let value = match field.name {
                "fileid" => "ACSSF",
                "stusab" => "CA",
                "sumlevel" => sumlevel,
                "logrecno" => logrecno,
                "state" => "06",
                "geoid" => geoid,
                "name" => name,
                _ => "",
            };
            format!("{:<width$}", value)
        })
        .collect()
}

const LOOKUP: &str = "\
File ID,Table ID,Sequence Number,Line Number,Start Position,Total Cells in Table,Total Cells in Sequence,Table Title,Subject Area
ACSSF,B01001,0002,,7,2 CELLS,,SEX BY AGE,Age-Sex
ACSSF,B01001,0002,,,,,Universe:  Total population,Age-Sex
ACSSF,B01001,0002,1,,,,Total:,Age-Sex
ACSSF,B01001,0002,2,,,,Male:,Age-Sex
ACSSF,B01001,0002,0.5,,,,Note,Age-Sex
ACSSF,B01002,0002,,9,3 CELLS,,MEDIAN AGE BY SEX,Age-Sex
ACSSF,B01002,0002,,,,,Universe:  Total population,Age-Sex
ACSSF,B01002,0002,1,,,,Median age --,Age-Sex
ACSSF,B01002,0002,2,,,,Male,Age-Sex
ACSSF,B01002,0002,3,,,,Female,Age-Sex
";

const ESTIMATES: &str = "\
ACSSF,2011e5,ca,000,0002,0000001,37253956,18517830,35.2,34.1,36.3
ACSSF,2011e5,ca,000,0002,0000002,1510271,.,37.3,,38.8
";

const MARGINS: &str = "\
ACSSF,2011m5,ca,000,0002,0000001,0,1601,0.1,0.1,0.1
ACSSF,2011m5,ca,000,0002,0000002,0,.,0.2,,0.3
";

fn census_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    let root = dir.path();
    fs::write(root.join("Sequence_Number_and_Table_Number_Lookup.txt"), LOOKUP)?;

    let geo = root.join("California_All_Geographies");
    fs::create_dir_all(&geo)?;
    fs::write(
        geo.join("g20115ca.txt"),
        format!(
            "{}\n{}\n",
            geo_line("0000001", "040", "04000US06", "California"),
            geo_line("0000002", "050", "05000US06001", "Alameda County, California"),
        ),
    )?;
    fs::write(geo.join("e20115ca0002000.txt"), ESTIMATES)?;
    fs::write(geo.join("m20115ca0002000.txt"), MARGINS)?;
    Ok(dir)
}

fn config(dir: &Path) -> ImportConfig {
    ImportConfig {
        census_dir: dir.to_path_buf(),
        database: dir.join("census.sqlite"),
        margins: true,
        ..ImportConfig::default()
    }
}

fn count(store: &SqliteStore, table: &str) -> Result<i64> {
    Ok(store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))?)
}

#[test]
fn full_import_into_sqlite() -> Result<()> {
    init_test_logging();
    let dir = census_dir()?;
    let cfg = config(dir.path());
    let files = import::discover(&cfg)?;
    assert_eq!(files.geography.len(), 1);
    assert_eq!(files.sequences.len(), 2);

    let mut store = SqliteStore::open(&cfg.database)?;
    let summary = import::run(&mut store, &cfg, &files)?;
    assert_eq!(summary.failed().count(), 0);
    assert_eq!(summary.tables_created, 4);
    assert_eq!(summary.rows_loaded(), 8);

    // geoheader post-processing
    let (stusab, tiger): (String, String) = store.connection().query_row(
        "SELECT stusab, geoid_tiger FROM geoheader WHERE logrecno = 2",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(stusab, "ca");
    assert_eq!(tiger, "06001");

    // estimates join the geoheader on (stusab, logrecno)
    let total: i64 = store.connection().query_row(
        "SELECT e.\"B01001.0001\" FROM \"B01001\" e \
         JOIN geoheader g ON g.stusab = e.stusab AND g.logrecno = e.logrecno \
         WHERE g.geoid_tiger = '06'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(total, 37_253_956);

    let sentinel: i64 = store.connection().query_row(
        "SELECT \"B01001.0002\" FROM \"B01001\" WHERE logrecno = 2",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(sentinel, -2);

    let median: f64 = store.connection().query_row(
        "SELECT \"B01002.0001\" FROM \"B01002\" WHERE logrecno = 1",
        [],
        |r| r.get(0),
    )?;
    assert!((median - 35.2).abs() < 1e-9);

    let missing: Option<f64> = store.connection().query_row(
        "SELECT \"B01002.0002\" FROM \"B01002\" WHERE logrecno = 2",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(missing, None);

    assert_eq!(count(&store, "B01001_moe")?, 2);
    assert_eq!(count(&store, "census_lookup")?, 10);
    assert_eq!(count(&store, "census_column_lookup")?, 5);

    let universe: String = store.connection().query_row(
        "SELECT table_universe FROM census_column_lookup WHERE column_id = 'B01001.0002'",
        [],
        |r| r.get(0),
    )?;
    assert_eq!(universe, "Total population");
    Ok(())
}

#[test]
fn reloading_follows_the_tolerance_asymmetry() -> Result<()> {
    init_test_logging();
    let dir = census_dir()?;
    let cfg = ImportConfig {
        skip_geoheader: true,
        margins: false,
        ..config(dir.path())
    };
    let files = import::discover(&cfg)?;
    let mut store = SqliteStore::open(&cfg.database)?;
    import::run(&mut store, &cfg, &files)?;

    let lookup = LookupMetadataStore::from_path(cfg.lookup_path())?;
    let estimates = dir
        .path()
        .join("California_All_Geographies")
        .join("e20115ca0002000.txt");

    // row-by-row, tolerant: second load is a no-op
    let loader = SequenceFileLoader::new(
        &lookup,
        LoadOptions::new(LoadStrategy::RowByRow, Tolerance::SkipDuplicates),
        TableFilter::All,
    );
    let report = loader.load(&mut store, &estimates).into_result()?;
    assert_eq!(
        report.tables["B01001"],
        TableOutcome::Loaded {
            rows: 0,
            duplicates_skipped: 2
        }
    );
    assert_eq!(count(&store, "B01001")?, 2);

    // bulk, tolerant: the whole table load is dropped
    let loader = SequenceFileLoader::new(
        &lookup,
        LoadOptions::new(LoadStrategy::Bulk, Tolerance::SkipDuplicates),
        TableFilter::All,
    );
    let report = loader.load(&mut store, &estimates).into_result()?;
    assert!(matches!(report.tables["B01001"], TableOutcome::Skipped { .. }));
    assert_eq!(count(&store, "B01001")?, 2);

    // bulk, strict: the reload fails and nothing changes
    let loader = SequenceFileLoader::new(&lookup, LoadOptions::default(), TableFilter::All);
    let report = loader.load(&mut store, &estimates);
    assert!(report.is_failed());
    assert_eq!(count(&store, "B01001")?, 2);
    assert!(store.connection().is_autocommit());

    // the store is still usable after the failures
    store.run_query("DELETE FROM \"B01001\";")?;
    assert_eq!(count(&store, "B01001")?, 0);
    Ok(())
}
