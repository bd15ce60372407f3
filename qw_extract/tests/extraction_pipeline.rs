/// End-to-end tests of the extraction pipeline against the in-memory backend.
///
/// The fixture holds two partitions for one Illinois River site:
/// - `01` (environmental): two samples, one of them bed sediment, with
///   comments, a qualifier, a duplicated result and a rejected result
/// - `02` (QA): one replicate sample reusing record number 00000001
///
/// Run with: cargo test --test extraction_pipeline

use chrono::{NaiveDate, NaiveDateTime};
use qw_extract::backend::Record;
use qw_extract::backend::memory::MemoryBackend;
use qw_extract::compose::WaterYearMonth;
use qw_extract::export::write_tables;
use qw_extract::model::{ResultValue, Stream};
use qw_extract::{ExtractError, ExtractionConfig, ExtractionRequest, PlotRow, Stage, extract};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const SITE: &str = "05586100";
const DO_COLUMN: &str = "p00300_Dissolved_oxygen";
const PH_COLUMN: &str = "p00400_pH";

fn rec(value: Value) -> Record {
    Record::from_json(value).expect("fixture rows are objects")
}

fn site_row() -> Record {
    rec(json!({
        "agency_cd": "USGS",
        "site_no": "05586100       ",
        "station_nm": "ILLINOIS RIVER AT VALLEY CITY, IL",
        "dec_lat_va": 39.7081,
        "dec_long_va": -90.6454,
    }))
}

fn result_row(record_no: &str, parm_cd: &str, value: &str, remark: Option<&str>, dqi: &str) -> Record {
    let mut row = json!({
        "record_no": record_no,
        "parm_cd": parm_cd,
        "result_va": value,
        "dqi_cd": dqi,
    });
    if let Some(remark) = remark {
        row["remark_cd"] = json!(remark);
    }
    rec(row)
}

/// Builds the two-partition fixture. With `qa_has_site` unset the QA site
/// file does not list the site.
fn backend(qa_has_site: bool) -> MemoryBackend {
    let qa_sites = if qa_has_site { vec![site_row()] } else { vec![] };
    MemoryBackend::new()
        .with_table("sitefile_01", vec![site_row()])
        .with_table("sitefile_02", qa_sites)
        .with_table(
            "qw_sample_01",
            vec![
                rec(json!({
                    "record_no": "00000001", "agency_cd": "USGS", "site_no": SITE,
                    "sample_start_dt": "2020-06-15 18:00:00", "sample_start_tz_cd": "CST",
                    "sample_start_local_tm_fg": "Y", "medium_cd": "WS",
                    "project_cd": "00GC8MK", "lab_no": "20201234",
                })),
                rec(json!({
                    "record_no": "00000002", "agency_cd": "USGS", "site_no": SITE,
                    "sample_start_dt": "2020-11-03 15:30:00", "sample_start_tz_cd": "CST",
                    "sample_start_local_tm_fg": "Y", "medium_cd": "SB",
                    "project_cd": "OTHER",
                })),
            ],
        )
        .with_table(
            "qw_sample_02",
            vec![rec(json!({
                "record_no": "00000001", "agency_cd": "USGS", "site_no": SITE,
                "sample_start_dt": "2020-06-16 14:00:00", "sample_start_tz_cd": "CST",
                "sample_start_local_tm_fg": "Y", "medium_cd": "WSQ",
                "project_cd": "00GC8MK",
            }))],
        )
        .with_table(
            "qw_result_01",
            vec![
                result_row("00000001", "00300", "8.4", None, "R"),
                result_row("00000001", "00400", "7.1", Some("E"), "R"),
                result_row("00000001", "00400", "7.3", None, "R"),
                result_row("00000001", "00095", "520", None, "X"),
                result_row("00000002", "00300", "9.0", None, "R"),
            ],
        )
        .with_table(
            "qw_result_02",
            vec![result_row("00000001", "00300", "0.01", Some("<"), "R")],
        )
        .with_table(
            "qw_sample_cm_01",
            vec![rec(json!({"record_no": "00000001", "sample_cm_tx": "storm event"}))],
        )
        .with_table("qw_sample_cm_02", vec![])
        .with_table(
            "qw_result_cm_01",
            vec![rec(json!({"record_no": "00000001", "parm_cd": "00400", "result_cm_tx": "re-run"}))],
        )
        .with_table("qw_result_cm_02", vec![])
        .with_table(
            "qw_val_qual_01",
            vec![rec(json!({"record_no": "00000001", "parm_cd": "00300", "val_qual_cd": "e"}))],
        )
        .with_table("qw_val_qual_02", vec![])
        .with_table(
            "parm",
            vec![
                rec(json!({"parm_cd": "00300", "parm_seq_grp_cd": "INF", "parm_nm": "Dissolved oxygen", "parm_seq_nu": 10})),
                rec(json!({"parm_cd": "00400", "parm_seq_grp_cd": "PHY", "parm_nm": "pH", "parm_seq_nu": 20})),
                rec(json!({"parm_cd": "00095", "parm_seq_grp_cd": "PHY", "parm_nm": "Specific conductance", "parm_seq_nu": 5})),
            ],
        )
}

fn request() -> ExtractionRequest {
    ExtractionRequest {
        data_source: "memory".to_string(),
        env_partition: "01".to_string(),
        qa_partition: "02".to_string(),
        stations: vec![SITE.to_string()],
        parameters: vec!["All".to_string()],
        select_by_group: false,
        begin_date: None,
        end_date: None,
        project_codes: Vec::new(),
        numeric_values: false,
    }
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn plot_rows<'a>(rows: &'a [PlotRow], record_no: &str, parm_cd: &str) -> Vec<&'a PlotRow> {
    rows.iter()
        .filter(|r| r.record_no == record_no && r.parm_cd == parm_cd)
        .collect()
}

// ---------------------------------------------------------------------------
// Full extraction
// ---------------------------------------------------------------------------

#[test]
fn test_full_extraction_builds_both_tables() {
    let backend = backend(true);
    let extraction = extract(&backend, &ExtractionConfig::default(), &request()).unwrap();
    let plot = &extraction.plot_table.rows;
    let data = &extraction.data_table;

    // Bed sediment sample 2 is kept out of the plot table only.
    let records: Vec<&str> = plot.iter().map(|r| r.record_no.as_str()).collect();
    assert_eq!(
        records,
        vec!["00000001_01", "00000001_01", "00000001_01", "00000001_02"]
    );
    let data_records: Vec<&str> = data.rows.iter().map(|r| r.record_no.as_str()).collect();
    assert_eq!(data_records, vec!["00000001_01", "00000002_01", "00000001_02"]);

    assert_eq!(data.column_for("00300"), Some(DO_COLUMN));
    assert_eq!(data.column_for("00400"), Some(PH_COLUMN));
    assert_eq!(data.get("00000001_01", PH_COLUMN), Some("7.1E"));
    assert_eq!(data.get("00000001_01", DO_COLUMN), Some("8.4e"));
    assert_eq!(data.get("00000001_02", DO_COLUMN), Some("0.01<"));
    assert_eq!(data.get("00000002_01", DO_COLUMN), Some("9.0"));
    assert_eq!(data.get("00000002_01", PH_COLUMN), None);
    assert_eq!(data.get("00000001_01", "site_no"), Some(SITE));
    assert_eq!(data.get("00000001_02", "stream"), Some("QA"));

    assert!(extraction.warnings.is_empty());
    assert_eq!(backend.open_connections(), 0);
}

#[test]
fn test_joins_and_catalog_land_on_plot_rows() {
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &request()).unwrap();
    let plot = &extraction.plot_table.rows;

    let oxygen = plot_rows(plot, "00000001_01", "00300");
    assert_eq!(oxygen.len(), 1);
    let oxygen = oxygen[0];
    assert_eq!(oxygen.val_qual_cd.as_deref(), Some("e"));
    assert_eq!(oxygen.sample_cm_tx.as_deref(), Some("storm event"));
    assert_eq!(oxygen.parm_nm.as_deref(), Some("Dissolved oxygen"));
    assert_eq!(oxygen.parm_seq_grp_cd.as_deref(), Some("INF"));
    assert_eq!(oxygen.station_nm.as_deref(), Some("ILLINOIS RIVER AT VALLEY CITY, IL"));
    assert_eq!(oxygen.site_no, SITE);
    assert_eq!(oxygen.stream, Stream::Environmental.to_string());

    let ph = plot_rows(plot, "00000001_01", "00400");
    assert_eq!(ph[0].result_cm_tx.as_deref(), Some("re-run"));
}

#[test]
fn test_start_time_is_local_with_water_year_month() {
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &request()).unwrap();
    let row = &extraction.plot_table.rows[0];

    // 18:00 UTC in CST with daylight saving observed is 13:00 CDT.
    assert_eq!(row.sample_start_dt, Some(at(2020, 6, 15, 13, 0)));
    assert_eq!(row.month.map(WaterYearMonth::position), Some(9));
    assert_eq!(row.doy, Some(167));
}

#[test]
fn test_duplicate_results_stay_long_collapse_wide() {
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &request()).unwrap();
    let ph = plot_rows(&extraction.plot_table.rows, "00000001_01", "00400");
    assert_eq!(ph.len(), 2);
    assert_eq!(
        extraction.data_table.get("00000001_01", PH_COLUMN),
        Some("7.1E")
    );
}

#[test]
fn test_rejected_result_never_appears() {
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &request()).unwrap();
    assert!(extraction.plot_table.rows.iter().all(|r| r.parm_cd != "00095"));
    assert!(extraction.data_table.column_for("00095").is_none());
}

#[test]
fn test_numeric_values_are_typed() {
    let mut numeric = request();
    numeric.numeric_values = true;
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &numeric).unwrap();
    let oxygen = plot_rows(&extraction.plot_table.rows, "00000001_01", "00300");
    assert_eq!(oxygen[0].result_va, Some(ResultValue::Numeric(8.4)));
    // The wide table keeps the raw text with its remark.
    assert_eq!(extraction.data_table.get("00000001_02", DO_COLUMN), Some("0.01<"));
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[test]
fn test_select_by_code() {
    let mut by_code = request();
    by_code.parameters = vec!["00300".to_string()];
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &by_code).unwrap();
    let codes: Vec<&str> = extraction
        .data_table
        .parameter_columns
        .iter()
        .map(|c| c.parm_cd.as_str())
        .collect();
    assert_eq!(codes, vec!["00300"]);
}

#[test]
fn test_select_by_group() {
    let mut by_group = request();
    by_group.parameters = vec!["PHY".to_string()];
    by_group.select_by_group = true;
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &by_group).unwrap();
    assert!(extraction.plot_table.rows.iter().all(|r| r.parm_cd == "00400"));
    // Only the QA stream loses everything.
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].stream, Stream::QualityAssurance);
    assert_eq!(extraction.warnings[0].stage, Stage::ParameterSelection);
}

#[test]
fn test_date_range_emptying_one_stream_is_a_warning() {
    let mut ranged = request();
    ranged.begin_date = NaiveDate::from_ymd_opt(2020, 6, 1);
    ranged.end_date = NaiveDate::from_ymd_opt(2020, 6, 15);
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &ranged).unwrap();

    assert_eq!(extraction.data_table.len(), 1);
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].stage, Stage::DateRange);
    assert_eq!(extraction.warnings[0].partition, "02");
}

#[test]
fn test_project_filter() {
    let mut projects = request();
    projects.project_codes = vec!["OTHER".to_string()];
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &projects).unwrap();
    let records: Vec<&str> = extraction
        .data_table
        .rows
        .iter()
        .map(|r| r.record_no.as_str())
        .collect();
    assert_eq!(records, vec!["00000002_01"]);
}

// ---------------------------------------------------------------------------
// Empty-result policy
// ---------------------------------------------------------------------------

#[test]
fn test_both_site_lookups_empty_is_fatal() {
    let backend = backend(true);
    let mut missing = request();
    missing.stations = vec!["09999999".to_string()];

    let err = extract(&backend, &ExtractionConfig::default(), &missing).unwrap_err();

    assert!(matches!(err, ExtractError::JointEmpty(Stage::SiteLookup)));
    assert!(backend.queries_on("qw_sample_01").is_empty());
    assert_eq!(backend.open_connections(), 0);
}

#[test]
fn test_only_qa_empty_succeeds_from_environmental_stream() {
    let extraction = extract(&backend(false), &ExtractionConfig::default(), &request()).unwrap();

    assert!(!extraction.plot_table.is_empty());
    assert!(extraction.plot_table.rows.iter().all(|r| r.stream == "ENV"));
    assert!(extraction.data_table.rows.iter().all(|r| r.record_no.ends_with("_01")));
    assert_eq!(extraction.warnings.len(), 1);
    assert_eq!(extraction.warnings[0].stage, Stage::SiteLookup);
    assert_eq!(extraction.warnings[0].stream, Stream::QualityAssurance);
}

#[test]
fn test_samples_without_results_in_both_streams_is_fatal() {
    let unresulted = |record_no: &str| {
        rec(json!({
            "record_no": record_no, "agency_cd": "USGS", "site_no": SITE,
            "sample_start_dt": "2021-04-02 16:00:00", "sample_start_tz_cd": "CST",
            "sample_start_local_tm_fg": "Y", "medium_cd": "WS",
            "project_cd": "NORES",
        }))
    };
    let backend = backend(true)
        .with_table("qw_sample_01", vec![unresulted("00000009")])
        .with_table("qw_sample_02", vec![unresulted("00000009")]);
    let mut no_results = request();
    no_results.project_codes = vec!["NORES".to_string()];

    let err = extract(&backend, &ExtractionConfig::default(), &no_results).unwrap_err();

    assert!(matches!(err, ExtractError::JointEmpty(Stage::ResultJoin)));
    assert_eq!(backend.queries_on("qw_result_01").len(), 1);
    assert_eq!(backend.queries_on("qw_result_02").len(), 1);
    assert!(backend.queries_on("parm").is_empty());
    assert_eq!(backend.open_connections(), 0);
}

#[test]
fn test_selection_matching_nothing_is_fatal() {
    let mut nothing = request();
    nothing.parameters = vec!["99999".to_string()];
    let err = extract(&backend(true), &ExtractionConfig::default(), &nothing).unwrap_err();
    assert!(matches!(err, ExtractError::JointEmpty(Stage::ParameterSelection)));
}

// ---------------------------------------------------------------------------
// Errors and resources
// ---------------------------------------------------------------------------

#[test]
fn test_missing_partition_table_names_partition() {
    let backend = backend(true);
    let mut wrong = request();
    wrong.qa_partition = "03".to_string();

    let err = extract(&backend, &ExtractionConfig::default(), &wrong).unwrap_err();

    match err {
        ExtractError::Query {
            partition,
            table,
            missing_table,
            ..
        } => {
            assert_eq!(partition, "03");
            assert_eq!(table, "sitefile_03");
            assert!(missing_table);
        }
        other => panic!("expected Query error, got {other:?}"),
    }
    assert_eq!(backend.open_connections(), 0);
}

#[test]
fn test_unreachable_source_is_a_connection_error() {
    let err = extract(
        &MemoryBackend::unreachable(),
        &ExtractionConfig::default(),
        &request(),
    )
    .unwrap_err();
    match err {
        ExtractError::BackendConnection { data_source, .. } => assert_eq!(data_source, "memory"),
        other => panic!("expected BackendConnection error, got {other:?}"),
    }
}

#[test]
fn test_empty_station_list_is_rejected_before_querying() {
    let backend = backend(true);
    let mut empty = request();
    empty.stations.clear();

    let err = extract(&backend, &ExtractionConfig::default(), &empty).unwrap_err();

    assert!(matches!(err, ExtractError::InvalidInput(_)));
    assert!(backend.query_log().is_empty());
}

#[test]
fn test_small_batches_split_record_lookups() {
    let backend = backend(true);
    let config = ExtractionConfig {
        batch_size: 1,
        ..ExtractionConfig::default()
    };
    extract(&backend, &config, &request()).unwrap();

    let result_queries = backend.queries_on("qw_result_01");
    assert_eq!(result_queries.len(), 2);
    assert!(result_queries.iter().all(|q| q.keys.len() == 1));
    // Three distinct codes survive the joins, one query each.
    assert_eq!(backend.queries_on("parm").len(), 3);
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[test]
fn test_csv_export_headers() {
    let extraction = extract(&backend(true), &ExtractionConfig::default(), &request()).unwrap();
    let dir = std::env::temp_dir().join(format!("qw_extract_export_{}", std::process::id()));

    let (plot_path, data_path) = write_tables(&extraction, &dir).unwrap();

    let plot = std::fs::read_to_string(&plot_path).unwrap();
    assert_eq!(plot.lines().next(), Some(PlotRow::COLUMNS.join(",").as_str()));
    assert_eq!(plot.lines().count(), 1 + extraction.plot_table.len());

    let data = std::fs::read_to_string(&data_path).unwrap();
    let header = data.lines().next().unwrap();
    assert!(header.starts_with("record_no,site_no,station_nm"));
    assert!(header.contains(DO_COLUMN));

    std::fs::remove_dir_all(&dir).ok();
}
