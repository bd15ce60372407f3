//! Final table composition.
//!
//! Unions the environmental and QA streams (environmental rows first) into
//! the long plot table and the wide data table. The review-status filter
//! applies to both tables; the medium allow-list applies to the plot table
//! only. Record numbers are already partition-suffixed and globally unique
//! when rows reach this module.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Month, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::assemble::AssembledResult;
use crate::catalog::ParameterCatalog;
use crate::config::ExtractionConfig;
use crate::error::{EmptyResultWarning, Result, Stage};
use crate::filter::{StreamTally, check_stage, dedupe_first_seen, is_review_excluded};
use crate::logging;
use crate::model::{ParameterInfo, ResultValue, Sample, Site, Stream};
use crate::pivot::{LongCell, PivotColumn, pivot_wide};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One result with its sample, site and catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub stream: Stream,
    pub site: Option<Site>,
    pub sample: Sample,
    pub assembled: AssembledResult,
    pub parameter: Option<ParameterInfo>,
}

/// The joined rows of one stream.
#[derive(Debug, Clone)]
pub struct StreamRows {
    pub stream: Stream,
    pub partition: String,
    pub rows: Vec<JoinedRow>,
}

impl StreamRows {
    fn tally(&self, before: usize) -> StreamTally<'_> {
        StreamTally {
            stream: self.stream,
            partition: &self.partition,
            before,
            after: self.rows.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Water-year month
// ---------------------------------------------------------------------------

/// Calendar month ordered on the water year, October first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaterYearMonth(pub Month);

impl WaterYearMonth {
    pub fn from_date(date: &impl Datelike) -> Option<Self> {
        u8::try_from(date.month())
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(WaterYearMonth)
    }

    /// 1 for October through 12 for September.
    pub fn position(self) -> u32 {
        (self.0.number_from_month() + 2) % 12 + 1
    }

    pub fn abbreviation(self) -> &'static str {
        let name = self.0.name();
        name.get(..3).unwrap_or(name)
    }
}

impl PartialOrd for WaterYearMonth {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WaterYearMonth {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.position().cmp(&other.position())
    }
}

impl Serialize for WaterYearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.abbreviation())
    }
}

// ---------------------------------------------------------------------------
// Plot table
// ---------------------------------------------------------------------------

/// One row of the long table. Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotRow {
    pub record_no: String,
    pub site_no: String,
    pub station_nm: Option<String>,
    pub sample_start_dt: Option<NaiveDateTime>,
    pub sample_end_dt: Option<NaiveDateTime>,
    pub medium_cd: Option<String>,
    pub project_cd: Option<String>,
    pub parm_cd: String,
    pub parm_nm: Option<String>,
    pub meth_cd: Option<String>,
    pub result_va: Option<ResultValue>,
    pub remark_cd: Option<String>,
    pub val_qual_cd: Option<String>,
    pub rpt_lev_va: Option<String>,
    pub rpt_lev_cd: Option<String>,
    pub dqi_cd: Option<String>,
    pub dec_lat_va: Option<f64>,
    pub dec_long_va: Option<f64>,
    pub sample_cm_tx: Option<String>,
    pub sample_cm_cr: Option<NaiveDateTime>,
    pub sample_cm_cn: Option<String>,
    pub result_cm_tx: Option<String>,
    pub result_cm_cr: Option<NaiveDateTime>,
    pub result_cm_cn: Option<String>,
    pub result_cr: Option<NaiveDateTime>,
    pub result_cn: Option<String>,
    pub result_md: Option<NaiveDateTime>,
    pub result_mn: Option<String>,
    pub anl_ent_cd: Option<String>,
    pub lab_std_va: Option<String>,
    pub prep_dt: Option<NaiveDateTime>,
    pub anl_dt: Option<NaiveDateTime>,
    pub parm_seq_grp_cd: Option<String>,
    pub parm_ds: Option<String>,
    pub parm_seq_nu: Option<i64>,
    pub agency_cd: String,
    pub lab_no: Option<String>,
    pub samp_type_cd: Option<String>,
    pub hyd_cond_cd: Option<String>,
    pub hyd_event_cd: Option<String>,
    pub sample_cr: Option<NaiveDateTime>,
    pub sample_cn: Option<String>,
    pub sample_md: Option<NaiveDateTime>,
    pub sample_mn: Option<String>,
    pub stream: String,
    pub month: Option<WaterYearMonth>,
    pub doy: Option<u32>,
}

impl PlotRow {
    pub const COLUMNS: [&'static str; 47] = [
        "record_no",
        "site_no",
        "station_nm",
        "sample_start_dt",
        "sample_end_dt",
        "medium_cd",
        "project_cd",
        "parm_cd",
        "parm_nm",
        "meth_cd",
        "result_va",
        "remark_cd",
        "val_qual_cd",
        "rpt_lev_va",
        "rpt_lev_cd",
        "dqi_cd",
        "dec_lat_va",
        "dec_long_va",
        "sample_cm_tx",
        "sample_cm_cr",
        "sample_cm_cn",
        "result_cm_tx",
        "result_cm_cr",
        "result_cm_cn",
        "result_cr",
        "result_cn",
        "result_md",
        "result_mn",
        "anl_ent_cd",
        "lab_std_va",
        "prep_dt",
        "anl_dt",
        "parm_seq_grp_cd",
        "parm_ds",
        "parm_seq_nu",
        "agency_cd",
        "lab_no",
        "samp_type_cd",
        "hyd_cond_cd",
        "hyd_event_cd",
        "sample_cr",
        "sample_cn",
        "sample_md",
        "sample_mn",
        "stream",
        "month",
        "doy",
    ];

    pub fn from_joined(row: &JoinedRow) -> Self {
        let sample = &row.sample;
        let result = &row.assembled.result;
        let sample_cm = row.assembled.sample_comment.as_ref();
        let result_cm = row.assembled.result_comment.as_ref();
        let parameter = row.parameter.as_ref();
        let site = row.site.as_ref();

        PlotRow {
            record_no: sample.record_no.clone(),
            site_no: sample.site_no.clone(),
            station_nm: site.and_then(|s| s.station_nm.clone()),
            sample_start_dt: sample.sample_start_dt,
            sample_end_dt: sample.sample_end_dt,
            medium_cd: sample.medium_cd.clone(),
            project_cd: sample.project_cd.clone(),
            parm_cd: result.parm_cd.clone(),
            parm_nm: parameter.and_then(|p| p.parm_nm.clone()),
            meth_cd: result.meth_cd.clone(),
            result_va: result.value.clone(),
            remark_cd: result.remark_cd.clone(),
            val_qual_cd: row.assembled.val_qual_cd.clone(),
            rpt_lev_va: result.rpt_lev_va.clone(),
            rpt_lev_cd: result.rpt_lev_cd.clone(),
            dqi_cd: result.dqi_cd.clone(),
            dec_lat_va: site.and_then(|s| s.dec_lat_va),
            dec_long_va: site.and_then(|s| s.dec_long_va),
            sample_cm_tx: sample_cm.and_then(|c| c.sample_cm_tx.clone()),
            sample_cm_cr: sample_cm.and_then(|c| c.sample_cm_cr),
            sample_cm_cn: sample_cm.and_then(|c| c.sample_cm_cn.clone()),
            result_cm_tx: result_cm.and_then(|c| c.result_cm_tx.clone()),
            result_cm_cr: result_cm.and_then(|c| c.result_cm_cr),
            result_cm_cn: result_cm.and_then(|c| c.result_cm_cn.clone()),
            result_cr: result.result_cr,
            result_cn: result.result_cn.clone(),
            result_md: result.result_md,
            result_mn: result.result_mn.clone(),
            anl_ent_cd: result.anl_ent_cd.clone(),
            lab_std_va: result.lab_std_va.clone(),
            prep_dt: result.prep_dt,
            anl_dt: result.anl_dt,
            parm_seq_grp_cd: parameter.and_then(|p| p.parm_seq_grp_cd.clone()),
            parm_ds: parameter.and_then(|p| p.parm_ds.clone()),
            parm_seq_nu: parameter.and_then(|p| p.parm_seq_nu),
            agency_cd: sample.agency_cd.clone(),
            lab_no: sample.lab_no.clone(),
            samp_type_cd: sample.samp_type_cd.clone(),
            hyd_cond_cd: sample.hyd_cond_cd.clone(),
            hyd_event_cd: sample.hyd_event_cd.clone(),
            sample_cr: sample.sample_cr,
            sample_cn: sample.sample_cn.clone(),
            sample_md: sample.sample_md,
            sample_mn: sample.sample_mn.clone(),
            stream: row.stream.to_string(),
            month: sample.sample_start_dt.and_then(|t| WaterYearMonth::from_date(&t)),
            doy: sample.sample_start_dt.map(|t| t.ordinal()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotTable {
    pub rows: Vec<PlotRow>,
}

impl PlotTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Data table
// ---------------------------------------------------------------------------

/// Sample columns placed between the record number and the parameters.
pub const CORE_COLUMNS: [&str; 7] = [
    "site_no",
    "station_nm",
    "sample_start_dt",
    "sample_end_dt",
    "medium_cd",
    "lab_no",
    "project_cd",
];

/// Sample columns placed after the parameters.
pub const TRAILING_COLUMNS: [&str; 13] = [
    "agency_cd",
    "samp_type_cd",
    "aqfr_cd",
    "hyd_cond_cd",
    "hyd_event_cd",
    "dec_lat_va",
    "dec_long_va",
    "sample_cm_tx",
    "sample_cr",
    "sample_cn",
    "sample_md",
    "sample_mn",
    "stream",
];

const RECORD_COLUMN: &str = "record_no";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub record_no: String,
    /// Sparse cells keyed by column name.
    pub cells: BTreeMap<String, String>,
}

impl DataRow {
    pub fn value(&self, column: &str) -> Option<&str> {
        if column == RECORD_COLUMN {
            return Some(&self.record_no);
        }
        self.cells.get(column).map(String::as_str)
    }
}

/// The wide table: one row per sample. `columns` is the full output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub parameter_columns: Vec<PivotColumn>,
    pub rows: Vec<DataRow>,
    /// Record number to position in `rows`.
    index: HashMap<String, usize>,
}

impl DataTable {
    pub fn new(
        columns: Vec<String>,
        parameter_columns: Vec<PivotColumn>,
        rows: Vec<DataRow>,
    ) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.record_no.clone(), i))
            .collect();
        Self {
            columns,
            parameter_columns,
            rows,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Indexed lookup; rows edited after construction fall back to a scan.
    pub fn row(&self, record_no: &str) -> Option<&DataRow> {
        self.index
            .get(record_no)
            .and_then(|&i| self.rows.get(i))
            .filter(|r| r.record_no == record_no)
            .or_else(|| self.rows.iter().find(|r| r.record_no == record_no))
    }

    pub fn get(&self, record_no: &str, column: &str) -> Option<&str> {
        self.row(record_no)?.value(column)
    }

    /// Column name assigned to a parameter code.
    pub fn column_for(&self, parm_cd: &str) -> Option<&str> {
        self.parameter_columns
            .iter()
            .find(|c| c.parm_cd == parm_cd)
            .map(|c| c.column.as_str())
    }
}

fn format_time(t: Option<NaiveDateTime>) -> Option<String> {
    t.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

fn sample_metadata(row: &JoinedRow) -> Vec<(&'static str, Option<String>)> {
    let sample = &row.sample;
    let site = row.site.as_ref();
    vec![
        ("site_no", Some(sample.site_no.clone())),
        ("station_nm", site.and_then(|s| s.station_nm.clone())),
        ("sample_start_dt", format_time(sample.sample_start_dt)),
        ("sample_end_dt", format_time(sample.sample_end_dt)),
        ("medium_cd", sample.medium_cd.clone()),
        ("lab_no", sample.lab_no.clone()),
        ("project_cd", sample.project_cd.clone()),
        ("agency_cd", Some(sample.agency_cd.clone())),
        ("samp_type_cd", sample.samp_type_cd.clone()),
        ("aqfr_cd", sample.aqfr_cd.clone()),
        ("hyd_cond_cd", sample.hyd_cond_cd.clone()),
        ("hyd_event_cd", sample.hyd_event_cd.clone()),
        ("dec_lat_va", site.and_then(|s| s.dec_lat_va).map(|v| v.to_string())),
        ("dec_long_va", site.and_then(|s| s.dec_long_va).map(|v| v.to_string())),
        (
            "sample_cm_tx",
            row.assembled
                .sample_comment
                .as_ref()
                .and_then(|c| c.sample_cm_tx.clone()),
        ),
        ("sample_cr", format_time(sample.sample_cr)),
        ("sample_cn", sample.sample_cn.clone()),
        ("sample_md", format_time(sample.sample_md)),
        ("sample_mn", sample.sample_mn.clone()),
        ("stream", Some(row.stream.to_string())),
    ]
}

fn build_data_table(rows: &[&JoinedRow], catalog: &ParameterCatalog) -> DataTable {
    let reserved: Vec<&str> = std::iter::once(RECORD_COLUMN)
        .chain(CORE_COLUMNS)
        .chain(TRAILING_COLUMNS)
        .collect();

    let cells = rows.iter().map(|r| LongCell {
        record_no: &r.sample.record_no,
        parm_cd: &r.assembled.result.parm_cd,
        value: &r.assembled.value_with_qualifier,
    });
    let wide = pivot_wide(cells, catalog, &reserved);
    if wide.collapsed > 0 {
        logging::debug(
            None,
            None,
            &format!("{} duplicate result cell(s) collapsed in pivot", wide.collapsed),
        );
    }

    let mut metadata: HashMap<&str, &JoinedRow> = HashMap::new();
    for &row in rows {
        metadata.entry(row.sample.record_no.as_str()).or_insert(row);
    }

    let data_rows = wide
        .rows
        .into_iter()
        .map(|wide_row| {
            let mut cells: BTreeMap<String, String> = wide_row.values.into_iter().collect();
            if let Some(joined) = metadata.get(wide_row.record_no.as_str()) {
                for (column, value) in sample_metadata(joined) {
                    if let Some(value) = value {
                        cells.insert(column.to_string(), value);
                    }
                }
            }
            DataRow {
                record_no: wide_row.record_no,
                cells,
            }
        })
        .collect();

    let columns = std::iter::once(RECORD_COLUMN.to_string())
        .chain(CORE_COLUMNS.iter().map(|c| c.to_string()))
        .chain(wide.columns.iter().map(|c| c.column.clone()))
        .chain(TRAILING_COLUMNS.iter().map(|c| c.to_string()))
        .collect();

    DataTable::new(columns, wide.columns, data_rows)
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Builds both output tables from the joined rows of each stream.
pub fn compose(
    env: StreamRows,
    qa: StreamRows,
    config: &ExtractionConfig,
    catalog: &ParameterCatalog,
    warnings: &mut Vec<EmptyResultWarning>,
) -> Result<(PlotTable, DataTable)> {
    let mut streams = [env, qa];

    let before = streams.each_ref().map(|s| s.rows.len());
    for stream in streams.iter_mut() {
        stream.rows.retain(|r| {
            !is_review_excluded(
                r.assembled.result.dqi_cd.as_deref(),
                &config.excluded_dqi_codes,
            )
        });
    }
    check_stage(
        Stage::ReviewStatus,
        [streams[0].tally(before[0]), streams[1].tally(before[1])],
        warnings,
    )?;

    let plot_streams = streams.each_ref().map(|s| StreamRows {
        stream: s.stream,
        partition: s.partition.clone(),
        rows: s
            .rows
            .iter()
            .filter(|r| config.is_plot_medium(r.sample.medium_cd.as_deref()))
            .cloned()
            .collect(),
    });
    check_stage(
        Stage::MediumCode,
        [
            plot_streams[0].tally(streams[0].rows.len()),
            plot_streams[1].tally(streams[1].rows.len()),
        ],
        warnings,
    )?;

    let plot_table = PlotTable {
        rows: plot_streams
            .iter()
            .flat_map(|s| s.rows.iter().map(PlotRow::from_joined))
            .collect(),
    };

    let all_rows: Vec<&JoinedRow> = streams.iter().flat_map(|s| s.rows.iter()).collect();
    let unique = dedupe_first_seen(all_rows, |r| {
        (r.sample.record_no.as_str(), r.assembled.result.parm_cd.as_str())
    });
    let data_table = build_data_table(&unique, catalog);

    logging::info(
        None,
        None,
        &format!(
            "composed plot table with {} rows and data table with {} rows, {} parameter columns",
            plot_table.len(),
            data_table.len(),
            data_table.parameter_columns.len()
        ),
    );
    Ok((plot_table, data_table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Record;
    use crate::model::ResultRecord;
    use chrono::NaiveDate;
    use serde_json::json;

    fn joined(stream: Stream, record_no: &str, parm_cd: &str, value: &str) -> JoinedRow {
        let sample = Sample::from_record(
            &Record::from_json(json!({
                "record_no": record_no,
                "site_no": "05586100",
                "sample_start_dt": "2020-10-15 12:00:00",
                "medium_cd": "WS",
                "lab_no": "20201234",
            }))
            .unwrap(),
        )
        .unwrap();
        let result = ResultRecord::from_record(
            &Record::from_json(json!({
                "record_no": record_no,
                "parm_cd": parm_cd,
                "result_va": value,
            }))
            .unwrap(),
            false,
        )
        .unwrap();
        JoinedRow {
            stream,
            site: Some(Site {
                agency_cd: "USGS".to_string(),
                site_no: "05586100".to_string(),
                station_nm: Some("ILLINOIS RIVER AT VALLEY CITY, IL".to_string()),
                dec_lat_va: Some(39.7),
                dec_long_va: Some(-90.6),
            }),
            sample,
            assembled: AssembledResult {
                value_with_qualifier: value.to_string(),
                result,
                sample_comment: None,
                result_comment: None,
                val_qual_cd: None,
            },
            parameter: None,
        }
    }

    fn stream_rows(stream: Stream, partition: &str, rows: Vec<JoinedRow>) -> StreamRows {
        StreamRows {
            stream,
            partition: partition.to_string(),
            rows,
        }
    }

    #[test]
    fn test_water_year_month_positions() {
        let pos = |m: u32| {
            WaterYearMonth::from_date(&NaiveDate::from_ymd_opt(2020, m, 1).unwrap())
                .unwrap()
                .position()
        };
        assert_eq!(pos(10), 1);
        assert_eq!(pos(12), 3);
        assert_eq!(pos(1), 4);
        assert_eq!(pos(9), 12);
        assert!(WaterYearMonth(Month::October) < WaterYearMonth(Month::January));
        assert_eq!(WaterYearMonth(Month::October).abbreviation(), "Oct");
    }

    #[test]
    fn test_plot_row_columns_match_serialized_header() {
        let row = PlotRow::from_joined(&joined(Stream::Environmental, "1_01", "00300", "8.4"));
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&row).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, PlotRow::COLUMNS.join(","));
    }

    #[test]
    fn test_plot_row_derives_month_and_day_of_year() {
        let row = PlotRow::from_joined(&joined(Stream::QualityAssurance, "1_02", "00300", "8.4"));
        assert_eq!(row.month, Some(WaterYearMonth(Month::October)));
        assert_eq!(row.doy, Some(289));
        assert_eq!(row.stream, "QA");
        assert_eq!(row.station_nm.as_deref(), Some("ILLINOIS RIVER AT VALLEY CITY, IL"));
    }

    #[test]
    fn test_compose_unions_streams_env_first() {
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![joined(Stream::Environmental, "1_01", "00300", "8.4")],
        );
        let qa = stream_rows(
            Stream::QualityAssurance,
            "02",
            vec![joined(Stream::QualityAssurance, "1_02", "00300", "8.5")],
        );
        let mut warnings = Vec::new();
        let (plot, data) = compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();

        let records: Vec<&str> = plot.rows.iter().map(|r| r.record_no.as_str()).collect();
        assert_eq!(records, vec!["1_01", "1_02"]);
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("1_02", "p00300"), Some("8.5"));
        assert_eq!(data.get("1_01", "stream"), Some("ENV"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_data_table_column_order() {
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![
                joined(Stream::Environmental, "1_01", "00400", "7.1"),
                joined(Stream::Environmental, "1_01", "00300", "8.4"),
            ],
        );
        let qa = stream_rows(Stream::QualityAssurance, "02", vec![]);
        let mut warnings = Vec::new();
        let (_, data) = compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(data.columns[0], "record_no");
        assert_eq!(&data.columns[1..8], &CORE_COLUMNS.map(String::from)[..]);
        assert_eq!(&data.columns[8..10], &["p00300".to_string(), "p00400".to_string()][..]);
        assert_eq!(data.columns.len(), 1 + CORE_COLUMNS.len() + 2 + TRAILING_COLUMNS.len());
        assert_eq!(data.get("1_01", "sample_start_dt"), Some("2020-10-15T12:00:00"));
    }

    #[test]
    fn test_data_table_rows_found_by_record_number() {
        let rows: Vec<DataRow> = (0..500)
            .map(|i| DataRow {
                record_no: format!("{:08}_01", i),
                cells: BTreeMap::from([("p00300".to_string(), i.to_string())]),
            })
            .collect();
        let mut table = DataTable::new(Vec::new(), Vec::new(), rows);

        assert_eq!(table.get("00000000_01", "p00300"), Some("0"));
        assert_eq!(table.get("00000499_01", "p00300"), Some("499"));
        assert_eq!(table.get("00000499_01", "record_no"), Some("00000499_01"));
        assert!(table.row("00000500_01").is_none());

        table.rows.reverse();
        assert_eq!(table.get("00000499_01", "p00300"), Some("499"));
    }

    #[test]
    fn test_rejected_results_leave_both_tables() {
        let mut rejected = joined(Stream::Environmental, "1_01", "00400", "7.1");
        rejected.assembled.result.dqi_cd = Some("X".to_string());
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![joined(Stream::Environmental, "1_01", "00300", "8.4"), rejected],
        );
        let qa = stream_rows(Stream::QualityAssurance, "02", vec![]);
        let mut warnings = Vec::new();
        let (plot, data) = compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();

        assert!(plot.rows.iter().all(|r| r.parm_cd != "00400"));
        assert!(data.column_for("00400").is_none());
    }

    #[test]
    fn test_medium_allow_list_only_narrows_plot_table() {
        let mut bed = joined(Stream::Environmental, "2_01", "00300", "1.0");
        bed.sample.medium_cd = Some("SB".to_string());
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![joined(Stream::Environmental, "1_01", "00300", "8.4"), bed],
        );
        let qa = stream_rows(Stream::QualityAssurance, "02", vec![]);
        let mut warnings = Vec::new();
        let (plot, data) = compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(plot.len(), 1);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_duplicate_pairs_kept_in_plot_collapsed_in_data() {
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![
                joined(Stream::Environmental, "1_01", "00300", "8.4"),
                joined(Stream::Environmental, "1_01", "00300", "9.9"),
            ],
        );
        let qa = stream_rows(Stream::QualityAssurance, "02", vec![]);
        let mut warnings = Vec::new();
        let (plot, data) = compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(plot.len(), 2);
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("1_01", "p00300"), Some("8.4"));
    }

    #[test]
    fn test_stream_emptied_by_review_is_warned() {
        let mut rejected = joined(Stream::QualityAssurance, "1_02", "00300", "8.4");
        rejected.assembled.result.dqi_cd = Some("Q".to_string());
        let env = stream_rows(
            Stream::Environmental,
            "01",
            vec![joined(Stream::Environmental, "1_01", "00300", "8.4")],
        );
        let qa = stream_rows(Stream::QualityAssurance, "02", vec![rejected]);
        let mut warnings = Vec::new();
        compose(
            env,
            qa,
            &ExtractionConfig::default(),
            &ParameterCatalog::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].stage, Stage::ReviewStatus);
        assert_eq!(warnings[0].partition, "02");
    }
}
