/// Core data types for the discrete water-quality extraction service.
///
/// This module defines the shared domain model imported by all other modules:
/// station identifiers, the five source entities (site, sample, result,
/// comments, qualifiers), catalog entries and the typed result value.
/// Decoding from backend `Record`s lives beside each type; everything here is
/// an immutable snapshot for the duration of one extraction call.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::backend::Record;

// ---------------------------------------------------------------------------
// Identifier conventions
// ---------------------------------------------------------------------------

/// Agency assumed when a station identifier carries no prefix.
pub const DEFAULT_AGENCY: &str = "USGS";

/// Storage width of the site number column; keys are space-padded to it.
pub const SITE_NO_WIDTH: usize = 15;

/// Parameter selector value that disables parameter filtering.
pub const ALL_PARAMETERS: &str = "All";

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// The two partitions an extraction reads: production samples and
/// quality-assurance samples. Both hold the same table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    Environmental,
    QualityAssurance,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Environmental => write!(f, "ENV"),
            Stream::QualityAssurance => write!(f, "QA"),
        }
    }
}

// ---------------------------------------------------------------------------
// Station identifiers
// ---------------------------------------------------------------------------

/// A normalized (agency, site) pair. `site_no` is always trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId {
    pub agency_cd: String,
    pub site_no: String,
}

impl StationId {
    /// The site number right-padded to the storage width.
    pub fn padded_site_no(&self) -> String {
        format!("{:<width$}", self.site_no, width = SITE_NO_WIDTH)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.agency_cd, self.site_no)
    }
}

// ---------------------------------------------------------------------------
// Source entities
// ---------------------------------------------------------------------------

/// Site file entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub agency_cd: String,
    pub site_no: String,
    pub station_nm: Option<String>,
    pub dec_lat_va: Option<f64>,
    pub dec_long_va: Option<f64>,
}

impl Site {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Site {
            agency_cd: record
                .text("agency_cd")
                .unwrap_or_else(|| DEFAULT_AGENCY.to_string()),
            site_no: record.text("site_no")?,
            station_nm: record.text("station_nm"),
            dec_lat_va: record.number("dec_lat_va"),
            dec_long_va: record.number("dec_long_va"),
        })
    }

    pub fn station_id(&self) -> StationId {
        StationId {
            agency_cd: self.agency_cd.clone(),
            site_no: self.site_no.clone(),
        }
    }
}

/// One physical collection event.
///
/// Start and end timestamps are UTC as stored until the time normalizer
/// rewrites them; each carries its own timezone code and daylight flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub record_no: String,
    pub agency_cd: String,
    pub site_no: String,
    pub sample_start_dt: Option<NaiveDateTime>,
    pub sample_start_tz_cd: Option<String>,
    pub sample_start_local_tm_fg: Option<bool>,
    pub sample_end_dt: Option<NaiveDateTime>,
    pub sample_end_tz_cd: Option<String>,
    pub sample_end_local_tm_fg: Option<bool>,
    pub medium_cd: Option<String>,
    pub project_cd: Option<String>,
    pub samp_type_cd: Option<String>,
    pub lab_no: Option<String>,
    pub aqfr_cd: Option<String>,
    pub hyd_cond_cd: Option<String>,
    pub hyd_event_cd: Option<String>,
    pub sample_cr: Option<NaiveDateTime>,
    pub sample_cn: Option<String>,
    pub sample_md: Option<NaiveDateTime>,
    pub sample_mn: Option<String>,
}

impl Sample {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Sample {
            record_no: record.text("record_no")?,
            agency_cd: record
                .text("agency_cd")
                .unwrap_or_else(|| DEFAULT_AGENCY.to_string()),
            site_no: record.text("site_no")?,
            sample_start_dt: record.timestamp("sample_start_dt"),
            sample_start_tz_cd: record.text("sample_start_tz_cd"),
            sample_start_local_tm_fg: record.flag("sample_start_local_tm_fg"),
            sample_end_dt: record.timestamp("sample_end_dt"),
            sample_end_tz_cd: record.text("sample_end_tz_cd"),
            sample_end_local_tm_fg: record.flag("sample_end_local_tm_fg"),
            medium_cd: record.text("medium_cd"),
            project_cd: record.text("project_cd"),
            samp_type_cd: record.text("samp_type_cd"),
            lab_no: record.text("lab_no"),
            aqfr_cd: record.text("aqfr_cd"),
            hyd_cond_cd: record.text("hyd_cond_cd"),
            hyd_event_cd: record.text("hyd_event_cd"),
            sample_cr: record.timestamp("sample_cr"),
            sample_cn: record.text("sample_cn"),
            sample_md: record.timestamp("sample_md"),
            sample_mn: record.text("sample_mn"),
        })
    }

    pub fn station_id(&self) -> StationId {
        StationId {
            agency_cd: self.agency_cd.clone(),
            site_no: self.site_no.clone(),
        }
    }
}

/// A result value, typed once at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultValue {
    Numeric(f64),
    Text(String),
}

impl ResultValue {
    /// Types a raw value. With `numeric` set, text that does not parse as a
    /// number yields `None` rather than falling back to text.
    pub fn from_raw(raw: Option<&str>, numeric: bool) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        if numeric {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ResultValue::Numeric)
        } else {
            Some(ResultValue::Text(raw.to_string()))
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Numeric(v) => write!(f, "{}", v),
            ResultValue::Text(s) => f.write_str(s),
        }
    }
}

/// One analyte measurement tied to a sample by record number.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub record_no: String,
    pub parm_cd: String,
    /// Value text as stored, used for the composite value-with-qualifier.
    pub raw_value: Option<String>,
    pub value: Option<ResultValue>,
    pub remark_cd: Option<String>,
    pub meth_cd: Option<String>,
    pub rpt_lev_va: Option<String>,
    pub rpt_lev_cd: Option<String>,
    pub dqi_cd: Option<String>,
    pub anl_ent_cd: Option<String>,
    pub lab_std_va: Option<String>,
    pub prep_dt: Option<NaiveDateTime>,
    pub anl_dt: Option<NaiveDateTime>,
    pub result_cr: Option<NaiveDateTime>,
    pub result_cn: Option<String>,
    pub result_md: Option<NaiveDateTime>,
    pub result_mn: Option<String>,
}

impl ResultRecord {
    pub fn from_record(record: &Record, numeric_values: bool) -> Option<Self> {
        let raw_value = record.text("result_va");
        Some(ResultRecord {
            record_no: record.text("record_no")?,
            parm_cd: record.text("parm_cd")?,
            value: ResultValue::from_raw(raw_value.as_deref(), numeric_values),
            raw_value,
            remark_cd: record.text("remark_cd"),
            meth_cd: record.text("meth_cd"),
            rpt_lev_va: record.text("rpt_lev_va"),
            rpt_lev_cd: record.text("rpt_lev_cd"),
            dqi_cd: record.text("dqi_cd"),
            anl_ent_cd: record.text("anl_ent_cd"),
            lab_std_va: record.text("lab_std_va"),
            prep_dt: record.timestamp("prep_dt"),
            anl_dt: record.timestamp("anl_dt"),
            result_cr: record.timestamp("result_cr"),
            result_cn: record.text("result_cn"),
            result_md: record.timestamp("result_md"),
            result_mn: record.text("result_mn"),
        })
    }
}

/// Sample-level free-text annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleComment {
    pub record_no: String,
    pub sample_cm_tx: Option<String>,
    pub sample_cm_cr: Option<NaiveDateTime>,
    pub sample_cm_cn: Option<String>,
}

impl SampleComment {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(SampleComment {
            record_no: record.text("record_no")?,
            sample_cm_tx: record.text("sample_cm_tx"),
            sample_cm_cr: record.timestamp("sample_cm_cr"),
            sample_cm_cn: record.text("sample_cm_cn"),
        })
    }
}

/// Result-level free-text annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultComment {
    pub record_no: String,
    pub parm_cd: String,
    pub result_cm_tx: Option<String>,
    pub result_cm_cr: Option<NaiveDateTime>,
    pub result_cm_cn: Option<String>,
}

impl ResultComment {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(ResultComment {
            record_no: record.text("record_no")?,
            parm_cd: record.text("parm_cd")?,
            result_cm_tx: record.text("result_cm_tx"),
            result_cm_cr: record.timestamp("result_cm_cr"),
            result_cm_cn: record.text("result_cm_cn"),
        })
    }
}

/// Value qualifier attached to one result.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    pub record_no: String,
    pub parm_cd: String,
    pub val_qual_cd: Option<String>,
}

impl Qualifier {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Qualifier {
            record_no: record.text("record_no")?,
            parm_cd: record.text("parm_cd")?,
            val_qual_cd: record.text("val_qual_cd"),
        })
    }
}

/// Parameter catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub parm_cd: String,
    pub parm_seq_grp_cd: Option<String>,
    pub parm_ds: Option<String>,
    pub parm_nm: Option<String>,
    pub parm_seq_nu: Option<i64>,
}

impl ParameterInfo {
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(ParameterInfo {
            parm_cd: record.text("parm_cd")?,
            parm_seq_grp_cd: record.text("parm_seq_grp_cd"),
            parm_ds: record.text("parm_ds"),
            parm_nm: record.text("parm_nm"),
            parm_seq_nu: record.integer("parm_seq_nu"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
