//! Extraction entry point.
//!
//! Runs the whole pipeline for one request against one data source:
//! station normalization, site and sample lookups, date and project
//! filters, result joins, catalog resolution, parameter selection, time
//! normalization and table composition. Every stage runs for the
//! environmental stream and then the QA stream over a single connection,
//! which is released before the call returns on every path.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::assemble::{AssembledResult, assemble};
use crate::backend::{BackendError, Connection, Connector, Record};
use crate::batch::{BatchQuery, execute_batched};
use crate::catalog::{ParameterCatalog, distinct_codes, resolve_parameters};
use crate::compose::{DataTable, JoinedRow, PlotTable, StreamRows, compose};
use crate::config::{ExtractionConfig, Table};
use crate::error::{EmptyResultWarning, ExtractError, Result, Stage};
use crate::filter::{
    DateRange, ParameterSelector, StreamTally, check_stage, filter_date_range,
    filter_parameters, filter_projects,
};
use crate::logging;
use crate::model::{
    ALL_PARAMETERS, Qualifier, ResultComment, ResultRecord, Sample, SampleComment, Site,
    StationId, Stream,
};
use crate::stations::{NormalizedStations, normalize_station_ids};
use crate::timezone::normalize_sample_times;

fn default_parameters() -> Vec<String> {
    vec![ALL_PARAMETERS.to_string()]
}

/// What to extract.
///
/// Loadable from TOML; dates are quoted ISO strings:
///
/// ```toml
/// data_source = "host=localhost user=nwis dbname=nwis"
/// env_partition = "01"
/// qa_partition = "02"
/// stations = ["05586100", "USGS-05586300"]
/// parameters = ["00300", "00400"]
/// begin_date = "2020-01-01"
/// end_date = "2020-12-31"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractionRequest {
    #[serde(default)]
    pub data_source: String,
    pub env_partition: String,
    pub qa_partition: String,
    pub stations: Vec<String>,
    /// Parameter codes, or group codes when `select_by_group` is set.
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub select_by_group: bool,
    #[serde(default)]
    pub begin_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub project_codes: Vec<String>,
    /// Coerce result values to numbers instead of keeping text.
    #[serde(default)]
    pub numeric_values: bool,
}

impl ExtractionRequest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ExtractError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ExtractError::Config(format!("failed to parse request: {}", e)))
    }
}

/// Both output tables plus the warnings raised on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub plot_table: PlotTable,
    pub data_table: DataTable,
    pub warnings: Vec<EmptyResultWarning>,
}

/// Inputs checked before any connection is opened.
struct ValidatedRequest {
    stations: NormalizedStations,
    selector: ParameterSelector,
    date_range: Option<DateRange>,
}

fn validate_request(config: &ExtractionConfig, request: &ExtractionRequest) -> Result<ValidatedRequest> {
    config.validate()?;

    for partition in [&request.env_partition, &request.qa_partition] {
        let valid = !partition.is_empty()
            && partition.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ExtractError::InvalidInput(format!(
                "invalid partition identifier '{}'",
                partition
            )));
        }
    }
    if request.env_partition == request.qa_partition {
        return Err(ExtractError::InvalidInput(format!(
            "environmental and QA partitions are both '{}'",
            request.env_partition
        )));
    }

    Ok(ValidatedRequest {
        stations: normalize_station_ids(&request.stations)?,
        selector: ParameterSelector::from_request(&request.parameters, request.select_by_group)?,
        date_range: DateRange::from_bounds(request.begin_date, request.end_date)?,
    })
}

/// Runs one extraction.
pub fn extract<C: Connector>(
    connector: &C,
    config: &ExtractionConfig,
    request: &ExtractionRequest,
) -> Result<Extraction> {
    let validated = validate_request(config, request)?;

    logging::info(
        None,
        None,
        &format!(
            "extracting {} station(s) from partitions '{}' (ENV) and '{}' (QA)",
            validated.stations.len(),
            request.env_partition,
            request.qa_partition
        ),
    );

    let mut conn = connector
        .connect(&request.data_source)
        .map_err(|e| connection_error(&request.data_source, e))?;

    let outcome = run(&mut conn, config, request, &validated);
    drop(conn);

    match &outcome {
        Ok(extraction) => logging::info(
            None,
            None,
            &format!(
                "extraction finished: {} plot rows, {} data rows, {} warning(s)",
                extraction.plot_table.len(),
                extraction.data_table.len(),
                extraction.warnings.len()
            ),
        ),
        Err(e) => logging::error(None, None, &format!("extraction failed: {}", e)),
    }
    outcome
}

fn connection_error(data_source: &str, err: BackendError) -> ExtractError {
    let message = match err {
        BackendError::Connect(message) => message,
        other => other.to_string(),
    };
    logging::error(None, None, &format!("could not connect to data source: {}", message));
    ExtractError::BackendConnection {
        data_source: data_source.to_string(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Per-stream working set
// ---------------------------------------------------------------------------

struct StreamState<'a> {
    stream: Stream,
    partition: &'a str,
    sites: Vec<Site>,
    samples: Vec<Sample>,
    results: Vec<AssembledResult>,
}

impl<'a> StreamState<'a> {
    fn new(stream: Stream, partition: &'a str) -> Self {
        StreamState {
            stream,
            partition,
            sites: Vec::new(),
            samples: Vec::new(),
            results: Vec::new(),
        }
    }

    fn tally(&self, before: usize, after: usize) -> StreamTally<'a> {
        StreamTally {
            stream: self.stream,
            partition: self.partition,
            before,
            after,
        }
    }
}

/// Queries one table of a partition and decodes its rows, skipping rows
/// that lack key columns.
fn lookup<C, T, F>(
    conn: &mut C,
    config: &ExtractionConfig,
    table: Table,
    partition: &str,
    keys: &[String],
    decode: F,
) -> Result<Vec<T>>
where
    C: Connection + ?Sized,
    F: Fn(&Record) -> Option<T>,
{
    let table_name = config.table_name(table, partition);
    let query = BatchQuery {
        table: &table_name,
        key_column: table.key_column(),
        partition,
    };
    let records = execute_batched(conn, &query, keys, config.batch_size)?;
    let decoded: Vec<T> = records.iter().filter_map(decode).collect();
    logging::log_undecodable(partition, &table_name, records.len() - decoded.len());
    Ok(decoded)
}

fn distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

fn suffix_record_no(record_no: &mut String, partition: &str) {
    record_no.push('_');
    record_no.push_str(partition);
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn lookup_sites<C: Connection + ?Sized>(
    conn: &mut C,
    config: &ExtractionConfig,
    stations: &NormalizedStations,
    state: &mut StreamState<'_>,
) -> Result<()> {
    let keys = stations.padded_site_numbers();
    let mut seen: HashSet<StationId> = HashSet::new();
    state.sites = lookup(conn, config, Table::Site, state.partition, &keys, Site::from_record)?
        .into_iter()
        .filter(|s| stations.contains(&s.agency_cd, &s.site_no))
        .filter(|s| seen.insert(s.station_id()))
        .collect();
    Ok(())
}

fn lookup_samples<C: Connection + ?Sized>(
    conn: &mut C,
    config: &ExtractionConfig,
    state: &mut StreamState<'_>,
) -> Result<()> {
    let keys: Vec<String> = {
        let mut seen = HashSet::new();
        state
            .sites
            .iter()
            .filter(|s| seen.insert(s.site_no.as_str()))
            .map(|s| s.station_id().padded_site_no())
            .collect()
    };
    let found: HashSet<StationId> = state.sites.iter().map(Site::station_id).collect();
    state.samples = lookup(conn, config, Table::Sample, state.partition, &keys, Sample::from_record)?
        .into_iter()
        .filter(|s| found.contains(&s.station_id()))
        .collect();
    Ok(())
}

fn join_results<C: Connection + ?Sized>(
    conn: &mut C,
    config: &ExtractionConfig,
    numeric_values: bool,
    state: &mut StreamState<'_>,
) -> Result<()> {
    let partition = state.partition;
    let keys = distinct(state.samples.iter().map(|s| s.record_no.as_str()));

    let results: Vec<ResultRecord> = lookup(conn, config, Table::Result, partition, &keys, |r| {
        ResultRecord::from_record(r, numeric_values)
    })?;
    let sample_comments: Vec<SampleComment> = lookup(
        conn,
        config,
        Table::SampleComment,
        partition,
        &keys,
        SampleComment::from_record,
    )?;
    let result_comments: Vec<ResultComment> = lookup(
        conn,
        config,
        Table::ResultComment,
        partition,
        &keys,
        ResultComment::from_record,
    )?;
    let qualifiers: Vec<Qualifier> =
        lookup(conn, config, Table::Qualifier, partition, &keys, Qualifier::from_record)?;

    let (assembled, duplicates) = assemble(results, &sample_comments, &result_comments, &qualifiers);
    let ignored = duplicates.sample_comments + duplicates.result_comments + duplicates.qualifiers;
    if ignored > 0 {
        logging::warn(
            Some(state.stream),
            Some(partition),
            &format!(
                "ignored duplicate join rows: {} sample comment(s), {} result comment(s), {} qualifier(s)",
                duplicates.sample_comments, duplicates.result_comments, duplicates.qualifiers
            ),
        );
    }
    state.results = assembled;
    Ok(())
}

/// Makes record numbers globally unique by appending the partition id.
fn suffix_partition(state: &mut StreamState<'_>) {
    let partition = state.partition;
    for sample in &mut state.samples {
        suffix_record_no(&mut sample.record_no, partition);
    }
    for row in &mut state.results {
        suffix_record_no(&mut row.result.record_no, partition);
        if let Some(comment) = &mut row.sample_comment {
            suffix_record_no(&mut comment.record_no, partition);
        }
        if let Some(comment) = &mut row.result_comment {
            suffix_record_no(&mut comment.record_no, partition);
        }
    }
}

fn into_stream_rows(state: StreamState<'_>, catalog: &ParameterCatalog) -> StreamRows {
    let sites: HashMap<StationId, &Site> = state.sites.iter().map(|s| (s.station_id(), s)).collect();
    let samples: HashMap<&str, &Sample> = state
        .samples
        .iter()
        .map(|s| (s.record_no.as_str(), s))
        .collect();

    let rows = state
        .results
        .iter()
        .filter_map(|assembled| {
            let sample = samples.get(assembled.result.record_no.as_str())?;
            Some(JoinedRow {
                stream: state.stream,
                site: sites.get(&sample.station_id()).map(|s| (*s).clone()),
                sample: (*sample).clone(),
                assembled: assembled.clone(),
                parameter: catalog.get(&assembled.result.parm_cd).cloned(),
            })
        })
        .collect();

    StreamRows {
        stream: state.stream,
        partition: state.partition.to_string(),
        rows,
    }
}

fn run<C: Connection + ?Sized>(
    conn: &mut C,
    config: &ExtractionConfig,
    request: &ExtractionRequest,
    validated: &ValidatedRequest,
) -> Result<Extraction> {
    let mut warnings = Vec::new();
    let mut env = StreamState::new(Stream::Environmental, &request.env_partition);
    let mut qa = StreamState::new(Stream::QualityAssurance, &request.qa_partition);

    // Site lookup
    let requested = validated.stations.len();
    lookup_sites(conn, config, &validated.stations, &mut env)?;
    lookup_sites(conn, config, &validated.stations, &mut qa)?;
    check_stage(
        Stage::SiteLookup,
        [
            env.tally(requested, env.sites.len()),
            qa.tally(requested, qa.sites.len()),
        ],
        &mut warnings,
    )?;

    // Sample lookup
    let before = [env.sites.len(), qa.sites.len()];
    lookup_samples(conn, config, &mut env)?;
    lookup_samples(conn, config, &mut qa)?;
    check_stage(
        Stage::SampleLookup,
        [
            env.tally(before[0], env.samples.len()),
            qa.tally(before[1], qa.samples.len()),
        ],
        &mut warnings,
    )?;

    // Date range
    let before = [env.samples.len(), qa.samples.len()];
    let range = validated.date_range.as_ref();
    env.samples = filter_date_range(std::mem::take(&mut env.samples), range);
    qa.samples = filter_date_range(std::mem::take(&mut qa.samples), range);
    check_stage(
        Stage::DateRange,
        [
            env.tally(before[0], env.samples.len()),
            qa.tally(before[1], qa.samples.len()),
        ],
        &mut warnings,
    )?;

    // Project code
    let before = [env.samples.len(), qa.samples.len()];
    env.samples = filter_projects(std::mem::take(&mut env.samples), &request.project_codes);
    qa.samples = filter_projects(std::mem::take(&mut qa.samples), &request.project_codes);
    check_stage(
        Stage::ProjectCode,
        [
            env.tally(before[0], env.samples.len()),
            qa.tally(before[1], qa.samples.len()),
        ],
        &mut warnings,
    )?;

    // Result join
    let before = [env.samples.len(), qa.samples.len()];
    join_results(conn, config, request.numeric_values, &mut env)?;
    join_results(conn, config, request.numeric_values, &mut qa)?;
    check_stage(
        Stage::ResultJoin,
        [
            env.tally(before[0], env.results.len()),
            qa.tally(before[1], qa.results.len()),
        ],
        &mut warnings,
    )?;
    suffix_partition(&mut env);
    suffix_partition(&mut qa);

    // Catalog, shared by both streams
    let codes = distinct_codes(
        env.results
            .iter()
            .chain(qa.results.iter())
            .map(|r| r.result.parm_cd.as_str()),
    );
    let catalog = resolve_parameters(conn, config, &codes)?;

    // Parameter selection
    let before = [env.results.len(), qa.results.len()];
    env.results = filter_parameters(std::mem::take(&mut env.results), &validated.selector, &catalog);
    qa.results = filter_parameters(std::mem::take(&mut qa.results), &validated.selector, &catalog);
    check_stage(
        Stage::ParameterSelection,
        [
            env.tally(before[0], env.results.len()),
            qa.tally(before[1], qa.results.len()),
        ],
        &mut warnings,
    )?;

    for sample in env.samples.iter_mut().chain(qa.samples.iter_mut()) {
        normalize_sample_times(sample);
    }

    let env_rows = into_stream_rows(env, &catalog);
    let qa_rows = into_stream_rows(qa, &catalog);
    let (plot_table, data_table) = compose(env_rows, qa_rows, config, &catalog, &mut warnings)?;

    Ok(Extraction {
        plot_table,
        data_table,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            data_source: "memory".to_string(),
            env_partition: "01".to_string(),
            qa_partition: "02".to_string(),
            stations: vec!["05586100".to_string()],
            parameters: default_parameters(),
            select_by_group: false,
            begin_date: None,
            end_date: None,
            project_codes: Vec::new(),
            numeric_values: false,
        }
    }

    #[test]
    fn test_request_defaults_from_toml() {
        let parsed: ExtractionRequest = toml::from_str(
            r#"
            env_partition = "01"
            qa_partition = "02"
            stations = ["05586100"]
            begin_date = "2020-01-01"
            end_date = "2020-12-31"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.parameters, vec!["All"]);
        assert!(!parsed.select_by_group);
        assert_eq!(parsed.begin_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert!(parsed.data_source.is_empty());
    }

    #[test]
    fn test_partition_ids_must_be_identifiers() {
        let mut bad = request();
        bad.qa_partition = "02; drop table parm".to_string();
        let err = validate_request(&ExtractionConfig::default(), &bad).err().unwrap();
        assert!(matches!(err, ExtractError::InvalidInput(_)));
    }

    #[test]
    fn test_partitions_must_differ() {
        let mut same = request();
        same.qa_partition = "01".to_string();
        assert!(validate_request(&ExtractionConfig::default(), &same).is_err());
    }

    #[test]
    fn test_inverted_date_range_is_rejected() {
        let mut bad = request();
        bad.begin_date = NaiveDate::from_ymd_opt(2021, 1, 1);
        bad.end_date = NaiveDate::from_ymd_opt(2020, 1, 1);
        assert!(validate_request(&ExtractionConfig::default(), &bad).is_err());
    }

    #[test]
    fn test_record_numbers_get_partition_suffix() {
        let mut state = StreamState::new(Stream::QualityAssurance, "02");
        state.samples.push(
            Sample::from_record(&Record::new().with("record_no", "0123").with("site_no", "1"))
                .unwrap(),
        );
        suffix_partition(&mut state);
        assert_eq!(state.samples[0].record_no, "0123_02");
    }
}
