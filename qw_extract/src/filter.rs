//! Record filtering, de-duplication and the empty-result policy.
//!
//! Filters run in a fixed order, each narrowing one stream's working set:
//! date range and project code on samples, parameter selection on joined
//! results, and review status last, when the final tables are composed.
//! Emptying one stream is a warning; both streams empty at the site lookup,
//! the result join or the parameter selection ends the call.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::assemble::AssembledResult;
use crate::catalog::ParameterCatalog;
use crate::error::{EmptyResultWarning, ExtractError, Result, Stage};
use crate::logging;
use crate::model::{ALL_PARAMETERS, Sample, Stream};

// ---------------------------------------------------------------------------
// Date range and project code
// ---------------------------------------------------------------------------

/// Inclusive date range on the stored sample start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// A range only exists when both bounds are given.
    pub fn from_bounds(begin: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Option<Self>> {
        match (begin, end) {
            (Some(begin), Some(end)) if begin > end => Err(ExtractError::InvalidInput(format!(
                "begin date {} is after end date {}",
                begin, end
            ))),
            (Some(begin), Some(end)) => Ok(Some(DateRange { begin, end })),
            _ => Ok(None),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end
    }
}

/// Keeps samples whose start date lies in `range`. Samples without a start
/// time cannot be placed and are dropped when a range is given.
pub fn filter_date_range(samples: Vec<Sample>, range: Option<&DateRange>) -> Vec<Sample> {
    let Some(range) = range else {
        return samples;
    };
    samples
        .into_iter()
        .filter(|s| s.sample_start_dt.is_some_and(|t| range.contains(t.date())))
        .collect()
}

/// Keeps samples whose project code is listed. An empty list keeps all.
pub fn filter_projects(samples: Vec<Sample>, project_codes: &[String]) -> Vec<Sample> {
    if project_codes.is_empty() {
        return samples;
    }
    let wanted: HashSet<&str> = project_codes.iter().map(|p| p.trim()).collect();
    samples
        .into_iter()
        .filter(|s| s.project_cd.as_deref().is_some_and(|p| wanted.contains(p)))
        .collect()
}

// ---------------------------------------------------------------------------
// Parameter selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSelector {
    All,
    Codes(HashSet<String>),
    Groups(HashSet<String>),
}

impl ParameterSelector {
    /// Builds a selector from the caller's list. `All` anywhere in the list
    /// (any case) disables filtering.
    pub fn from_request(values: &[String], by_group: bool) -> Result<Self> {
        let values: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            return Err(ExtractError::InvalidInput(
                "no parameters or parameter groups selected".to_string(),
            ));
        }
        if values.iter().any(|v| v.eq_ignore_ascii_case(ALL_PARAMETERS)) {
            return Ok(ParameterSelector::All);
        }
        if by_group {
            Ok(ParameterSelector::Groups(
                values.iter().map(|v| v.to_ascii_uppercase()).collect(),
            ))
        } else {
            Ok(ParameterSelector::Codes(
                values.iter().map(|v| v.to_string()).collect(),
            ))
        }
    }

    pub fn matches(&self, parm_cd: &str, group: Option<&str>) -> bool {
        match self {
            ParameterSelector::All => true,
            ParameterSelector::Codes(codes) => codes.contains(parm_cd),
            ParameterSelector::Groups(groups) => {
                group.is_some_and(|g| groups.contains(&g.trim().to_ascii_uppercase()))
            }
        }
    }
}

pub fn filter_parameters(
    results: Vec<AssembledResult>,
    selector: &ParameterSelector,
    catalog: &ParameterCatalog,
) -> Vec<AssembledResult> {
    results
        .into_iter()
        .filter(|r| selector.matches(&r.result.parm_cd, catalog.group_of(&r.result.parm_cd)))
        .collect()
}

// ---------------------------------------------------------------------------
// Review status and de-duplication
// ---------------------------------------------------------------------------

/// True when the DQI code marks the result as excluded from the tables.
pub fn is_review_excluded(dqi_cd: Option<&str>, excluded: &[String]) -> bool {
    dqi_cd.is_some_and(|dqi| {
        excluded
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(dqi.trim()))
    })
}

/// Keeps the first row per key, preserving order.
pub fn dedupe_first_seen<T, K, F>(rows: Vec<T>, key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

// ---------------------------------------------------------------------------
// Empty-result policy
// ---------------------------------------------------------------------------

/// Row counts of one stream around a stage.
#[derive(Debug, Clone, Copy)]
pub struct StreamTally<'a> {
    pub stream: Stream,
    pub partition: &'a str,
    pub before: usize,
    pub after: usize,
}

/// Applies the empty-result policy after `stage`.
///
/// Records a warning for each stream the stage emptied. Fails with
/// `JointEmpty` when the stage is a checkpoint and both streams are empty,
/// however they got there.
pub fn check_stage(
    stage: Stage,
    tallies: [StreamTally<'_>; 2],
    warnings: &mut Vec<EmptyResultWarning>,
) -> Result<()> {
    for tally in &tallies {
        logging::log_stage_rows(tally.stream, tally.partition, stage, tally.after);
    }

    if stage.is_joint_empty_checkpoint() && tallies.iter().all(|t| t.after == 0) {
        logging::error(
            None,
            None,
            &format!("both streams are empty after {}; stopping", stage),
        );
        return Err(ExtractError::JointEmpty(stage));
    }

    for tally in tallies.iter().filter(|t| t.before > 0 && t.after == 0) {
        let warning = EmptyResultWarning {
            stream: tally.stream,
            partition: tally.partition.to_string(),
            stage,
        };
        logging::log_empty_stage(&warning);
        warnings.push(warning);
    }
    Ok(())
}
