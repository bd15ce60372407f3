//! Result reconciliation for one partition.
//!
//! Left-joins sample comments (by record number), then result comments and
//! value qualifiers (by record number and parameter code) onto the result
//! rows. The right-hand sides are indexed first-seen per key before joining,
//! so a duplicated comment or qualifier never multiplies result rows; the
//! number of ignored duplicates is logged.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::model::{Qualifier, ResultComment, ResultRecord, SampleComment};

/// Remark token the source data uses for "no remark".
const MISSING_REMARK: &str = "NA";

/// One result with everything joined onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledResult {
    pub result: ResultRecord,
    pub sample_comment: Option<SampleComment>,
    pub result_comment: Option<ResultComment>,
    pub val_qual_cd: Option<String>,
    /// Raw value followed by the remark and joined qualifier codes, e.g.
    /// `0.01<` or `8.4e`.
    pub value_with_qualifier: String,
}

fn code_suffix(code: Option<&str>) -> &str {
    match code.map(str::trim) {
        Some(MISSING_REMARK) | None => "",
        Some(code) => code,
    }
}

/// Raw value text followed by the remark code, then the qualifier code.
/// A missing code, or the literal `NA`, adds nothing.
pub fn value_with_qualifier(
    raw_value: Option<&str>,
    remark_cd: Option<&str>,
    val_qual_cd: Option<&str>,
) -> String {
    let value = raw_value.map(str::trim).unwrap_or_default();
    format!(
        "{}{}{}",
        value,
        code_suffix(remark_cd),
        code_suffix(val_qual_cd)
    )
}

fn index_first_seen<T, K, F>(rows: &[T], key: F) -> (HashMap<K, &T>, usize)
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut index = HashMap::with_capacity(rows.len());
    let mut duplicates = 0;
    for row in rows {
        match index.entry(key(row)) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }
    (index, duplicates)
}

/// Counts of right-hand rows ignored because their key was already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinDuplicates {
    pub sample_comments: usize,
    pub result_comments: usize,
    pub qualifiers: usize,
}

/// Joins comments and qualifiers onto `results`, preserving result order.
pub fn assemble(
    results: Vec<ResultRecord>,
    sample_comments: &[SampleComment],
    result_comments: &[ResultComment],
    qualifiers: &[Qualifier],
) -> (Vec<AssembledResult>, JoinDuplicates) {
    let (sample_cm, sample_dups) = index_first_seen(sample_comments, |c| c.record_no.clone());
    let (result_cm, result_dups) =
        index_first_seen(result_comments, |c| (c.record_no.clone(), c.parm_cd.clone()));
    let (quals, qual_dups) =
        index_first_seen(qualifiers, |q| (q.record_no.clone(), q.parm_cd.clone()));

    let assembled = results
        .into_iter()
        .map(|result| {
            let pair = (result.record_no.clone(), result.parm_cd.clone());
            let val_qual_cd = quals.get(&pair).and_then(|q| q.val_qual_cd.clone());
            let value_with_qualifier = value_with_qualifier(
                result.raw_value.as_deref(),
                result.remark_cd.as_deref(),
                val_qual_cd.as_deref(),
            );
            AssembledResult {
                sample_comment: sample_cm.get(&result.record_no).map(|c| (*c).clone()),
                result_comment: result_cm.get(&pair).map(|c| (*c).clone()),
                val_qual_cd,
                value_with_qualifier,
                result,
            }
        })
        .collect();

    (
        assembled,
        JoinDuplicates {
            sample_comments: sample_dups,
            result_comments: result_dups,
            qualifiers: qual_dups,
        },
    )
}
