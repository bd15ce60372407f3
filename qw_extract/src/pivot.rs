//! Long-to-wide pivot of joined results.
//!
//! One output row per record number in first-seen order, one column per
//! parameter code present. Column names come from the parameter code and
//! display name, sanitized to identifier-safe text and made unique with a
//! numeric suffix. The resulting column set depends on the data, so it is
//! carried as metadata next to sparse rows rather than as a fixed struct.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;

use crate::catalog::ParameterCatalog;

/// One (record, parameter, value) cell of the long table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongCell<'a> {
    pub record_no: &'a str,
    pub parm_cd: &'a str,
    pub value: &'a str,
}

/// A parameter column of the wide table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotColumn {
    pub parm_cd: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideRow {
    pub record_no: String,
    /// Cell values keyed by column name. Absent parameters have no entry.
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidePivot {
    pub columns: Vec<PivotColumn>,
    pub rows: Vec<WideRow>,
    /// Long cells dropped because their (record, parameter) pair was taken.
    pub collapsed: usize,
}

impl WidePivot {
    /// Back to (record, parameter, value) triples, row order then column
    /// order.
    pub fn melt(&self) -> Vec<(String, String, String)> {
        let mut cells = Vec::new();
        for row in &self.rows {
            for column in &self.columns {
                if let Some(value) = row.values.get(&column.column) {
                    cells.push((row.record_no.clone(), column.parm_cd.clone(), value.clone()));
                }
            }
        }
        cells
    }
}

/// Identifier-safe column name from a parameter code and display name.
///
/// Runs of characters other than ASCII letters and digits become a single
/// `_`, leading and trailing ones are dropped, and a name starting with a
/// digit gets a `p` prefix.
pub fn sanitize_column_name(parm_cd: &str, parm_nm: Option<&str>) -> String {
    let raw = match parm_nm.map(str::trim) {
        Some(name) if !name.is_empty() => format!("{} {}", parm_cd.trim(), name),
        _ => parm_cd.trim().to_string(),
    };

    let mut out = String::with_capacity(raw.len() + 1);
    let mut gap = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('_');
            }
            gap = false;
            out.push(ch);
        } else {
            gap = true;
        }
    }

    if out.is_empty() {
        return "p".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'p');
    }
    out
}

/// Makes `bases` unique in order. A name already used, or reserved, gets
/// the first free `_1`, `_2`, ... suffix.
pub fn unique_column_names(bases: &[String], reserved: &[&str]) -> Vec<String> {
    let mut taken: HashSet<String> = reserved.iter().map(|r| r.to_string()).collect();
    bases
        .iter()
        .map(|base| {
            let mut candidate = base.clone();
            let mut suffix = 0;
            while taken.contains(&candidate) {
                suffix += 1;
                candidate = format!("{}_{}", base, suffix);
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Pivots long cells to one row per record number.
///
/// The first value seen for a (record, parameter) pair wins. Parameter
/// columns follow catalog display order; `reserved` names are kept free
/// for the metadata columns joined on afterwards.
pub fn pivot_wide<'a, I>(cells: I, catalog: &ParameterCatalog, reserved: &[&str]) -> WidePivot
where
    I: IntoIterator<Item = LongCell<'a>>,
{
    let mut records: Vec<(&'a str, HashMap<&'a str, &'a str>)> = Vec::new();
    let mut record_index: HashMap<&'a str, usize> = HashMap::new();
    let mut codes: Vec<&'a str> = Vec::new();
    let mut seen_codes: HashSet<&'a str> = HashSet::new();
    let mut collapsed = 0;

    for cell in cells {
        let index = *record_index.entry(cell.record_no).or_insert_with(|| {
            records.push((cell.record_no, HashMap::new()));
            records.len() - 1
        });
        if seen_codes.insert(cell.parm_cd) {
            codes.push(cell.parm_cd);
        }
        match records[index].1.entry(cell.parm_cd) {
            Entry::Vacant(slot) => {
                slot.insert(cell.value);
            }
            Entry::Occupied(_) => collapsed += 1,
        }
    }

    let bases: Vec<String> = codes
        .iter()
        .map(|code| {
            let name = catalog.get(code).and_then(|p| p.parm_nm.as_deref());
            sanitize_column_name(code, name)
        })
        .collect();
    // Suffixes follow first-seen order; display order is applied after.
    let mut named: Vec<(&'a str, String)> = codes
        .into_iter()
        .zip(unique_column_names(&bases, reserved))
        .collect();
    named.sort_by(|a, b| catalog.display_order(a.0, b.0));

    let column_of: HashMap<&str, &str> = named
        .iter()
        .map(|(code, column)| (*code, column.as_str()))
        .collect();

    let rows = records
        .into_iter()
        .map(|(record_no, values)| WideRow {
            record_no: record_no.to_string(),
            values: values
                .into_iter()
                .filter_map(|(code, value)| {
                    column_of
                        .get(code)
                        .map(|column| (column.to_string(), value.to_string()))
                })
                .collect(),
        })
        .collect();

    let columns = named
        .into_iter()
        .map(|(code, column)| PivotColumn {
            parm_cd: code.to_string(),
            column,
        })
        .collect();

    WidePivot {
        columns,
        rows,
        collapsed,
    }
}
