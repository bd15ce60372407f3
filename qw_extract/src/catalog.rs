//! Parameter catalog resolution.
//!
//! Looks up the distinct parameter codes of an extraction in the shared
//! catalog table through the same batched IN-list discipline as every other
//! lookup. Codes without a catalog entry are not an error; they carry no
//! descriptive metadata and are labelled by their raw code.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::backend::Connection;
use crate::batch::{BatchQuery, execute_batched};
use crate::config::{ExtractionConfig, Table};
use crate::error::Result;
use crate::logging;
use crate::model::ParameterInfo;

/// Partition label used in logs and errors for the shared catalog.
const CATALOG_PARTITION: &str = "catalog";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCatalog {
    entries: HashMap<String, ParameterInfo>,
}

impl ParameterCatalog {
    /// Builds a catalog; the first entry seen for a code wins.
    pub fn from_entries(entries: impl IntoIterator<Item = ParameterInfo>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(entry.parm_cd.clone()).or_insert(entry);
        }
        Self { entries: map }
    }

    pub fn get(&self, parm_cd: &str) -> Option<&ParameterInfo> {
        self.entries.get(parm_cd)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn group_of(&self, parm_cd: &str) -> Option<&str> {
        self.get(parm_cd)?.parm_seq_grp_cd.as_deref()
    }

    /// Display name, or the raw code when the catalog has none.
    pub fn label(&self, parm_cd: &str) -> String {
        self.get(parm_cd)
            .and_then(|p| p.parm_nm.clone())
            .unwrap_or_else(|| parm_cd.to_string())
    }

    /// Display order: group code, then sequence number, then code.
    /// Catalogued codes sort before uncatalogued ones.
    pub fn display_order(&self, a: &str, b: &str) -> Ordering {
        match (self.get(a), self.get(b)) {
            (Some(pa), Some(pb)) => pa
                .parm_seq_grp_cd
                .cmp(&pb.parm_seq_grp_cd)
                .then(pa.parm_seq_nu.cmp(&pb.parm_seq_nu))
                .then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    }
}

/// Distinct codes in first-seen order.
pub fn distinct_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|c| seen.insert(*c))
        .map(str::to_string)
        .collect()
}

/// Resolves `codes` against the catalog table.
pub fn resolve_parameters<C: Connection + ?Sized>(
    conn: &mut C,
    config: &ExtractionConfig,
    codes: &[String],
) -> Result<ParameterCatalog> {
    let table = config.table_name(Table::Parameter, CATALOG_PARTITION);
    let query = BatchQuery {
        table: &table,
        key_column: Table::Parameter.key_column(),
        partition: CATALOG_PARTITION,
    };

    let records = execute_batched(conn, &query, codes, config.batch_size)?;
    let total = records.len();
    let entries: Vec<ParameterInfo> = records.iter().filter_map(ParameterInfo::from_record).collect();
    logging::log_undecodable(CATALOG_PARTITION, &table, total - entries.len());

    let catalog = ParameterCatalog::from_entries(entries);
    let unresolved = codes.iter().filter(|c| catalog.get(c).is_none()).count();
    if unresolved > 0 {
        logging::debug(
            None,
            Some(CATALOG_PARTITION),
            &format!("{} parameter code(s) have no catalog entry", unresolved),
        );
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{Connector, Record};
    use serde_json::json;

    fn info(code: &str, group: &str, seq: i64, name: &str) -> ParameterInfo {
        ParameterInfo {
            parm_cd: code.to_string(),
            parm_seq_grp_cd: Some(group.to_string()),
            parm_ds: None,
            parm_nm: Some(name.to_string()),
            parm_seq_nu: Some(seq),
        }
    }

    #[test]
    fn test_distinct_codes_first_seen() {
        let codes = distinct_codes(["00300", "00400", "00300", "00095"]);
        assert_eq!(codes, vec!["00300", "00400", "00095"]);
    }

    #[test]
    fn test_label_falls_back_to_code() {
        let catalog = ParameterCatalog::from_entries([info("00300", "INF", 1, "Dissolved oxygen")]);
        assert_eq!(catalog.label("00300"), "Dissolved oxygen");
        assert_eq!(catalog.label("99999"), "99999");
        assert_eq!(catalog.group_of("99999"), None);
    }

    #[test]
    fn test_display_order_group_then_sequence() {
        let catalog = ParameterCatalog::from_entries([
            info("00400", "PHY", 2, "pH"),
            info("00095", "PHY", 1, "Specific conductance"),
            info("00300", "INF", 9, "Dissolved oxygen"),
        ]);
        let mut codes = vec!["99999", "00400", "00095", "00300"];
        codes.sort_by(|a, b| catalog.display_order(a, b));
        assert_eq!(codes, vec!["00300", "00095", "00400", "99999"]);
    }

    #[test]
    fn test_resolve_uses_shared_catalog_table_in_batches() {
        let rows = vec![
            Record::from_json(json!({
                "parm_cd": "00300", "parm_seq_grp_cd": "INF",
                "parm_nm": "Dissolved oxygen", "parm_seq_nu": 10
            }))
            .unwrap(),
            Record::from_json(json!({
                "parm_cd": "00400", "parm_seq_grp_cd": "PHY", "parm_nm": "pH"
            }))
            .unwrap(),
        ];
        let backend = MemoryBackend::new().with_table("parm", rows);
        let mut conn = backend.connect("memory").unwrap();
        let config = ExtractionConfig {
            batch_size: 2,
            ..ExtractionConfig::default()
        };
        let codes: Vec<String> = ["00300", "00400", "99999"].iter().map(|s| s.to_string()).collect();

        let catalog = resolve_parameters(&mut conn, &config, &codes).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.group_of("00400"), Some("PHY"));
        assert_eq!(catalog.get("00300").and_then(|p| p.parm_seq_nu), Some(10));
        assert!(catalog.get("99999").is_none());
        assert_eq!(backend.queries_on("parm").len(), 2);
    }
}
