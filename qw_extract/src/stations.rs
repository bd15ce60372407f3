/// Station identifier normalization.
///
/// Callers hand over station identifiers as typed by a user: either a bare
/// site number (`05586100`) or an agency-prefixed form (`USGS-05586100`).
/// This module turns them into `StationId`s, the padded keys the site file
/// is queried with, and the legacy quoted literal list. Padding never leaks
/// into anything returned to callers.

use std::collections::HashSet;

use crate::error::{ExtractError, Result};
use crate::model::{DEFAULT_AGENCY, SITE_NO_WIDTH, StationId};

/// Normalized, de-duplicated station identifiers in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedStations {
    stations: Vec<StationId>,
}

impl NormalizedStations {
    pub fn stations(&self) -> &[StationId] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Distinct site numbers padded to the storage width, for IN-list keys.
    /// The same site under two agencies is queried once.
    pub fn padded_site_numbers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.stations
            .iter()
            .filter(|s| seen.insert(s.site_no.as_str()))
            .map(StationId::padded_site_no)
            .collect()
    }

    /// Quoted, comma-separated literal list of padded site numbers
    /// (`'05586100       ','05586300       '`). Single quotes are doubled.
    pub fn literal_list(&self) -> String {
        self.padded_site_numbers()
            .iter()
            .map(|s| format!("'{}'", s.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn contains(&self, agency_cd: &str, site_no: &str) -> bool {
        let site_no = site_no.trim();
        self.stations
            .iter()
            .any(|s| s.site_no == site_no && s.agency_cd.eq_ignore_ascii_case(agency_cd.trim()))
    }
}

/// Parses one identifier.
///
/// A purely numeric token is a USGS site. Otherwise the text before the
/// first `-` is the agency code. A token with no `-` is a bare site number
/// and also defaults to USGS.
pub fn parse_station_id(raw: &str) -> Result<StationId> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(ExtractError::InvalidInput(
            "station identifier is blank".to_string(),
        ));
    }

    let (agency_cd, site_no) = if token.chars().all(|c| c.is_ascii_digit()) {
        (DEFAULT_AGENCY.to_string(), token.to_string())
    } else {
        match token.split_once('-') {
            Some((agency, site)) => (agency.trim().to_ascii_uppercase(), site.trim().to_string()),
            None => (DEFAULT_AGENCY.to_string(), token.to_string()),
        }
    };

    if agency_cd.is_empty() || !agency_cd.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ExtractError::InvalidInput(format!(
            "station identifier '{}' has an invalid agency code",
            raw
        )));
    }
    if site_no.is_empty() {
        return Err(ExtractError::InvalidInput(format!(
            "station identifier '{}' has no site number",
            raw
        )));
    }
    if site_no.chars().count() > SITE_NO_WIDTH {
        return Err(ExtractError::InvalidInput(format!(
            "site number '{}' is longer than {} characters",
            site_no, SITE_NO_WIDTH
        )));
    }

    Ok(StationId { agency_cd, site_no })
}

/// Normalizes a collection of identifiers. Fails on an empty collection or
/// on the first malformed entry.
pub fn normalize_station_ids<S: AsRef<str>>(ids: &[S]) -> Result<NormalizedStations> {
    if ids.is_empty() {
        return Err(ExtractError::InvalidInput(
            "no station identifiers supplied".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut stations = Vec::with_capacity(ids.len());
    for raw in ids {
        let id = parse_station_id(raw.as_ref())?;
        if seen.insert(id.clone()) {
            stations.push(id);
        }
    }
    Ok(NormalizedStations { stations })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
