//! Observation CSV ingest.
//!
//! Turns a flat per-observation CSV into validated [`Observation`]s:
//!
//! ```text
//! station1,station2,source,mjd,delay_obs,delay_sigma,delay_theo,partial:UT1,partial:x_pole,...
//! ```
//!
//! Delays and sigmas are in seconds. Every `partial:<name>` column supplies
//! ∂delay/∂`<name>`; an empty cell means the observation does not depend on
//! that parameter. Unlike a lenient ingest, any bad row aborts the whole
//! read: a session with a silently missing scan is not the session the
//! caller asked to estimate.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Baseline, Epoch, Observation, Session};
use crate::error::AppError;

const PARTIAL_PREFIX: &str = "partial:";
const REQUIRED_COLUMNS: [&str; 6] = ["station1", "station2", "mjd", "delay_obs", "delay_sigma", "delay_theo"];
/// Row errors echoed in the abort message.
const MAX_REPORTED_ROW_ERRORS: usize = 5;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Load an observation CSV as a session named after the file stem.
pub fn load_observation_csv(path: &Path) -> Result<Session, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let observations = read_observations(file)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Session::new(name, observations))
}

/// Parse observations from any CSV source.
pub fn read_observations<R: Read>(source: R) -> Result<Vec<Observation>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns = Columns::from_headers(&headers)?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; CSV lines are 1-based.
        let line = idx + 2;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &columns));
        match parsed {
            Ok(obs) => observations.push(obs),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        let shown: Vec<String> = row_errors
            .iter()
            .take(MAX_REPORTED_ROW_ERRORS)
            .map(ToString::to_string)
            .collect();
        let more = row_errors.len().saturating_sub(MAX_REPORTED_ROW_ERRORS);
        let mut message = format!("{} invalid observation row(s): {}", row_errors.len(), shown.join("; "));
        if more > 0 {
            message.push_str(&format!(" (+{more} more)"));
        }
        return Err(AppError::new(2, message));
    }

    if observations.is_empty() {
        return Err(AppError::new(3, "CSV contains no observations."));
    }

    Ok(observations)
}

/// Resolved column positions.
struct Columns {
    index: HashMap<String, usize>,
    /// (parameter name, column) for every `partial:` column.
    partials: Vec<(String, usize)>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, AppError> {
        let mut index = HashMap::new();
        let mut partials = Vec::new();
        for (i, raw) in headers.iter().enumerate() {
            // Spreadsheet exports sometimes prefix the first header with a BOM.
            let name = raw.trim().trim_start_matches('\u{feff}');
            match name.strip_prefix(PARTIAL_PREFIX) {
                Some(param) if !param.trim().is_empty() => {
                    // Parameter names are case-sensitive; keep them as written.
                    partials.push((param.trim().to_string(), i));
                }
                Some(_) => return Err(AppError::new(2, format!("Empty parameter name in column {}", i + 1))),
                None => {
                    index.insert(name.to_ascii_lowercase(), i);
                }
            }
        }

        for col in REQUIRED_COLUMNS {
            if !index.contains_key(col) {
                return Err(AppError::new(2, format!("Missing required column: `{col}`")));
            }
        }
        if partials.is_empty() {
            return Err(AppError::new(2, "No `partial:<name>` columns found."));
        }

        Ok(Self { index, partials })
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        let i = *self.index.get(name)?;
        record.get(i).filter(|s| !s.is_empty())
    }
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<Observation, String> {
    let required = |name: &str| {
        columns
            .get(record, name)
            .ok_or_else(|| format!("Missing `{name}` value."))
    };
    let number = |name: &str| -> Result<f64, String> {
        let raw = required(name)?;
        raw.parse::<f64>()
            .map_err(|_| format!("Invalid `{name}` value '{raw}'."))
    };

    let baseline = Baseline::new(required("station1")?, required("station2")?);
    let epoch = Epoch::from_mjd(number("mjd")?);
    let observed = number("delay_obs")?;
    let sigma = number("delay_sigma")?;
    let apriori = number("delay_theo")?;

    let mut partials = BTreeMap::new();
    for (name, i) in &columns.partials {
        let Some(raw) = record.get(*i).filter(|s| !s.is_empty()) else {
            continue;
        };
        let value = raw
            .parse::<f64>()
            .map_err(|_| format!("Invalid partial for `{name}`: '{raw}'."))?;
        partials.insert(name.clone(), value);
    }

    let obs = Observation::new(baseline, epoch, observed, apriori, sigma, partials).map_err(|e| match e {
        crate::error::EstimationError::InvalidObservation { reason, .. } => reason,
        other => other.to_string(),
    })?;

    Ok(match columns.get(record, "source") {
        Some(source) => obs.with_source(source),
        None => obs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "station1,station2,source,mjd,delay_obs,delay_sigma,delay_theo,partial:UT1,partial:x_pole\n";

    #[test]
    fn reads_rows_and_partials() {
        let csv = format!(
            "{HEADER}WETTZELL,KOKEE,0552+398,60815.25,1.0e-3,2e-11,0.9e-3,0.25,\n\
             KOKEE,ONSALA60,,60815.30,2.0e-3,3e-11,2.0e-3,-0.1,0.02\n"
        );
        let obs = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].baseline().to_string(), "WETTZELL-KOKEE");
        assert_eq!(obs[0].source(), Some("0552+398"));
        assert_eq!(obs[0].partial("UT1"), 0.25);
        assert!(!obs[0].partials().contains_key("x_pole"));
        assert_eq!(obs[1].source(), None);
        assert_eq!(obs[1].partial("x_pole"), 0.02);
    }

    #[test]
    fn bad_rows_abort_with_line_numbers() {
        let csv = format!(
            "{HEADER}WETTZELL,KOKEE,,60815.25,1.0e-3,0,0.9e-3,0.25,\n\
             WETTZELL,KOKEE,,60815.26,abc,1e-11,0.9e-3,0.25,\n"
        );
        let err = read_observations(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let msg = err.to_string();
        assert!(msg.starts_with("2 invalid observation row(s)"));
        assert!(msg.contains("line 2: uncertainty must be strictly positive"));
        assert!(msg.contains("line 3: Invalid `delay_obs` value 'abc'."));
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let csv = "station1,station2,mjd,delay_obs,delay_sigma,partial:UT1\nA,B,1,1,1,1\n";
        let err = read_observations(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("`delay_theo`"));
    }

    #[test]
    fn headers_are_case_insensitive_except_partials() {
        let csv = "\u{feff}Station1,STATION2,MJD,Delay_Obs,delay_sigma,delay_theo,partial:clock:KOKEE\n\
                   A,KOKEE,60000,1e-9,1e-11,0,1\n";
        let obs = read_observations(csv.as_bytes()).unwrap();
        assert_eq!(obs[0].partial("clock:KOKEE"), 1.0);
    }
}
