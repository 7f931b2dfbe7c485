//! Read/write session JSON files.
//!
//! Session JSON is the portable form of everything one estimation run needs:
//! observations, a priori parameters and EOP series, reference epoch and an
//! optional embedded configuration. The schema is `domain::Session`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::Session;
use crate::error::AppError;
use crate::io::ingest::load_observation_csv;

/// Load a session from JSON, or from an observation CSV when the extension is `.csv`.
pub fn load_session(path: &Path) -> Result<Session, AppError> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        load_observation_csv(path)
    } else {
        read_session_json(path)
    }
}

/// Read a session JSON file and validate every observation in it.
pub fn read_session_json(path: &Path) -> Result<Session, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open session JSON '{}': {e}", path.display())))?;
    let mut session: Session = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid session JSON '{}': {e}", path.display())))?;

    session.validate()?;
    if session.name.is_empty() {
        session.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(session)
}

/// Write a session JSON file.
pub fn write_session_json(path: &Path, session: &Session) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create session JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, session)
        .map_err(|e| AppError::new(2, format!("Failed to write session JSON: {e}")))?;
    Ok(())
}
