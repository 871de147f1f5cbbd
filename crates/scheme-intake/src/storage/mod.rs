//! SQLite-backed profile, scheme and application stores.

mod applications;
mod profiles;
mod schemes;
pub mod seed;

pub use applications::SqliteApplicationStore;
pub use profiles::SqliteProfileStore;
pub use schemes::{NewScheme, SqliteSchemeCatalog};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};

use crate::intake::{CatalogError, RepositoryError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const PROFILES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS user_details (
        aadhaar_number TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        dob TEXT,
        gender TEXT,
        annual_income INTEGER,
        community TEXT,
        district TEXT,
        phone TEXT,
        extra_fields TEXT
    );
";

pub(crate) const SCHEMES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS departments (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS schemes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        department_id INTEGER NOT NULL REFERENCES departments(id),
        definition TEXT NOT NULL DEFAULT '',
        eligibility_summary TEXT NOT NULL DEFAULT '',
        application_fee INTEGER NOT NULL DEFAULT 0,
        min_age INTEGER NOT NULL DEFAULT 0,
        max_age INTEGER NOT NULL DEFAULT 150,
        gender_eligibility TEXT NOT NULL DEFAULT 'Any',
        max_annual_income INTEGER NOT NULL,
        community_eligibility TEXT,
        required_information TEXT,
        supporting_documents TEXT
    );
    CREATE TABLE IF NOT EXISTS scheme_geographies (
        scheme_id INTEGER NOT NULL REFERENCES schemes(id),
        district TEXT NOT NULL,
        PRIMARY KEY (scheme_id, district)
    );
";

pub(crate) const APPLICATIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS applications (
        application_uuid TEXT PRIMARY KEY,
        scheme_name TEXT NOT NULL,
        aadhar_number TEXT NOT NULL,
        applicant_name TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'Submitted',
        submitted_at TEXT NOT NULL
    );
";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not prepare database directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Open (creating if needed) a database file and apply `schema`.
pub fn open(path: &Path, schema: &str) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(schema)?;
    Ok(conn)
}

pub fn open_in_memory(schema: &str) -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(schema)?;
    Ok(conn)
}

fn sqlite_code(err: &rusqlite::Error) -> Option<ErrorCode> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    }
}

/// Busy and locked databases are transient; a constraint hit on insert is a duplicate id.
pub(crate) fn repository_error(err: rusqlite::Error) -> RepositoryError {
    match sqlite_code(&err) {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            RepositoryError::Busy(err.to_string())
        }
        Some(ErrorCode::ConstraintViolation) => RepositoryError::Conflict,
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}

pub(crate) fn catalog_error(err: rusqlite::Error) -> CatalogError {
    CatalogError::Unavailable(err.to_string())
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}
