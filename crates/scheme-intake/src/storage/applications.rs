use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{lock, open, open_in_memory, repository_error, StorageError, APPLICATIONS_SCHEMA};
use crate::intake::{
    ApplicationId, ApplicationRecord, ApplicationStatus, ApplicationStatusView, ApplicationStore,
    RepositoryError, SaveReceipt,
};

/// `applications` table keyed by the issued application UUID.
pub struct SqliteApplicationStore {
    conn: Mutex<Connection>,
}

impl SqliteApplicationStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_connection(open(path, APPLICATIONS_SCHEMA)?))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(open_in_memory(APPLICATIONS_SCHEMA)?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Operator-side status change; the only mutation a stored record ever sees.
    pub fn set_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<ApplicationStatusView, RepositoryError> {
        let updated = lock(&self.conn)
            .execute(
                "UPDATE applications SET status = ?1 WHERE application_uuid = ?2",
                params![status.label(), id.0],
            )
            .map_err(repository_error)?;

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        info!(application_id = %id, status = status.label(), "application status updated");
        self.status(id)
    }
}

impl ApplicationStore for SqliteApplicationStore {
    fn save(&self, record: ApplicationRecord) -> Result<SaveReceipt, RepositoryError> {
        lock(&self.conn)
            .execute(
                "INSERT INTO applications
                    (application_uuid, scheme_name, aadhar_number, applicant_name, phone, status, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.application_id.0,
                    record.scheme_name,
                    record.national_id.as_str(),
                    record.applicant_name,
                    record.phone,
                    record.status.label(),
                    record.submitted_at.to_rfc3339(),
                ],
            )
            .map_err(repository_error)?;

        Ok(SaveReceipt {
            application_id: record.application_id,
            status: record.status.label(),
        })
    }

    fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, RepositoryError> {
        let row = lock(&self.conn)
            .query_row(
                "SELECT scheme_name, status FROM applications WHERE application_uuid = ?1",
                params![id.0],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(repository_error)?;

        let (scheme_name, raw_status) = row.ok_or(RepositoryError::NotFound)?;
        let status = match ApplicationStatus::from_label(&raw_status) {
            Some(known) => known.label().to_string(),
            None => raw_status,
        };

        Ok(ApplicationStatusView {
            application_id: id.clone(),
            scheme_name,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::NationalId;
    use chrono::Utc;

    fn record(id: &str) -> ApplicationRecord {
        ApplicationRecord {
            application_id: ApplicationId(id.to_string()),
            scheme_name: "Gruha Lakshmi".to_string(),
            national_id: NationalId::parse("123456789012").expect("valid id"),
            applicant_name: "Lakshmi Devi".to_string(),
            phone: "9876543210".to_string(),
            status: ApplicationStatus::Submitted,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn saved_record_reports_submitted_status() {
        let store = SqliteApplicationStore::in_memory().expect("store opens");
        let receipt = store.save(record("app-1")).expect("saved");
        assert_eq!(receipt.status, "Submitted");

        let view = store
            .status(&ApplicationId("app-1".to_string()))
            .expect("status readable");
        assert_eq!(view.status, "Submitted");
        assert_eq!(view.scheme_name, "Gruha Lakshmi");
    }

    #[test]
    fn duplicate_id_is_a_conflict_not_an_overwrite() {
        let store = SqliteApplicationStore::in_memory().expect("store opens");
        store.save(record("app-1")).expect("first save");

        let mut second = record("app-1");
        second.scheme_name = "Other".to_string();
        assert!(matches!(store.save(second), Err(RepositoryError::Conflict)));

        let view = store
            .status(&ApplicationId("app-1".to_string()))
            .expect("status readable");
        assert_eq!(view.scheme_name, "Gruha Lakshmi");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = SqliteApplicationStore::in_memory().expect("store opens");
        assert!(matches!(
            store.status(&ApplicationId("missing".to_string())),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn set_status_changes_only_status() {
        let store = SqliteApplicationStore::in_memory().expect("store opens");
        store.save(record("app-1")).expect("saved");
        let id = ApplicationId("app-1".to_string());

        let view = store
            .set_status(&id, ApplicationStatus::UnderReview)
            .expect("status updated");
        assert_eq!(view.status, "Under Review");
        assert_eq!(view.scheme_name, "Gruha Lakshmi");

        assert!(matches!(
            store.set_status(&ApplicationId("missing".to_string()), ApplicationStatus::Approved),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn externally_written_status_is_returned_verbatim() {
        let store = SqliteApplicationStore::in_memory().expect("store opens");
        lock(&store.conn)
            .execute(
                "INSERT INTO applications
                    (application_uuid, scheme_name, aadhar_number, applicant_name, phone, status, submitted_at)
                 VALUES ('app-9', 'Gruha Lakshmi', '123456789012', 'Lakshmi Devi', '', 'Pending', '2025-06-01T00:00:00Z')",
                [],
            )
            .expect("raw insert");
        store.save(record("app-2")).expect("saved");
        lock(&store.conn)
            .execute(
                "UPDATE applications SET status = 'approved' WHERE application_uuid = 'app-2'",
                [],
            )
            .expect("raw update");

        let pending = store
            .status(&ApplicationId("app-9".to_string()))
            .expect("status readable");
        assert_eq!(pending.status, "Pending");
        let approved = store
            .status(&ApplicationId("app-2".to_string()))
            .expect("status readable");
        assert_eq!(approved.status, "Approved");
    }
}
