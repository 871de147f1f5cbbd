use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::warn;

use super::{catalog_error, lock, open, open_in_memory, StorageError, PROFILES_SCHEMA};
use crate::intake::{CatalogError, NationalId, Profile, ProfileStore};

/// Read side of the `user_details` table.
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_connection(open(path, PROFILES_SCHEMA)?))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(open_in_memory(PROFILES_SCHEMA)?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Insert or replace a profile; used by seeding and tests.
    pub fn upsert(&self, profile: &Profile) -> Result<(), StorageError> {
        let extra = if profile.additional.is_empty() {
            None
        } else {
            serde_json::to_string(&profile.additional).ok()
        };
        let income = profile
            .annual_income
            .and_then(|income| i64::try_from(income).ok());

        lock(&self.conn).execute(
            "INSERT OR REPLACE INTO user_details
                (aadhaar_number, name, dob, gender, annual_income, community, district, phone, extra_fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                profile.national_id.as_str(),
                profile.name,
                profile.date_of_birth.map(|dob| dob.format("%Y-%m-%d").to_string()),
                profile.gender,
                income,
                profile.community,
                profile.district,
                profile.phone,
                extra,
            ],
        )?;
        Ok(())
    }
}

struct ProfileRow {
    name: String,
    dob: Option<String>,
    gender: Option<String>,
    annual_income: Option<i64>,
    community: Option<String>,
    district: Option<String>,
    phone: Option<String>,
    extra_fields: Option<String>,
}

impl ProfileStore for SqliteProfileStore {
    fn fetch(&self, national_id: &NationalId) -> Result<Option<Profile>, CatalogError> {
        let row = lock(&self.conn)
            .query_row(
                "SELECT name, dob, gender, annual_income, community, district, phone, extra_fields
                 FROM user_details WHERE aadhaar_number = ?1",
                params![national_id.as_str()],
                |row| {
                    Ok(ProfileRow {
                        name: row.get(0)?,
                        dob: row.get(1)?,
                        gender: row.get(2)?,
                        annual_income: row.get(3)?,
                        community: row.get(4)?,
                        district: row.get(5)?,
                        phone: row.get(6)?,
                        extra_fields: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(catalog_error)?;

        row.map(|row| into_profile(national_id, row)).transpose()
    }
}

fn into_profile(national_id: &NationalId, row: ProfileRow) -> Result<Profile, CatalogError> {
    let annual_income = row
        .annual_income
        .map(|income| {
            u64::try_from(income).map_err(|_| CatalogError::Corrupt {
                entity: "profile",
                key: national_id.masked(),
                detail: format!("negative annual income {income}"),
            })
        })
        .transpose()?;

    let date_of_birth = row.dob.as_deref().and_then(|raw| {
        let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok();
        if parsed.is_none() {
            warn!(applicant = %national_id.masked(), dob = raw, "unreadable date of birth");
        }
        parsed
    });

    Ok(Profile {
        national_id: national_id.clone(),
        name: row.name,
        date_of_birth,
        gender: row.gender,
        annual_income,
        community: row.community,
        district: row.district,
        phone: row.phone,
        additional: parse_extra_fields(row.extra_fields.as_deref()),
    })
}

/// Flat JSON object of extra named fields. Scalars are stringified; anything else is dropped.
fn parse_extra_fields(raw: Option<&str>) -> BTreeMap<String, String> {
    let Some(object) = raw.and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
    else {
        return BTreeMap::new();
    };

    object
        .into_iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => return None,
            };
            Some((name, value))
        })
        .collect()
}
