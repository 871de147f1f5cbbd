//! CSV import for the scheme catalog and citizen profiles.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use super::{NewScheme, SqliteProfileStore, SqliteSchemeCatalog, StorageError};
use crate::intake::{EligibilityCriteria, NationalId, Profile, ANY_GENDER};

const PROFILE_COLUMNS: [&str; 8] = [
    "aadhaar_number",
    "name",
    "dob",
    "gender",
    "annual_income",
    "community",
    "district",
    "phone",
];

#[derive(Debug)]
pub enum SeedError {
    Io(std::io::Error),
    Csv(csv::Error),
    Storage(StorageError),
    InvalidRow { line: usize, detail: String },
}

impl fmt::Display for SeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedError::Io(err) => write!(f, "failed to read seed file: {}", err),
            SeedError::Csv(err) => write!(f, "invalid seed CSV data: {}", err),
            SeedError::Storage(err) => write!(f, "failed to store seed data: {}", err),
            SeedError::InvalidRow { line, detail } => {
                write!(f, "seed row {} is invalid: {}", line, detail)
            }
        }
    }
}

impl std::error::Error for SeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SeedError::Io(err) => Some(err),
            SeedError::Csv(err) => Some(err),
            SeedError::Storage(err) => Some(err),
            SeedError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for SeedError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for SeedError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<StorageError> for SeedError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Counts reported back to the operator after a seed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct SchemeRow {
    name: String,
    department: String,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    eligibility_summary: String,
    #[serde(default, deserialize_with = "empty_as_zero")]
    application_fee: u32,
    #[serde(default, deserialize_with = "empty_as_zero")]
    min_age: u32,
    #[serde(default, deserialize_with = "empty_as_none")]
    max_age: Option<u32>,
    #[serde(default)]
    gender_eligibility: String,
    max_annual_income: u64,
    #[serde(default)]
    community_eligibility: String,
    #[serde(default)]
    districts: String,
    #[serde(default)]
    required_information: String,
    #[serde(default)]
    supporting_documents: String,
}

impl SchemeRow {
    fn into_new_scheme(self) -> NewScheme {
        let gender_eligibility = if self.gender_eligibility.trim().is_empty() {
            ANY_GENDER.to_string()
        } else {
            self.gender_eligibility
        };

        NewScheme {
            name: self.name,
            department: self.department,
            definition: self.definition,
            eligibility_summary: self.eligibility_summary,
            application_fee: self.application_fee,
            criteria: EligibilityCriteria {
                min_age: self.min_age,
                max_age: self.max_age.unwrap_or(150),
                gender_eligibility,
                max_annual_income: self.max_annual_income,
                community_eligibility: split_list(&self.community_eligibility),
                districts: split_list(&self.districts),
            },
            required_information: split_list(&self.required_information),
            supporting_documents: split_list(&self.supporting_documents),
        }
    }
}

/// List cells are either a JSON array or `;`-separated text.
pub fn split_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list;
        }
    }
    trimmed
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn empty_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(empty_as_none(deserializer)?.unwrap_or_default())
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Insert every scheme row not already present by name.
pub fn seed_schemes<R: Read>(
    catalog: &SqliteSchemeCatalog,
    reader: R,
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    for row in csv_reader(reader).deserialize::<SchemeRow>() {
        let scheme = row?.into_new_scheme();
        if catalog.contains(&scheme.name)? {
            report.skipped += 1;
            continue;
        }
        catalog.insert(&scheme)?;
        report.inserted += 1;
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "scheme catalog seeded"
    );
    Ok(report)
}

/// Upsert profiles. Columns beyond the canonical set become additional named fields.
pub fn seed_profiles<R: Read>(
    store: &SqliteProfileStore,
    reader: R,
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    for (index, row) in csv_reader(reader)
        .deserialize::<BTreeMap<String, String>>()
        .enumerate()
    {
        let line = index + 2;
        let mut row = row?;
        let Some(profile) = profile_from_row(&mut row, line)? else {
            report.skipped += 1;
            continue;
        };
        store.upsert(&profile)?;
        report.inserted += 1;
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "profiles seeded"
    );
    Ok(report)
}

fn profile_from_row(
    row: &mut BTreeMap<String, String>,
    line: usize,
) -> Result<Option<Profile>, SeedError> {
    let mut take = |column: &str| row.remove(column).filter(|value| !value.is_empty());

    let raw_id = take("aadhaar_number").unwrap_or_default();
    let Some(national_id) = NationalId::parse(&raw_id) else {
        warn!(line, "skipping profile row without a valid Aadhaar number");
        return Ok(None);
    };

    let name = take("name").ok_or_else(|| SeedError::InvalidRow {
        line,
        detail: "name is required".to_string(),
    })?;

    let date_of_birth = take("dob")
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|err| SeedError::InvalidRow {
                line,
                detail: format!("dob '{raw}' is not YYYY-MM-DD ({err})"),
            })
        })
        .transpose()?;

    let annual_income = take("annual_income")
        .map(|raw| {
            raw.parse::<u64>().map_err(|_| SeedError::InvalidRow {
                line,
                detail: format!("annual_income '{raw}' is not a whole number"),
            })
        })
        .transpose()?;

    let gender = take("gender");
    let community = take("community");
    let district = take("district");
    let phone = take("phone");

    let additional = row
        .iter()
        .filter(|(column, value)| !PROFILE_COLUMNS.contains(&column.as_str()) && !value.is_empty())
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    Ok(Some(Profile {
        national_id,
        name,
        date_of_birth,
        gender,
        annual_income,
        community,
        district,
        phone,
        additional,
    }))
}

pub fn seed_schemes_from_path(
    catalog: &SqliteSchemeCatalog,
    path: &Path,
) -> Result<SeedReport, SeedError> {
    seed_schemes(catalog, File::open(path)?)
}

pub fn seed_profiles_from_path(
    store: &SqliteProfileStore,
    path: &Path,
) -> Result<SeedReport, SeedError> {
    seed_profiles(store, File::open(path)?)
}
