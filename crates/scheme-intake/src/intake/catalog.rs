use super::domain::{NationalId, Profile, Scheme};
use super::eligibility::match_by_name;

/// Read access to citizen profiles keyed by Aadhaar number.
pub trait ProfileStore: Send + Sync {
    fn fetch(&self, national_id: &NationalId) -> Result<Option<Profile>, CatalogError>;
}

/// Read access to the scheme catalog in its stored order.
pub trait SchemeCatalog: Send + Sync {
    fn list_all(&self) -> Result<Vec<Scheme>, CatalogError>;

    fn find_by_name(&self, query: &str) -> Result<Vec<Scheme>, CatalogError> {
        let schemes = self.list_all()?;
        Ok(match_by_name(&schemes, query))
    }
}

/// Failure reading profiles or schemes from their backing store.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt {entity} record {key}: {detail}")]
    Corrupt {
        entity: &'static str,
        key: String,
        detail: String,
    },
}

/// Decode a JSON-serialized string list column. Absent or malformed input is an empty list.
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| serde_json::from_str::<Vec<String>>(value).ok())
        .unwrap_or_default()
}
