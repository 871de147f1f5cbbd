use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{catalog_error, lock, open, open_in_memory, StorageError, SCHEMES_SCHEMA};
use crate::intake::{parse_list, CatalogError, EligibilityCriteria, Scheme, SchemeCatalog};

/// Scheme catalog over `schemes`, `departments` and `scheme_geographies`.
pub struct SqliteSchemeCatalog {
    conn: Mutex<Connection>,
}

/// Everything needed to insert one scheme with its department and districts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheme {
    pub name: String,
    pub department: String,
    pub definition: String,
    pub eligibility_summary: String,
    pub application_fee: u32,
    pub criteria: EligibilityCriteria,
    pub required_information: Vec<String>,
    pub supporting_documents: Vec<String>,
}

struct SchemeRow {
    id: i64,
    name: String,
    department: String,
    definition: String,
    eligibility_summary: String,
    application_fee: i64,
    min_age: i64,
    max_age: i64,
    gender_eligibility: String,
    max_annual_income: i64,
    community_eligibility: Option<String>,
    required_information: Option<String>,
    supporting_documents: Option<String>,
}

impl SqliteSchemeCatalog {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_connection(open(path, SCHEMES_SCHEMA)?))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(open_in_memory(SCHEMES_SCHEMA)?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Insert a scheme in one transaction. Returns the new scheme id.
    pub fn insert(&self, scheme: &NewScheme) -> Result<i64, StorageError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        let department_id: i64 = match tx
            .query_row(
                "SELECT id FROM departments WHERE name = ?1",
                params![scheme.department],
                |row| row.get(0),
            )
            .optional()?
        {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO departments (name) VALUES (?1)",
                    params![scheme.department],
                )?;
                tx.last_insert_rowid()
            }
        };

        let to_json = |list: &Vec<String>| serde_json::to_string(list).unwrap_or_default();
        let max_income = i64::try_from(scheme.criteria.max_annual_income).unwrap_or(i64::MAX);

        tx.execute(
            "INSERT INTO schemes
                (name, department_id, definition, eligibility_summary, application_fee,
                 min_age, max_age, gender_eligibility, max_annual_income,
                 community_eligibility, required_information, supporting_documents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                scheme.name,
                department_id,
                scheme.definition,
                scheme.eligibility_summary,
                scheme.application_fee,
                scheme.criteria.min_age,
                scheme.criteria.max_age,
                scheme.criteria.gender_eligibility,
                max_income,
                to_json(&scheme.criteria.community_eligibility),
                to_json(&scheme.required_information),
                to_json(&scheme.supporting_documents),
            ],
        )?;
        let scheme_id = tx.last_insert_rowid();

        for district in &scheme.criteria.districts {
            tx.execute(
                "INSERT OR IGNORE INTO scheme_geographies (scheme_id, district) VALUES (?1, ?2)",
                params![scheme_id, district],
            )?;
        }

        tx.commit()?;
        Ok(scheme_id)
    }

    pub fn contains(&self, name: &str) -> Result<bool, StorageError> {
        let found = lock(&self.conn)
            .query_row(
                "SELECT 1 FROM schemes WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn districts(conn: &Connection) -> Result<HashMap<i64, Vec<String>>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT scheme_id, district FROM scheme_geographies ORDER BY scheme_id, rowid",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut districts: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            let (scheme_id, district) = row?;
            districts.entry(scheme_id).or_default().push(district);
        }
        Ok(districts)
    }
}

impl SchemeCatalog for SqliteSchemeCatalog {
    fn list_all(&self) -> Result<Vec<Scheme>, CatalogError> {
        let conn = lock(&self.conn);
        let mut districts = Self::districts(&conn).map_err(catalog_error)?;

        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.name, d.name, s.definition, s.eligibility_summary,
                        s.application_fee, s.min_age, s.max_age, s.gender_eligibility,
                        s.max_annual_income, s.community_eligibility,
                        s.required_information, s.supporting_documents
                 FROM schemes s
                 JOIN departments d ON s.department_id = d.id
                 ORDER BY s.id",
            )
            .map_err(catalog_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SchemeRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    department: row.get(2)?,
                    definition: row.get(3)?,
                    eligibility_summary: row.get(4)?,
                    application_fee: row.get(5)?,
                    min_age: row.get(6)?,
                    max_age: row.get(7)?,
                    gender_eligibility: row.get(8)?,
                    max_annual_income: row.get(9)?,
                    community_eligibility: row.get(10)?,
                    required_information: row.get(11)?,
                    supporting_documents: row.get(12)?,
                })
            })
            .map_err(catalog_error)?;

        let mut schemes = Vec::new();
        for row in rows {
            let row = row.map_err(catalog_error)?;
            let scheme_districts = districts.remove(&row.id).unwrap_or_default();
            schemes.push(into_scheme(row, scheme_districts)?);
        }
        Ok(schemes)
    }
}

fn into_scheme(row: SchemeRow, districts: Vec<String>) -> Result<Scheme, CatalogError> {
    let corrupt = |detail: String| CatalogError::Corrupt {
        entity: "scheme",
        key: row.name.clone(),
        detail,
    };

    let application_fee = u32::try_from(row.application_fee)
        .map_err(|_| corrupt(format!("application fee {}", row.application_fee)))?;
    let min_age = u32::try_from(row.min_age)
        .map_err(|_| corrupt(format!("min age {}", row.min_age)))?;
    let max_age = u32::try_from(row.max_age)
        .map_err(|_| corrupt(format!("max age {}", row.max_age)))?;
    let max_annual_income = u64::try_from(row.max_annual_income)
        .map_err(|_| corrupt(format!("income ceiling {}", row.max_annual_income)))?;

    Ok(Scheme {
        id: row.id,
        criteria: EligibilityCriteria {
            min_age,
            max_age,
            gender_eligibility: row.gender_eligibility,
            max_annual_income,
            community_eligibility: parse_list(row.community_eligibility.as_deref()),
            districts,
        },
        required_information: parse_list(row.required_information.as_deref()),
        supporting_documents: parse_list(row.supporting_documents.as_deref()),
        name: row.name,
        department: row.department,
        definition: row.definition,
        eligibility_summary: row.eligibility_summary,
        application_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_scheme(name: &str, districts: &[&str]) -> NewScheme {
        NewScheme {
            name: name.to_string(),
            department: "Women and Child Development".to_string(),
            definition: "Monthly support".to_string(),
            eligibility_summary: "Women aged 18-60".to_string(),
            application_fee: 0,
            criteria: EligibilityCriteria {
                min_age: 18,
                max_age: 60,
                gender_eligibility: "Female".to_string(),
                max_annual_income: 300_000,
                community_eligibility: vec!["OBC".to_string(), "SC".to_string()],
                districts: districts.iter().map(|d| d.to_string()).collect(),
            },
            required_information: vec![
                "Full Name".to_string(),
                "Caste Certificate RD Number".to_string(),
            ],
            supporting_documents: vec!["Income Certificate".to_string()],
        }
    }

    #[test]
    fn list_all_reassembles_schemes_in_insert_order() {
        let catalog = SqliteSchemeCatalog::in_memory().expect("catalog opens");
        catalog
            .insert(&new_scheme("Gruha Lakshmi", &["Mysuru", "Mandya"]))
            .expect("first scheme");
        catalog
            .insert(&new_scheme("Bhagya Lakshmi", &["All Districts"]))
            .expect("second scheme");

        let schemes = catalog.list_all().expect("catalog lists");

        assert_eq!(schemes.len(), 2);
        assert_eq!(schemes[0].name, "Gruha Lakshmi");
        assert_eq!(schemes[0].criteria.districts, vec!["Mysuru", "Mandya"]);
        assert_eq!(schemes[0].department, "Women and Child Development");
        assert_eq!(
            schemes[0].required_information,
            vec!["Full Name", "Caste Certificate RD Number"]
        );
        assert_eq!(schemes[1].criteria.districts, vec!["All Districts"]);
    }

    #[test]
    fn departments_are_shared_between_schemes() {
        let catalog = SqliteSchemeCatalog::in_memory().expect("catalog opens");
        catalog.insert(&new_scheme("A", &[])).expect("insert");
        catalog.insert(&new_scheme("B", &[])).expect("insert");

        let count: i64 = lock(&catalog.conn)
            .query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn malformed_list_columns_read_as_empty() {
        let catalog = SqliteSchemeCatalog::in_memory().expect("catalog opens");
        let id = catalog.insert(&new_scheme("Broken", &["Mysuru"])).expect("insert");
        lock(&catalog.conn)
            .execute(
                "UPDATE schemes SET required_information = 'Full Name' WHERE id = ?1",
                params![id],
            )
            .expect("update");

        let schemes = catalog.list_all().expect("catalog lists");
        assert!(schemes[0].required_information.is_empty());
    }

    #[test]
    fn negative_ceiling_is_reported_as_corrupt() {
        let catalog = SqliteSchemeCatalog::in_memory().expect("catalog opens");
        let id = catalog.insert(&new_scheme("Odd", &[])).expect("insert");
        lock(&catalog.conn)
            .execute(
                "UPDATE schemes SET max_annual_income = -1 WHERE id = ?1",
                params![id],
            )
            .expect("update");

        assert!(matches!(
            catalog.list_all(),
            Err(CatalogError::Corrupt { entity: "scheme", .. })
        ));
    }

    #[test]
    fn scheme_without_geography_rows_stays_eligible() {
        let catalog = SqliteSchemeCatalog::in_memory().expect("catalog opens");
        catalog.insert(&new_scheme("Statewide", &[])).expect("insert");
        let facts = crate::intake::EligibilityFacts {
            district: Some("Mysuru".to_string()),
            ..Default::default()
        };

        let schemes = catalog.list_all().expect("catalog lists");
        assert_eq!(schemes.len(), 1);
        assert!(schemes[0].criteria.districts.is_empty());
        assert_eq!(crate::intake::filter_eligible(&facts, &schemes).len(), 1);
    }
}
