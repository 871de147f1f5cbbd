use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::intake::catalog::{CatalogError, ProfileStore, SchemeCatalog};
use crate::intake::domain::{
    ApplicationId, EligibilityCriteria, EligibilityFacts, NationalId, Profile, Scheme,
};
use crate::intake::render::{ArtifactLocator, DocumentRenderer, FlatFields, RenderError};
use crate::intake::repository::{
    ApplicationRecord, ApplicationStatusView, ApplicationStore, RepositoryError, SaveReceipt,
};
use crate::intake::service::IntakeService;

pub(super) const NATIONAL_ID: &str = "123456789012";
pub(super) const UNKNOWN_NATIONAL_ID: &str = "999999999999";
pub(super) const OTP: &str = "123456";

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn national_id() -> NationalId {
    NationalId::parse(NATIONAL_ID).expect("valid id")
}

/// 45 years old on `today()`, no phone on record.
pub(super) fn profile() -> Profile {
    let mut additional = BTreeMap::new();
    additional.insert(
        "Caste Certificate RD Number".to_string(),
        "CC123".to_string(),
    );

    Profile {
        national_id: national_id(),
        name: "Lakshmi Devi".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 3, 10),
        gender: Some("Female".to_string()),
        annual_income: Some(200_000),
        community: Some("OBC".to_string()),
        district: Some("Mysuru".to_string()),
        phone: None,
        additional,
    }
}

pub(super) fn facts() -> EligibilityFacts {
    EligibilityFacts {
        age: Some(45),
        gender: Some("Female".to_string()),
        annual_income: Some(200_000),
        community: Some("OBC".to_string()),
        district: Some("Mysuru".to_string()),
    }
}

pub(super) fn open_criteria() -> EligibilityCriteria {
    EligibilityCriteria {
        min_age: 18,
        max_age: 60,
        gender_eligibility: "Any".to_string(),
        max_annual_income: 300_000,
        community_eligibility: vec!["OBC".to_string(), "General".to_string()],
        districts: vec!["All Districts".to_string()],
    }
}

pub(super) fn scheme(id: i64, name: &str, criteria: EligibilityCriteria) -> Scheme {
    Scheme {
        id,
        name: name.to_string(),
        department: "Women and Child Development".to_string(),
        definition: format!("{name} support"),
        eligibility_summary: "See criteria".to_string(),
        application_fee: 0,
        required_information: vec![
            "Full Name".to_string(),
            "Phone".to_string(),
            "Caste Certificate RD Number".to_string(),
        ],
        supporting_documents: vec![
            "Income Certificate".to_string(),
            "Ration Card".to_string(),
        ],
        criteria,
    }
}

pub(super) fn gruha_lakshmi() -> Scheme {
    scheme(1, "Gruha Lakshmi", open_criteria())
}

/// Three schemes: open, low income ceiling, and male-only.
pub(super) fn catalog() -> Vec<Scheme> {
    let mut low_income = open_criteria();
    low_income.max_annual_income = 150_000;
    let mut male_only = open_criteria();
    male_only.gender_eligibility = "Male".to_string();

    vec![
        gruha_lakshmi(),
        scheme(2, "Annapurna Poverty Relief", low_income),
        scheme(3, "Raitha Vidya Nidhi", male_only),
    ]
}

#[derive(Default)]
pub(super) struct MemoryProfiles {
    profiles: HashMap<NationalId, Profile>,
}

impl MemoryProfiles {
    pub(super) fn with(profile: Profile) -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(profile.national_id.clone(), profile);
        Self { profiles }
    }
}

impl ProfileStore for MemoryProfiles {
    fn fetch(&self, national_id: &NationalId) -> Result<Option<Profile>, CatalogError> {
        Ok(self.profiles.get(national_id).cloned())
    }
}

pub(super) struct MemoryCatalog(pub(super) Vec<Scheme>);

impl SchemeCatalog for MemoryCatalog {
    fn list_all(&self) -> Result<Vec<Scheme>, CatalogError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
}

impl MemoryStore {
    pub(super) fn records(&self) -> Vec<ApplicationRecord> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl ApplicationStore for MemoryStore {
    fn save(&self, record: ApplicationRecord) -> Result<SaveReceipt, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        let receipt = SaveReceipt {
            application_id: record.application_id.clone(),
            status: record.status.label(),
        };
        guard.insert(record.application_id.clone(), record);
        Ok(receipt)
    }

    fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, RepositoryError> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .map(ApplicationRecord::status_view)
            .ok_or(RepositoryError::NotFound)
    }
}

/// Reports `Busy` for the first `failures` saves, then delegates.
pub(super) struct FlakyStore {
    pub(super) inner: MemoryStore,
    failures: u32,
    pub(super) attempts: AtomicU32,
}

impl FlakyStore {
    pub(super) fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::default(),
            failures,
            attempts: AtomicU32::new(0),
        }
    }
}

impl ApplicationStore for FlakyStore {
    fn save(&self, record: ApplicationRecord) -> Result<SaveReceipt, RepositoryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(RepositoryError::Busy("database is locked".to_string()));
        }
        self.inner.save(record)
    }

    fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, RepositoryError> {
        self.inner.status(id)
    }
}

pub(super) struct UnavailableStore;

impl ApplicationStore for UnavailableStore {
    fn save(&self, _record: ApplicationRecord) -> Result<SaveReceipt, RepositoryError> {
        Err(RepositoryError::Unavailable("disk full".to_string()))
    }

    fn status(&self, _id: &ApplicationId) -> Result<ApplicationStatusView, RepositoryError> {
        Err(RepositoryError::Unavailable("disk full".to_string()))
    }
}

/// Keeps rendered field lists in memory; `load` hands back a marker payload.
#[derive(Default)]
pub(super) struct MemoryRenderer {
    rendered: Mutex<Vec<(ApplicationId, FlatFields)>>,
}

impl MemoryRenderer {
    pub(super) fn rendered(&self) -> Vec<(ApplicationId, FlatFields)> {
        self.rendered.lock().expect("renderer mutex poisoned").clone()
    }
}

impl DocumentRenderer for MemoryRenderer {
    fn render(
        &self,
        fields: &FlatFields,
        application_id: &ApplicationId,
    ) -> Result<ArtifactLocator, RenderError> {
        self.rendered
            .lock()
            .expect("renderer mutex poisoned")
            .push((application_id.clone(), fields.clone()));
        Ok(ArtifactLocator::for_application(application_id))
    }

    fn load(&self, filename: &str) -> Result<Vec<u8>, RenderError> {
        let known = self
            .rendered
            .lock()
            .expect("renderer mutex poisoned")
            .iter()
            .any(|(id, _)| ArtifactLocator::for_application(id).filename == filename);
        if known {
            Ok(b"%PDF-1.4 memory".to_vec())
        } else {
            Err(RenderError::Missing(filename.to_string()))
        }
    }
}

pub(super) struct FailingRenderer;

impl DocumentRenderer for FailingRenderer {
    fn render(
        &self,
        _fields: &FlatFields,
        _application_id: &ApplicationId,
    ) -> Result<ArtifactLocator, RenderError> {
        Err(RenderError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only volume",
        )))
    }

    fn load(&self, filename: &str) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Missing(filename.to_string()))
    }
}

pub(super) struct ServiceFixture {
    pub(super) service: Arc<IntakeService>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) renderer: Arc<MemoryRenderer>,
}

pub(super) fn build_service() -> ServiceFixture {
    build_service_with(|service| service)
}

pub(super) fn build_service_with(
    configure: impl FnOnce(IntakeService) -> IntakeService,
) -> ServiceFixture {
    let store = Arc::new(MemoryStore::default());
    let renderer = Arc::new(MemoryRenderer::default());
    let service = IntakeService::new(
        Arc::new(MemoryProfiles::with(profile())),
        Arc::new(MemoryCatalog(catalog())),
        store.clone(),
        renderer.clone(),
    )
    .with_today(today);

    ServiceFixture {
        service: Arc::new(configure(service)),
        store,
        renderer,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}
