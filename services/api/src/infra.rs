use metrics_exporter_prometheus::PrometheusHandle;
use scheme_intake::config::StorageConfig;
use scheme_intake::intake::{
    ApplicationStatus, IntakeService, PdfRenderer, RetryPolicy, VerificationPolicy,
};
use scheme_intake::storage::{
    SqliteApplicationStore, SqliteProfileStore, SqliteSchemeCatalog, StorageError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The three stores behind one intake service.
pub(crate) struct StorageHandles {
    pub(crate) profiles: Arc<SqliteProfileStore>,
    pub(crate) catalog: Arc<SqliteSchemeCatalog>,
    pub(crate) applications: Arc<SqliteApplicationStore>,
    pub(crate) render_dir: PathBuf,
}

impl StorageHandles {
    pub(crate) fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(Self {
            profiles: Arc::new(SqliteProfileStore::open(&config.profiles_db)?),
            catalog: Arc::new(SqliteSchemeCatalog::open(&config.schemes_db)?),
            applications: Arc::new(SqliteApplicationStore::open(&config.applications_db)?),
            render_dir: config.render_dir.clone(),
        })
    }

    pub(crate) fn in_memory(render_dir: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            profiles: Arc::new(SqliteProfileStore::in_memory()?),
            catalog: Arc::new(SqliteSchemeCatalog::in_memory()?),
            applications: Arc::new(SqliteApplicationStore::in_memory()?),
            render_dir: render_dir.to_path_buf(),
        })
    }

    pub(crate) fn intake_service(
        &self,
        verification: VerificationPolicy,
        retry: RetryPolicy,
    ) -> IntakeService {
        let renderer = PdfRenderer::new(self.render_dir.clone());
        IntakeService::new(
            self.profiles.clone(),
            self.catalog.clone(),
            self.applications.clone(),
            Arc::new(renderer),
        )
        .with_verification(verification)
        .with_retry(retry)
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<ApplicationStatus, String> {
    ApplicationStatus::from_label(raw).ok_or_else(|| {
        format!("unknown status '{raw}' (expected submitted, under_review, approved or rejected)")
    })
}
