use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ApplicationId, NationalId, Profile, Scheme};
use super::draft::{ApplicationDraft, AssemblyError};
use super::render::{flatten, ArtifactLocator, DocumentRenderer};
use super::repository::{ApplicationStore, RetryPolicy};
use super::verification::VerificationPolicy;

/// Result of a confirmed submission. `artifact` is absent when rendering failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub application_id: ApplicationId,
    pub scheme_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactLocator>,
}

impl SubmissionReceipt {
    pub fn download_path(&self) -> Option<String> {
        self.artifact.as_ref().map(ArtifactLocator::download_path)
    }
}

/// Opens drafts and turns complete ones into persisted, rendered applications.
pub struct ApplicationAssembler {
    store: Arc<dyn ApplicationStore>,
    renderer: Arc<dyn DocumentRenderer>,
    verification: VerificationPolicy,
    retry: RetryPolicy,
}

impl ApplicationAssembler {
    pub fn new(store: Arc<dyn ApplicationStore>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            store,
            renderer,
            verification: VerificationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_verification(mut self, verification: VerificationPolicy) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Open a draft at `CollectingInfo(0)`; a consented profile is applied before any prompt.
    pub fn start(
        &self,
        national_id: NationalId,
        scheme: Scheme,
        profile: Option<Arc<Profile>>,
    ) -> ApplicationDraft {
        let mut draft = ApplicationDraft::new(national_id, scheme, self.verification);
        if let Some(profile) = profile {
            if let Ok(filled) = draft.resolve_from_profile(profile) {
                info!(
                    scheme = %draft.scheme().name,
                    applicant = %draft.national_id().masked(),
                    prefilled = filled,
                    "draft opened with profile data"
                );
            }
        }
        draft
    }

    /// Persist a complete draft, then render it. Only a confirmed write issues an id.
    pub fn confirm(
        &self,
        draft: &mut ApplicationDraft,
    ) -> Result<SubmissionReceipt, AssemblyError> {
        draft.ensure_open()?;
        if !draft.is_complete() {
            return Err(AssemblyError::Incomplete {
                missing_items: draft.missing_items(),
                missing_documents: draft.missing_documents(),
            });
        }

        let application_id = ApplicationId::generate();
        let record = draft.to_record(application_id.clone(), Utc::now());
        let saved = self.retry.run(|| self.store.save(record.clone()))?;
        draft.mark_submitted(application_id.clone());

        info!(
            application_id = %application_id,
            scheme = %record.scheme_name,
            "application submitted"
        );

        let fields = flatten(&draft.summary_json(&application_id));
        let artifact = match self.renderer.render(&fields, &application_id) {
            Ok(locator) => Some(locator),
            Err(err) => {
                warn!(
                    application_id = %application_id,
                    error = %err,
                    "application saved but rendering failed"
                );
                None
            }
        };

        Ok(SubmissionReceipt {
            application_id: saved.application_id,
            scheme_name: record.scheme_name,
            status: saved.status,
            artifact,
        })
    }

    /// Abandon a draft. Nothing is persisted and no id is generated.
    pub fn cancel(&self, draft: &mut ApplicationDraft) -> Result<(), AssemblyError> {
        draft.cancel()?;
        info!(scheme = %draft.scheme().name, "draft cancelled");
        Ok(())
    }
}
