use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assembler::{ApplicationAssembler, SubmissionReceipt};
use super::catalog::{CatalogError, ProfileStore, SchemeCatalog};
use super::domain::{ApplicationId, EligibilityFacts, NationalId, Profile, Scheme};
use super::draft::{ApplicationDraft, AssemblyError, AssemblyState, DocumentSlot, ItemSlot};
use super::eligibility::{explain, filter_eligible, CriterionCheck};
use super::render::{validate_filename, DocumentRenderer, RenderError};
use super::repository::{ApplicationStatusView, ApplicationStore, RepositoryError, RetryPolicy};
use super::verification::{parse_national_id, validate_otp, VerificationError, VerificationPolicy};

pub const NO_SCHEMES_MESSAGE: &str = "No schemes found matching your criteria.";

/// Conversation-scoped handle for an open draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl DraftId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consent and simulated OTP supplied by the conversation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Consent {
    #[serde(default)]
    pub granted: bool,
    #[serde(default)]
    pub otp: Option<String>,
}

impl Consent {
    pub fn granted(otp: &str) -> Self {
        Self {
            granted: true,
            otp: Some(otp.to_string()),
        }
    }

    pub fn declined() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub consent: Consent,
    /// Loosely structured profile facts; malformed input disables filtering.
    #[serde(default)]
    pub profile_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    Personalized,
    General,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub mode: DiscoveryMode,
    pub schemes: Vec<Scheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub national_id: String,
    pub scheme_name: String,
    #[serde(default)]
    pub consent: Consent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Information { item: String },
    Document { document: String },
    Confirmation,
}

/// Snapshot of a draft returned after every turn.
#[derive(Debug, Clone, Serialize)]
pub struct DraftView {
    pub draft_id: DraftId,
    pub scheme_name: String,
    #[serde(flatten)]
    pub state: AssemblyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_prompt: Option<Prompt>,
    pub items: Vec<ItemSlot>,
    pub documents: Vec<DocumentSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl DraftView {
    fn of(draft_id: &DraftId, draft: &ApplicationDraft, notice: Option<String>) -> Self {
        let state = draft.state();
        let next_prompt = match &state {
            AssemblyState::CollectingInfo { .. } => draft
                .next_info_item()
                .map(|item| Prompt::Information {
                    item: item.to_string(),
                }),
            AssemblyState::CollectingDocuments { .. } => {
                draft.next_document().map(|document| Prompt::Document {
                    document: document.to_string(),
                })
            }
            AssemblyState::AwaitingConfirmation => Some(Prompt::Confirmation),
            AssemblyState::Submitted { .. } | AssemblyState::Cancelled => None,
        };

        Self {
            draft_id: draft_id.clone(),
            scheme_name: draft.scheme().name.clone(),
            state,
            next_prompt,
            items: draft.items().to_vec(),
            documents: draft.documents().to_vec(),
            notice,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("No user profile found for the provided Aadhaar number.")]
    ProfileNotFound,
    #[error("No schemes found matching '{0}'.")]
    SchemeNotFound(String),
    #[error("'{query}' matches several schemes: {}", .candidates.join(", "))]
    AmbiguousScheme {
        query: String,
        candidates: Vec<String>,
    },
    #[error("draft {0} not found")]
    DraftNotFound(DraftId),
    #[error("application {0} not found")]
    ApplicationNotFound(String),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl IntakeError {
    /// Stable machine-readable tag for the conversation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            IntakeError::ProfileNotFound => "profile_not_found",
            IntakeError::SchemeNotFound(_) => "scheme_not_found",
            IntakeError::AmbiguousScheme { .. } => "ambiguous_scheme",
            IntakeError::DraftNotFound(_) => "draft_not_found",
            IntakeError::ApplicationNotFound(_) => "application_not_found",
            IntakeError::Verification(VerificationError::InvalidOtp) => "invalid_otp",
            IntakeError::Verification(VerificationError::InvalidNationalId) => {
                "invalid_national_id"
            }
            IntakeError::Assembly(err) => match err {
                AssemblyError::UnknownItem(_) => "unknown_item",
                AssemblyError::UnknownDocument(_) => "unknown_document",
                AssemblyError::RdNumberMismatch { .. } => "rd_number_mismatch",
                AssemblyError::VerificationLocked(_) => "verification_locked",
                AssemblyError::Incomplete { .. } => "incomplete",
                AssemblyError::DraftClosed => "draft_closed",
                AssemblyError::Persistence(_) => "persistence_failed",
            },
            IntakeError::Catalog(_) => "catalog_unavailable",
            IntakeError::Repository(_) => "repository_unavailable",
            IntakeError::Render(RenderError::InvalidFilename(_)) => "invalid_filename",
            IntakeError::Render(RenderError::Missing(_)) => "artifact_missing",
            IntakeError::Render(RenderError::Io(_)) => "render_failed",
        }
    }
}

type SharedDraft = Arc<Mutex<ApplicationDraft>>;

/// Drafts idle for longer than this are dropped unless configured otherwise.
pub const DEFAULT_DRAFT_TTL: Duration = Duration::from_secs(30 * 60);

struct DraftSession {
    draft: SharedDraft,
    last_touched: Instant,
}

impl DraftSession {
    fn new(draft: ApplicationDraft) -> Self {
        Self {
            draft: Arc::new(Mutex::new(draft)),
            last_touched: Instant::now(),
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touched)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Facade the conversation layer calls as tools: discovery, drafts, submission, status.
pub struct IntakeService {
    profiles: Arc<dyn ProfileStore>,
    catalog: Arc<dyn SchemeCatalog>,
    store: Arc<dyn ApplicationStore>,
    renderer: Arc<dyn DocumentRenderer>,
    assembler: ApplicationAssembler,
    drafts: Mutex<HashMap<DraftId, DraftSession>>,
    draft_ttl: Option<Duration>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl IntakeService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        catalog: Arc<dyn SchemeCatalog>,
        store: Arc<dyn ApplicationStore>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let assembler = ApplicationAssembler::new(store.clone(), renderer.clone());
        Self {
            profiles,
            catalog,
            store,
            renderer,
            assembler,
            drafts: Mutex::new(HashMap::new()),
            draft_ttl: Some(DEFAULT_DRAFT_TTL),
            today: local_today,
        }
    }

    pub fn with_verification(mut self, policy: VerificationPolicy) -> Self {
        self.assembler = self.assembler.with_verification(policy);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.assembler = self.assembler.with_retry(retry);
        self
    }

    /// Idle lifetime of an open draft; `None` keeps drafts until confirm or cancel.
    pub fn with_draft_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.draft_ttl = ttl;
        self
    }

    /// Pin the evaluation date used to derive ages.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn list_schemes(&self) -> Result<Vec<Scheme>, IntakeError> {
        Ok(self.catalog.list_all()?)
    }

    /// Direct lookup by name; eligibility is not applied.
    pub fn find_schemes(&self, query: &str) -> Result<Vec<Scheme>, IntakeError> {
        let schemes = self.catalog.find_by_name(query)?;
        if schemes.is_empty() {
            return Err(IntakeError::SchemeNotFound(query.trim().to_string()));
        }
        Ok(schemes)
    }

    /// Fetch a profile after checking the Aadhaar format, consent and OTP shape.
    pub fn fetch_profile(
        &self,
        national_id: &str,
        consent: &Consent,
    ) -> Result<Option<Profile>, IntakeError> {
        let national_id = parse_national_id(national_id)?;
        if !consent.granted {
            return Ok(None);
        }
        validate_otp(consent.otp.as_deref().unwrap_or_default())?;

        let profile = self.profiles.fetch(&national_id)?;
        debug!(
            applicant = %national_id.masked(),
            found = profile.is_some(),
            "profile lookup"
        );
        Ok(profile)
    }

    pub fn discover(&self, request: &DiscoveryRequest) -> Result<Discovery, IntakeError> {
        let catalog = self.catalog.list_all()?;

        let (facts, mut notice) = match (&request.national_id, &request.profile_json) {
            (Some(national_id), _) if request.consent.granted => {
                match self.fetch_profile(national_id, &request.consent)? {
                    Some(profile) => (profile.facts((self.today)()), None),
                    None => (
                        EligibilityFacts::default(),
                        Some(IntakeError::ProfileNotFound.to_string()),
                    ),
                }
            }
            (_, Some(raw)) => (EligibilityFacts::from_json(raw), None),
            _ => (EligibilityFacts::default(), None),
        };

        let mode = if facts.is_empty() {
            DiscoveryMode::General
        } else {
            DiscoveryMode::Personalized
        };
        let schemes = filter_eligible(&facts, &catalog);
        if schemes.is_empty() {
            notice = Some(NO_SCHEMES_MESSAGE.to_string());
        }

        info!(?mode, matched = schemes.len(), total = catalog.len(), "scheme discovery");
        Ok(Discovery {
            mode,
            schemes,
            notice,
        })
    }

    /// Per-criterion breakdown for one scheme against a consented profile.
    pub fn explain_eligibility(
        &self,
        national_id: &str,
        consent: &Consent,
        scheme_name: &str,
    ) -> Result<Vec<CriterionCheck>, IntakeError> {
        let scheme = self.resolve_scheme(scheme_name)?;
        let profile = self
            .fetch_profile(national_id, consent)?
            .ok_or(IntakeError::ProfileNotFound)?;
        Ok(explain(&profile.facts((self.today)()), &scheme))
    }

    pub fn start_application(&self, request: &StartRequest) -> Result<DraftView, IntakeError> {
        let national_id: NationalId = parse_national_id(&request.national_id)?;
        let scheme = self.resolve_scheme(&request.scheme_name)?;

        let (profile, notice) = match self.fetch_profile(&request.national_id, &request.consent)? {
            Some(profile) => (Some(Arc::new(profile)), None),
            None if request.consent.granted => {
                (None, Some(IntakeError::ProfileNotFound.to_string()))
            }
            None => (None, None),
        };

        let draft = self.assembler.start(national_id, scheme, profile);
        let draft_id = DraftId::generate();
        let view = DraftView::of(&draft_id, &draft, notice);

        {
            let mut drafts = lock(&self.drafts);
            self.evict_idle(&mut drafts);
            drafts.insert(draft_id.clone(), DraftSession::new(draft));
        }
        info!(draft_id = %draft_id, scheme = %view.scheme_name, "application draft started");
        Ok(view)
    }

    pub fn draft(&self, draft_id: &DraftId) -> Result<DraftView, IntakeError> {
        let shared = self.shared_draft(draft_id)?;
        let draft = lock(&shared);
        Ok(DraftView::of(draft_id, &draft, None))
    }

    pub fn submit_item(
        &self,
        draft_id: &DraftId,
        item: &str,
        value: &str,
    ) -> Result<DraftView, IntakeError> {
        let shared = self.shared_draft(draft_id)?;
        let mut draft = lock(&shared);
        let provenance = draft.submit_user_value(item, value)?;
        debug!(draft_id = %draft_id, item, provenance = provenance.label(), "item accepted");
        Ok(DraftView::of(draft_id, &draft, None))
    }

    pub fn mark_document(
        &self,
        draft_id: &DraftId,
        document: &str,
    ) -> Result<DraftView, IntakeError> {
        let shared = self.shared_draft(draft_id)?;
        let mut draft = lock(&shared);
        draft.mark_document_received(document)?;
        Ok(DraftView::of(draft_id, &draft, None))
    }

    /// Submit a complete draft. A failed write keeps the draft open for another attempt.
    pub fn confirm(&self, draft_id: &DraftId) -> Result<SubmissionReceipt, IntakeError> {
        let shared = self.shared_draft(draft_id)?;
        let receipt = {
            let mut draft = lock(&shared);
            self.assembler.confirm(&mut draft)?
        };
        lock(&self.drafts).remove(draft_id);
        Ok(receipt)
    }

    pub fn cancel(&self, draft_id: &DraftId) -> Result<DraftView, IntakeError> {
        let shared = self.shared_draft(draft_id)?;
        let view = {
            let mut draft = lock(&shared);
            self.assembler.cancel(&mut draft)?;
            DraftView::of(draft_id, &draft, None)
        };
        lock(&self.drafts).remove(draft_id);
        Ok(view)
    }

    pub fn application_status(
        &self,
        application_id: &str,
    ) -> Result<ApplicationStatusView, IntakeError> {
        let id = ApplicationId(application_id.trim().to_string());
        match self.store.status(&id) {
            Ok(view) => Ok(view),
            Err(RepositoryError::NotFound) => Err(IntakeError::ApplicationNotFound(id.0)),
            Err(other) => Err(other.into()),
        }
    }

    /// Load a rendered record; the filename is validated before it reaches storage.
    pub fn download(&self, filename: &str) -> Result<Vec<u8>, IntakeError> {
        let filename = validate_filename(filename)?;
        Ok(self.renderer.load(filename)?)
    }

    pub fn open_drafts(&self) -> usize {
        let mut drafts = lock(&self.drafts);
        self.evict_idle(&mut drafts);
        drafts.len()
    }

    fn resolve_scheme(&self, query: &str) -> Result<Scheme, IntakeError> {
        let mut matches = self.find_schemes(query)?;
        if matches.len() > 1 {
            return Err(IntakeError::AmbiguousScheme {
                query: query.trim().to_string(),
                candidates: matches.into_iter().map(|scheme| scheme.name).collect(),
            });
        }
        matches
            .pop()
            .ok_or_else(|| IntakeError::SchemeNotFound(query.trim().to_string()))
    }

    /// Drop drafts idle past the configured lifetime. Returns how many were removed.
    pub fn evict_idle_drafts(&self) -> usize {
        self.evict_idle(&mut lock(&self.drafts))
    }

    fn evict_idle(&self, drafts: &mut HashMap<DraftId, DraftSession>) -> usize {
        let Some(ttl) = self.draft_ttl else {
            return 0;
        };
        let now = Instant::now();
        let before = drafts.len();
        drafts.retain(|draft_id, session| {
            let keep = session.idle_for(now) <= ttl;
            if !keep {
                warn!(draft_id = %draft_id, "idle application draft discarded");
            }
            keep
        });
        before - drafts.len()
    }

    fn shared_draft(&self, draft_id: &DraftId) -> Result<SharedDraft, IntakeError> {
        let mut drafts = lock(&self.drafts);
        self.evict_idle(&mut drafts);
        let session = drafts
            .get_mut(draft_id)
            .ok_or_else(|| IntakeError::DraftNotFound(draft_id.clone()))?;
        session.last_touched = Instant::now();
        Ok(session.draft.clone())
    }
}
