//! Welfare-scheme discovery and application intake.
//!
//! Profiles and the scheme catalog are read-only inputs. A draft is opened per
//! conversation, filled from the profile and the user, verified, and on
//! confirmation persisted and rendered as a downloadable record.

pub mod assembler;
pub mod catalog;
pub mod domain;
pub mod draft;
pub mod eligibility;
pub mod render;
pub mod repository;
pub mod router;
pub mod service;
pub mod verification;

#[cfg(test)]
mod tests;

pub use assembler::{ApplicationAssembler, SubmissionReceipt};
pub use catalog::{parse_list, CatalogError, ProfileStore, SchemeCatalog};
pub use domain::{
    field_key, ApplicationId, ApplicationStatus, CollectedValue, EligibilityCriteria,
    EligibilityFacts, NationalId, Profile, Provenance, Scheme, ALL_DISTRICTS, ANY_GENDER,
    GENERAL_COMMUNITY,
};
pub use draft::{ApplicationDraft, AssemblyError, AssemblyState, DocumentSlot, ItemSlot};
pub use eligibility::{
    evaluate, explain, filter_eligible, match_by_name, CheckOutcome, Criterion, CriterionCheck,
};
pub use render::{
    flatten, validate_filename, ArtifactLocator, DocumentRenderer, FlatFields, PdfRenderer,
    RenderError,
};
pub use repository::{
    ApplicationRecord, ApplicationStatusView, ApplicationStore, RepositoryError, RetryPolicy,
    SaveReceipt,
};
pub use router::intake_router;
pub use service::{
    Consent, Discovery, DiscoveryMode, DiscoveryRequest, DraftId, DraftView, IntakeError,
    IntakeService, Prompt, StartRequest, NO_SCHEMES_MESSAGE,
};
pub use verification::{
    is_rd_number_item, parse_national_id, validate_otp, VerificationError, VerificationPolicy,
    OTP_LENGTH, RD_NUMBER_ITEMS,
};
