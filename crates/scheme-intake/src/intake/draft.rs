use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::domain::{
    field_key, ApplicationId, ApplicationStatus, CollectedValue, NationalId, Profile, Provenance,
    Scheme,
};
use super::repository::{ApplicationRecord, RepositoryError};
use super::verification::{is_rd_number_item, VerificationPolicy};

const NAME_ITEMS: [&str; 3] = ["full_name", "name", "applicant_name"];
const PHONE_ITEMS: [&str; 4] = ["phone", "phone_number", "mobile", "mobile_number"];

/// One required-information entry in checklist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSlot {
    pub name: String,
    pub value: Option<CollectedValue>,
    #[serde(skip)]
    failed_attempts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSlot {
    pub name: String,
    pub received: bool,
}

/// Position of a draft in the collection sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssemblyState {
    CollectingInfo { cursor: usize },
    CollectingDocuments { cursor: usize },
    AwaitingConfirmation,
    Submitted { application_id: ApplicationId },
    Cancelled,
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssemblyState::Submitted { .. } | AssemblyState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Closure {
    Submitted(ApplicationId),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("'{0}' is not part of this scheme's required information")]
    UnknownItem(String),
    #[error("'{0}' is not one of this scheme's supporting documents")]
    UnknownDocument(String),
    #[error("{item} does not match the certificate on record")]
    RdNumberMismatch {
        item: String,
        remaining_attempts: Option<u8>,
    },
    #[error("{0} verification attempts exhausted")]
    VerificationLocked(String),
    #[error("application is incomplete")]
    Incomplete {
        missing_items: Vec<String>,
        missing_documents: Vec<String>,
    },
    #[error("application draft is already closed")]
    DraftClosed,
    #[error("application could not be saved: {0}")]
    Persistence(#[from] RepositoryError),
}

/// In-progress application owned by a single conversation.
#[derive(Debug, Clone)]
pub struct ApplicationDraft {
    national_id: NationalId,
    scheme: Scheme,
    profile: Option<Arc<Profile>>,
    items: Vec<ItemSlot>,
    documents: Vec<DocumentSlot>,
    policy: VerificationPolicy,
    closure: Option<Closure>,
}

impl ApplicationDraft {
    pub fn new(national_id: NationalId, scheme: Scheme, policy: VerificationPolicy) -> Self {
        let mut items: Vec<ItemSlot> = Vec::with_capacity(scheme.required_information.len());
        // Values are keyed by `field_key`, so spellings that share a key are one field.
        for name in &scheme.required_information {
            let key = field_key(name);
            if let Some(kept) = items.iter().find(|slot| field_key(&slot.name) == key) {
                warn!(
                    scheme = %scheme.name,
                    kept = %kept.name,
                    dropped = %name,
                    "duplicate required-information entry merged"
                );
                continue;
            }
            items.push(ItemSlot {
                name: name.clone(),
                value: None,
                failed_attempts: 0,
            });
        }

        let mut documents: Vec<DocumentSlot> =
            Vec::with_capacity(scheme.supporting_documents.len());
        for name in &scheme.supporting_documents {
            let key = field_key(name);
            if let Some(kept) = documents.iter().find(|slot| field_key(&slot.name) == key) {
                warn!(
                    scheme = %scheme.name,
                    kept = %kept.name,
                    dropped = %name,
                    "duplicate supporting document merged"
                );
                continue;
            }
            documents.push(DocumentSlot {
                name: name.clone(),
                received: false,
            });
        }

        Self {
            national_id,
            scheme,
            profile: None,
            items,
            documents,
            policy,
            closure: None,
        }
    }

    pub fn national_id(&self) -> &NationalId {
        &self.national_id
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_deref()
    }

    pub fn items(&self) -> &[ItemSlot] {
        &self.items
    }

    pub fn documents(&self) -> &[DocumentSlot] {
        &self.documents
    }

    pub fn value_of(&self, item_name: &str) -> Option<&CollectedValue> {
        self.item_index(item_name)
            .and_then(|index| self.items[index].value.as_ref())
    }

    pub fn state(&self) -> AssemblyState {
        match &self.closure {
            Some(Closure::Submitted(id)) => AssemblyState::Submitted {
                application_id: id.clone(),
            },
            Some(Closure::Cancelled) => AssemblyState::Cancelled,
            None => {
                if let Some(cursor) = self.items.iter().position(|slot| slot.value.is_none()) {
                    AssemblyState::CollectingInfo { cursor }
                } else if let Some(cursor) = self.documents.iter().position(|slot| !slot.received)
                {
                    AssemblyState::CollectingDocuments { cursor }
                } else {
                    AssemblyState::AwaitingConfirmation
                }
            }
        }
    }

    /// First unresolved item in checklist order; drives prompting only.
    pub fn next_info_item(&self) -> Option<&str> {
        self.items
            .iter()
            .find(|slot| slot.value.is_none())
            .map(|slot| slot.name.as_str())
    }

    pub fn next_document(&self) -> Option<&str> {
        self.documents
            .iter()
            .find(|slot| !slot.received)
            .map(|slot| slot.name.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.next_info_item().is_none() && self.next_document().is_none()
    }

    /// Pre-fill unresolved items from a consented profile fetch. RD numbers are never copied.
    pub fn resolve_from_profile(&mut self, profile: Arc<Profile>) -> Result<usize, AssemblyError> {
        self.ensure_open()?;

        let mut filled = 0;
        for slot in self.items.iter_mut() {
            if slot.value.is_some() || is_rd_number_item(&slot.name) {
                continue;
            }
            if let Some(value) = profile.field(&slot.name) {
                slot.value = Some(CollectedValue {
                    value,
                    provenance: Provenance::FromProfile,
                });
                filled += 1;
            }
        }

        self.profile = Some(profile);
        Ok(filled)
    }

    /// Record a user supplied value for any checklist item, in any order.
    pub fn submit_user_value(
        &mut self,
        item_name: &str,
        value: &str,
    ) -> Result<Provenance, AssemblyError> {
        self.ensure_open()?;
        let index = self
            .item_index(item_name)
            .ok_or_else(|| AssemblyError::UnknownItem(item_name.to_string()))?;

        let policy = self.policy;
        let expected = if is_rd_number_item(&self.items[index].name) {
            Some(
                self.profile
                    .as_ref()
                    .and_then(|profile| profile.field(&self.items[index].name)),
            )
        } else {
            None
        };

        let slot = &mut self.items[index];
        let provenance = match expected {
            None => Provenance::FromUser,
            Some(on_record) => {
                if policy.exhausted(slot.failed_attempts) {
                    return Err(AssemblyError::VerificationLocked(slot.name.clone()));
                }
                match on_record {
                    Some(on_record) if on_record != value => {
                        slot.failed_attempts = slot.failed_attempts.saturating_add(1);
                        return Err(AssemblyError::RdNumberMismatch {
                            item: slot.name.clone(),
                            remaining_attempts: policy.remaining(slot.failed_attempts),
                        });
                    }
                    Some(_) => Provenance::VerifiedAgainstProfile,
                    None => Provenance::FromUser,
                }
            }
        };

        slot.value = Some(CollectedValue {
            value: value.to_string(),
            provenance,
        });
        Ok(provenance)
    }

    /// Idempotent; document content is never inspected.
    pub fn mark_document_received(&mut self, document: &str) -> Result<(), AssemblyError> {
        self.ensure_open()?;
        let slot = self
            .documents
            .iter_mut()
            .find(|slot| slot.name == document || field_key(&slot.name) == field_key(document))
            .ok_or_else(|| AssemblyError::UnknownDocument(document.to_string()))?;
        slot.received = true;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), AssemblyError> {
        self.ensure_open()?;
        self.closure = Some(Closure::Cancelled);
        Ok(())
    }

    pub fn missing_items(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|slot| slot.value.is_none())
            .map(|slot| slot.name.clone())
            .collect()
    }

    pub fn missing_documents(&self) -> Vec<String> {
        self.documents
            .iter()
            .filter(|slot| !slot.received)
            .map(|slot| slot.name.clone())
            .collect()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), AssemblyError> {
        if self.closure.is_some() {
            Err(AssemblyError::DraftClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mark_submitted(&mut self, application_id: ApplicationId) {
        self.closure = Some(Closure::Submitted(application_id));
    }

    pub(crate) fn to_record(
        &self,
        application_id: ApplicationId,
        submitted_at: DateTime<Utc>,
    ) -> ApplicationRecord {
        ApplicationRecord {
            application_id,
            scheme_name: self.scheme.name.clone(),
            national_id: self.national_id.clone(),
            applicant_name: self.contact_value(&NAME_ITEMS, |profile| Some(profile.name.clone())),
            phone: self.contact_value(&PHONE_ITEMS, |profile| profile.phone.clone()),
            status: ApplicationStatus::Submitted,
            submitted_at,
        }
    }

    /// Nested summary of everything collected, in checklist order, ready for flattening.
    pub fn summary_json(&self, application_id: &ApplicationId) -> Value {
        let mut information = Map::new();
        for slot in &self.items {
            let value = slot
                .value
                .as_ref()
                .map(|collected| collected.value.clone())
                .unwrap_or_default();
            information.insert(slot.name.clone(), Value::String(value));
        }

        let documents: Vec<Value> = self
            .documents
            .iter()
            .filter(|slot| slot.received)
            .map(|slot| Value::String(slot.name.clone()))
            .collect();

        json!({
            "Application ID": application_id.0,
            "Scheme": self.scheme.name,
            "Department": self.scheme.department,
            "Application Fee": self.scheme.application_fee,
            "Aadhaar Number": self.national_id.as_str(),
            "Required Information": information,
            "Supporting Documents": documents,
        })
    }

    fn item_index(&self, item_name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|slot| slot.name == item_name)
            .or_else(|| {
                let key = field_key(item_name);
                self.items
                    .iter()
                    .position(|slot| field_key(&slot.name) == key)
            })
    }

    fn contact_value(
        &self,
        keys: &[&str],
        from_profile: impl Fn(&Profile) -> Option<String>,
    ) -> String {
        self.items
            .iter()
            .find(|slot| keys.contains(&field_key(&slot.name).as_str()))
            .and_then(|slot| slot.value.as_ref())
            .map(|collected| collected.value.clone())
            .or_else(|| self.profile.as_deref().and_then(from_profile))
            .unwrap_or_default()
    }
}
