use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Sentinel accepted by `gender_eligibility` for schemes open to every gender.
pub const ANY_GENDER: &str = "Any";
/// Sentinel district row marking a scheme as state-wide.
pub const ALL_DISTRICTS: &str = "All Districts";
/// Community tag that opens a scheme to every community.
pub const GENERAL_COMMUNITY: &str = "General";

/// Twelve digit Aadhaar number identifying a citizen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NationalId(String);

impl NationalId {
    pub const LENGTH: usize = 12;

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == Self::LENGTH && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe rendering that only keeps the last four digits.
    pub fn masked(&self) -> String {
        let visible = &self.0[self.0.len().saturating_sub(4)..];
        format!("XXXXXXXX{visible}")
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier issued to an application once the store confirms the write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Citizen record fetched from the DigiLocker-style profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub national_id: NationalId,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub annual_income: Option<u64>,
    pub community: Option<String>,
    pub district: Option<String>,
    pub phone: Option<String>,
    /// Extra named fields (certificate numbers, addresses) used to pre-fill checklists.
    #[serde(default)]
    pub additional: BTreeMap<String, String>,
}

impl Profile {
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = self.date_of_birth?;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    /// Attributes consumed by the eligibility rules, with age derived for `today`.
    pub fn facts(&self, today: NaiveDate) -> EligibilityFacts {
        EligibilityFacts {
            age: self.age_on(today),
            gender: self.gender.clone(),
            annual_income: self.annual_income,
            community: self.community.clone(),
            district: self.district.clone(),
        }
    }

    /// Resolve a checklist item name against the canonical fields and the additional map.
    pub fn field(&self, item_name: &str) -> Option<String> {
        let key = field_key(item_name);
        let canonical = match key.as_str() {
            "name" | "full_name" | "applicant_name" => Some(self.name.clone()),
            "aadhaar" | "aadhaar_number" | "aadhar_number" | "national_id" => {
                Some(self.national_id.to_string())
            }
            "phone" | "phone_number" | "mobile" | "mobile_number" => self.phone.clone(),
            "dob" | "date_of_birth" => self.date_of_birth.map(|dob| dob.to_string()),
            "gender" => self.gender.clone(),
            "annual_income" | "income" => self.annual_income.map(|income| income.to_string()),
            "community" | "caste" => self.community.clone(),
            "district" => self.district.clone(),
            _ => None,
        };

        canonical.filter(|value| !value.trim().is_empty()).or_else(|| {
            self.additional
                .iter()
                .find(|(name, _)| field_key(name) == key)
                .map(|(_, value)| value.clone())
                .filter(|value| !value.trim().is_empty())
        })
    }
}

/// Normalized lookup key: lowercase ASCII alphanumerics joined by single underscores.
pub fn field_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            key.push(ch.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

/// Optional eligibility inputs; an absent attribute never constrains the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityFacts {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub annual_income: Option<u64>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

impl EligibilityFacts {
    /// Parse facts from loosely structured JSON. Only input that is not a JSON object yields an
    /// empty filter; an attribute that cannot be read is dropped on its own.
    pub fn from_json(raw: &str) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw) else {
            return Self::default();
        };

        Self {
            age: whole_number(map.get("age")).and_then(|age| u32::try_from(age).ok()),
            gender: text(map.get("gender")),
            annual_income: whole_number(map.get("annual_income")),
            community: text(map.get("community")),
            district: text(map.get("district")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Non-negative integers, integral floats and numeric strings all read as a whole number.
fn whole_number(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| *float >= 0.0 && float.fract() == 0.0 && *float <= u64::MAX as f64)
                .map(|float| float as u64)
        }),
        serde_json::Value::String(raw) => {
            let raw = raw.trim();
            raw.parse::<u64>().ok().or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|float| *float >= 0.0 && float.fract() == 0.0)
                    .map(|float| float as u64)
            })
        }
        _ => None,
    }
}

fn text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        _ => None,
    }
}

/// Structured eligibility predicate attached to every scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    pub min_age: u32,
    pub max_age: u32,
    pub gender_eligibility: String,
    pub max_annual_income: u64,
    pub community_eligibility: Vec<String>,
    pub districts: Vec<String>,
}

/// Welfare scheme definition with its fixed application checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheme {
    pub id: i64,
    pub name: String,
    pub department: String,
    pub definition: String,
    pub eligibility_summary: String,
    pub application_fee: u32,
    pub required_information: Vec<String>,
    pub supporting_documents: Vec<String>,
    pub criteria: EligibilityCriteria,
}

/// Where a collected checklist value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    FromProfile,
    FromUser,
    VerifiedAgainstProfile,
}

impl Provenance {
    pub const fn label(self) -> &'static str {
        match self {
            Provenance::FromProfile => "from_profile",
            Provenance::FromUser => "from_user",
            Provenance::VerifiedAgainstProfile => "verified_against_profile",
        }
    }
}

/// Value held for one required-information item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedValue {
    pub value: String,
    pub provenance: Provenance,
}

/// Lifecycle status of a persisted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "Submitted",
            ApplicationStatus::UnderReview => "Under Review",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Rejected => "Rejected",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match field_key(raw).as_str() {
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}
