use super::domain::{field_key, NationalId};

/// Certificate references that must be re-entered even when the profile already holds them.
pub const RD_NUMBER_ITEMS: [&str; 2] = ["Caste Certificate RD Number", "Income Certificate RD Number"];

pub const OTP_LENGTH: usize = 6;

pub fn is_rd_number_item(item_name: &str) -> bool {
    let key = field_key(item_name);
    RD_NUMBER_ITEMS
        .iter()
        .any(|candidate| field_key(candidate) == key)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("confirmation code must be exactly {} digits", OTP_LENGTH)]
    InvalidOtp,
    #[error("Aadhaar number must be exactly {} digits", NationalId::LENGTH)]
    InvalidNationalId,
}

/// Simulated OTP check: only the shape of the code is validated.
pub fn validate_otp(raw: &str) -> Result<(), VerificationError> {
    if raw.len() == OTP_LENGTH && raw.bytes().all(|byte| byte.is_ascii_digit()) {
        Ok(())
    } else {
        Err(VerificationError::InvalidOtp)
    }
}

pub fn parse_national_id(raw: &str) -> Result<NationalId, VerificationError> {
    NationalId::parse(raw).ok_or(VerificationError::InvalidNationalId)
}

/// Cap on RD-number attempts per checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    max_rd_attempts: Option<u8>,
}

impl VerificationPolicy {
    /// `0` disables the cap.
    pub fn new(max_rd_attempts: u8) -> Self {
        Self {
            max_rd_attempts: (max_rd_attempts > 0).then_some(max_rd_attempts),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_rd_attempts: None,
        }
    }

    pub fn max_rd_attempts(&self) -> Option<u8> {
        self.max_rd_attempts
    }

    pub fn exhausted(&self, failed_attempts: u8) -> bool {
        self.max_rd_attempts
            .map(|max| failed_attempts >= max)
            .unwrap_or(false)
    }

    pub fn remaining(&self, failed_attempts: u8) -> Option<u8> {
        self.max_rd_attempts
            .map(|max| max.saturating_sub(failed_attempts))
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
