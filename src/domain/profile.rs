//! User profile record.
//!
//! One profile per [`Uid`], written whole by its owner. `isVerified` is set
//! by the verification workflow outside this service and survives every
//! edit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Uid;
use crate::error::MarketError;

/// Professions a user can list, in display order.
pub const PROFESSIONS: [&str; 17] = [
    "Delivery",
    "Plumber",
    "Electrician",
    "Carpenter",
    "Cleaner",
    "Tutor",
    "Mechanic",
    "Driver",
    "Gardener",
    "Cook",
    "Babysitter",
    "Nurse",
    "IT Support",
    "Web Developer",
    "Designer",
    "Data Entry",
    "Other",
];

/// What the user does for a living.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    /// Employed; `organizationName` is the company.
    Working,
    /// Studying; `organizationName` is the university.
    Student,
    /// Anything else.
    #[default]
    Other,
}

impl EmploymentStatus {
    /// Returns `true` if the status requires an organization name.
    #[must_use]
    pub const fn needs_organization(self) -> bool {
        matches!(self, Self::Working | Self::Student)
    }
}

/// Owner-supplied fields of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Public name.
    pub display_name: String,
    /// Free-text self description.
    pub about: String,
    /// Hosted profile photo.
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Entries of [`PROFESSIONS`].
    #[serde(default)]
    pub professions: Vec<String>,
    /// Employment status, `other` when absent.
    #[serde(default)]
    pub employment_status: EmploymentStatus,
    /// Company or university, required for `working` and `student`.
    #[serde(default)]
    pub organization_name: Option<String>,
}

/// A user's public profile. Field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Owner.
    pub uid: Uid,
    /// Public name.
    pub display_name: String,
    /// Free-text self description.
    pub about: String,
    /// Hosted profile photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Listed professions, deduplicated, in [`PROFESSIONS`] order.
    #[serde(default)]
    pub professions: Vec<String>,
    /// Employment status.
    #[serde(default)]
    pub employment_status: EmploymentStatus,
    /// Company or university. Empty unless the status needs one.
    #[serde(default)]
    pub organization_name: String,
    /// Set by the verification workflow.
    #[serde(default)]
    pub is_verified: bool,
    /// Last edit.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Validates `update` and builds the profile `uid` will store, keeping
    /// the verification flag of `existing`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Validation`] for a blank name or about text, an
    /// unknown profession, a blank photo URL, or a missing organization for
    /// `working` / `student`.
    pub fn apply(
        uid: Uid,
        update: ProfileUpdate,
        existing: Option<&Self>,
        now: DateTime<Utc>,
    ) -> Result<Self, MarketError> {
        let display_name = required(&update.display_name, "display name")?;
        let about = required(&update.about, "about")?;
        let photo_url = match update.photo_url.as_deref().map(str::trim) {
            Some("") => {
                return Err(MarketError::Validation(
                    "photo URL must not be blank".to_string(),
                ));
            }
            Some(url) => Some(url.to_string()),
            None => None,
        };

        let mut professions = Vec::new();
        for profession in &update.professions {
            let Some(known) = PROFESSIONS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(profession.trim()))
            else {
                return Err(MarketError::Validation(format!(
                    "unknown profession {profession:?}"
                )));
            };
            if !professions.iter().any(|listed: &String| listed == known) {
                professions.push((*known).to_string());
            }
        }
        professions.sort_by_key(|listed| PROFESSIONS.iter().position(|known| known == listed));

        let organization_name = if update.employment_status.needs_organization() {
            update
                .organization_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    MarketError::Validation(
                        "organization name is required for working and student".to_string(),
                    )
                })?
                .to_string()
        } else {
            String::new()
        };

        Ok(Self {
            uid,
            display_name,
            about,
            photo_url,
            professions,
            employment_status: update.employment_status,
            organization_name,
            is_verified: existing.is_some_and(|profile| profile.is_verified),
            updated_at: now,
        })
    }
}

fn required(value: &str, field: &str) -> Result<String, MarketError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MarketError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
