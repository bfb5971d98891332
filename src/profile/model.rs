//! Profile, draft, and field value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Stable external identity of a user, as given by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Gender, answered with one of two keyboard labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "Pria")]
    Male,
    #[serde(rename = "Wanita")]
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    /// The label shown on the keyboard and stored in the database.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Male => "Pria",
            Self::Female => "Wanita",
        }
    }

    /// Resolve a label typed or tapped by the user. Case and surrounding
    /// whitespace are ignored; anything else is rejected.
    pub fn from_label(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::ALL
            .into_iter()
            .find(|g| g.label().eq_ignore_ascii_case(input))
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Returns `None` for coordinates outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Opaque reference to an image already uploaded to the transport
/// (a Telegram `file_id`). The bytes are never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(String);

impl PhotoRef {
    pub fn new(reference: impl Into<String>) -> Option<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            None
        } else {
            Some(Self(reference))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhotoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user's profile, as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub gender: Gender,
    pub age: u8,
    pub hobby: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub photo_ref: PhotoRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A complete profile ready for its single insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub user_id: UserId,
    pub gender: Gender,
    pub age: u8,
    pub hobby: String,
    pub description: String,
    pub location: Location,
    pub photo_ref: PhotoRef,
}

impl NewProfile {
    /// Reject blank free-text fields. Typed fields cannot be absent.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.hobby.trim().is_empty() {
            return Err(DatabaseError::IncompleteProfile { missing: "hobby" });
        }
        if self.description.trim().is_empty() {
            return Err(DatabaseError::IncompleteProfile {
                missing: "description",
            });
        }
        if self.photo_ref.as_str().trim().is_empty() {
            return Err(DatabaseError::IncompleteProfile {
                missing: "photo_ref",
            });
        }
        Ok(())
    }
}

/// Profile fields that can be changed after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditableField {
    Hobby,
    Description,
}

impl EditableField {
    /// Column backing the field in the `users` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Hobby => "hobby",
            Self::Description => "description",
        }
    }
}

impl std::fmt::Display for EditableField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Registration answers collected so far. Every field starts absent and is
/// filled by exactly one registration step; nothing here is persisted until
/// [`ProfileDraft::complete`] succeeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDraft {
    pub gender: Option<Gender>,
    pub age: Option<u8>,
    pub hobby: Option<String>,
    pub location: Option<Location>,
    pub photo_ref: Option<PhotoRef>,
    pub description: Option<String>,
}

impl ProfileDraft {
    /// Turn the draft into an insertable profile, naming the first missing field.
    pub fn complete(self, user_id: UserId) -> Result<NewProfile, DatabaseError> {
        let missing = |field: &'static str| DatabaseError::IncompleteProfile { missing: field };
        let profile = NewProfile {
            user_id,
            gender: self.gender.ok_or_else(|| missing("gender"))?,
            age: self.age.ok_or_else(|| missing("age"))?,
            hobby: self.hobby.ok_or_else(|| missing("hobby"))?,
            location: self.location.ok_or_else(|| missing("location"))?,
            photo_ref: self.photo_ref.ok_or_else(|| missing("photo_ref"))?,
            description: self.description.ok_or_else(|| missing("description"))?,
        };
        profile.validate()?;
        Ok(profile)
    }
}
