//! The async persistence interface the engine depends on.
//!
//! The engine only ever sees these traits, so tests can hand it an
//! in-memory libSQL backend or a purpose-built double.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::profile::{EditableField, NewProfile, Profile, UserId};

/// A swipe: accept or reject a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    Like,
    Dislike,
}

impl SwipeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl std::str::FromStr for SwipeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(format!("unknown swipe action: {other}")),
        }
    }
}

impl std::fmt::Display for SwipeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded swipe. Append-only: never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub swiper_id: UserId,
    pub swiped_id: UserId,
    pub action: SwipeAction,
    pub decided_at: DateTime<Utc>,
}

/// Durable table of user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Whether the user has completed registration.
    async fn exists(&self, user_id: UserId) -> Result<bool, DatabaseError>;

    /// Insert a profile in one write.
    ///
    /// Fails with `DuplicateProfile` if the user already has a row and with
    /// `IncompleteProfile` if a required field is blank.
    async fn create(&self, profile: &NewProfile) -> Result<Profile, DatabaseError>;

    /// Fetch a profile; `NotFound` if the user never registered.
    async fn get(&self, user_id: UserId) -> Result<Profile, DatabaseError>;

    /// Overwrite one editable field; `NotFound` if the user never registered.
    async fn update_field(
        &self,
        user_id: UserId,
        field: EditableField,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// Ids of every registered user.
    async fn all_ids(&self) -> Result<Vec<UserId>, DatabaseError>;

    /// Number of registered users.
    async fn count(&self) -> Result<u64, DatabaseError>;
}

/// Durable, append-only log of swipe decisions.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Record a decision. At most one row may exist per ordered
    /// `(swiper, swiped)` pair; a second attempt fails with
    /// `DuplicateDecision` and leaves the first row untouched.
    async fn record(
        &self,
        swiper: UserId,
        swiped: UserId,
        action: SwipeAction,
    ) -> Result<Decision, DatabaseError>;

    /// True iff `b` has already liked `a`, i.e. a `(b, a, like)` row exists.
    async fn has_reciprocal_like(&self, a: UserId, b: UserId) -> Result<bool, DatabaseError>;

    /// Every user this user has already decided on.
    async fn decided_targets(&self, user_id: UserId) -> Result<HashSet<UserId>, DatabaseError>;

    /// The decision for an ordered pair, if any.
    async fn get_decision(
        &self,
        swiper: UserId,
        swiped: UserId,
    ) -> Result<Option<Decision>, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swipe_action_round_trips_through_str() {
        for action in [SwipeAction::Like, SwipeAction::Dislike] {
            assert_eq!(action.as_str().parse::<SwipeAction>().unwrap(), action);
            assert_eq!(action.to_string(), action.as_str());
        }
        assert!("superlike".parse::<SwipeAction>().is_err());
        assert!("Like".parse::<SwipeAction>().is_err());
    }
}
