//! Candidate selection for the swipe loop.
//!
//! The eligible set is every registered profile minus the user and minus
//! everyone the user already decided on. One member is drawn uniformly at
//! random; there is no scoring, proximity ranking, or recency weighting.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::DatabaseError;
use crate::profile::{Profile, UserId};
use crate::store::{DecisionStore, ProfileStore};

/// Picks the next profile to show a user.
pub struct CandidateSelector {
    profiles: Arc<dyn ProfileStore>,
    decisions: Arc<dyn DecisionStore>,
}

impl CandidateSelector {
    pub fn new(profiles: Arc<dyn ProfileStore>, decisions: Arc<dyn DecisionStore>) -> Self {
        Self {
            profiles,
            decisions,
        }
    }

    /// Return a random not-yet-decided profile, or `None` once the user has
    /// decided on everyone else.
    pub async fn next_candidate(&self, user_id: UserId) -> Result<Option<Profile>, DatabaseError> {
        let all = self.profiles.all_ids().await?;
        let decided = self.decisions.decided_targets(user_id).await?;
        let eligible = eligible_candidates(user_id, all, &decided);

        debug!(
            user_id = %user_id,
            eligible = eligible.len(),
            decided = decided.len(),
            "Selecting candidate"
        );

        let Some(pick) = eligible.choose(&mut rand::thread_rng()).copied() else {
            return Ok(None);
        };
        self.profiles.get(pick).await.map(Some)
    }
}

/// All ids except the user and anyone already decided on.
pub fn eligible_candidates(
    user_id: UserId,
    all: impl IntoIterator<Item = UserId>,
    decided: &HashSet<UserId>,
) -> Vec<UserId> {
    all.into_iter()
        .filter(|id| *id != user_id && !decided.contains(id))
        .collect()
}
