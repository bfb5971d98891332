//! Match detection: records a swipe and reports whether it completed a
//! mutual like.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::profile::UserId;
use crate::store::{DecisionStore, SwipeAction};
use crate::sync::KeyedLocks;

/// Result of applying one swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The swipe was a like and the other user had already liked back.
    /// Both users must be notified, once.
    Matched,
    NoMatch,
    /// The pair was already decided; nothing was written and nobody should
    /// be notified again.
    AlreadyDecided,
}

/// Unordered key for a pair of users.
fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Applies swipes against the decision store.
///
/// Record-then-check runs under a lock keyed by the unordered pair, so when
/// both users like each other at the same moment exactly one of the two
/// calls observes the other's row and returns `Matched`.
pub struct MatchDetector {
    decisions: Arc<dyn DecisionStore>,
    pair_locks: KeyedLocks<(UserId, UserId)>,
}

impl MatchDetector {
    pub fn new(decisions: Arc<dyn DecisionStore>) -> Self {
        Self {
            decisions,
            pair_locks: KeyedLocks::new(),
        }
    }

    pub async fn apply_decision(
        &self,
        swiper: UserId,
        swiped: UserId,
        action: SwipeAction,
    ) -> Result<MatchOutcome, DatabaseError> {
        let _pair = self.pair_locks.lock(pair_key(swiper, swiped)).await;

        match self.decisions.record(swiper, swiped, action).await {
            Ok(_) => {}
            Err(DatabaseError::DuplicateDecision { .. }) => {
                warn!(swiper = %swiper, swiped = %swiped, "User tried to swipe the same profile again");
                return Ok(MatchOutcome::AlreadyDecided);
            }
            Err(e) => return Err(e),
        }

        if action == SwipeAction::Dislike {
            return Ok(MatchOutcome::NoMatch);
        }

        if self.decisions.has_reciprocal_like(swiper, swiped).await? {
            info!(a = %swiper, b = %swiped, "Mutual like, match found");
            Ok(MatchOutcome::Matched)
        } else {
            Ok(MatchOutcome::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<LibSqlBackend>, Arc<MatchDetector>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let detector = Arc::new(MatchDetector::new(db.clone()));
        (db, detector)
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(pair_key(UserId(5), UserId(2)), pair_key(UserId(2), UserId(5)));
        assert_eq!(pair_key(UserId(5), UserId(2)), (UserId(2), UserId(5)));
    }

    #[tokio::test]
    async fn second_like_matches() {
        let (_db, detector) = setup().await;
        let a = UserId(1);
        let b = UserId(2);

        assert_eq!(
            detector.apply_decision(a, b, SwipeAction::Like).await.unwrap(),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            detector.apply_decision(b, a, SwipeAction::Like).await.unwrap(),
            MatchOutcome::Matched
        );
    }

    #[tokio::test]
    async fn reversed_order_matches_on_first_users_like() {
        let (_db, detector) = setup().await;
        let a = UserId(1);
        let b = UserId(2);

        assert_eq!(
            detector.apply_decision(b, a, SwipeAction::Like).await.unwrap(),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            detector.apply_decision(a, b, SwipeAction::Like).await.unwrap(),
            MatchOutcome::Matched
        );
    }

    #[tokio::test]
    async fn dislike_never_matches() {
        let (_db, detector) = setup().await;
        detector
            .apply_decision(UserId(2), UserId(1), SwipeAction::Like)
            .await
            .unwrap();
        assert_eq!(
            detector
                .apply_decision(UserId(1), UserId(2), SwipeAction::Dislike)
                .await
                .unwrap(),
            MatchOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn like_after_reciprocal_dislike_is_no_match() {
        let (_db, detector) = setup().await;
        detector
            .apply_decision(UserId(2), UserId(1), SwipeAction::Dislike)
            .await
            .unwrap();
        assert_eq!(
            detector
                .apply_decision(UserId(1), UserId(2), SwipeAction::Like)
                .await
                .unwrap(),
            MatchOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn repeated_decision_is_already_decided() {
        let (db, detector) = setup().await;
        let a = UserId(1);
        let b = UserId(2);
        detector.apply_decision(b, a, SwipeAction::Like).await.unwrap();

        assert_eq!(
            detector.apply_decision(a, b, SwipeAction::Like).await.unwrap(),
            MatchOutcome::Matched
        );
        // A second like must not report the match again.
        assert_eq!(
            detector.apply_decision(a, b, SwipeAction::Like).await.unwrap(),
            MatchOutcome::AlreadyDecided
        );
        assert_eq!(
            detector.apply_decision(a, b, SwipeAction::Dislike).await.unwrap(),
            MatchOutcome::AlreadyDecided
        );

        let kept = db.get_decision(a, b).await.unwrap().unwrap();
        assert_eq!(kept.action, SwipeAction::Like);
    }

    #[tokio::test]
    async fn concurrent_mutual_likes_match_exactly_once() {
        for round in 0..20 {
            let (_db, detector) = setup().await;
            let a = UserId(100 + round);
            let b = UserId(200 + round);

            let first = {
                let detector = Arc::clone(&detector);
                tokio::spawn(async move { detector.apply_decision(a, b, SwipeAction::Like).await })
            };
            let second = {
                let detector = Arc::clone(&detector);
                tokio::spawn(async move { detector.apply_decision(b, a, SwipeAction::Like).await })
            };

            let outcomes = [
                first.await.unwrap().unwrap(),
                second.await.unwrap().unwrap(),
            ];
            let matched = outcomes
                .iter()
                .filter(|o| **o == MatchOutcome::Matched)
                .count();
            assert_eq!(matched, 1, "round {round}: outcomes {outcomes:?}");
        }
    }

    #[tokio::test]
    async fn concurrent_duplicate_swipes_record_once() {
        let (db, detector) = setup().await;
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let detector = Arc::clone(&detector);
                tokio::spawn(async move {
                    detector
                        .apply_decision(UserId(1), UserId(2), SwipeAction::Like)
                        .await
                })
            })
            .collect();

        let mut already = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == MatchOutcome::AlreadyDecided {
                already += 1;
            }
        }
        assert_eq!(already, 4);
        assert_eq!(db.decided_targets(UserId(1)).await.unwrap().len(), 1);
    }
}
