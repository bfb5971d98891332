//! libSQL implementation of `ProfileStore` and `DecisionStore`.
//!
//! Supports local file and in-memory databases. Uniqueness of profiles and
//! of swipe pairs is enforced by primary keys; inserts use
//! `ON CONFLICT DO NOTHING` and the affected-row count tells a fresh row from
//! a duplicate, so check-and-insert is a single statement.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::profile::{EditableField, Gender, Location, NewProfile, PhotoRef, Profile, UserId};
use crate::store::migrations;
use crate::store::traits::{Decision, DecisionStore, ProfileStore, SwipeAction};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Unavailable(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Read a nullable REAL column.
fn opt_real(row: &libsql::Row, idx: i32) -> Result<Option<f64>, libsql::Error> {
    Ok(match row.get_value(idx)? {
        libsql::Value::Real(v) => Some(v),
        libsql::Value::Integer(v) => Some(v as f64),
        _ => None,
    })
}

fn query_err(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

const PROFILE_COLUMNS: &str =
    "user_id, gender, age, hobby, description, latitude, longitude, photo_ref, created_at, updated_at";

const DECISION_COLUMNS: &str = "swiper_id, swiped_id, action, decided_at";

/// Map a libsql Row to a Profile.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let parse = query_err("profile row parse");

    let user_id: i64 = row.get(0).map_err(&parse)?;
    let gender_str: String = row.get(1).map_err(&parse)?;
    let age: i64 = row.get(2).map_err(&parse)?;
    let hobby: String = row.get(3).map_err(&parse)?;
    let description: String = row.get(4).map_err(&parse)?;
    let latitude = opt_real(row, 5).map_err(&parse)?;
    let longitude = opt_real(row, 6).map_err(&parse)?;
    let photo_str: String = row.get(7).map_err(&parse)?;
    let created_str: String = row.get(8).map_err(&parse)?;
    let updated_str: Option<String> = row.get::<String>(9).ok();

    let gender = Gender::from_label(&gender_str).ok_or_else(|| {
        DatabaseError::Serialization(format!("unknown gender {gender_str:?} for user {user_id}"))
    })?;
    let age = u8::try_from(age).map_err(|_| {
        DatabaseError::Serialization(format!("age {age} out of range for user {user_id}"))
    })?;
    let photo_ref = PhotoRef::new(photo_str).ok_or_else(|| {
        DatabaseError::Serialization(format!("empty photo reference for user {user_id}"))
    })?;
    let location = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Location::new(lat, lon),
        _ => None,
    };
    let created_at = parse_datetime(&created_str);

    Ok(Profile {
        user_id: UserId(user_id),
        gender,
        age,
        hobby,
        description,
        location,
        photo_ref,
        created_at,
        updated_at: updated_str
            .as_deref()
            .map(parse_datetime)
            .unwrap_or(created_at),
    })
}

/// Map a libsql Row to a Decision.
///
/// Column order matches DECISION_COLUMNS.
fn row_to_decision(row: &libsql::Row) -> Result<Decision, DatabaseError> {
    let parse = query_err("decision row parse");

    let swiper: i64 = row.get(0).map_err(&parse)?;
    let swiped: i64 = row.get(1).map_err(&parse)?;
    let action_str: String = row.get(2).map_err(&parse)?;
    let decided_str: String = row.get(3).map_err(&parse)?;

    Ok(Decision {
        swiper_id: UserId(swiper),
        swiped_id: UserId(swiped),
        action: action_str
            .parse()
            .map_err(DatabaseError::Serialization)?,
        decided_at: parse_datetime(&decided_str),
    })
}

// ── Profiles ────────────────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn exists(&self, user_id: UserId) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM users WHERE user_id = ?1",
                params![user_id.0],
            )
            .await
            .map_err(query_err("exists"))?;

        let row = rows.next().await.map_err(query_err("exists"))?;
        Ok(row.is_some())
    }

    async fn create(&self, profile: &NewProfile) -> Result<Profile, DatabaseError> {
        profile.validate()?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "INSERT INTO users (user_id, gender, age, hobby, latitude, longitude, photo_ref, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (user_id) DO NOTHING",
                params![
                    profile.user_id.0,
                    profile.gender.label(),
                    i64::from(profile.age),
                    profile.hobby.as_str(),
                    profile.location.latitude,
                    profile.location.longitude,
                    profile.photo_ref.as_str(),
                    profile.description.as_str(),
                    now_str.as_str(),
                    now_str.as_str(),
                ],
            )
            .await
            .map_err(query_err("create_profile"))?;

        if changed == 0 {
            return Err(DatabaseError::DuplicateProfile {
                user_id: profile.user_id,
            });
        }

        debug!(user_id = %profile.user_id, "Profile inserted into DB");
        Ok(Profile {
            user_id: profile.user_id,
            gender: profile.gender,
            age: profile.age,
            hobby: profile.hobby.clone(),
            description: profile.description.clone(),
            location: Some(profile.location),
            photo_ref: profile.photo_ref.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, user_id: UserId) -> Result<Profile, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id.0],
            )
            .await
            .map_err(query_err("get_profile"))?;

        match rows.next().await.map_err(query_err("get_profile"))? {
            Some(row) => row_to_profile(&row),
            None => Err(DatabaseError::NotFound { user_id }),
        }
    }

    async fn update_field(
        &self,
        user_id: UserId,
        field: EditableField,
        value: &str,
    ) -> Result<(), DatabaseError> {
        if value.trim().is_empty() {
            return Err(DatabaseError::IncompleteProfile {
                missing: field.column(),
            });
        }

        let now = Utc::now().to_rfc3339();
        // The column name comes from a closed enum, never from input.
        let changed = self
            .conn()
            .execute(
                &format!(
                    "UPDATE users SET {} = ?1, updated_at = ?2 WHERE user_id = ?3",
                    field.column()
                ),
                params![value, now, user_id.0],
            )
            .await
            .map_err(query_err("update_field"))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound { user_id });
        }

        debug!(user_id = %user_id, field = %field, "Profile field updated in DB");
        Ok(())
    }

    async fn all_ids(&self) -> Result<Vec<UserId>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT user_id FROM users ORDER BY user_id", ())
            .await
            .map_err(query_err("all_ids"))?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("all_ids"))? {
            let id: i64 = row.get(0).map_err(query_err("all_ids row parse"))?;
            ids.push(UserId(id));
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM users", ())
            .await
            .map_err(query_err("count_profiles"))?;

        match rows.next().await.map_err(query_err("count_profiles"))? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(query_err("count_profiles"))?;
                Ok(count.max(0) as u64)
            }
            None => Ok(0),
        }
    }
}

// ── Decisions ───────────────────────────────────────────────────────

#[async_trait]
impl DecisionStore for LibSqlBackend {
    async fn record(
        &self,
        swiper: UserId,
        swiped: UserId,
        action: SwipeAction,
    ) -> Result<Decision, DatabaseError> {
        let now = Utc::now();
        let changed = self
            .conn()
            .execute(
                "INSERT INTO swipes (swiper_id, swiped_id, action, decided_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (swiper_id, swiped_id) DO NOTHING",
                params![swiper.0, swiped.0, action.as_str(), now.to_rfc3339()],
            )
            .await
            .map_err(query_err("record_decision"))?;

        if changed == 0 {
            return Err(DatabaseError::DuplicateDecision { swiper, swiped });
        }

        debug!(swiper = %swiper, swiped = %swiped, action = %action, "Decision recorded");
        Ok(Decision {
            swiper_id: swiper,
            swiped_id: swiped,
            action,
            decided_at: now,
        })
    }

    async fn has_reciprocal_like(&self, a: UserId, b: UserId) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM swipes WHERE swiper_id = ?1 AND swiped_id = ?2 AND action = 'like'",
                params![b.0, a.0],
            )
            .await
            .map_err(query_err("has_reciprocal_like"))?;

        let row = rows.next().await.map_err(query_err("has_reciprocal_like"))?;
        Ok(row.is_some())
    }

    async fn decided_targets(&self, user_id: UserId) -> Result<HashSet<UserId>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT swiped_id FROM swipes WHERE swiper_id = ?1",
                params![user_id.0],
            )
            .await
            .map_err(query_err("decided_targets"))?;

        let mut targets = HashSet::new();
        while let Some(row) = rows.next().await.map_err(query_err("decided_targets"))? {
            let id: i64 = row.get(0).map_err(query_err("decided_targets row parse"))?;
            targets.insert(UserId(id));
        }
        Ok(targets)
    }

    async fn get_decision(
        &self,
        swiper: UserId,
        swiped: UserId,
    ) -> Result<Option<Decision>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DECISION_COLUMNS} FROM swipes WHERE swiper_id = ?1 AND swiped_id = ?2"
                ),
                params![swiper.0, swiped.0],
            )
            .await
            .map_err(query_err("get_decision"))?;

        match rows.next().await.map_err(query_err("get_decision"))? {
            Some(row) => row_to_decision(&row).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_profile(id: i64) -> NewProfile {
        NewProfile {
            user_id: UserId(id),
            gender: Gender::Female,
            age: 29,
            hobby: "Baca".into(),
            description: "hai".into(),
            location: Location::new(1.0, 2.0).unwrap(),
            photo_ref: PhotoRef::new("p1").unwrap(),
        }
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get() {
        let db = test_db().await;
        let created = db.create(&make_profile(42)).await.unwrap();

        let fetched = db.get(UserId(42)).await.unwrap();
        assert_eq!(fetched.user_id, UserId(42));
        assert_eq!(fetched.gender, Gender::Female);
        assert_eq!(fetched.age, 29);
        assert_eq!(fetched.hobby, "Baca");
        assert_eq!(fetched.description, "hai");
        assert_eq!(fetched.photo_ref.as_str(), "p1");
        assert_eq!(fetched.location, Location::new(1.0, 2.0));
        assert_eq!(
            fetched.created_at.timestamp(),
            created.created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn exists_reflects_registration() {
        let db = test_db().await;
        assert!(!db.exists(UserId(1)).await.unwrap());
        db.create(&make_profile(1)).await.unwrap();
        assert!(db.exists(UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_profile_rejected_and_original_kept() {
        let db = test_db().await;
        db.create(&make_profile(5)).await.unwrap();

        let mut second = make_profile(5);
        second.hobby = "Renang".into();
        let err = db.create(&second).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::DuplicateProfile { user_id: UserId(5) }
        ));

        assert_eq!(db.get(UserId(5)).await.unwrap().hobby, "Baca");
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn incomplete_profile_rejected() {
        let db = test_db().await;
        let mut profile = make_profile(9);
        profile.description = " ".into();

        let err = db.create(&profile).await.unwrap_err();
        assert!(matches!(err, DatabaseError::IncompleteProfile { .. }));
        assert!(!db.exists(UserId(9)).await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_profile_is_not_found() {
        let db = test_db().await;
        let err = db.get(UserId(404)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { user_id: UserId(404) }));
    }

    #[tokio::test]
    async fn update_field_changes_only_that_field() {
        let db = test_db().await;
        let created = db.create(&make_profile(3)).await.unwrap();

        db.update_field(UserId(3), EditableField::Description, "baru")
            .await
            .unwrap();
        let fetched = db.get(UserId(3)).await.unwrap();
        assert_eq!(fetched.description, "baru");
        assert_eq!(fetched.hobby, "Baca");
        assert_eq!(
            fetched.created_at.timestamp(),
            created.created_at.timestamp()
        );
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn update_field_is_idempotent() {
        let db = test_db().await;
        db.create(&make_profile(3)).await.unwrap();

        db.update_field(UserId(3), EditableField::Hobby, "Masak")
            .await
            .unwrap();
        let first = db.get(UserId(3)).await.unwrap();
        db.update_field(UserId(3), EditableField::Hobby, "Masak")
            .await
            .unwrap();
        let second = db.get(UserId(3)).await.unwrap();

        assert_eq!(first.hobby, "Masak");
        assert_eq!(second.hobby, "Masak");
        assert_eq!(first.description, second.description);
    }

    #[tokio::test]
    async fn update_field_without_profile_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_field(UserId(77), EditableField::Hobby, "Masak")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { user_id: UserId(77) }));
    }

    #[tokio::test]
    async fn all_ids_and_count() {
        let db = test_db().await;
        for id in [3, 1, 2] {
            db.create(&make_profile(id)).await.unwrap();
        }
        assert_eq!(
            db.all_ids().await.unwrap(),
            vec![UserId(1), UserId(2), UserId(3)]
        );
        assert_eq!(db.count().await.unwrap(), 3);
    }

    // ── Decision tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn record_and_get_decision() {
        let db = test_db().await;
        let recorded = db
            .record(UserId(1), UserId(2), SwipeAction::Like)
            .await
            .unwrap();
        assert_eq!(recorded.action, SwipeAction::Like);

        let fetched = db.get_decision(UserId(1), UserId(2)).await.unwrap().unwrap();
        assert_eq!(fetched.swiper_id, UserId(1));
        assert_eq!(fetched.swiped_id, UserId(2));
        assert_eq!(fetched.action, SwipeAction::Like);

        assert!(db.get_decision(UserId(2), UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_decision_rejected_not_overwritten() {
        let db = test_db().await;
        db.record(UserId(1), UserId(2), SwipeAction::Like)
            .await
            .unwrap();

        let err = db
            .record(UserId(1), UserId(2), SwipeAction::Dislike)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::DuplicateDecision {
                swiper: UserId(1),
                swiped: UserId(2)
            }
        ));

        let kept = db.get_decision(UserId(1), UserId(2)).await.unwrap().unwrap();
        assert_eq!(kept.action, SwipeAction::Like);
    }

    #[tokio::test]
    async fn concurrent_duplicate_records_store_one_row() {
        let db = Arc::new(test_db().await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                tokio::spawn(async move { db.record(UserId(1), UserId(2), SwipeAction::Like).await })
            })
            .collect();

        let mut ok = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DatabaseError::DuplicateDecision { .. }) => duplicate += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(duplicate, 7);
        assert_eq!(db.decided_targets(UserId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reciprocal_like_direction() {
        let db = test_db().await;
        db.record(UserId(2), UserId(1), SwipeAction::Like)
            .await
            .unwrap();

        // 2 liked 1, so 1 has a reciprocal like from 2.
        assert!(db.has_reciprocal_like(UserId(1), UserId(2)).await.unwrap());
        assert!(!db.has_reciprocal_like(UserId(2), UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn dislike_is_not_a_reciprocal_like() {
        let db = test_db().await;
        db.record(UserId(2), UserId(1), SwipeAction::Dislike)
            .await
            .unwrap();
        assert!(!db.has_reciprocal_like(UserId(1), UserId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn decided_targets_lists_only_own_decisions() {
        let db = test_db().await;
        db.record(UserId(1), UserId(2), SwipeAction::Like)
            .await
            .unwrap();
        db.record(UserId(1), UserId(3), SwipeAction::Dislike)
            .await
            .unwrap();
        db.record(UserId(4), UserId(1), SwipeAction::Like)
            .await
            .unwrap();

        let targets = db.decided_targets(UserId(1)).await.unwrap();
        assert_eq!(targets, HashSet::from([UserId(2), UserId(3)]));
        assert!(db.decided_targets(UserId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("matchbot.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create(&make_profile(8)).await.unwrap();
            db.record(UserId(8), UserId(9), SwipeAction::Like)
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.exists(UserId(8)).await.unwrap());
        assert!(db.get_decision(UserId(8), UserId(9)).await.unwrap().is_some());
    }

    #[test]
    fn parse_datetime_formats() {
        let rfc = parse_datetime("2026-01-02T03:04:05Z");
        assert_eq!(rfc.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        let sqlite = parse_datetime("2026-01-02 03:04:05");
        assert_eq!(sqlite, rfc);
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
