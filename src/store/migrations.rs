//! Schema migrations, tracked in a `_migrations` table.
//!
//! A database written by the earlier single-file bot (a `users` table with
//! `photo_id`, no `_migrations`) is adopted in place as V1: columns are
//! renamed, rows are kept.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append-only, in version order.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                gender TEXT NOT NULL,
                age INTEGER NOT NULL,
                hobby TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                photo_ref TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS swipes (
                swiper_id INTEGER NOT NULL,
                swiped_id INTEGER NOT NULL,
                action TEXT NOT NULL CHECK (action IN ('like', 'dislike')),
                decided_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (swiper_id, swiped_id)
            );
            CREATE INDEX IF NOT EXISTS idx_swipes_swiped ON swipes(swiped_id);
        "#,
    },
    Migration {
        version: 2,
        name: "profile_updated_at",
        sql: r#"
            ALTER TABLE users ADD COLUMN updated_at TEXT;
            UPDATE users SET updated_at = created_at WHERE updated_at IS NULL;
        "#,
    },
];

/// Renames the earlier bot's columns in place and adds what V1 expects.
const ADOPT_LEGACY: &str = r#"
    ALTER TABLE users RENAME COLUMN photo_id TO photo_ref;
    ALTER TABLE users RENAME COLUMN registration_date TO created_at;
    CREATE TABLE IF NOT EXISTS swipes (
        swiper_id INTEGER NOT NULL,
        swiped_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        swipe_date TEXT,
        PRIMARY KEY (swiper_id, swiped_id)
    );
    ALTER TABLE swipes RENAME COLUMN swipe_date TO decided_at;
    CREATE INDEX IF NOT EXISTS idx_swipes_swiped ON swipes(swiped_id);
"#;

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let mut applied = current_version(conn).await?;

    if applied == 0 && is_legacy_schema(conn).await? {
        conn.execute_batch(ADOPT_LEGACY)
            .await
            .map_err(|e| DatabaseError::Migration(format!("adopt legacy tables: {e}")))?;
        mark_applied(conn, &MIGRATIONS[0]).await?;
        applied = MIGRATIONS[0].version;
        tracing::info!("Adopted tables from the earlier bot as V1");
    }

    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);
    for migration in pending {
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
        })?;
        mark_applied(conn, migration).await?;
    }

    tracing::debug!(version = current_version(conn).await?, "Schema up to date");
    Ok(())
}

/// Highest applied version, 0 on a fresh database.
async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    scalar(conn, "SELECT COALESCE(MAX(version), 0) FROM _migrations", "read schema version").await
}

/// A `users` table with the earlier bot's `photo_id` column.
async fn is_legacy_schema(conn: &Connection) -> Result<bool, DatabaseError> {
    let columns = scalar(
        conn,
        "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'photo_id'",
        "inspect users table",
    )
    .await?;
    Ok(columns > 0)
}

async fn scalar(conn: &Connection, sql: &str, what: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("{what}: {e}")))?;
    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("{what}: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!("{what}: {e}"))),
    }
}

async fn mark_applied(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("record V{}: {e}", migration.version)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh() -> Connection {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn migrated() -> Connection {
        let conn = fresh().await;
        run_migrations(&conn).await.unwrap();
        conn
    }

    async fn insert_swipe(conn: &Connection, swiper: i64, swiped: i64, action: &str) -> bool {
        conn.execute(
            "INSERT INTO swipes (swiper_id, swiped_id, action) VALUES (?1, ?2, ?3)",
            libsql::params![swiper, swiped, action],
        )
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn fresh_database_reaches_latest_version() {
        let conn = migrated().await;
        for table in ["users", "swipes", "_migrations"] {
            let sql = format!("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{table}'");
            assert_eq!(scalar(&conn, &sql, "probe").await.unwrap(), 1, "{table}");
        }
        assert_eq!(current_version(&conn).await.unwrap(), 2);
        assert_eq!(
            scalar(&conn, "SELECT COUNT(*) FROM _migrations", "count").await.unwrap(),
            MIGRATIONS.len() as i64
        );
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let conn = migrated().await;
        run_migrations(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn swipes_are_unique_per_ordered_pair() {
        let conn = migrated().await;
        assert!(insert_swipe(&conn, 1, 2, "like").await);
        assert!(!insert_swipe(&conn, 1, 2, "dislike").await);
        assert!(insert_swipe(&conn, 2, 1, "like").await);
        assert!(!insert_swipe(&conn, 3, 4, "superlike").await);
    }

    #[tokio::test]
    async fn earlier_bot_database_is_adopted() {
        let conn = fresh().await;
        conn.execute_batch(
            "CREATE TABLE users (
                user_id INTEGER PRIMARY KEY, gender TEXT, age INTEGER, hobby TEXT,
                latitude REAL, longitude REAL, photo_id TEXT, description TEXT,
                registration_date DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE swipes (
                swiper_id INTEGER NOT NULL, swiped_id INTEGER NOT NULL, action TEXT NOT NULL,
                swipe_date DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (swiper_id, swiped_id)
            );
            INSERT INTO users (user_id, gender, age, hobby, latitude, longitude, photo_id, description)
                VALUES (7, 'Pria', 30, 'Lari', 1.5, 2.5, 'old-photo', 'halo');
            INSERT INTO swipes (swiper_id, swiped_id, action) VALUES (7, 8, 'like');",
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), 2);

        let mut rows = conn
            .query("SELECT photo_ref, created_at = updated_at FROM users WHERE user_id = 7", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "old-photo");
        assert_eq!(row.get::<i64>(1).unwrap(), 1);

        let kept = scalar(&conn, "SELECT COUNT(*) FROM swipes WHERE decided_at IS NOT NULL", "count")
            .await
            .unwrap();
        assert_eq!(kept, 1);
    }
}
