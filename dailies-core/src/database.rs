use crate::error::{Result, TrackerError};
use lazy_static::lazy_static;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite_migration::{M, Migrations};
use std::path::Path;

lazy_static! {
    static ref MIGRATIONS: Migrations<'static> = Migrations::new(vec![
        M::up(
            r#"
            CREATE TABLE servers (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                has_dailies INTEGER NOT NULL DEFAULT 1,
                has_fishing INTEGER NOT NULL DEFAULT 0,
                has_tombola INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE store_accounts (
                id INTEGER PRIMARY KEY,
                email TEXT UNIQUE NOT NULL
            );

            CREATE TABLE game_accounts (
                id INTEGER PRIMARY KEY,
                store_account_id INTEGER NOT NULL,
                server_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                UNIQUE(username, server_id),
                FOREIGN KEY (store_account_id) REFERENCES store_accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE
            );

            CREATE TABLE characters (
                id INTEGER PRIMARY KEY,
                game_account_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                char_type TEXT NOT NULL DEFAULT 'ALCHEMIST'
                    CHECK (char_type IN ('ALCHEMIST', 'FISHERMAN')),
                slots INTEGER NOT NULL DEFAULT 1,
                UNIQUE(game_account_id, name),
                FOREIGN KEY (game_account_id) REFERENCES game_accounts(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_game_accounts_server_id ON game_accounts(server_id);
            CREATE INDEX idx_game_accounts_store_id ON game_accounts(store_account_id);
            CREATE INDEX idx_characters_game_account_id ON characters(game_account_id);
            "#,
        ),
        M::up(
            r#"
            CREATE TABLE alchemy_events (
                id INTEGER PRIMARY KEY,
                server_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE
            );

            CREATE TABLE daily_cor_activity (
                id INTEGER PRIMARY KEY,
                character_id INTEGER NOT NULL,
                event_id INTEGER NOT NULL,
                day_index INTEGER NOT NULL,
                status_code INTEGER NOT NULL DEFAULT 0 CHECK (status_code IN (-1, 0, 1)),
                UNIQUE(character_id, event_id, day_index),
                FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE,
                FOREIGN KEY (event_id) REFERENCES alchemy_events(id) ON DELETE CASCADE
            );

            CREATE TABLE alchemy_counters (
                id INTEGER PRIMARY KEY,
                event_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(event_id, name),
                FOREIGN KEY (event_id) REFERENCES alchemy_events(id) ON DELETE CASCADE
            );

            CREATE TABLE daily_cor_records (
                id INTEGER PRIMARY KEY,
                event_id INTEGER NOT NULL,
                game_account_id INTEGER NOT NULL,
                day_index INTEGER NOT NULL,
                cords INTEGER NOT NULL DEFAULT 0,
                UNIQUE(event_id, game_account_id, day_index),
                FOREIGN KEY (event_id) REFERENCES alchemy_events(id) ON DELETE CASCADE,
                FOREIGN KEY (game_account_id) REFERENCES game_accounts(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_alchemy_events_server_id ON alchemy_events(server_id);
            CREATE INDEX idx_daily_cor_activity_event_id ON daily_cor_activity(event_id);
            "#,
        ),
        M::up(
            r#"
            CREATE TABLE fishing_activity (
                id INTEGER PRIMARY KEY,
                character_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                week INTEGER NOT NULL,
                status_code INTEGER NOT NULL DEFAULT 0 CHECK (status_code IN (-1, 0, 1)),
                UNIQUE(character_id, year, month, week),
                FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_fishing_activity_month ON fishing_activity(year, month);
            "#,
        ),
        M::up(
            r#"
            CREATE TABLE tombola_events (
                id INTEGER PRIMARY KEY,
                server_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE
            );

            CREATE TABLE tombola_activity (
                id INTEGER PRIMARY KEY,
                character_id INTEGER NOT NULL,
                event_id INTEGER NOT NULL,
                day_index INTEGER NOT NULL,
                status_code INTEGER NOT NULL DEFAULT 0 CHECK (status_code IN (-1, 0, 1)),
                UNIQUE(character_id, event_id, day_index),
                FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE,
                FOREIGN KEY (event_id) REFERENCES tombola_events(id) ON DELETE CASCADE
            );

            CREATE TABLE tombola_item_counters (
                id INTEGER PRIMARY KEY,
                event_id INTEGER NOT NULL,
                item_name TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(event_id, item_name),
                FOREIGN KEY (event_id) REFERENCES tombola_events(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_tombola_events_server_id ON tombola_events(server_id);
            CREATE INDEX idx_tombola_activity_event_id ON tombola_activity(event_id);
            "#,
        ),
        M::up(
            r#"
            CREATE TABLE timer_records (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                elapsed_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        ),
    ]);
}

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_pool_size(path, 4)
    }

    pub fn with_pool_size(path: &Path, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(TrackerError::Pool)?;

        let db = Self { pool };
        db.run_migrations()?;
        tracing::debug!("Opened database at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database. The pool holds exactly one connection that
    /// never expires, so every call sees the same data.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(TrackerError::Pool)?;

        let db = Self { pool };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(TrackerError::Pool)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        MIGRATIONS.to_latest(&mut conn)?;
        Ok(())
    }
}
