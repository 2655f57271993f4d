//! Servers, store accounts, game accounts and characters.

use crate::database::Database;
use crate::error::{Result, TrackerError};
use crate::models::{CharType, Character, GameAccount, Server, ServerFeatures, StoreAccount};
use rusqlite::{Connection, OptionalExtension, Row, params};

pub(crate) fn server_from_row(row: &Row) -> rusqlite::Result<Server> {
    Ok(Server {
        id: row.get(0)?,
        name: row.get(1)?,
        features: ServerFeatures {
            has_dailies: row.get(2)?,
            has_fishing: row.get(3)?,
            has_tombola: row.get(4)?,
        },
    })
}

fn store_from_row(row: &Row) -> rusqlite::Result<StoreAccount> {
    Ok(StoreAccount {
        id: row.get(0)?,
        email: row.get(1)?,
    })
}

fn game_account_from_row(row: &Row) -> rusqlite::Result<GameAccount> {
    Ok(GameAccount {
        id: row.get(0)?,
        store_account_id: row.get(1)?,
        server_id: row.get(2)?,
        username: row.get(3)?,
    })
}

pub(crate) fn character_from_row(row: &Row) -> rusqlite::Result<Character> {
    Ok(Character {
        id: row.get(0)?,
        game_account_id: row.get(1)?,
        name: row.get(2)?,
        char_type: row.get(3)?,
        slots: row.get(4)?,
    })
}

/// Map a UNIQUE constraint failure to `DuplicateEntry`, pass anything else through.
fn map_unique(err: rusqlite::Error, what: impl FnOnce() -> String) -> TrackerError {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            TrackerError::DuplicateEntry(what())
        }
        other => TrackerError::Database(other),
    }
}

pub(crate) fn load_server(conn: &Connection, server_id: i64) -> Result<Server> {
    conn.query_row(
        "SELECT id, name, has_dailies, has_fishing, has_tombola FROM servers WHERE id = ?",
        params![server_id],
        server_from_row,
    )
    .optional()?
    .ok_or_else(|| TrackerError::NotFound(format!("server {}", server_id)))
}

fn find_store(conn: &Connection, email: &str) -> Result<Option<StoreAccount>> {
    Ok(conn
        .query_row(
            "SELECT id, email FROM store_accounts WHERE email = ?",
            params![email],
            store_from_row,
        )
        .optional()?)
}

fn store_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(TrackerError::Validation("Store email is empty".to_string()));
    }
    Ok(email)
}

/// Find a store by email or insert it. Returns the store and whether it was created.
pub(crate) fn get_or_create_store_in(conn: &Connection, email: &str) -> Result<(StoreAccount, bool)> {
    if let Some(store) = find_store(conn, email)? {
        return Ok((store, false));
    }
    conn.execute("INSERT INTO store_accounts (email) VALUES (?)", params![email])?;
    Ok((
        StoreAccount {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
        },
        true,
    ))
}

/// Find a game account by (username, server) or insert it under `store_id`.
pub(crate) fn get_or_create_game_account_in(
    conn: &Connection,
    store_id: i64,
    server_id: i64,
    username: &str,
) -> Result<(GameAccount, bool)> {
    let existing = conn
        .query_row(
            "SELECT id, store_account_id, server_id, username FROM game_accounts
             WHERE username = ? AND server_id = ?",
            params![username, server_id],
            game_account_from_row,
        )
        .optional()?;

    if let Some(account) = existing {
        if account.store_account_id != store_id {
            tracing::warn!(
                "Game account {} on server {} already belongs to store {}, keeping it there",
                username,
                server_id,
                account.store_account_id
            );
        }
        return Ok((account, false));
    }

    conn.execute(
        "INSERT INTO game_accounts (store_account_id, server_id, username) VALUES (?, ?, ?)",
        params![store_id, server_id, username],
    )?;
    Ok((
        GameAccount {
            id: conn.last_insert_rowid(),
            store_account_id: store_id,
            server_id,
            username: username.to_string(),
        },
        true,
    ))
}

/// Insert or update a character keyed by (game account, name).
/// Returns the character and whether it was created.
fn upsert_character_in(
    conn: &Connection,
    game_account_id: i64,
    name: &str,
    char_type: CharType,
    slots: i32,
) -> Result<(Character, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM characters WHERE game_account_id = ? AND name = ?",
            params![game_account_id, name],
            |row| row.get(0),
        )
        .optional()?;

    let (id, created) = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE characters SET slots = ?, char_type = ? WHERE id = ?",
                params![slots, char_type, id],
            )?;
            (id, false)
        }
        None => {
            conn.execute(
                "INSERT INTO characters (game_account_id, name, char_type, slots) VALUES (?, ?, ?, ?)",
                params![game_account_id, name, char_type, slots],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };

    Ok((
        Character {
            id,
            game_account_id,
            name: name.to_string(),
            char_type,
            slots,
        },
        created,
    ))
}

impl Database {
    // Servers

    pub fn create_server(&self, name: &str, features: ServerFeatures) -> Result<Server> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::Validation("Server name is empty".to_string()));
        }
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO servers (name, has_dailies, has_fishing, has_tombola) VALUES (?, ?, ?, ?)",
            params![name, features.has_dailies, features.has_fishing, features.has_tombola],
        )
        .map_err(|e| map_unique(e, || format!("server {}", name)))?;

        let server = Server {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            features,
        };
        tracing::info!("Created server {} (id {})", server.name, server.id);
        Ok(server)
    }

    pub fn list_servers(&self) -> Result<Vec<Server>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, has_dailies, has_fishing, has_tombola FROM servers ORDER BY name",
        )?;
        let servers = stmt
            .query_map([], server_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(servers)
    }

    pub fn get_server(&self, server_id: i64) -> Result<Server> {
        let conn = self.connection()?;
        load_server(&conn, server_id)
    }

    pub fn set_server_features(&self, server_id: i64, features: ServerFeatures) -> Result<Server> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE servers SET has_dailies = ?, has_fishing = ?, has_tombola = ? WHERE id = ?",
            params![features.has_dailies, features.has_fishing, features.has_tombola, server_id],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("server {}", server_id)));
        }
        load_server(&conn, server_id)
    }

    /// Delete a server together with its game accounts, events and activity.
    pub fn delete_server(&self, server_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM servers WHERE id = ?", params![server_id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("server {}", server_id)));
        }
        tracing::info!("Deleted server {}", server_id);
        Ok(())
    }

    // Store accounts

    pub fn create_store(&self, email: &str) -> Result<StoreAccount> {
        let email = store_email(email)?;
        let conn = self.connection()?;
        conn.execute("INSERT INTO store_accounts (email) VALUES (?)", params![email])
            .map_err(|e| map_unique(e, || format!("store {}", email)))?;
        Ok(StoreAccount {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
        })
    }

    pub fn get_or_create_store(&self, email: &str) -> Result<StoreAccount> {
        let email = store_email(email)?;
        let conn = self.connection()?;
        let (store, created) = get_or_create_store_in(&conn, email)?;
        if created {
            tracing::debug!("Created store account {}", email);
        }
        Ok(store)
    }

    pub fn find_store_by_email(&self, email: &str) -> Result<Option<StoreAccount>> {
        let conn = self.connection()?;
        find_store(&conn, email.trim())
    }

    pub fn list_stores(&self) -> Result<Vec<StoreAccount>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id, email FROM store_accounts ORDER BY email")?;
        let stores = stmt
            .query_map([], store_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stores)
    }

    pub fn rename_store(&self, store_id: i64, email: &str) -> Result<StoreAccount> {
        let email = store_email(email)?;
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE store_accounts SET email = ? WHERE id = ?",
                params![email, store_id],
            )
            .map_err(|e| map_unique(e, || format!("store {}", email)))?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("store {}", store_id)));
        }
        Ok(StoreAccount {
            id: store_id,
            email: email.to_string(),
        })
    }

    pub fn delete_store(&self, store_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM store_accounts WHERE id = ?", params![store_id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("store {}", store_id)));
        }
        Ok(())
    }

    // Game accounts

    pub fn create_game_account(&self, store_id: i64, server_id: i64, username: &str) -> Result<GameAccount> {
        let username = username.trim();
        if username.is_empty() {
            return Err(TrackerError::Validation("Game account username is empty".to_string()));
        }
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO game_accounts (store_account_id, server_id, username) VALUES (?, ?, ?)",
            params![store_id, server_id, username],
        )
        .map_err(|e| map_unique(e, || format!("game account {} on server {}", username, server_id)))?;

        Ok(GameAccount {
            id: conn.last_insert_rowid(),
            store_account_id: store_id,
            server_id,
            username: username.to_string(),
        })
    }

    pub fn get_or_create_game_account(&self, store_id: i64, server_id: i64, username: &str) -> Result<GameAccount> {
        let conn = self.connection()?;
        let (account, _) = get_or_create_game_account_in(&conn, store_id, server_id, username)?;
        Ok(account)
    }

    pub fn get_game_account(&self, game_account_id: i64) -> Result<GameAccount> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, store_account_id, server_id, username FROM game_accounts WHERE id = ?",
            params![game_account_id],
            game_account_from_row,
        )
        .optional()?
        .ok_or_else(|| TrackerError::NotFound(format!("game account {}", game_account_id)))
    }

    pub fn list_game_accounts(&self, server_id: i64) -> Result<Vec<GameAccount>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, store_account_id, server_id, username FROM game_accounts
             WHERE server_id = ? ORDER BY username",
        )?;
        let accounts = stmt
            .query_map(params![server_id], game_account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    pub fn delete_game_account(&self, game_account_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM game_accounts WHERE id = ?", params![game_account_id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("game account {}", game_account_id)));
        }
        Ok(())
    }

    /// Grow or shrink a game account to exactly `count` characters.
    ///
    /// Shrinking deletes the newest characters first, and their activity rows
    /// go with them. Growing adds `<username>-<n>` placeholders.
    /// Returns `(created, deleted)`.
    pub fn set_character_count(
        &self,
        game_account_id: i64,
        count: usize,
        default_type: CharType,
    ) -> Result<(usize, usize)> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let username: String = tx
            .query_row(
                "SELECT username FROM game_accounts WHERE id = ?",
                params![game_account_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| TrackerError::NotFound(format!("game account {}", game_account_id)))?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM characters WHERE game_account_id = ? ORDER BY id")?;
            stmt.query_map(params![game_account_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut created = 0;
        let mut deleted = 0;

        if ids.len() > count {
            for id in &ids[count..] {
                deleted += tx.execute("DELETE FROM characters WHERE id = ?", params![id])?;
            }
        } else {
            let mut suffix = ids.len() + 1;
            while ids.len() + created < count {
                let name = format!("{}-{}", username, suffix);
                suffix += 1;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO characters (game_account_id, name, char_type, slots)
                     VALUES (?, ?, ?, 1)",
                    params![game_account_id, name, default_type],
                )?;
                created += inserted;
            }
        }

        tx.commit()?;
        tracing::info!(
            "Game account {} now has {} characters ({} created, {} deleted)",
            username,
            count,
            created,
            deleted
        );
        Ok((created, deleted))
    }

    // Characters

    pub fn create_character(
        &self,
        game_account_id: i64,
        name: &str,
        char_type: CharType,
        slots: i32,
    ) -> Result<Character> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::Validation("Character name is empty".to_string()));
        }
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO characters (game_account_id, name, char_type, slots) VALUES (?, ?, ?, ?)",
            params![game_account_id, name, char_type, slots],
        )
        .map_err(|e| map_unique(e, || format!("character {}", name)))?;

        Ok(Character {
            id: conn.last_insert_rowid(),
            game_account_id,
            name: name.to_string(),
            char_type,
            slots,
        })
    }

    pub fn upsert_character(
        &self,
        game_account_id: i64,
        name: &str,
        char_type: CharType,
        slots: i32,
    ) -> Result<Character> {
        let conn = self.connection()?;
        let (character, _) = upsert_character_in(&conn, game_account_id, name.trim(), char_type, slots)?;
        Ok(character)
    }

    pub fn get_character(&self, character_id: i64) -> Result<Character> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, game_account_id, name, char_type, slots FROM characters WHERE id = ?",
            params![character_id],
            character_from_row,
        )
        .optional()?
        .ok_or_else(|| TrackerError::NotFound(format!("character {}", character_id)))
    }

    pub fn list_characters(&self, game_account_id: i64) -> Result<Vec<Character>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, game_account_id, name, char_type, slots FROM characters
             WHERE game_account_id = ? ORDER BY id",
        )?;
        let characters = stmt
            .query_map(params![game_account_id], character_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(characters)
    }

    pub fn update_character(
        &self,
        character_id: i64,
        name: Option<&str>,
        char_type: Option<CharType>,
        slots: Option<i32>,
    ) -> Result<Character> {
        let current = self.get_character(character_id)?;
        let name = name.map(str::trim).unwrap_or(current.name.as_str()).to_string();
        let char_type = char_type.unwrap_or(current.char_type);
        let slots = slots.unwrap_or(current.slots);

        let conn = self.connection()?;
        conn.execute(
            "UPDATE characters SET name = ?, char_type = ?, slots = ? WHERE id = ?",
            params![name, char_type, slots, character_id],
        )
        .map_err(|e| map_unique(e, || format!("character {}", name)))?;

        Ok(Character {
            id: character_id,
            game_account_id: current.game_account_id,
            name,
            char_type,
            slots,
        })
    }

    pub fn delete_character(&self, character_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM characters WHERE id = ?", params![character_id])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("character {}", character_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Database, Server, StoreAccount, GameAccount) {
        let db = Database::in_memory().unwrap();
        let server = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let store = db.create_store("owner@gmail.com").unwrap();
        let account = db.create_game_account(store.id, server.id, "Fragmetin1").unwrap();
        (db, server, store, account)
    }

    #[test]
    fn test_create_and_list_servers() {
        let db = Database::in_memory().unwrap();
        db.create_server("Beta", ServerFeatures::default()).unwrap();
        db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let servers = db.list_servers().unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "Alpha");
        assert!(servers[0].features.has_tombola);
        assert!(!servers[1].features.has_fishing);
    }

    #[test]
    fn test_duplicate_server_name() {
        let db = Database::in_memory().unwrap();
        db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let err = db.create_server("Alpha", ServerFeatures::all()).unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateEntry(_)));
    }

    #[test]
    fn test_set_server_features() {
        let (db, server, _, _) = seeded();
        let updated = db
            .set_server_features(
                server.id,
                ServerFeatures {
                    has_dailies: true,
                    has_fishing: false,
                    has_tombola: false,
                },
            )
            .unwrap();
        assert!(!updated.features.has_fishing);
        assert!(matches!(
            db.set_server_features(999, ServerFeatures::all()),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn test_game_account_unique_per_server() {
        let (db, server, store, _) = seeded();
        let err = db.create_game_account(store.id, server.id, "Fragmetin1").unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateEntry(_)));

        let other = db.create_server("Beta", ServerFeatures::all()).unwrap();
        assert!(db.create_game_account(store.id, other.id, "Fragmetin1").is_ok());
    }

    #[test]
    fn test_store_email_is_trimmed_and_required() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(db.create_store("   "), Err(TrackerError::Validation(_))));
        assert!(matches!(db.get_or_create_store(""), Err(TrackerError::Validation(_))));
        assert!(db.find_store_by_email("a@gmail.com").unwrap().is_none());

        let store = db.create_store(" a@gmail.com ").unwrap();
        assert_eq!(store.email, "a@gmail.com");
        let found = db.find_store_by_email("a@gmail.com").unwrap().unwrap();
        assert_eq!(found.id, store.id);
        assert!(matches!(db.create_store("a@gmail.com"), Err(TrackerError::DuplicateEntry(_))));

        assert!(matches!(db.rename_store(store.id, " "), Err(TrackerError::Validation(_))));
        assert_eq!(db.rename_store(store.id, "b@gmail.com ").unwrap().email, "b@gmail.com");
        assert!(db.find_store_by_email("a@gmail.com").unwrap().is_none());
        assert!(db.find_store_by_email("b@gmail.com").unwrap().is_some());
    }

    #[test]
    fn test_get_or_create_store_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let a = db.get_or_create_store("x@gmail.com").unwrap();
        let b = db.get_or_create_store("x@gmail.com").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.list_stores().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_character_updates_slots() {
        let (db, _, _, account) = seeded();
        let first = db.upsert_character(account.id, "ChamanLuzPVM", CharType::Alchemist, 3).unwrap();
        let second = db.upsert_character(account.id, "ChamanLuzPVM", CharType::Fisherman, 5).unwrap();
        assert_eq!(first.id, second.id);
        let stored = db.get_character(first.id).unwrap();
        assert_eq!(stored.slots, 5);
        assert_eq!(stored.char_type, CharType::Fisherman);
    }

    #[test]
    fn test_update_character_partial() {
        let (db, _, _, account) = seeded();
        let c = db.create_character(account.id, "Pj1", CharType::Alchemist, 1).unwrap();
        let updated = db.update_character(c.id, None, None, Some(4)).unwrap();
        assert_eq!(updated.name, "Pj1");
        assert_eq!(updated.slots, 4);
    }

    #[test]
    fn test_set_character_count_shrinks_and_cascades() {
        let (db, _, _, account) = seeded();
        let keep = db.create_character(account.id, "A", CharType::Alchemist, 1).unwrap();
        let drop1 = db.create_character(account.id, "B", CharType::Alchemist, 1).unwrap();
        let drop2 = db.create_character(account.id, "C", CharType::Fisherman, 1).unwrap();

        db.update_fishing_status(drop2.id, 2025, 3, 1, crate::status::Status::Done)
            .unwrap();

        let (created, deleted) = db.set_character_count(account.id, 1, CharType::Alchemist).unwrap();
        assert_eq!((created, deleted), (0, 2));

        let remaining = db.list_characters(account.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
        assert!(db.get_character(drop1.id).is_err());

        let orphaned: i64 = db
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM fishing_activity WHERE character_id = ?",
                params![drop2.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphaned, 0);
    }

    #[test]
    fn test_set_character_count_grows() {
        let (db, _, _, account) = seeded();
        db.create_character(account.id, "A", CharType::Alchemist, 1).unwrap();
        let (created, deleted) = db.set_character_count(account.id, 3, CharType::Fisherman).unwrap();
        assert_eq!((created, deleted), (2, 0));
        let names: Vec<String> = db
            .list_characters(account.id)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["A", "Fragmetin1-2", "Fragmetin1-3"]);
    }

    #[test]
    fn test_delete_store_cascades() {
        let (db, server, store, account) = seeded();
        db.create_character(account.id, "A", CharType::Alchemist, 1).unwrap();
        db.delete_store(store.id).unwrap();
        assert!(db.list_game_accounts(server.id).unwrap().is_empty());
        assert!(db.list_characters(account.id).unwrap().is_empty());
    }
}
