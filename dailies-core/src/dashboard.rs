//! Store -> game account -> character grouping for the per-feature dashboards.

use crate::accounts::load_server;
use crate::error::{Result, TrackerError};
use crate::models::{CharType, Character, GameAccount, Server, StoreAccount};
use crate::status::{Status, StatusMap};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize)]
pub struct CharacterRow {
    pub character: Character,
    pub statuses: StatusMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub account: GameAccount,
    pub characters: Vec<CharacterRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreGroup {
    pub store: StoreAccount,
    pub accounts: Vec<AccountRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub server: Server,
    pub title: String,
    pub max_index: u32,
    pub groups: Vec<StoreGroup>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Feature {
    Dailies,
    Fishing,
    Tombola,
}

impl Feature {
    fn enabled(self, server: &Server) -> bool {
        match self {
            Feature::Dailies => server.features.has_dailies,
            Feature::Fishing => server.features.has_fishing,
            Feature::Tombola => server.features.has_tombola,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Feature::Dailies => "dailies",
            Feature::Fishing => "fishing",
            Feature::Tombola => "tombola",
        }
    }
}

pub(crate) fn require_feature(conn: &Connection, server_id: i64, feature: Feature) -> Result<Server> {
    let server = load_server(conn, server_id)?;
    if !feature.enabled(&server) {
        return Err(TrackerError::FeatureDisabled {
            server: server.name,
            feature: feature.name().to_string(),
        });
    }
    Ok(server)
}

/// One join over stores, game accounts and characters of a server.
///
/// Every status map starts empty with `max_index` slots. Stores without a
/// game account on the server never appear.
pub(crate) fn load_groups(
    conn: &Connection,
    server_id: i64,
    char_type: Option<CharType>,
    max_index: u32,
) -> Result<Vec<StoreGroup>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.email,
                g.id, g.store_account_id, g.server_id, g.username,
                c.id, c.game_account_id, c.name, c.char_type, c.slots
         FROM store_accounts s
         JOIN game_accounts g ON g.store_account_id = s.id
         LEFT JOIN characters c ON c.game_account_id = g.id
              AND (?2 IS NULL OR c.char_type = ?2)
         WHERE g.server_id = ?1
         ORDER BY s.email, g.username, c.id",
    )?;
    let mut rows = stmt.query(params![server_id, char_type])?;

    let mut groups: Vec<StoreGroup> = Vec::new();
    while let Some(row) = rows.next()? {
        let store_id: i64 = row.get(0)?;
        if groups.last().map(|g| g.store.id) != Some(store_id) {
            groups.push(StoreGroup {
                store: StoreAccount {
                    id: store_id,
                    email: row.get(1)?,
                },
                accounts: Vec::new(),
            });
        }
        let Some(group) = groups.last_mut() else {
            continue;
        };

        let account_id: i64 = row.get(2)?;
        if group.accounts.last().map(|a| a.account.id) != Some(account_id) {
            group.accounts.push(AccountRow {
                account: GameAccount {
                    id: account_id,
                    store_account_id: row.get(3)?,
                    server_id: row.get(4)?,
                    username: row.get(5)?,
                },
                characters: Vec::new(),
            });
        }
        let Some(account) = group.accounts.last_mut() else {
            continue;
        };

        let character_id: Option<i64> = row.get(6)?;
        if let Some(id) = character_id {
            account.characters.push(CharacterRow {
                character: Character {
                    id,
                    game_account_id: row.get(7)?,
                    name: row.get(8)?,
                    char_type: row.get(9)?,
                    slots: row.get(10)?,
                },
                statuses: StatusMap::new(max_index),
            });
        }
    }

    Ok(groups)
}

/// Fill each character's status map from a bulk-fetched activity map.
pub(crate) fn overlay_statuses(groups: &mut [StoreGroup], mut statuses: HashMap<i64, Vec<(u32, Status)>>) {
    for row in groups
        .iter_mut()
        .flat_map(|g| g.accounts.iter_mut())
        .flat_map(|a| a.characters.iter_mut())
    {
        if let Some(entries) = statuses.remove(&row.character.id) {
            row.statuses = StatusMap::from_entries(row.statuses.max_index(), entries);
        }
    }
}

impl Dashboard {
    pub fn character_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| &g.accounts)
            .map(|a| a.characters.len())
            .sum()
    }

    /// Plain-text grid: one line per character, one cell per day/week.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} - {} [{}]", self.server.name, self.title, self.max_index);

        let header: String = (1..=self.max_index)
            .map(|i| char::from_digit(i % 10, 10).unwrap_or(' '))
            .collect();
        let _ = writeln!(out, "{:>32} {}", "", header);

        for group in &self.groups {
            let _ = writeln!(out, "{}", group.store.email);
            for account in &group.accounts {
                let _ = writeln!(out, "  {}", account.account.username);
                for row in &account.characters {
                    let progress = row.statuses.progress();
                    let _ = writeln!(
                        out,
                        "    {:<28} {} {}/{}",
                        truncate(&row.character.name, 28),
                        row.statuses.render(),
                        progress.done,
                        self.max_index
                    );
                }
            }
        }
        out
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        name.chars().take(width - 1).chain(std::iter::once('~')).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::ServerFeatures;

    #[test]
    fn test_grouping_filters_by_server() {
        let db = Database::in_memory().unwrap();
        let alpha = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let beta = db.create_server("Beta", ServerFeatures::all()).unwrap();

        let zed = db.create_store("zed@gmail.com").unwrap();
        let amy = db.create_store("amy@gmail.com").unwrap();
        let only_beta = db.create_store("beta-only@gmail.com").unwrap();

        let z1 = db.create_game_account(zed.id, alpha.id, "zlogin").unwrap();
        let a2 = db.create_game_account(amy.id, alpha.id, "bravo").unwrap();
        let a1 = db.create_game_account(amy.id, alpha.id, "alfa").unwrap();
        db.create_game_account(amy.id, beta.id, "elsewhere").unwrap();
        db.create_game_account(only_beta.id, beta.id, "hidden").unwrap();

        db.create_character(a1.id, "Uno", CharType::Alchemist, 1).unwrap();
        db.create_character(a1.id, "Dos", CharType::Fisherman, 1).unwrap();
        db.create_character(a2.id, "Tres", CharType::Alchemist, 1).unwrap();
        db.create_character(z1.id, "Cuatro", CharType::Alchemist, 1).unwrap();

        let conn = db.connection().unwrap();
        let groups = load_groups(&conn, alpha.id, Some(CharType::Alchemist), 5).unwrap();

        let emails: Vec<&str> = groups.iter().map(|g| g.store.email.as_str()).collect();
        assert_eq!(emails, vec!["amy@gmail.com", "zed@gmail.com"]);

        let amy_accounts: Vec<&str> = groups[0]
            .accounts
            .iter()
            .map(|a| a.account.username.as_str())
            .collect();
        assert_eq!(amy_accounts, vec!["alfa", "bravo"]);
        assert_eq!(groups[0].accounts[0].characters.len(), 1);
        assert_eq!(groups[0].accounts[0].characters[0].character.name, "Uno");
        assert!(groups.iter().all(|g| g.accounts.iter().all(|a| a.account.server_id == alpha.id)));
    }

    #[test]
    fn test_account_without_characters_is_listed() {
        let db = Database::in_memory().unwrap();
        let alpha = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let store = db.create_store("x@gmail.com").unwrap();
        db.create_game_account(store.id, alpha.id, "empty").unwrap();

        let conn = db.connection().unwrap();
        let groups = load_groups(&conn, alpha.id, None, 3).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].accounts.len(), 1);
        assert!(groups[0].accounts[0].characters.is_empty());
    }

    #[test]
    fn test_overlay_statuses() {
        let db = Database::in_memory().unwrap();
        let alpha = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let store = db.create_store("x@gmail.com").unwrap();
        let account = db.create_game_account(store.id, alpha.id, "acc").unwrap();
        let c = db.create_character(account.id, "Pj", CharType::Alchemist, 1).unwrap();

        let conn = db.connection().unwrap();
        let mut groups = load_groups(&conn, alpha.id, None, 4).unwrap();
        let mut statuses = HashMap::new();
        statuses.insert(c.id, vec![(1, Status::Done), (2, Status::Failed)]);
        statuses.insert(9999, vec![(1, Status::Done)]);
        overlay_statuses(&mut groups, statuses);

        let map = &groups[0].accounts[0].characters[0].statuses;
        assert_eq!(map.render(), "x-..");
        assert_eq!(map.next_pending(), Some(3));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd~");
    }
}
