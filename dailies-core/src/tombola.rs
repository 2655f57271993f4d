//! Tombola events: one ticket status per character and day, plus item tallies.

use crate::activity::{self, DayTable};
use crate::dashboard::{self, Dashboard, Feature};
use crate::database::Database;
use crate::error::Result;
use crate::models::{Counter, Event};
use crate::status::{Status, StatusMap};
use chrono::NaiveDate;

const TABLE: DayTable = DayTable::Tombola;

impl Database {
    pub fn create_tombola_event(
        &self,
        server_id: i64,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Event> {
        let conn = self.connection()?;
        activity::create_event(&conn, TABLE, server_id, name, start_date, end_date)
    }

    pub fn get_tombola_event(&self, event_id: i64) -> Result<Event> {
        let conn = self.connection()?;
        activity::load_event(&conn, TABLE, event_id)
    }

    pub fn list_tombola_events(&self, server_id: i64) -> Result<Vec<Event>> {
        let conn = self.connection()?;
        activity::list_events(&conn, TABLE, server_id)
    }

    pub fn delete_tombola_event(&self, event_id: i64) -> Result<()> {
        let conn = self.connection()?;
        activity::delete_event(&conn, TABLE, event_id)
    }

    pub fn update_tombola_status(
        &self,
        character_id: i64,
        event_id: i64,
        day_index: u32,
        status: Status,
    ) -> Result<()> {
        let mut conn = self.connection()?;
        activity::set_day(&mut conn, TABLE, character_id, event_id, day_index, status)
    }

    pub fn get_tombola_status_map(&self, character_id: i64, event_id: i64) -> Result<StatusMap> {
        let conn = self.connection()?;
        let event = activity::load_event(&conn, TABLE, event_id)?;
        activity::day_status_map(&conn, TABLE, character_id, &event)
    }

    pub fn get_next_pending_tombola_day(&self, character_id: i64, event_id: i64) -> Result<Option<u32>> {
        Ok(self.get_tombola_status_map(character_id, event_id)?.next_pending())
    }

    pub fn mark_tombola_day(
        &self,
        character_id: i64,
        event_id: i64,
        day_index: u32,
        status: Status,
    ) -> Result<Status> {
        let mut conn = self.connection()?;
        activity::advance_day(&mut conn, TABLE, character_id, event_id, day_index, |_| status)
    }

    pub fn cycle_tombola_day(&self, character_id: i64, event_id: i64, day_index: u32) -> Result<Status> {
        let mut conn = self.connection()?;
        activity::advance_day(&mut conn, TABLE, character_id, event_id, day_index, Status::cycle)
    }

    pub fn increment_tombola_item(&self, event_id: i64, item_name: &str, delta: i64) -> Result<i64> {
        let conn = self.connection()?;
        activity::add_to_counter(&conn, TABLE, event_id, item_name, delta)
    }

    pub fn set_tombola_item(&self, event_id: i64, item_name: &str, count: i64) -> Result<()> {
        let conn = self.connection()?;
        activity::set_counter(&conn, TABLE, event_id, item_name, count)
    }

    pub fn list_tombola_items(&self, event_id: i64) -> Result<Vec<Counter>> {
        let conn = self.connection()?;
        activity::list_counters(&conn, TABLE, event_id)
    }

    /// Every character of the server, whatever its type.
    pub fn tombola_dashboard(&self, server_id: i64, event_id: i64) -> Result<Dashboard> {
        let conn = self.connection()?;
        let server = dashboard::require_feature(&conn, server_id, Feature::Tombola)?;
        let event = activity::load_event(&conn, TABLE, event_id)?;
        activity::check_event_server(&event, server_id)?;

        let mut groups = dashboard::load_groups(&conn, server_id, None, event.days())?;
        let statuses = activity::event_status_rows(&conn, TABLE, event_id)?;
        dashboard::overlay_statuses(&mut groups, statuses);

        Ok(Dashboard {
            server,
            title: format!("Tombola: {} ({} - {})", event.name, event.start_date, event.end_date),
            max_index: event.days(),
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::models::{CharType, ServerFeatures};

    fn setup() -> (Database, i64, i64, i64, i64) {
        let db = Database::in_memory().unwrap();
        let server = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let store = db.create_store("t@gmail.com").unwrap();
        let account = db.create_game_account(store.id, server.id, "login").unwrap();
        let alchemist = db.create_character(account.id, "A", CharType::Alchemist, 1).unwrap();
        let fisher = db.create_character(account.id, "F", CharType::Fisherman, 1).unwrap();
        let event = db
            .create_tombola_event(
                server.id,
                "Semana 1",
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            )
            .unwrap();
        (db, server.id, alchemist.id, fisher.id, event.id)
    }

    #[test]
    fn test_tombola_status_flow() {
        let (db, _, a, _, ev) = setup();
        db.update_tombola_status(a, ev, 1, Status::Done).unwrap();
        db.update_tombola_status(a, ev, 1, Status::Done).unwrap();
        assert_eq!(db.get_next_pending_tombola_day(a, ev).unwrap(), Some(2));
        assert!(matches!(
            db.mark_tombola_day(a, ev, 3, Status::Done),
            Err(TrackerError::SequenceViolation { index: 3, previous: 2 })
        ));
        assert_eq!(db.cycle_tombola_day(a, ev, 2).unwrap(), Status::Done);
        assert_eq!(db.mark_tombola_day(a, ev, 3, Status::Failed).unwrap(), Status::Failed);
        assert_eq!(db.get_next_pending_tombola_day(a, ev).unwrap(), None);
    }

    #[test]
    fn test_tombola_items() {
        let (db, _, _, _, ev) = setup();
        db.increment_tombola_item(ev, "Cofre", 1).unwrap();
        db.increment_tombola_item(ev, "Cofre", 1).unwrap();
        db.set_tombola_item(ev, "Anillo", 4).unwrap();
        let items = db.list_tombola_items(ev).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Anillo");
        assert_eq!(items[1].count, 2);

        assert_eq!(db.increment_tombola_item(ev, " Cofre ", 1).unwrap(), 3);
        assert!(matches!(db.set_tombola_item(ev, "  ", 1), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_tombola_dashboard_includes_all_types() {
        let (db, server_id, a, _, ev) = setup();
        db.update_tombola_status(a, ev, 2, Status::Failed).unwrap();
        let dashboard = db.tombola_dashboard(server_id, ev).unwrap();
        assert_eq!(dashboard.character_count(), 2);
        assert_eq!(dashboard.groups[0].accounts[0].characters[0].statuses.render(), ".-.");
    }

    #[test]
    fn test_tombola_event_belongs_to_one_server() {
        let (db, server_id, a, _, ev) = setup();
        let beta = db.create_server("Beta", ServerFeatures::all()).unwrap();
        assert!(matches!(db.tombola_dashboard(beta.id, ev), Err(TrackerError::Validation(_))));
        assert!(db.tombola_dashboard(server_id, ev).is_ok());

        let beta_event = db
            .create_tombola_event(
                beta.id,
                "Beta",
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            )
            .unwrap();
        assert!(matches!(
            db.update_tombola_status(a, beta_event.id, 1, Status::Done),
            Err(TrackerError::Validation(_))
        ));
        assert!(matches!(
            db.mark_tombola_day(a, beta_event.id, 1, Status::Done),
            Err(TrackerError::Validation(_))
        ));
        assert_eq!(db.get_next_pending_tombola_day(a, beta_event.id).unwrap(), Some(1));
    }

    #[test]
    fn test_tombola_events_are_separate_from_alchemy() {
        let (db, server_id, _, _, ev) = setup();
        assert_eq!(db.list_tombola_events(server_id).unwrap().len(), 1);
        assert!(db.list_alchemy_events(server_id).unwrap().is_empty());
        assert!(db.get_alchemy_event(ev).is_err());
        db.delete_tombola_event(ev).unwrap();
        assert!(matches!(db.get_tombola_event(ev), Err(TrackerError::NotFound(_))));
    }
}
