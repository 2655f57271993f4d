//! Roster import from `.csv` and `.xlsx` sheets.
//!
//! Sheets follow a loose two-row header convention:
//! ```text
//! owner.token                     <- store email (or a bare token)
//!              Cantidad   Pj      <- header row
//! Fragmetin1   5          ChamanLuzPVM
//!              3          OtroPj  <- empty account cell: same login as above
//! ```
//! The header row is located by keyword within the first rows of the sheet,
//! and the store email is the first nearby cell that is neither a header,
//! a date nor a number.

use crate::accounts::{get_or_create_game_account_in, get_or_create_store_in, load_server};
use crate::config::ImportConfig;
use crate::database::Database;
use crate::error::{Result, TrackerError};
use crate::file_utils::{decode_text, read_text_lossy_latin1};
use crate::models::{CharType, ImportSummary, ImportedCharacter, ImportedStore};
use calamine::{Data, Reader, open_workbook_auto};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{OptionalExtension, params};
use std::path::Path;

lazy_static! {
    static ref DATE_LIKE: Regex =
        Regex::new(r"^\s*(\d{1,4}[/\-.]\d{1,2}[/\-.]\d{1,4}|\d{4}-\d{2}-\d{2}T)").unwrap();
}

const SLOT_KEYWORDS: [&str; 2] = ["cantidad", "fragmentos"];
const ACCOUNT_KEYWORDS: [&str; 3] = ["cuenta", "account", "usuario"];
const NAME_KEYWORDS: [&str; 2] = ["personaje", "nombre"];

/// One spreadsheet cell, reduced to what the layout sniffer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(String),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display form; whole numbers print without a fraction.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Date(s) => s.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(n.round() as i32),
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i32>()
                    .ok()
                    .or_else(|| s.replace(',', ".").parse::<f64>().ok().map(|n| n.round() as i32))
            }
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        match self {
            Cell::Number(_) => true,
            Cell::Text(s) => s.trim().replace(',', ".").parse::<f64>().is_ok(),
            _ => false,
        }
    }

    fn is_date_like(&self) -> bool {
        match self {
            Cell::Date(_) => true,
            Cell::Text(s) => DATE_LIKE.is_match(s),
            _ => false,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::text(s),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Date(dt.as_f64().to_string()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Date(s.clone()),
        }
    }
}

/// Knobs for [`parse_sheet`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub header_scan_rows: usize,
    pub email_domain: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            email_domain: "gmail.com".to_string(),
        }
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            header_scan_rows: config.header_scan_rows,
            email_domain: config.default_email_domain.clone(),
        }
    }
}

/// Bare tokens get `@<domain>` appended; anything with an `@` is kept as is.
pub fn normalize_email(token: &str, domain: &str) -> String {
    let token = token.trim();
    if token.contains('@') {
        token.to_string()
    } else {
        format!("{}@{}", token, domain)
    }
}

fn lower(cell: &Cell) -> String {
    cell.display().to_lowercase()
}

fn is_slots_header(cell: &Cell) -> bool {
    let text = lower(cell);
    SLOT_KEYWORDS.iter().any(|k| text.contains(*k))
}

fn is_name_header(cell: &Cell) -> bool {
    let text = lower(cell);
    text.starts_with("pj") || NAME_KEYWORDS.iter().any(|k| text.contains(*k))
}

/// A header repeated further down the sheet. Character names may start with
/// "pj" too, so only a bare header word in the name column counts.
fn is_repeated_header(row: &[Cell], layout: &Layout) -> bool {
    let slots_header = row.get(layout.slots_col).is_some_and(is_slots_header);
    let bare_name_header = row.get(layout.name_col).is_some_and(|cell| {
        let text = lower(cell);
        let word = text.trim_matches(|c: char| !c.is_alphanumeric());
        matches!(word, "pj" | "pjs" | "personaje" | "personajes" | "nombre")
    });
    slots_header || bare_name_header
}

fn is_account_header(cell: &Cell) -> bool {
    let text = lower(cell);
    ACCOUNT_KEYWORDS.iter().any(|k| text.contains(*k))
}

fn is_header_keyword(cell: &Cell) -> bool {
    is_slots_header(cell) || is_name_header(cell) || is_account_header(cell)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    header_row: usize,
    slots_col: usize,
    name_col: usize,
    account_col: Option<usize>,
}

fn detect_layout(rows: &[Vec<Cell>], scan_rows: usize) -> Result<Layout> {
    for (row_idx, row) in rows.iter().take(scan_rows).enumerate() {
        let slots = row.iter().position(is_slots_header);
        let name = row.iter().position(is_name_header);
        if slots.is_none() && name.is_none() {
            continue;
        }

        let (slots_col, name_col) = match (slots, name) {
            (Some(s), Some(n)) => (s, n),
            (Some(s), None) => (s, s + 1),
            (None, Some(n)) if n > 0 => (n - 1, n),
            _ => {
                return Err(TrackerError::MissingField(format!(
                    "slots column next to the name header on row {}",
                    row_idx + 1
                )));
            }
        };

        let account_col = row
            .iter()
            .enumerate()
            .position(|(i, cell)| i != slots_col && i != name_col && is_account_header(cell))
            .or_else(|| slots_col.checked_sub(1).filter(|&c| c != name_col));

        return Ok(Layout {
            header_row: row_idx,
            slots_col,
            name_col,
            account_col,
        });
    }

    Err(TrackerError::MissingField(format!(
        "header row with 'Cantidad', 'Fragmentos' or 'Pj' in the first {} rows",
        scan_rows
    )))
}

fn detect_store_token(rows: &[Vec<Cell>], layout: &Layout) -> Option<String> {
    rows.iter()
        .take(layout.header_row + 1)
        .flat_map(|row| row.iter())
        .find(|cell| {
            !cell.is_empty() && !cell.is_numeric() && !cell.is_date_like() && !is_header_keyword(cell)
        })
        .map(Cell::display)
}

/// Turn one sheet into a store with its characters.
///
/// `fallback_identifier` (file stem or sheet name) stands in for the email
/// when no candidate cell is found above the header.
pub fn parse_sheet(
    rows: &[Vec<Cell>],
    options: &ImportOptions,
    fallback_identifier: Option<&str>,
) -> Result<ImportedStore> {
    let layout = detect_layout(rows, options.header_scan_rows)?;
    tracing::debug!("Detected sheet layout {:?}", layout);

    let token = detect_store_token(rows, &layout)
        .or_else(|| fallback_identifier.map(str::to_string))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TrackerError::MissingField("store email".to_string()))?;
    let email = normalize_email(&token, &options.email_domain);
    let default_account = email.split('@').next().unwrap_or(&email).to_string();

    let empty = Cell::Empty;
    let mut characters = Vec::new();
    let mut last_account: Option<String> = None;

    for row in rows.iter().skip(layout.header_row + 1) {
        let name_cell = row.get(layout.name_col).unwrap_or(&empty);
        let name = name_cell.display();
        if name.is_empty() || is_repeated_header(row, &layout) {
            continue;
        }

        let account_cell = layout.account_col.and_then(|c| row.get(c)).unwrap_or(&empty);
        let account_name = if account_cell.is_empty() {
            last_account.clone().unwrap_or_else(|| default_account.clone())
        } else {
            account_cell.display()
        };
        last_account = Some(account_name.clone());

        let slots_cell = row.get(layout.slots_col).unwrap_or(&empty);
        let slots = slots_cell.as_int().unwrap_or_else(|| {
            if !slots_cell.is_empty() {
                tracing::warn!("Unreadable slot count '{}' for {}, using 0", slots_cell.display(), name);
            }
            0
        });

        characters.push(ImportedCharacter {
            name,
            slots,
            account_name,
        });
    }

    Ok(ImportedStore { email, characters })
}

fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let semicolons = first.matches(';').count();
    let commas = first.matches(',').count();
    let tabs = first.matches('\t').count();
    if tabs > semicolons && tabs > commas {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Parse CSV text into rows of cells. The delimiter (`,` `;` or tab) is
/// taken from the first non-empty line.
pub fn csv_rows(text: &str) -> Result<Vec<Vec<Cell>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    Ok(rows)
}

pub fn read_csv(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let text = read_text_lossy_latin1(path)?;
    csv_rows(&text)
}

pub fn read_csv_bytes(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    csv_rows(&decode_text(bytes))
}

/// Every worksheet as `(sheet name, rows)`.
pub fn read_xlsx(path: &Path) -> Result<Vec<(String, Vec<Vec<Cell>>)>> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();
        sheets.push((name, rows));
    }
    Ok(sheets)
}

fn is_default_sheet_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    ["sheet", "hoja", "feuille", "tabelle"].iter().any(|prefix| {
        lower
            .strip_prefix(*prefix)
            .is_some_and(|rest| rest.trim().chars().all(|c| c.is_ascii_digit()))
    })
}

/// Parse an import file into one store per usable sheet.
pub fn parse_file(path: &Path, options: &ImportOptions) -> Result<Vec<ImportedStore>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let stem = path.file_stem().and_then(|s| s.to_str());

    match ext.as_str() {
        "csv" | "txt" => {
            let rows = read_csv(path)?;
            Ok(vec![parse_sheet(&rows, options, stem)?])
        }
        "xlsx" | "xlsm" | "xls" | "ods" => {
            let mut stores = Vec::new();
            let mut last_error = None;
            for (sheet_name, rows) in read_xlsx(path)? {
                if rows.iter().all(|row| row.iter().all(Cell::is_empty)) {
                    continue;
                }
                let fallback = if is_default_sheet_name(&sheet_name) {
                    stem
                } else {
                    Some(sheet_name.as_str())
                };
                match parse_sheet(&rows, options, fallback) {
                    Ok(store) => stores.push(store),
                    Err(e) => {
                        tracing::warn!("Skipping sheet '{}' of {}: {}", sheet_name, path.display(), e);
                        last_error = Some(e);
                    }
                }
            }
            match (stores.is_empty(), last_error) {
                (true, Some(e)) => Err(e),
                _ => Ok(stores),
            }
        }
        other => Err(TrackerError::InvalidFileFormat(format!(
            "Unsupported import extension '{}' for {}",
            other,
            path.display()
        ))),
    }
}

impl Database {
    /// Upsert one imported store with its game accounts and characters.
    ///
    /// New characters get `default_type`; existing ones keep their type and
    /// only have their slot count refreshed. The whole store is written in one
    /// transaction.
    pub fn import_store(&self, server_id: i64, store: &ImportedStore, default_type: CharType) -> Result<ImportSummary> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        load_server(&tx, server_id)?;

        let mut summary = ImportSummary::default();
        let (store_row, created) = get_or_create_store_in(&tx, &store.email)?;
        if created {
            summary.stores_created += 1;
        }

        for entry in &store.characters {
            let (account, created) = get_or_create_game_account_in(&tx, store_row.id, server_id, &entry.account_name)?;
            if created {
                summary.accounts_created += 1;
            }

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM characters WHERE game_account_id = ? AND name = ?",
                    params![account.id, entry.name],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute("UPDATE characters SET slots = ? WHERE id = ?", params![entry.slots, id])?;
                    summary.characters_updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO characters (game_account_id, name, char_type, slots) VALUES (?, ?, ?, ?)",
                        params![account.id, entry.name, default_type, entry.slots],
                    )?;
                    summary.characters_created += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            "Imported {}: {} accounts created, {} characters created, {} updated",
            store.email,
            summary.accounts_created,
            summary.characters_created,
            summary.characters_updated
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerFeatures;

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("fragmetin", "gmail.com"), "fragmetin@gmail.com");
        assert_eq!(normalize_email("  Someone@Outlook.es ", "gmail.com"), "Someone@Outlook.es");
    }

    #[test]
    fn test_parse_basic_sheet() {
        let rows = vec![
            vec![Cell::Empty, t("Cantidad"), t("Pj")],
            vec![t("Fragmetin1"), Cell::Number(5.0), t("ChamanLuzPVM")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), Some("owner")).unwrap();
        assert_eq!(store.email, "owner@gmail.com");
        assert_eq!(
            store.characters,
            vec![ImportedCharacter {
                name: "ChamanLuzPVM".to_string(),
                slots: 5,
                account_name: "Fragmetin1".to_string(),
            }]
        );
    }

    #[test]
    fn test_email_detection_skips_dates_and_headers() {
        let rows = vec![
            vec![t("12/03/2025"), t("tienda.norte")],
            vec![t("Cuenta"), t("Fragmentos"), t("Pj")],
            vec![t("login1"), t("3"), t("Uno")],
            vec![Cell::Empty, t("2"), t("Dos")],
            vec![t("login2"), t("x"), t("Tres")],
            vec![t("login2"), t("1"), Cell::Empty],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), Some("ignored")).unwrap();
        assert_eq!(store.email, "tienda.norte@gmail.com");
        assert_eq!(store.characters.len(), 3);
        assert_eq!(store.characters[1].account_name, "login1");
        assert_eq!(store.characters[1].slots, 2);
        assert_eq!(store.characters[2].slots, 0);
    }

    #[test]
    fn test_email_with_at_is_verbatim() {
        let rows = vec![
            vec![t("Mixed.Case@hotmail.com")],
            vec![Cell::Empty, t("Cantidad"), t("Pj")],
            vec![t("acc"), Cell::Number(1.0), t("Pj1")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        assert_eq!(store.email, "Mixed.Case@hotmail.com");
    }

    #[test]
    fn test_missing_header() {
        let rows = vec![vec![t("nothing"), t("here")]];
        assert!(matches!(
            parse_sheet(&rows, &ImportOptions::default(), Some("x")),
            Err(TrackerError::MissingField(_))
        ));
    }

    #[test]
    fn test_header_beyond_scan_window() {
        let mut rows: Vec<Vec<Cell>> = (0..10).map(|_| vec![Cell::Empty]).collect();
        rows.push(vec![Cell::Empty, t("Cantidad"), t("Pj")]);
        assert!(parse_sheet(&rows, &ImportOptions::default(), Some("x")).is_err());

        let options = ImportOptions {
            header_scan_rows: 20,
            ..ImportOptions::default()
        };
        assert!(parse_sheet(&rows, &options, Some("x")).is_ok());
    }

    #[test]
    fn test_missing_email_without_fallback() {
        let rows = vec![
            vec![Cell::Empty, t("Cantidad"), t("Pj")],
            vec![t("acc"), Cell::Number(1.0), t("Pj1")],
        ];
        assert!(matches!(
            parse_sheet(&rows, &ImportOptions::default(), None),
            Err(TrackerError::MissingField(_))
        ));
    }

    #[test]
    fn test_name_only_header_infers_slots_column() {
        let rows = vec![
            vec![t("store")],
            vec![t("Cuenta"), Cell::Empty, t("PJ")],
            vec![t("acc"), t("4"), t("Pj1")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        assert_eq!(store.characters[0].slots, 4);
        assert_eq!(store.characters[0].account_name, "acc");
    }

    #[test]
    fn test_name_header_with_punctuation() {
        let rows = vec![
            vec![t("store")],
            vec![t("Cuenta"), Cell::Empty, t("PJ:")],
            vec![t("acc"), t("4"), t("Uno")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        assert_eq!(store.email, "store@gmail.com");
        assert_eq!(store.characters.len(), 1);
        assert_eq!(store.characters[0].name, "Uno");
        assert_eq!(store.characters[0].slots, 4);
    }

    #[test]
    fn test_repeated_header_rows_are_skipped() {
        let rows = vec![
            vec![t("store")],
            vec![t("Cuenta"), t("Cantidad"), t("Pjs.")],
            vec![t("acc"), t("2"), t("PjMago")],
            vec![t("Cuenta"), t("Cantidad"), t("Pjs.")],
            vec![t("acc"), t("1"), t("Otro")],
            vec![Cell::Empty, Cell::Empty, t("PJ")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        let names: Vec<&str> = store.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["PjMago", "Otro"]);
    }

    #[test]
    fn test_no_account_column_uses_email_local_part() {
        let rows = vec![
            vec![t("owner")],
            vec![t("Pj"), t("Cantidad")],
            vec![t("Solo"), t("2")],
        ];
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        assert_eq!(store.characters[0].account_name, "owner");
        assert_eq!(store.characters[0].slots, 2);
    }

    #[test]
    fn test_csv_semicolon_and_latin1() {
        let bytes = b"due\xF1o.tienda;;\n;Cantidad;Pj\nFragmetin1;5;ChamanLuzPVM\n";
        let rows = read_csv_bytes(bytes).unwrap();
        let store = parse_sheet(&rows, &ImportOptions::default(), None).unwrap();
        assert_eq!(store.email, "dueño.tienda@gmail.com");
        assert_eq!(store.characters[0].slots, 5);
        assert_eq!(store.characters[0].account_name, "Fragmetin1");
    }

    #[test]
    fn test_cell_helpers() {
        assert_eq!(Cell::Number(5.0).display(), "5");
        assert_eq!(Cell::Number(2.5).display(), "2.5");
        assert_eq!(t("3,0").as_int(), Some(3));
        assert_eq!(t("abc").as_int(), None);
        assert!(t("2025-01-01").is_date_like());
        assert!(!t("tienda").is_date_like());
        assert!(is_default_sheet_name("Hoja1"));
        assert!(is_default_sheet_name("Sheet 2"));
        assert!(!is_default_sheet_name("cliente@gmail.com"));
    }

    #[test]
    fn test_parse_csv_file_uses_stem_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cliente.uno.csv");
        std::fs::write(&path, ",Cantidad,Pj\nFragmetin1,5,ChamanLuzPVM\n").unwrap();
        let stores = parse_file(&path, &ImportOptions::default()).unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].email, "cliente.uno@gmail.com");

        let bad = dir.path().join("roster.pdf");
        std::fs::write(&bad, "x").unwrap();
        assert!(matches!(
            parse_file(&bad, &ImportOptions::default()),
            Err(TrackerError::InvalidFileFormat(_))
        ));
    }

    #[test]
    fn test_import_store_upserts() {
        let db = Database::in_memory().unwrap();
        let server = db.create_server("Alpha", ServerFeatures::all()).unwrap();
        let store = ImportedStore {
            email: "owner@gmail.com".to_string(),
            characters: vec![
                ImportedCharacter {
                    name: "Uno".to_string(),
                    slots: 5,
                    account_name: "login1".to_string(),
                },
                ImportedCharacter {
                    name: "Dos".to_string(),
                    slots: 2,
                    account_name: "login1".to_string(),
                },
                ImportedCharacter {
                    name: "Tres".to_string(),
                    slots: 1,
                    account_name: "login2".to_string(),
                },
            ],
        };

        let first = db.import_store(server.id, &store, CharType::Alchemist).unwrap();
        assert_eq!(first.stores_created, 1);
        assert_eq!(first.accounts_created, 2);
        assert_eq!(first.characters_created, 3);

        let mut again = store.clone();
        again.characters[0].slots = 7;
        let second = db.import_store(server.id, &again, CharType::Fisherman).unwrap();
        assert_eq!(second.stores_created, 0);
        assert_eq!(second.accounts_created, 0);
        assert_eq!(second.characters_created, 0);
        assert_eq!(second.characters_updated, 3);

        let accounts = db.list_game_accounts(server.id).unwrap();
        assert_eq!(accounts.len(), 2);
        let chars = db.list_characters(accounts[0].id).unwrap();
        assert_eq!(chars[0].name, "Uno");
        assert_eq!(chars[0].slots, 7);
        assert_eq!(chars[0].char_type, CharType::Alchemist);
    }

    #[test]
    fn test_import_store_unknown_server() {
        let db = Database::in_memory().unwrap();
        let store = ImportedStore {
            email: "x@gmail.com".to_string(),
            characters: vec![],
        };
        assert!(matches!(
            db.import_store(42, &store, CharType::Alchemist),
            Err(TrackerError::NotFound(_))
        ));
        assert!(db.list_stores().unwrap().is_empty());
    }
}
