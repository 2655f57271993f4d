use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use dailies_core::config::AppConfig;
use dailies_core::database::Database;
use dailies_core::file_utils::find_files_with_extensions;
use dailies_core::fishing::week_of_month;
use dailies_core::importer::{ImportOptions, normalize_email, parse_file};
use dailies_core::models::{CharType, Event, ImportSummary, ImportedStore, ServerFeatures};
use dailies_core::status::{Status, StatusMap};
use dailies_core::timer::{format_elapsed, parse_elapsed};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const IMPORT_EXTENSIONS: [&str; 4] = ["csv", "xlsx", "xlsm", "xls"];

#[derive(Parser)]
#[command(
    name = "dailies",
    version = "0.1.0",
    about = "Track alchemy, fishing and tombola dailies for store accounts and their characters",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, env = "DB_NAME")]
    database: Option<PathBuf>,

    /// Path to TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/dailies.log")]
    log_file: PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage servers and their feature flags
    Server {
        #[command(subcommand)]
        action: ServerCommand,
    },
    /// Manage store accounts (one email each)
    Store {
        #[command(subcommand)]
        action: StoreCommand,
    },
    /// Manage game logins
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Manage characters
    Character {
        #[command(subcommand)]
        action: CharacterCommand,
    },
    /// Alchemy events, daily cor status, counters and cords
    Alchemy {
        #[command(subcommand)]
        action: AlchemyCommand,
    },
    /// Weekly fishing status
    Fishing {
        #[command(subcommand)]
        action: FishingCommand,
    },
    /// Tombola events, ticket status and item tallies
    Tombola {
        #[command(subcommand)]
        action: TombolaCommand,
    },
    /// Import rosters from .csv/.xlsx files or directories
    Import {
        /// Server the imported game accounts belong to
        #[arg(long)]
        server: i64,
        /// Type given to newly created characters (defaults to the config value)
        #[arg(long, value_parser = parse_char_type)]
        char_type: Option<CharType>,
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Quiet mode (0=show messages/warnings, 1=suppress messages, 2=suppress both)
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },
    /// Stopwatch log
    Timer {
        #[command(subcommand)]
        action: TimerCommand,
    },
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Add a server (all features enabled unless disabled)
    Add {
        name: String,
        #[arg(long)]
        no_dailies: bool,
        #[arg(long)]
        no_fishing: bool,
        #[arg(long)]
        no_tombola: bool,
    },
    List,
    /// Toggle feature flags
    Features {
        id: i64,
        #[arg(long)]
        dailies: Option<bool>,
        #[arg(long)]
        fishing: Option<bool>,
        #[arg(long)]
        tombola: Option<bool>,
    },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Add a store; bare tokens get the default email domain
    Add { email: String },
    List,
    Rename { id: i64, email: String },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum AccountCommand {
    Add {
        #[arg(long)]
        store: i64,
        #[arg(long)]
        server: i64,
        username: String,
    },
    List {
        #[arg(long)]
        server: i64,
    },
    /// Grow or shrink a login to exactly COUNT characters
    SetCharacters {
        id: i64,
        count: usize,
        #[arg(long, value_parser = parse_char_type)]
        char_type: Option<CharType>,
        /// Quiet mode (0=show messages/warnings, 1=suppress messages, 2=suppress both)
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum CharacterCommand {
    Add {
        #[arg(long)]
        account: i64,
        name: String,
        #[arg(long, value_parser = parse_char_type, default_value = "alchemist")]
        char_type: CharType,
        #[arg(long, default_value_t = 1)]
        slots: i32,
    },
    List {
        #[arg(long)]
        account: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_char_type)]
        char_type: Option<CharType>,
        #[arg(long)]
        slots: Option<i32>,
    },
    Remove { id: i64 },
}

#[derive(Args)]
struct EventArgs {
    #[arg(long)]
    server: i64,
    #[arg(long)]
    name: String,
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,
    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Args)]
struct DayArgs {
    #[arg(long)]
    character: i64,
    #[arg(long)]
    event: i64,
    /// 1-based event day
    #[arg(long)]
    day: Option<u32>,
    /// Calendar date inside the event (defaults to today when --day is absent)
    #[arg(long, conflicts_with = "day")]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct CharacterEventArgs {
    #[arg(long)]
    character: i64,
    #[arg(long)]
    event: i64,
}

#[derive(Args)]
struct CountArgs {
    #[arg(long)]
    event: i64,
    #[arg(long)]
    name: String,
    /// Add to the current count
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    add: i64,
    /// Overwrite the count instead of adding
    #[arg(long, conflicts_with = "add")]
    set: Option<i64>,
}

#[derive(Subcommand)]
enum AlchemyCommand {
    EventAdd(EventArgs),
    Events {
        #[arg(long)]
        server: i64,
    },
    EventRemove { id: i64 },
    /// Set a day's daily cor status
    Mark {
        #[command(flatten)]
        day: DayArgs,
        #[arg(long, value_parser = parse_status, allow_hyphen_values = true)]
        status: Status,
    },
    /// Advance a day through pending -> done -> failed
    Cycle {
        #[command(flatten)]
        day: DayArgs,
    },
    Next(CharacterEventArgs),
    Status(CharacterEventArgs),
    Counter(CountArgs),
    Counters {
        #[arg(long)]
        event: i64,
    },
    /// Show or set cords per account and day
    Cords {
        #[arg(long)]
        event: i64,
        #[arg(long)]
        account: Option<i64>,
        #[arg(long, requires = "account", requires = "cords")]
        day: Option<u32>,
        #[arg(long, requires = "day")]
        cords: Option<i64>,
    },
    Dashboard {
        #[arg(long)]
        server: i64,
        #[arg(long)]
        event: i64,
    },
}

#[derive(Args)]
struct MonthArgs {
    #[arg(long)]
    character: i64,
    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,
    /// Defaults to the current month
    #[arg(long)]
    month: Option<u32>,
}

#[derive(Subcommand)]
enum FishingCommand {
    Mark {
        #[command(flatten)]
        month: MonthArgs,
        /// Defaults to the current week when year and month are omitted
        #[arg(long)]
        week: Option<u32>,
        #[arg(long, value_parser = parse_status, allow_hyphen_values = true)]
        status: Status,
    },
    Cycle {
        #[command(flatten)]
        month: MonthArgs,
        #[arg(long)]
        week: Option<u32>,
    },
    Next(MonthArgs),
    Status(MonthArgs),
    Dashboard {
        #[arg(long)]
        server: i64,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
}

#[derive(Subcommand)]
enum TombolaCommand {
    EventAdd(EventArgs),
    Events {
        #[arg(long)]
        server: i64,
    },
    EventRemove { id: i64 },
    Mark {
        #[command(flatten)]
        day: DayArgs,
        #[arg(long, value_parser = parse_status, allow_hyphen_values = true)]
        status: Status,
    },
    Cycle {
        #[command(flatten)]
        day: DayArgs,
    },
    Next(CharacterEventArgs),
    Status(CharacterEventArgs),
    Item(CountArgs),
    Items {
        #[arg(long)]
        event: i64,
    },
    Dashboard {
        #[arg(long)]
        server: i64,
        #[arg(long)]
        event: i64,
    },
}

#[derive(Subcommand)]
enum TimerCommand {
    /// Save an elapsed time (HH:MM:SS, MM:SS or seconds)
    Record { name: String, elapsed: String },
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Remove { id: i64 },
}

fn parse_status(s: &str) -> std::result::Result<Status, String> {
    s.parse().map_err(|e: dailies_core::TrackerError| e.to_string())
}

fn parse_char_type(s: &str) -> std::result::Result<CharType, String> {
    s.parse().map_err(|e: dailies_core::TrackerError| e.to_string())
}

fn setup_logging(verbose: u8, log_file: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("dailies.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path).with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(AppConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_status_map(map: &StatusMap, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "statuses": map,
            "progress": map.progress(),
            "next_pending": map.next_pending(),
        }));
    }
    let progress = map.progress();
    println!("{}", map.render());
    println!(
        "done {} / failed {} / pending {}",
        progress.done, progress.failed, progress.pending
    );
    Ok(())
}

fn print_next(next: Option<u32>, unit: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&next);
    }
    match next {
        Some(index) => println!("next pending {}: {}", unit, index),
        None => println!("all {}s settled", unit),
    }
    Ok(())
}

fn print_events(events: &[Event], json: bool) -> Result<()> {
    if json {
        return print_json(&events);
    }
    for event in events {
        println!(
            "{}\t{}\t{} - {}\t{} days",
            event.id,
            event.name,
            event.start_date,
            event.end_date,
            event.days()
        );
    }
    Ok(())
}

/// Explicit day, else the date's position in the event, else today's.
fn resolve_day(event: &Event, day: Option<u32>, date: Option<NaiveDate>) -> Result<u32> {
    if let Some(day) = day {
        return Ok(day);
    }
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    event.day_index(date).ok_or_else(|| {
        anyhow!(
            "{} is outside event '{}' ({} - {}); pass --day",
            date,
            event.name,
            event.start_date,
            event.end_date
        )
    })
}

fn resolve_month(year: Option<i32>, month: Option<u32>) -> (i32, u32) {
    let today = Local::now().date_naive();
    (year.unwrap_or(today.year()), month.unwrap_or(today.month()))
}

fn resolve_week(args: &MonthArgs, week: Option<u32>) -> Result<u32> {
    match week {
        Some(week) => Ok(week),
        None if args.year.is_none() && args.month.is_none() => Ok(week_of_month(Local::now().date_naive())),
        None => bail!("--week is required together with --year/--month"),
    }
}

fn run_server(db: &Database, action: ServerCommand, json: bool) -> Result<()> {
    match action {
        ServerCommand::Add { name, no_dailies, no_fishing, no_tombola } => {
            let features = ServerFeatures {
                has_dailies: !no_dailies,
                has_fishing: !no_fishing,
                has_tombola: !no_tombola,
            };
            let server = db.create_server(&name, features)?;
            info!("Created server {} ({})", server.name, server.id);
            if json {
                print_json(&server)?;
            } else {
                println!("{}", server.id);
            }
        }
        ServerCommand::List => {
            let servers = db.list_servers()?;
            if json {
                return print_json(&servers);
            }
            for s in servers {
                println!(
                    "{}\t{}\tdailies={} fishing={} tombola={}",
                    s.id, s.name, s.features.has_dailies, s.features.has_fishing, s.features.has_tombola
                );
            }
        }
        ServerCommand::Features { id, dailies, fishing, tombola } => {
            let current = db.get_server(id)?.features;
            let features = ServerFeatures {
                has_dailies: dailies.unwrap_or(current.has_dailies),
                has_fishing: fishing.unwrap_or(current.has_fishing),
                has_tombola: tombola.unwrap_or(current.has_tombola),
            };
            let server = db.set_server_features(id, features)?;
            if json {
                print_json(&server)?;
            }
        }
        ServerCommand::Remove { id } => db.delete_server(id)?,
    }
    Ok(())
}

fn run_store(db: &Database, config: &AppConfig, action: StoreCommand, json: bool) -> Result<()> {
    match action {
        StoreCommand::Add { email } => {
            let email = normalize_email(&email, &config.import.default_email_domain);
            let store = db.create_store(&email)?;
            if json {
                print_json(&store)?;
            } else {
                println!("{}", store.id);
            }
        }
        StoreCommand::List => {
            let stores = db.list_stores()?;
            if json {
                return print_json(&stores);
            }
            for store in stores {
                println!("{}\t{}", store.id, store.email);
            }
        }
        StoreCommand::Rename { id, email } => {
            let email = normalize_email(&email, &config.import.default_email_domain);
            let store = db.rename_store(id, &email)?;
            if json {
                print_json(&store)?;
            }
        }
        StoreCommand::Remove { id } => db.delete_store(id)?,
    }
    Ok(())
}

fn run_account(db: &Database, config: &AppConfig, action: AccountCommand, json: bool) -> Result<()> {
    match action {
        AccountCommand::Add { store, server, username } => {
            let account = db.create_game_account(store, server, &username)?;
            if json {
                print_json(&account)?;
            } else {
                println!("{}", account.id);
            }
        }
        AccountCommand::List { server } => {
            let accounts = db.list_game_accounts(server)?;
            if json {
                return print_json(&accounts);
            }
            for account in accounts {
                println!("{}\t{}\tstore={}", account.id, account.username, account.store_account_id);
            }
        }
        AccountCommand::SetCharacters { id, count, char_type, quiet } => {
            let char_type = match char_type {
                Some(t) => t,
                None => config.import.char_type()?,
            };
            let (created, deleted) = db.set_character_count(id, count, char_type)?;
            if quiet == 0 {
                info!("Account {}: {} characters created, {} deleted", id, created, deleted);
            }
            if deleted > 0 && quiet < 2 {
                tracing::warn!("Deleted {} characters and their activity history", deleted);
            }
            if json {
                print_json(&serde_json::json!({ "created": created, "deleted": deleted }))?;
            }
        }
        AccountCommand::Remove { id } => db.delete_game_account(id)?,
    }
    Ok(())
}

fn run_character(db: &Database, action: CharacterCommand, json: bool) -> Result<()> {
    match action {
        CharacterCommand::Add { account, name, char_type, slots } => {
            let character = db.create_character(account, &name, char_type, slots)?;
            if json {
                print_json(&character)?;
            } else {
                println!("{}", character.id);
            }
        }
        CharacterCommand::List { account } => {
            let characters = db.list_characters(account)?;
            if json {
                return print_json(&characters);
            }
            for c in characters {
                println!("{}\t{}\t{}\tslots={}", c.id, c.name, c.char_type, c.slots);
            }
        }
        CharacterCommand::Update { id, name, char_type, slots } => {
            let character = db.update_character(id, name.as_deref(), char_type, slots)?;
            if json {
                print_json(&character)?;
            }
        }
        CharacterCommand::Remove { id } => db.delete_character(id)?,
    }
    Ok(())
}

fn run_alchemy(db: &Database, action: AlchemyCommand, json: bool) -> Result<()> {
    match action {
        AlchemyCommand::EventAdd(args) => {
            let event = db.create_alchemy_event(args.server, &args.name, args.start, args.end)?;
            if json {
                print_json(&event)?;
            } else {
                println!("{}", event.id);
            }
        }
        AlchemyCommand::Events { server } => print_events(&db.list_alchemy_events(server)?, json)?,
        AlchemyCommand::EventRemove { id } => db.delete_alchemy_event(id)?,
        AlchemyCommand::Mark { day, status } => {
            let event = db.get_alchemy_event(day.event)?;
            let index = resolve_day(&event, day.day, day.date)?;
            let status = db.mark_daily_cor_day(day.character, day.event, index, status)?;
            println!("day {}: {}", index, status);
        }
        AlchemyCommand::Cycle { day } => {
            let event = db.get_alchemy_event(day.event)?;
            let index = resolve_day(&event, day.day, day.date)?;
            let status = db.cycle_daily_cor_day(day.character, day.event, index)?;
            println!("day {}: {}", index, status);
        }
        AlchemyCommand::Next(args) => {
            print_next(db.get_next_pending_day(args.character, args.event)?, "day", json)?;
        }
        AlchemyCommand::Status(args) => {
            print_status_map(&db.get_daily_cor_status_map(args.character, args.event)?, json)?;
        }
        AlchemyCommand::Counter(args) => match args.set {
            Some(count) => db.set_alchemy_counter(args.event, &args.name, count)?,
            None => {
                let total = db.increment_alchemy_counter(args.event, &args.name, args.add)?;
                println!("{}: {}", args.name, total);
            }
        },
        AlchemyCommand::Counters { event } => {
            let counters = db.list_alchemy_counters(event)?;
            if json {
                return print_json(&counters);
            }
            for counter in counters {
                println!("{}\t{}", counter.name, counter.count);
            }
        }
        AlchemyCommand::Cords { event, account, day, cords } => {
            if let (Some(account), Some(day), Some(cords)) = (account, day, cords) {
                db.set_daily_cords(event, account, day, cords)?;
            }
            match account {
                Some(account) => {
                    let per_day = db.get_account_cords(event, account)?;
                    if json {
                        return print_json(&per_day);
                    }
                    for (day, cords) in &per_day {
                        println!("day {}\t{}", day, cords);
                    }
                    println!("total\t{}", per_day.values().sum::<i64>());
                }
                None => {
                    let records = db.list_daily_cor_records(event)?;
                    let total = db.total_event_cords(event)?;
                    if json {
                        return print_json(&serde_json::json!({ "records": records, "total": total }));
                    }
                    for r in &records {
                        println!("account {}\tday {}\t{}", r.game_account_id, r.day_index, r.cords);
                    }
                    println!("total\t{}", total);
                }
            }
        }
        AlchemyCommand::Dashboard { server, event } => {
            let dashboard = db.alchemy_dashboard(server, event)?;
            if json {
                return print_json(&dashboard);
            }
            print!("{}", dashboard.render_text());
        }
    }
    Ok(())
}

fn run_fishing(db: &Database, action: FishingCommand, json: bool) -> Result<()> {
    match action {
        FishingCommand::Mark { month, week, status } => {
            let week = resolve_week(&month, week)?;
            let (y, m) = resolve_month(month.year, month.month);
            let status = db.mark_fishing_week(month.character, y, m, week, status)?;
            println!("{}-{:02} week {}: {}", y, m, week, status);
        }
        FishingCommand::Cycle { month, week } => {
            let week = resolve_week(&month, week)?;
            let (y, m) = resolve_month(month.year, month.month);
            let status = db.cycle_fishing_week(month.character, y, m, week)?;
            println!("{}-{:02} week {}: {}", y, m, week, status);
        }
        FishingCommand::Next(args) => {
            let (y, m) = resolve_month(args.year, args.month);
            print_next(db.get_next_pending_week(args.character, y, m)?, "week", json)?;
        }
        FishingCommand::Status(args) => {
            let (y, m) = resolve_month(args.year, args.month);
            print_status_map(&db.get_fishing_status_map(args.character, y, m)?, json)?;
        }
        FishingCommand::Dashboard { server, year, month } => {
            let (y, m) = resolve_month(year, month);
            let dashboard = db.fishing_dashboard(server, y, m)?;
            if json {
                return print_json(&dashboard);
            }
            print!("{}", dashboard.render_text());
        }
    }
    Ok(())
}

fn run_tombola(db: &Database, action: TombolaCommand, json: bool) -> Result<()> {
    match action {
        TombolaCommand::EventAdd(args) => {
            let event = db.create_tombola_event(args.server, &args.name, args.start, args.end)?;
            if json {
                print_json(&event)?;
            } else {
                println!("{}", event.id);
            }
        }
        TombolaCommand::Events { server } => print_events(&db.list_tombola_events(server)?, json)?,
        TombolaCommand::EventRemove { id } => db.delete_tombola_event(id)?,
        TombolaCommand::Mark { day, status } => {
            let event = db.get_tombola_event(day.event)?;
            let index = resolve_day(&event, day.day, day.date)?;
            let status = db.mark_tombola_day(day.character, day.event, index, status)?;
            println!("day {}: {}", index, status);
        }
        TombolaCommand::Cycle { day } => {
            let event = db.get_tombola_event(day.event)?;
            let index = resolve_day(&event, day.day, day.date)?;
            let status = db.cycle_tombola_day(day.character, day.event, index)?;
            println!("day {}: {}", index, status);
        }
        TombolaCommand::Next(args) => {
            print_next(db.get_next_pending_tombola_day(args.character, args.event)?, "day", json)?;
        }
        TombolaCommand::Status(args) => {
            print_status_map(&db.get_tombola_status_map(args.character, args.event)?, json)?;
        }
        TombolaCommand::Item(args) => match args.set {
            Some(count) => db.set_tombola_item(args.event, &args.name, count)?,
            None => {
                let total = db.increment_tombola_item(args.event, &args.name, args.add)?;
                println!("{}: {}", args.name, total);
            }
        },
        TombolaCommand::Items { event } => {
            let items = db.list_tombola_items(event)?;
            if json {
                return print_json(&items);
            }
            for item in items {
                println!("{}\t{}", item.name, item.count);
            }
        }
        TombolaCommand::Dashboard { server, event } => {
            let dashboard = db.tombola_dashboard(server, event)?;
            if json {
                return print_json(&dashboard);
            }
            print!("{}", dashboard.render_text());
        }
    }
    Ok(())
}

fn run_timer(db: &Database, action: TimerCommand, json: bool) -> Result<()> {
    match action {
        TimerCommand::Record { name, elapsed } => {
            let seconds = parse_elapsed(&elapsed)?;
            let record = db.record_timer(&name, seconds)?;
            if json {
                print_json(&record)?;
            } else {
                println!("{}", record.id);
            }
        }
        TimerCommand::List { limit } => {
            let timers = db.list_timers(limit)?;
            if json {
                return print_json(&timers);
            }
            for t in timers {
                println!(
                    "{}\t{}\t{}\t{}",
                    t.id,
                    t.created_at.format("%Y-%m-%d %H:%M"),
                    format_elapsed(t.elapsed_seconds),
                    t.name
                );
            }
        }
        TimerCommand::Remove { id } => db.delete_timer(id)?,
    }
    Ok(())
}

fn collect_import_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(find_files_with_extensions(path, &IMPORT_EXTENSIONS)?);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            bail!("Import path not found: {:?}", path);
        }
    }
    Ok(files)
}

#[derive(Debug, Default)]
struct ImportReport {
    summary: ImportSummary,
    files_failed: usize,
    stores_failed: usize,
}

/// Write parsed stores one by one. A file counts as failed when it did not
/// parse or when none of its stores could be imported.
fn import_parsed<F>(
    parsed: Vec<(PathBuf, dailies_core::Result<Vec<ImportedStore>>)>,
    quiet: u8,
    mut import: F,
) -> ImportReport
where
    F: FnMut(&ImportedStore) -> dailies_core::Result<ImportSummary>,
{
    let mut report = ImportReport::default();
    for (path, result) in parsed {
        let stores = match result {
            Ok(stores) => stores,
            Err(e) => {
                if quiet < 2 {
                    tracing::warn!("Failed to parse {:?}: {}", path, e);
                }
                report.files_failed += 1;
                continue;
            }
        };
        let mut imported = 0;
        for store in &stores {
            match import(store) {
                Ok(s) => {
                    report.summary.merge(&s);
                    imported += 1;
                }
                Err(e) => {
                    if quiet < 2 {
                        tracing::warn!("Failed to import {} from {:?}: {}", store.email, path, e);
                    }
                    report.stores_failed += 1;
                }
            }
        }
        if imported == 0 {
            if quiet < 2 {
                tracing::warn!("Nothing imported from {:?}", path);
            }
            report.files_failed += 1;
        }
    }
    report
}

fn run_import(
    db: &Database,
    config: &AppConfig,
    server: i64,
    char_type: Option<CharType>,
    paths: &[PathBuf],
    quiet: u8,
) -> Result<ImportSummary> {
    // Fail before parsing anything if the server is unknown
    db.get_server(server)?;
    let char_type = match char_type {
        Some(t) => t,
        None => config.import.char_type()?,
    };
    let options = ImportOptions::from(&config.import);

    let files = collect_import_files(paths)?;
    if quiet == 0 {
        info!("Found {} files to import", files.len());
    }

    // Parse all files in parallel, write sequentially
    let parsed: Vec<(PathBuf, dailies_core::Result<Vec<ImportedStore>>)> = files
        .par_iter()
        .map(|path| (path.clone(), parse_file(path, &options)))
        .collect();

    let report = import_parsed(parsed, quiet, |store| db.import_store(server, store, char_type));
    let summary = report.summary;

    if quiet == 0 {
        info!("--- Summary ---");
        info!("Stores created: {}", summary.stores_created);
        info!("Accounts created: {}", summary.accounts_created);
        info!("Characters created: {}", summary.characters_created);
        info!("Characters updated: {}", summary.characters_updated);
        info!("Failed files: {}", report.files_failed);
        info!("Failed stores: {}", report.stores_failed);
    }
    if !files.is_empty() && report.files_failed == files.len() {
        bail!("No file could be imported");
    }
    Ok(summary)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting dailies CLI");

    let config = load_config(cli.config.as_deref())?;
    let db_path = cli.database.clone().unwrap_or_else(|| config.database.path.clone());
    let db = Database::with_pool_size(&db_path, config.database.pool_size)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    let json = cli.json;

    match cli.command {
        Commands::Server { action } => run_server(&db, action, json)?,
        Commands::Store { action } => run_store(&db, &config, action, json)?,
        Commands::Account { action } => run_account(&db, &config, action, json)?,
        Commands::Character { action } => run_character(&db, action, json)?,
        Commands::Alchemy { action } => run_alchemy(&db, action, json)?,
        Commands::Fishing { action } => run_fishing(&db, action, json)?,
        Commands::Tombola { action } => run_tombola(&db, action, json)?,
        Commands::Import { server, char_type, paths, quiet } => {
            let summary = run_import(&db, &config, server, char_type, &paths, quiet)?;
            if json {
                print_json(&summary)?;
            }
        }
        Commands::Timer { action } => run_timer(&db, action, json)?,
    }

    info!("Dailies CLI finished");
    Ok(())
}
