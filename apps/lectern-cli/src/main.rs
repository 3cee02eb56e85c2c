//! # Lectern CLI
//!
//! Command-line front end for the Lectern dashboard engine.
//!
//! - `demo` drives four in-memory feeds through a scripted morning at the
//!   library and shows the aggregate after each step.
//! - `reduce` folds a directory of fixture files once and prints the result.
//! - `stats` runs the cached on-demand queries against the same fixtures.
//!
//! A fixture directory holds up to four files. Missing files read as an
//! empty collection or a missing document.
//!
//! ```text
//! catalog.json   { "<id>": { ...book... }, ... }   or  [ {"id": .., "data": ..}, ... ]
//! members.json   same layout as catalog.json
//! config.json    the settings document
//! archive.json   the archive document ({"tableauArchives": [...]})
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use colored::*;
use lectern_core::settings::DayHours;
use lectern_sdk::prelude::*;
use lectern_sdk::{Clock, CollectionNames, FixedClock, OrgSettings, Result, SystemClock};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Live statistics for library dashboards")]
#[command(version)]
struct Cli {
    /// Engine configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scripted walk-through: feeds attach, update, fail and detach
    Demo,
    /// Fold a fixture directory once and print the dashboard statistics
    Reduce {
        /// Directory holding catalog.json, members.json, config.json, archive.json
        #[arg(long, default_value = "apps/lectern-cli/fixtures")]
        dir: PathBuf,
        /// Reference instant (RFC 3339). Defaults to the local clock.
        #[arg(long)]
        now: Option<String>,
        /// Print the statistics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run the cached on-demand statistics queries against a fixture directory
    Stats {
        #[arg(long, default_value = "apps/lectern-cli/fixtures")]
        dir: PathBuf,
        #[arg(long)]
        now: Option<String>,
    },
}

// ─── Pretty printing ──────────────────────────────────────────────────────

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn push_arrow(feed: &str, what: &str) {
    println!(
        "  {} {} {}",
        feed.bright_magenta(),
        "──snapshot──▶".bright_cyan(),
        what
    );
}

fn show_stats(stats: &DashboardStats) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    println!("  │ {:^54} │", "Dashboard".bright_yellow().to_string());
    println!("  ├{}┤", border);

    let rows = [
        ("Books", stats.total_books.to_string()),
        (
            "Copies (available / initial)",
            format!("{} / {}", stats.available_exemplaires, stats.total_exemplaires),
        ),
        ("Members", stats.total_users.to_string()),
        ("Active loans", stats.active_loans.to_string()),
        ("Overdue loans", stats.overdue_loans.to_string()),
        ("Suspended members", stats.suspended_users.to_string()),
        ("Loans this month", stats.monthly_loans.to_string()),
        ("Rotation rate", format!("{:.1} %", stats.rotation_rate)),
    ];
    for (label, value) in rows {
        println!("  │ {:<34}{:>20} │", label, value);
    }

    println!("  ├{}┤", border);
    let week: Vec<String> = WEEKDAYS
        .iter()
        .zip(stats.recent_activity.iter())
        .map(|(day, n)| format!("{day}:{n}"))
        .collect();
    println!("  │ {:<54} │", week.join(" "));

    if !stats.popular_categories.is_empty() {
        println!("  ├{}┤", border);
        for c in &stats.popular_categories {
            let line = format!("{:<30}{:>8} {:>4} %", c.name, c.count, c.percentage);
            println!("  │ {:<54} │", line);
        }
    }

    if !stats.top_borrowed_books.is_empty() {
        println!("  ├{}┤", border);
        for (rank, b) in stats.top_borrowed_books.iter().enumerate() {
            let line = format!("{}. {} ({})", rank + 1, b.title, b.category);
            println!("  │ {:<46}{:>8} │", truncate(&line, 46), b.count);
        }
    }
    println!("  └{}┘", border);
}

fn show_settings(settings: &OrgSettings) {
    if settings.is_empty() {
        step(&"no organization settings".dimmed().to_string());
        return;
    }
    step(&format!("name: {}", settings.name().unwrap_or("-")));
    if let Some(max) = settings.maximum_simultaneous_loans() {
        step(&format!("max simultaneous loans: {max}"));
    }
    if let Some(days) = settings.default_loan_duration() {
        step(&format!("default loan duration: {days} days"));
    }
    if settings.maintenance_mode() {
        step(&"maintenance mode is ON".bright_red().to_string());
    }
    for (day, hours) in settings.opening_hours() {
        match hours {
            DayHours::Open { open, close } => step(&format!("{day}: {open}-{close}")),
            DayHours::Closed => step(&format!("{day}: {}", "closed".dimmed())),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn describe(event: &DashboardEvent) -> String {
    match event {
        DashboardEvent::Updated {
            source, revision, ..
        } => format!("{} {source} @{revision}", "updated".bright_green()),
        DashboardEvent::FeedFailed { source, error } => {
            format!("{} {source}: {error}", "failed".bright_red())
        }
        DashboardEvent::Loaded => "loaded".bright_cyan().to_string(),
        DashboardEvent::Detached { source } => format!("{} {source}", "detached".yellow()),
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────

fn read_json(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        warn!(path = %path.display(), "fixture not found");
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(serde_json::from_str(&text)?))
}

fn load_collection(path: &Path) -> Result<Vec<Document>> {
    match read_json(path)? {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .into_iter()
            .map(|(id, data)| Document::new(id, data))
            .collect()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value::<Document>(item).map_err(EngineError::from))
            .collect(),
        Some(_) => Err(EngineError::Config(format!(
            "{}: expected an object or an array of documents",
            path.display()
        ))),
    }
}

struct Fixtures {
    catalog: Vec<Document>,
    members: Vec<Document>,
    config: Option<Value>,
    archive: Option<Value>,
}

impl Fixtures {
    fn load(dir: &Path) -> Result<Self> {
        let fixtures = Self {
            catalog: load_collection(&dir.join("catalog.json"))?,
            members: load_collection(&dir.join("members.json"))?,
            config: read_json(&dir.join("config.json"))?,
            archive: read_json(&dir.join("archive.json"))?,
        };
        debug!(
            books = fixtures.catalog.len(),
            members = fixtures.members.len(),
            "fixtures loaded"
        );
        Ok(fixtures)
    }
}

fn parse_now(now: Option<&str>) -> Result<Arc<dyn Clock>> {
    match now {
        None => Ok(Arc::new(SystemClock)),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| Arc::new(FixedClock(at)) as Arc<dyn Clock>)
            .map_err(|e| EngineError::Config(format!("--now {raw}: {e}"))),
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

fn book(title: &str, category: &str, copies: i64, available: i64) -> Value {
    json!({"Nom": title, "Cathegorie": category, "initialExemplaire": copies, "Exemplaire": available})
}

fn demo_catalog() -> Snapshot {
    Snapshot::Collection(vec![
        Document::new("_placeholder", json!({})),
        Document::new("L001", book("Germinal", "Roman", 3, 1)),
        Document::new("L002", book("Les Misérables", "Roman", 2, 2)),
        Document::new("L003", book("Alcools", "Poésie", 1, 0)),
        Document::new("L004", book("Une brève histoire du temps", "Sciences", 2, 1)),
        Document::new("L005", json!("corrupted record")),
    ])
}

fn demo_members(returned: bool) -> Snapshot {
    let first = if returned {
        json!({"Nom": "Awa", "Etat1": "ras"})
    } else {
        json!({"Nom": "Awa", "Etat1": "emprunt", "tabEtat1": ["L001 - Germinal"]})
    };
    Snapshot::Collection(vec![
        Document::new("_placeholder", json!({})),
        Document::new("U1", first),
        Document::new("U2", json!({"Nom": "Bruno", "Etat1": "emprunt", "Etat2": "retard"})),
        Document::new("U3", json!({"Nom": "Chloé", "etat": "bloc"})),
    ])
}

fn demo_archive(now: DateTime<FixedOffset>) -> Snapshot {
    let at = |days: i64| (now - chrono::Duration::days(days)).to_rfc3339();
    Snapshot::Document(Some(json!({
        "tableauArchives": [
            {"heure": at(0), "nomDoc": "L001 - Germinal"},
            {"heure": at(1), "nomDoc": "L003 - Alcools"},
            {"heure": at(2), "nomDoc": "L001 - Germinal"},
            {"heure": at(6), "nomDoc": "L002 - Les Misérables"},
            {"heure": at(30), "nomDoc": "L999 - Retiré du fonds"},
        ]
    })))
}

fn demo_settings() -> Snapshot {
    Snapshot::Document(Some(json!({
        "Name": "Médiathèque du Parc",
        "MaximumSimultaneousLoans": 3,
        "DefaultLoanDuration": 14,
        "OpeningHours": {
            "monday": {"open": "09:00", "close": "18:00"},
            "sunday": "closed"
        }
    })))
}

fn run_demo(config: EngineConfig) {
    header("DEMO — Four Feeds, One Dashboard");
    let clock = SystemClock;
    let now = clock.now();
    let dashboard = Dashboard::new(config).with_clock(Arc::new(clock));
    let mut events = dashboard.subscribe();

    section("Phase 1: Attach feeds");
    let books = MemoryFeed::new("BiblioLivres");
    let users = MemoryFeed::new("BiblioUser");
    let settings = MemoryFeed::new("OrgSettings");
    let archive = MemoryFeed::new("Arch");
    let _catalog_handle = dashboard.attach(Source::Catalog, &books);
    let _members_handle = dashboard.attach(Source::Members, &users);
    let _config_handle = dashboard.attach(Source::Config, &settings);
    let archive_handle = dashboard.attach(Source::Archive, &archive);
    step(&format!("loading: {}", dashboard.is_loading()));

    section("Phase 2: Snapshots arrive in any order");
    archive.push(demo_archive(now));
    push_arrow("Arch", "5 archive entries (before the catalog: titles fall back to ids)");
    books.push(demo_catalog());
    push_arrow("BiblioLivres", "5 books + 1 corrupted record");
    users.push(demo_members(false));
    push_arrow("BiblioUser", "3 members, 3 loans");
    settings.push(demo_settings());
    push_arrow("OrgSettings", "settings document");
    step(&format!("loading: {}", dashboard.is_loading()));
    show_stats(&dashboard.stats());

    section("Phase 3: Archive re-delivered, join now resolves titles");
    archive.push(demo_archive(now));
    show_stats(&dashboard.stats());

    section("Phase 4: A book comes back");
    users.push(demo_members(true));
    step(&format!("rotation rate → {:.1} %", dashboard.stats().rotation_rate));

    section("Phase 5: Archive feed detached, later pushes are ignored");
    archive_handle.detach();
    archive.push(Snapshot::Document(Some(json!({"tableauArchives": []}))));
    step(&format!(
        "loans this month still {}",
        dashboard.stats().monthly_loans
    ));

    section("Phase 6: Members feed fails, everything else keeps its value");
    users.fail(FeedError::PermissionDenied("rules changed".into()));
    step(&format!("active loans still {}", dashboard.stats().active_loans));

    section("Organization settings");
    if let Some(settings) = dashboard.settings() {
        show_settings(&settings);
    }

    section("Event log");
    while let Ok(event) = events.try_recv() {
        step(&describe(&event));
    }

    section("Feed health");
    let mut health: Vec<_> = dashboard.feed_health().into_iter().collect();
    health.sort_by_key(|(source, _)| *source);
    for (source, h) in health {
        step(&format!(
            "{source}: applied {} rejected {} attached {}{}",
            h.snapshots_applied,
            h.snapshots_rejected,
            h.attached,
            h.last_error
                .map(|e| format!(" last error: {}", e.bright_red()))
                .unwrap_or_default()
        ));
    }
}

// ─── Reduce ────────────────────────────────────────────────────────────────

fn run_reduce(config: EngineConfig, dir: &Path, now: Option<&str>, as_json: bool) -> Result<()> {
    let fixtures = Fixtures::load(dir)?;
    let clock = parse_now(now)?;
    let reference = clock.now();
    let dashboard = Dashboard::new(config).with_clock(clock);

    let feeds = [
        (Source::Catalog, Snapshot::Collection(fixtures.catalog)),
        (Source::Members, Snapshot::Collection(fixtures.members)),
        (Source::Config, Snapshot::Document(fixtures.config)),
        (Source::Archive, Snapshot::Document(fixtures.archive)),
    ];
    // catalog first so the archive join can resolve titles
    let mut handles = Vec::new();
    for (source, snapshot) in feeds {
        let feed = MemoryFeed::new(source.as_str());
        feed.push(snapshot);
        handles.push(dashboard.attach(source, &feed));
    }

    let stats = dashboard.stats();
    if as_json {
        let mut out = serde_json::to_value(&stats)?;
        if let Some(settings) = dashboard.settings() {
            out["settings"] = settings.export(&reference);
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    header(&format!("REDUCE — {}", dir.display()));
    step(&format!("reference time: {}", reference.to_rfc3339()));
    show_stats(&stats);
    section("Organization settings");
    show_settings(&dashboard.settings().unwrap_or_default());
    Ok(())
}

// ─── Stats ─────────────────────────────────────────────────────────────────

async fn run_stats(config: EngineConfig, dir: &Path, now: Option<&str>) -> Result<()> {
    let fixtures = Fixtures::load(dir)?;
    let now = parse_now(now)?.now();
    let names = CollectionNames::default();

    let source = MemorySource::new();
    source.insert_collection(names.catalog.clone(), fixtures.catalog);
    source.insert_collection(names.members.clone(), fixtures.members);
    if let Some(archive) = fixtures.archive {
        source.insert_document(
            names.archive_collection.clone(),
            names.archive_document.clone(),
            archive,
        );
    }
    let service = StatisticsService::new(source, &config).with_names(names);

    header(&format!("STATS — {}", dir.display()));

    section("System");
    let system = service.system_stats().await?;
    step(&format!(
        "{} members, {} books, {} active loans, {} overdue, {} suspended",
        system.total_users,
        system.total_books,
        system.active_loans,
        system.overdue_loans,
        system.suspended_users
    ));

    section("Category performance");
    for c in service.category_performance().await? {
        step(&format!(
            "{:<24} {:>4} books {:>4} borrowed {:>6.1} %",
            c.name, c.books, c.loans, c.rate
        ));
    }

    section("Monthly trends");
    for t in service.monthly_trends(now).await? {
        step(&format!("{}  loans {:>4}  new books {:>4}", t.month, t.loans, t.books));
    }

    section("Cache");
    let before = service.source().fetch_count();
    service.system_stats().await?;
    service.category_performance().await?;
    service.monthly_trends(now).await?;
    step(&format!(
        "{} entries, repeat queries fetched {} times",
        service.cache().len(),
        service.source().fetch_count() - before
    ));
    Ok(())
}

// ─── Main ──────────────────────────────────────────────────────────────────

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match load_config(cli.config.as_deref()) {
        Err(err) => Err(err),
        Ok(config) => match cli.command {
            Commands::Demo => {
                run_demo(config);
                Ok(())
            }
            Commands::Reduce { dir, now, json } => run_reduce(config, &dir, now.as_deref(), json),
            Commands::Stats { dir, now } => run_stats(config, &dir, now.as_deref()).await,
        },
    };

    if let Err(err) = outcome {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}
