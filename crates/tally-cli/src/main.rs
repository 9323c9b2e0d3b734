//! `tally` — command-line access to a tally store.
//!
//! # Usage
//!
//! ```
//! tally --db ~/reminders.db migrate
//! tally add-list Groceries
//! tally add 1 "Oat milk" --priority high --due 2026-03-20
//! tally watch
//! ```
//!
//! Settings are read from the optional `--config` TOML file, then from
//! `TALLY_*` environment variables (`TALLY_STORE__PATH`,
//! `TALLY_STORE__BUSY_TIMEOUT_MS`, ...), then from command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde::Deserialize;
use tally_models::{
  migrator,
  reminders::{self, ListCount, NewReminder, NewRemindersList, Priority, RemindersList},
  schema,
};
use tally_store_sqlite::{LiveState, Migrator, Store, StoreConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Local-first reminders, chat and workouts")]
struct Cli {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Database file; overrides `store.path` from config.
  #[arg(long, value_name = "FILE")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Apply pending migrations.
  Migrate,
  /// Show applied and pending migrations.
  Status,
  /// Print every list with its number of open reminders.
  Lists,
  /// Create a list.
  AddList {
    title:    String,
    /// Color as hex RGB, e.g. `ff9500`.
    #[arg(long)]
    color:    Option<String>,
    #[arg(long)]
    position: Option<i64>,
  },
  /// Add a reminder to a list.
  Add {
    list:     i64,
    title:    String,
    #[arg(long)]
    notes:    Option<String>,
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,
    /// Due date, `YYYY-MM-DD`.
    #[arg(long)]
    due:      Option<NaiveDate>,
    #[arg(long)]
    flagged:  bool,
  },
  /// Toggle a reminder between open and completed.
  Complete { reminder: i64 },
  /// Delete a list and its reminders.
  DeleteList { list: i64 },
  /// Print list counts every time they change, until Ctrl-C.
  Watch,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PriorityArg {
  Low,
  Medium,
  High,
}

impl From<PriorityArg> for Priority {
  fn from(arg: PriorityArg) -> Self {
    match arg {
      PriorityArg::Low => Priority::Low,
      PriorityArg::Medium => Priority::Medium,
      PriorityArg::High => Priority::High,
    }
  }
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct AppConfig {
  store: StoreConfig,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
  let mut builder = config::Config::builder().set_default("store.path", "tally.db")?;
  if let Some(path) = &cli.config {
    builder = builder.add_source(config::File::from(path.as_path()).required(true));
  }
  let settings = builder
    .add_source(
      config::Environment::with_prefix("TALLY")
        .separator("__")
        .try_parsing(true),
    )
    .set_override_option("store.path", cli.db.as_ref().map(|p| p.display().to_string()))?
    .build()
    .context("failed to read configuration")?;

  let mut app: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;
  app.store.path = app.store.path.map(|p| expand_tilde(&p));
  Ok(app)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let app = load_config(&cli)?;

  let store = Store::open_with(&app.store, schema()?)
    .await
    .with_context(|| format!("failed to open store at {:?}", app.store.path))?;
  let plan = migrator()?;

  // Every command other than `status` needs an up-to-date schema.
  if !matches!(cli.command, Command::Status) {
    let report = store.migrate(&plan).await.context("migration failed")?;
    if matches!(cli.command, Command::Migrate) {
      if report.is_noop() {
        println!("schema up to date ({} migrations)", report.skipped);
      }
      for name in &report.applied {
        println!("applied {name}");
      }
    }
  }

  let result = run(&store, &plan, cli.command).await;
  store.close().await.context("failed to close store")?;
  result
}

async fn run(store: &Store, plan: &Migrator, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Migrate => {}

    Command::Status => {
      let ledger = Migrator::applied(store).await?;
      for entry in &ledger {
        println!("[x] {:>2} {}  ({})", entry.position, entry.name, entry.applied_at);
      }
      for (position, name) in plan.names().enumerate().skip(ledger.len()) {
        println!("[ ] {position:>2} {name}");
      }
    }

    Command::Lists => {
      let counts: Vec<ListCount> = store.read(&reminders::list_counts()?).await?;
      print_counts(&counts);
    }

    Command::AddList { title, color, position } => {
      let color = color
        .map(|hex| {
          i64::from_str_radix(hex.trim_start_matches('#'), 16)
            .with_context(|| format!("invalid color {hex:?}"))
        })
        .transpose()?;
      let draft = NewRemindersList { title, color, position };
      let list: RemindersList = store.write(move |tx| tx.insert(&draft)).await?;
      println!("created list {} ({})", list.id, list.title);
    }

    Command::Add { list, title, notes, priority, due, flagged } => {
      let draft = NewReminder {
        notes,
        priority: priority.map(Priority::from),
        due_date: due,
        is_flagged: flagged,
        ..NewReminder::new(list, title)
      };
      let reminder = store.write(move |tx| tx.insert(&draft)).await?;
      println!("added reminder {} to list {}", reminder.id, reminder.list_id);
    }

    Command::Complete { reminder } => {
      let stmt = reminders::toggle_completed(reminder)?;
      let changed = store.write(move |tx| tx.execute(&stmt)).await?;
      if changed == 0 {
        bail!("no reminder with id {reminder}");
      }
      println!("toggled reminder {reminder}");
    }

    Command::DeleteList { list } => {
      let stmt = reminders::delete_list(list)?;
      let changed = store.write(move |tx| tx.execute(&stmt)).await?;
      if changed == 0 {
        bail!("no list with id {list}");
      }
      println!("deleted list {list}");
    }

    Command::Watch => watch(store).await?,
  }
  Ok(())
}

async fn watch(store: &Store) -> anyhow::Result<()> {
  let sub = store.subscribe::<ListCount>(reminders::list_counts()?)?;
  let mut states = Box::pin(sub.into_stream());
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => return Ok(()),
      state = states.next() => match state {
        Some(LiveState::Loaded { rows, version }) => {
          println!("── version {version} ──");
          print_counts(&rows);
        }
        Some(LiveState::Failed(err)) => bail!("live query failed: {err}"),
        Some(LiveState::Idle | LiveState::Loading) => {}
        None => return Ok(()),
      },
    }
  }
}

fn print_counts(counts: &[ListCount]) {
  if counts.is_empty() {
    println!("no lists");
    return;
  }
  for count in counts {
    println!("{:>4}  #{:06x}  {:<24} {}", count.id, count.color, count.title, count.incomplete);
  }
}
