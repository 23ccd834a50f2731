//! shiftctl: operator and debugging CLI for volunteer shift tracking.
//!
//! Works against an offline snapshot under `~/.shift-tracker/` (or `--root`):
//! `backend.json` stands in for the attendance backend, `directory.json` for
//! the identity lookup, `store.json` holds the check-in cache.
//!
//! ## Subcommands
//!
//! - `resolve`: show how a raw backend timestamp is interpreted
//! - `verify` / `issue`: scanned identity codes
//! - `check-in` / `check-out` / `status` / `watch`: attendance
//! - `diagnose`: report conflicting timers, cache keys, clocks and zone guesses

mod backend;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backend::{Directory, FileBackend};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use shift_core::{
    format_duration, format_fixed, issue_hash_code, load_config, AnomalyDetector,
    AttendanceMachine, AttendanceState, Clock, ConflictDiagnostics, FileStore,
    IdentityHashVerifier, InterpretationLog, LocalWallClock, ShiftConfig, StorageConfig,
    SystemClock, TimerRegistry, TimestampResolver,
};

#[derive(Parser)]
#[command(name = "shiftctl")]
#[command(about = "Volunteer shift tracking")]
#[command(version)]
struct Cli {
    /// Data directory (default: ~/.shift-tracker)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a raw timestamp the way backend records are read
    Resolve {
        /// Unix seconds, unix millis, ISO-8601 or `YYYY-MM-DD HH:mm:ss`
        #[arg(value_name = "RAW")]
        raw: String,

        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Verify a scanned identity code
    Verify {
        #[arg(value_name = "CODE")]
        code: String,
    },

    /// Issue a current-generation identity code from the directory
    Issue {
        #[arg(value_name = "WORKER")]
        worker: u64,

        /// Issue time in unix seconds; defaults to now
        #[arg(long)]
        issued_at: Option<i64>,
    },

    /// Check a worker in
    CheckIn {
        #[arg(value_name = "WORKER")]
        worker: u64,

        #[arg(long)]
        operator: u64,

        /// Check-in time in any accepted timestamp shape; defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Check a worker out
    CheckOut {
        #[arg(value_name = "WORKER")]
        worker: u64,

        #[arg(long)]
        operator: u64,

        /// Check-out time in any accepted timestamp shape; defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Close a session that ran past the overtime limit at the limit
    AutoCheckOut {
        #[arg(value_name = "WORKER")]
        worker: u64,

        #[arg(long)]
        operator: u64,
    },

    /// Refresh and print a worker's attendance state
    Status {
        #[arg(value_name = "WORKER")]
        worker: u64,
    },

    /// Poll a worker's attendance state on a timer
    Watch {
        #[arg(value_name = "WORKER")]
        worker: u64,

        #[arg(long, default_value_t = 30)]
        interval_secs: u64,

        /// Stop after this many polls
        #[arg(long)]
        ticks: Option<u32>,
    },

    /// Report session conflicts
    Diagnose,
}

fn main() {
    let cli = Cli::parse();
    let storage = match cli.root {
        Some(root) => StorageConfig::with_root(root),
        None => match StorageConfig::from_home() {
            Ok(storage) => storage,
            Err(e) => {
                eprintln!("shiftctl: {}", e);
                std::process::exit(1);
            }
        },
    };
    let _logging_guard = logging::init(&storage);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli.command, storage)) {
        tracing::error!(error = %e, "shiftctl failed");
        eprintln!("shiftctl: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, storage: StorageConfig) -> Result<(), String> {
    match command {
        Commands::Resolve { raw, now } => resolve(&storage, &raw, now.as_deref()),
        Commands::Verify { code } => verify(&storage, &code).await,
        Commands::Issue { worker, issued_at } => issue(&storage, worker, issued_at),
        Commands::CheckIn {
            worker,
            operator,
            at,
        } => check_in(&storage, worker, operator, at.as_deref()).await,
        Commands::CheckOut {
            worker,
            operator,
            at,
        } => check_out(&storage, worker, operator, at.as_deref()).await,
        Commands::AutoCheckOut { worker, operator } => {
            auto_check_out(&storage, worker, operator).await
        }
        Commands::Status { worker } => status(&storage, worker).await,
        Commands::Watch {
            worker,
            interval_secs,
            ticks,
        } => watch(&storage, worker, interval_secs, ticks).await,
        Commands::Diagnose => diagnose(&storage).await,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

type FileMachine = AttendanceMachine<Arc<FileBackend>, Arc<FileBackend>, Arc<FileStore>>;

struct Session {
    config: ShiftConfig,
    clock: Arc<dyn Clock>,
    log: Arc<InterpretationLog>,
    backend: Arc<FileBackend>,
    store: Arc<FileStore>,
    machine: FileMachine,
}

impl Session {
    async fn open(storage: &StorageConfig) -> Result<Self, String> {
        storage.ensure_dirs()?;
        let config = load_config(storage);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let log = Arc::new(InterpretationLog::default());
        let backend = Arc::new(FileBackend::load(
            &storage.backend_file(),
            config.fixed_offset()?,
        )?);
        let store = Arc::new(FileStore::load(&storage.store_file())?);

        let resolver = TimestampResolver::from_config(&config)?.with_log(Arc::clone(&log));
        let machine = AttendanceMachine::new(
            Arc::clone(&backend),
            Arc::clone(&backend),
            Arc::clone(&store),
            resolver,
            Arc::clone(&clock),
        )
        .with_detector(AnomalyDetector::from_config(&config));

        machine.restore().await.map_err(|e| e.to_string())?;

        Ok(Self {
            config,
            clock,
            log,
            backend,
            store,
            machine,
        })
    }

    /// Server state when reachable, otherwise whatever was restored.
    async fn current(&self, worker: u64) -> AttendanceState {
        match self.machine.refresh(worker).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(worker_id = worker, error = %e, "Refresh failed, using local state");
                self.machine.state(worker)
            }
        }
    }

    fn resolve_at(&self, raw: Option<&str>) -> Result<DateTime<Utc>, String> {
        let now = self.clock.now();
        match raw {
            Some(raw) => self
                .machine
                .resolver()
                .resolve(raw, now)
                .map_err(|e| e.to_string()),
            None => Ok(now),
        }
    }

    fn print_state(&self, state: &AttendanceState) -> Result<(), String> {
        let offset = self.config.fixed_offset()?;
        let now = self.clock.now();
        println!("worker {}: {}", state.worker_id, state.status);

        if let Some(open) = &state.current_open_record {
            println!(
                "  open since {} (elapsed {})",
                format_fixed(open.start, offset),
                format_duration(open.elapsed(now).num_minutes())
            );
        }
        if let Some(closed) = &state.last_closed_record {
            let end = closed
                .end
                .map(|end| format_fixed(end, offset))
                .unwrap_or_default();
            let summary = self.machine.detector().summarize(closed);
            println!(
                "  last session {} to {} ({}{})",
                format_fixed(closed.start, offset),
                end,
                format_duration(summary.map(|s| s.minutes).unwrap_or(0)),
                if summary.is_some_and(|s| s.is_overtime) {
                    ", overtime"
                } else {
                    ""
                }
            );
        }
        if let Some(report) = self.machine.check(state.worker_id) {
            println!("  warning: {}", report);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn resolve(storage: &StorageConfig, raw: &str, now: Option<&str>) -> Result<(), String> {
    let config = load_config(storage);
    let now = match now {
        Some(now) => DateTime::parse_from_rfc3339(now)
            .map_err(|e| format!("Invalid --now: {}", e))?
            .with_timezone(&Utc),
        None => SystemClock.now(),
    };
    let resolver = TimestampResolver::from_config(&config)?;
    let resolution = resolver
        .resolve_detailed(raw, now)
        .map_err(|e| e.to_string())?;

    let output = serde_json::json!({
        "instant": resolution.instant.to_rfc3339(),
        "fixed": format_fixed(resolution.instant, resolver.offset()),
        "interpretation": resolution.interpretation,
        "rejected": resolution.rejected.map(|r| r.to_rfc3339()),
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

async fn verify(storage: &StorageConfig, code: &str) -> Result<(), String> {
    let config = load_config(storage);
    let directory = Directory::load(&storage.directory_file())?;
    let payload = IdentityHashVerifier::new(config.digest_scheme)
        .verify(code, &directory)
        .await
        .map_err(|e| e.to_string())?;
    let text = serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn issue(storage: &StorageConfig, worker: u64, issued_at: Option<i64>) -> Result<(), String> {
    let config = load_config(storage);
    let directory = Directory::load(&storage.directory_file())?;
    let record = directory
        .get(worker)
        .ok_or_else(|| format!("Worker {} is not in the directory", worker))?;
    let issued_at = issued_at.unwrap_or_else(|| SystemClock.now().timestamp());
    println!("{}", issue_hash_code(record, issued_at, config.digest_scheme));
    Ok(())
}

async fn check_in(
    storage: &StorageConfig,
    worker: u64,
    operator: u64,
    at: Option<&str>,
) -> Result<(), String> {
    let session = Session::open(storage).await?;
    session.current(worker).await;
    let at = session.resolve_at(at)?;
    let state = session
        .machine
        .check_in(worker, operator, at)
        .await
        .map_err(|e| e.to_string())?;
    session.print_state(&state)
}

async fn check_out(
    storage: &StorageConfig,
    worker: u64,
    operator: u64,
    at: Option<&str>,
) -> Result<(), String> {
    let session = Session::open(storage).await?;
    session.current(worker).await;
    let at = session.resolve_at(at)?;
    let state = session
        .machine
        .check_out(worker, operator, at)
        .await
        .map_err(|e| e.to_string())?;
    session.print_state(&state)
}

async fn auto_check_out(
    storage: &StorageConfig,
    worker: u64,
    operator: u64,
) -> Result<(), String> {
    let session = Session::open(storage).await?;
    match session
        .machine
        .auto_check_out(worker, operator)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(state) => session.print_state(&state),
        None => {
            println!("worker {}: no overtime session", worker);
            Ok(())
        }
    }
}

async fn status(storage: &StorageConfig, worker: u64) -> Result<(), String> {
    let session = Session::open(storage).await?;
    let state = session.current(worker).await;
    session.print_state(&state)
}

async fn watch(
    storage: &StorageConfig,
    worker: u64,
    interval_secs: u64,
    ticks: Option<u32>,
) -> Result<(), String> {
    let session = Session::open(storage).await?;
    let timers = TimerRegistry::new();
    let _timer = timers.register(format!("status-poll:{}", worker));

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut polls = 0;
    loop {
        interval.tick().await;
        let state = session.current(worker).await;
        session.print_state(&state)?;
        polls += 1;
        if ticks.is_some_and(|limit| polls >= limit) {
            return Ok(());
        }
    }
}

async fn diagnose(storage: &StorageConfig) -> Result<(), String> {
    let session = Session::open(storage).await?;
    // Resolve every known record so the interpretation log has something to compare.
    for worker in session.backend.worker_ids() {
        session.current(worker).await;
    }

    let diagnostics = ConflictDiagnostics::new(
        TimerRegistry::new(),
        Arc::clone(&session.log),
        Arc::clone(&session.clock),
        Arc::new(LocalWallClock),
    )
    .configure(&session.config)?;
    let conflicts = diagnostics
        .scan(session.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;

    if conflicts.is_empty() {
        println!("No conflicts");
    }
    for conflict in &conflicts {
        println!("{}", conflict);
    }
    Ok(())
}
