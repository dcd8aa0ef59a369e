//! CLI harness for exercising note recovery end to end
//!
//! This tool allows testing:
//! - Schema fingerprinting of a note store
//! - Full note assembly with candidate passwords
//! - Backup keybag unlock
//! - Assembly throughput

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use notes_crypto::{CancelToken, DecryptionSession, ManifestPlist, PasswordList};
use notes_store_sqlite::{
    AssemblerConfig, Database, DirectoryLocator, NoteAssembler, NoteStatus, SchemaVersion,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "notes-harness")]
#[command(about = "Note store recovery harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PasswordArgs {
    /// Candidate password (repeatable)
    #[arg(short, long = "password")]
    passwords: Vec<String>,

    /// File with one candidate password per line
    #[arg(long)]
    password_file: Option<PathBuf>,
}

impl PasswordArgs {
    fn load(&self) -> anyhow::Result<PasswordList> {
        let mut list = match &self.password_file {
            Some(path) => PasswordList::from_file(path)
                .with_context(|| format!("Reading password list {}", path.display()))?,
            None => PasswordList::new(),
        };
        for password in &self.passwords {
            list.add(password);
        }
        if list.is_empty() {
            warn!("No candidate passwords given, protected content stays locked");
        }
        Ok(list)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint a note store
    Version {
        /// Path to NoteStore.sqlite
        store: PathBuf,

        /// Fail instead of reporting an unknown layout
        #[arg(long)]
        strict: bool,
    },

    /// Reconstruct every note and print them as JSON
    Dump {
        /// Path to NoteStore.sqlite
        store: PathBuf,

        #[command(flatten)]
        passwords: PasswordArgs,

        /// Assembler configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory mirroring the note container, for attachments
        #[arg(short, long)]
        backup: Option<PathBuf>,

        /// Output directory for notes.json, attachments and the working copy
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Unlock the keybag of an encrypted backup
    Unlock {
        /// Path to Manifest.plist
        manifest: PathBuf,

        #[command(flatten)]
        passwords: PasswordArgs,
    },

    /// Benchmark assembly throughput
    Benchmark {
        /// Path to NoteStore.sqlite
        store: PathBuf,

        #[command(flatten)]
        passwords: PasswordArgs,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version { store, strict } => run_version(&store, strict),
        Commands::Dump {
            store,
            passwords,
            config,
            backup,
            output,
        } => run_dump(&store, &passwords, config, backup, output),
        Commands::Unlock { manifest, passwords } => run_unlock(&manifest, &passwords),
        Commands::Benchmark {
            store,
            passwords,
            runs,
        } => run_benchmark(&store, &passwords, runs),
    }
}

fn run_version(store: &Path, strict: bool) -> anyhow::Result<()> {
    let db = Database::open(store).with_context(|| format!("Opening {}", store.display()))?;
    let version = if strict {
        SchemaVersion::resolve_strict(&db)?
    } else {
        SchemaVersion::resolve(&db)?
    };

    info!("{}: {}", store.display(), version);
    if !version.is_usable(&db)? {
        warn!("Store lacks the tables generation {} reads from", version);
    }
    Ok(())
}

fn run_dump(
    store: &Path,
    passwords: &PasswordArgs,
    config: Option<PathBuf>,
    backup: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => AssemblerConfig::from_json_file(&path)
            .with_context(|| format!("Reading config {}", path.display()))?,
        None => AssemblerConfig::default(),
    };
    let session = Arc::new(DecryptionSession::new(passwords.load()?));

    // Write-back goes to a working copy, never the original store
    let db = match (&output, config.cache_plaintext) {
        (Some(dir), true) => {
            std::fs::create_dir_all(dir)?;
            let copy = dir.join("NoteStore.sqlite");
            std::fs::copy(store, &copy)?;
            info!("Caching plaintext into working copy {}", copy.display());
            Database::open_read_write(&copy)?
        }
        (None, true) => anyhow::bail!("Plaintext caching needs an output directory"),
        _ => Database::open(store).with_context(|| format!("Opening {}", store.display()))?,
    };

    let mut assembler = NoteAssembler::new(db, session.clone(), config)?;
    if let Some(root) = backup {
        let locator = match &output {
            Some(dir) => DirectoryLocator::new(root).with_output(dir.join("files")),
            None => DirectoryLocator::new(root),
        };
        assembler = assembler.with_locator(Box::new(locator));
    }

    let ids = assembler.note_ids()?;
    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut notes = Vec::with_capacity(ids.len());
    for id in ids {
        match assembler.assemble(id) {
            Ok(note) => {
                if note.status == NoteStatus::Locked {
                    pb.set_message(format!("note {} locked", id));
                }
                notes.push(note);
            }
            Err(e) => warn!("Skipping note {}: {}", id, e),
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    if assembler.config().cache_plaintext {
        let written = assembler.cache_plaintext(&notes)?;
        info!("Cached plaintext of {} notes", written);
    }

    let stats = assembler.stats();
    info!(
        "{} notes: {} parsed, {} locked, {} unparseable, {} objects ({} missing), {} passwords worked",
        stats.notes_seen,
        stats.notes_parsed,
        stats.notes_locked,
        stats.notes_unparseable,
        stats.objects_resolved,
        stats.objects_missing,
        session.successful_count()
    );

    match output {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join("notes.json");
            let file = std::fs::File::create(&path)?;
            serde_json::to_writer_pretty(file, &notes)?;
            info!("Wrote {}", path.display());
        }
        None => serde_json::to_writer_pretty(std::io::stdout().lock(), &notes)?,
    }
    Ok(())
}

fn run_unlock(manifest: &Path, passwords: &PasswordArgs) -> anyhow::Result<()> {
    let mut plist = ManifestPlist::from_file(manifest)
        .with_context(|| format!("Reading manifest {}", manifest.display()))?;
    if !plist.is_encrypted {
        info!("Backup is not encrypted");
        return Ok(());
    }

    let candidates = passwords.load()?;
    let cancel = CancelToken::new();
    let start = Instant::now();
    let unlocked = plist.unlock(&candidates, &cancel)?;
    let elapsed = start.elapsed();

    if !unlocked {
        warn!(
            "No candidate of {} unlocked the keybag ({:.2}s)",
            candidates.len(),
            elapsed.as_secs_f64()
        );
        return Ok(());
    }

    if let Some(keybag) = plist.keybag.as_ref() {
        let open = keybag.classes().iter().filter(|c| c.is_unlocked()).count();
        info!(
            "Keybag unlocked in {:.2}s: {}/{} protection classes open",
            elapsed.as_secs_f64(),
            open,
            keybag.classes().len()
        );
    }
    match plist.manifest_db_key() {
        Some(_) => info!("Manifest database key recovered"),
        None => warn!("Manifest database key did not unwrap"),
    }
    Ok(())
}

fn run_benchmark(store: &Path, passwords: &PasswordArgs, runs: u32) -> anyhow::Result<()> {
    anyhow::ensure!(runs > 0, "At least one run is needed");
    let candidates: Vec<String> = passwords.load()?.iter().map(str::to_string).collect();
    info!("Starting benchmark: {} runs over {}", runs, store.display());

    let mut total_duration = Duration::ZERO;
    let mut total_notes = 0u64;

    for run in 1..=runs {
        info!("Run {}/{}", run, runs);

        // Fresh session each run so cached passwords do not carry over
        let session = Arc::new(DecryptionSession::new(candidates.iter().collect()));
        let db = Database::open(store)?;
        let mut assembler = NoteAssembler::new(db, session, AssemblerConfig::default())?;

        let start_time = Instant::now();
        let notes = assembler.assemble_all()?;
        let elapsed = start_time.elapsed();

        info!(
            "  Duration: {:.2}s | {:.1} notes/s",
            elapsed.as_secs_f64(),
            notes.len() as f64 / elapsed.as_secs_f64()
        );

        total_duration += elapsed;
        total_notes += notes.len() as u64;
    }

    info!("Benchmark results:");
    info!("  Runs: {}", runs);
    info!("  Total notes: {}", total_notes);
    info!("  Average duration: {:.2}s", (total_duration / runs).as_secs_f64());
    info!(
        "  Average speed: {:.1} notes/s",
        total_notes as f64 / total_duration.as_secs_f64()
    );
    Ok(())
}
