//! modkeeper - mod selection and install manager for Kerbal Space Program

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use modkeeper::destination::resolve_destination;
use modkeeper::install::{NodeOutcome, ProcessReport};
use modkeeper::progress::ProgressSink;
use modkeeper::session::{LogLevel, ModSession};
use modkeeper::settings::Settings;
use modkeeper::tree::{DesiredState, ModForest, NodeId};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "modkeeper")]
#[command(version)]
#[command(about = "Select, place and install Kerbal Space Program mods")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Game installation directory (overrides the saved setting)
    #[arg(short, long, global = true, env = "MODKEEPER_ROOT")]
    root: Option<PathBuf>,

    /// Catalog file (default: ModCatalog.xml in the game directory)
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add mod archives (ZIP) or unpacked folders to the catalog
    Add {
        paths: Vec<PathBuf>,

        /// Check everything that could be placed and install right away
        #[arg(short, long)]
        install: bool,
    },

    /// List mods and their state
    List {
        /// Show every entry with its destination
        #[arg(short, long)]
        tree: bool,
    },

    /// Re-read installed state from disk
    Refresh,

    /// Install checked entries and uninstall unchecked ones
    Process {
        /// Overwrite files that already exist at a destination
        #[arg(long = "override")]
        override_existing: bool,
    },

    /// Uninstall mods and remove them from the catalog
    Remove { targets: Vec<String> },

    /// Check a mod or entry (`Mod/entry/path`) and install it
    Check {
        target: String,

        /// Only this node, not its descendants
        #[arg(long)]
        only: bool,
    },

    /// Uncheck a mod or entry and uninstall it (cascades to descendants)
    Uncheck { target: String },

    /// Set the destination folder of a mod entry
    Place {
        target: String,
        destination: String,

        /// Merge the entry's content into the destination instead of
        /// placing the entry itself inside it
        #[arg(long)]
        content_only: bool,
    },

    /// Clear the placement of a mod entry; an inherited placement is cleared
    /// on the ancestors it comes from
    Reset { target: String },

    /// Show checked files that would overwrite each other
    Collisions,

    /// Adopt GameData folders no known mod accounts for
    Scan,

    /// Check mods for newer releases
    Updates {
        /// Update outdated mods according to the update behavior setting
        #[arg(long)]
        apply: bool,
    },

    /// Show the effective settings
    Config {
        /// Store the effective settings (including --root/--catalog)
        #[arg(long)]
        save: bool,
    },
}

/// Terminal progress bar, created on the first tick of each operation.
#[derive(Default)]
struct BarSink {
    bar: RefCell<Option<ProgressBar>>,
}

impl BarSink {
    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let mut slot = self.bar.borrow_mut();
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        f(bar);
    }
}

impl ProgressSink for BarSink {
    fn progress(&self, current: usize, max: usize) {
        self.with_bar(|bar| {
            bar.set_length(max as u64);
            bar.set_position(current as u64);
        });
    }

    fn finished(&self, summary: &str, error: Option<&str>) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish_and_clear();
        }
        match error {
            Some(error) => warn!("{}: {}", summary, error),
            None => debug!("{}", summary),
        }
    }

    fn status(&self, message: &str) {
        self.with_bar(|bar| bar.set_message(message.to_string()));
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("modkeeper=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modkeeper=warn"))
    };
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("Log file needs a file name: {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(fmt::layer().json().with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn effective_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::load();
    if let Some(root) = &cli.root {
        settings.install_root = root.to_string_lossy().into_owned();
    }
    if let Some(catalog) = &cli.catalog {
        settings.catalog_file = catalog.to_string_lossy().into_owned();
    }
    settings
}

fn resolve(session: &ModSession, target: &str) -> Result<NodeId> {
    session
        .find_node(target)
        .with_context(|| format!("No mod or entry named '{}'", target))
}

fn state_marker(forest: &ModForest, id: NodeId) -> &'static str {
    match forest.desired_state(id) {
        DesiredState::Checked => "[x]",
        DesiredState::Unchecked => "[ ]",
        DesiredState::Mixed => "[-]",
    }
}

fn print_tree(forest: &ModForest, id: NodeId, depth: usize) {
    for &child in forest.children(id) {
        let node = &forest[child];
        let destination = resolve_destination(forest, child);
        println!(
            "{:indent$}{} {}{}{}",
            "",
            state_marker(forest, child),
            node,
            if node.is_installed() { " (installed)" } else { "" },
            if destination.is_empty() { String::new() } else { format!(" -> {}", destination) },
            indent = 4 + depth * 2
        );
        print_tree(forest, child, depth + 1);
    }
}

fn print_report(report: &ProcessReport) {
    for result in &report.outcomes {
        if !matches!(result.outcome, NodeOutcome::Unchanged) {
            println!("{:>30}  {} -> {}", result.outcome.to_string(), result.name, result.destination);
        }
    }
    println!("{}", report.summary());
}

fn print_log(session: &mut ModSession) {
    for entry in session.log_mut().drain() {
        if entry.level >= LogLevel::Warning {
            eprintln!("{}", entry);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut settings = effective_settings(&cli);
    if let Commands::Process { override_existing: true } = cli.command {
        settings.override_existing = true;
    }

    if let Commands::Config { save } = cli.command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        if save {
            settings.save()?;
            println!("Saved to {}", Settings::settings_path()?.display());
        }
        return Ok(());
    }

    if settings.install_root.is_empty() {
        bail!("No game directory configured; pass --root or set MODKEEPER_ROOT");
    }
    if !Path::new(&settings.install_root).is_dir() {
        bail!("Game directory does not exist: {}", settings.install_root);
    }

    let sink = BarSink::default();
    let mut session = ModSession::open(settings, &sink);
    let mut modified = false;

    match cli.command {
        Commands::Add { paths, install } => {
            if paths.is_empty() {
                bail!("No mod paths given");
            }
            let mut added = Vec::new();
            for path in &paths {
                match session.add_mod(path, None) {
                    Ok(id) => {
                        println!("Added {}", session.forest()[id]);
                        added.push(id);
                    }
                    Err(e) => eprintln!("Failed to add {}: {:#}", path.display(), e),
                }
            }
            if install && !added.is_empty() {
                for &id in &added {
                    session.check_all(id);
                }
                let report = session.process_mods(&added, &sink);
                println!("{}", report.summary());
            }
            modified = !added.is_empty();
        }

        Commands::List { tree } => {
            let forest = session.forest();
            if forest.is_empty() {
                println!("No mods in {}", session.catalog_path().display());
            }
            for &id in session.mods() {
                let node = &forest[id];
                let installed = node.is_installed() || forest.has_installed_children(id);
                println!(
                    "{} {}{}{}{}",
                    state_marker(forest, id),
                    node,
                    if node.metadata.version.is_empty() { String::new() } else { format!(" {}", node.metadata.version) },
                    if installed { " (installed)" } else { "" },
                    if node.is_outdated { " (outdated)" } else { "" },
                );
                if tree {
                    print_tree(forest, id, 0);
                }
            }
        }

        Commands::Refresh => {
            let report = session.refresh(&sink);
            println!("{} of {} nodes installed", report.installed_count(), report.processed);
            modified = true;
        }

        Commands::Process { .. } => {
            let report = session.process_all(&sink);
            print_report(&report);
            modified = true;
        }

        Commands::Remove { targets } => {
            let ids = targets
                .iter()
                .map(|t| resolve(&session, t))
                .collect::<Result<Vec<_>>>()?;
            let report = session.remove_mods(&ids, &sink);
            println!("{}", report.summary());
            modified = true;
        }

        Commands::Check { target, only } => {
            let id = resolve(&session, &target)?;
            let report = session.apply_checked(id, true, !only, &sink)?;
            print_report(&report);
            modified = true;
        }

        Commands::Uncheck { target } => {
            let id = resolve(&session, &target)?;
            let report = session.apply_checked(id, false, true, &sink)?;
            print_report(&report);
            modified = true;
        }

        Commands::Place {
            target,
            destination,
            content_only,
        } => {
            let id = resolve(&session, &target)?;
            session.set_destination(id, &destination, content_only)?;
            println!(
                "{} -> {}",
                session.forest()[id],
                resolve_destination(session.forest(), id)
            );
            modified = true;
        }

        Commands::Reset { target } => {
            let id = resolve(&session, &target)?;
            session.reset_destination(id)?;
            let destination = resolve_destination(session.forest(), id);
            if destination.is_empty() {
                println!("{} is no longer placed", session.forest()[id]);
            } else {
                println!("{} -> {}", session.forest()[id], destination);
            }
            modified = true;
        }

        Commands::Collisions => {
            let collisions = session.collisions();
            if collisions.is_empty() {
                println!("No collisions");
            }
            for collision in &collisions {
                println!("{}", session.describe_collision(collision));
            }
        }

        Commands::Scan => {
            let added = session.scan_game_data(&sink)?;
            for &id in &added {
                println!("Adopted {}", session.forest()[id]);
            }
            println!("{} folders adopted", added.len());
            modified = !added.is_empty();
        }

        Commands::Updates { apply } => {
            let roots = session.mods().to_vec();
            if apply {
                let updated = session.update_outdated(&roots, &sink);
                for &id in &updated {
                    println!("Updated {}", session.forest()[id]);
                }
            } else {
                for update in session.check_for_updates(&roots, &sink) {
                    println!(
                        "{}: {} -> {}",
                        session.forest()[update.node],
                        session.forest()[update.node].metadata.version,
                        update.latest.version
                    );
                }
            }
            modified = true;
        }

        Commands::Config { .. } => unreachable!("handled before the session is opened"),
    }

    print_log(&mut session);
    if modified {
        session.save_catalog()?;
    }
    Ok(())
}
