mod logging;
mod settings;
mod watch;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use directories::BaseDirs;
use peglin_core::core_api::{
    CapabilityIssue, Engine, Session, conventional_install_dirs, detect_install_dir_from_save_path,
    first_install_dir, stats_path_for_save,
};
use peglin_core::export::{export_to_string, import_runs};
use peglin_core::graph::Dialect;
use peglin_core::navigator::MAX_DUMP_DEPTH;
use peglin_core::runs::summarize;
use peglin_render::{
    JsonStyle, Outcome, RunFilter, TextRenderOptions, render_graph_dump, render_json_run,
    render_json_run_summary, render_json_runs, render_json_section, render_json_summary,
    render_text_run, render_text_run_summary, render_text_runs, render_text_summary,
};
use serde_json::Value as JsonValue;

use crate::settings::SettingsStore;
use crate::watch::{DEFAULT_DEBOUNCE_MS, Debouncer, FileStamp, POLL_INTERVAL};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Stats file holding the run history (Stats_<N>.data).
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "save")]
    stats: Option<PathBuf>,
    /// Save file (Save_<N>.data); its paired stats file is used for run queries.
    #[arg(long, global = true, value_name = "FILE")]
    save: Option<PathBuf>,
    /// Game install directory, used to find the type library.
    #[arg(long, global = true, value_name = "DIR")]
    install: Option<PathBuf>,
    /// Try this stream dialect first.
    #[arg(
        long,
        global = true,
        value_name = "permissive|standard|strict",
        value_parser = parse_dialect
    )]
    dialect: Option<Dialect>,
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Print the full error chain on failure.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Totals, win rate, per-class results and top orbs.
    Summary,
    /// List runs in stored order.
    Runs(RunsArgs),
    /// Show one run in detail.
    Run {
        #[arg(value_name = "INDEX")]
        index: usize,
    },
    /// Write runs and their raw records as JSON.
    Export {
        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Summarize a previously exported JSON file.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Dump a section of the decoded object graph.
    Extract {
        #[arg(long, value_name = "NAME")]
        section: Option<String>,
        #[arg(long, value_name = "N", default_value_t = MAX_DUMP_DEPTH)]
        depth: usize,
    },
    /// Set a class's unlocked cruciball level in the save file.
    SetCruciball {
        #[arg(long, value_name = "CLASS")]
        class: String,
        #[arg(long, value_name = "N")]
        level: i64,
    },
    /// Re-read the stats file whenever the game rewrites it.
    Watch {
        #[arg(long, value_name = "MS", default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce_ms: u64,
    },
    /// Show or change stored paths.
    Config {
        #[arg(long, value_name = "DIR")]
        set_install: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        set_save: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct RunsArgs {
    #[arg(long, value_name = "CLASS")]
    class: Option<String>,
    #[arg(long, conflicts_with = "losses")]
    wins: bool,
    #[arg(long)]
    losses: bool,
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

impl RunsArgs {
    fn filter(&self) -> RunFilter {
        let outcome = if self.wins {
            Some(Outcome::Wins)
        } else if self.losses {
            Some(Outcome::Losses)
        } else {
            None
        };
        RunFilter {
            class: self.class.clone(),
            outcome,
            limit: self.limit,
        }
    }
}

fn parse_dialect(value: &str) -> Result<Dialect, String> {
    Dialect::parse(value).ok_or_else(|| {
        format!("invalid dialect '{value}', expected permissive, standard or strict")
    })
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(err) = run(&cli) {
        if cli.debug {
            eprintln!("error: {err:?}");
        } else {
            eprintln!("error: {err:#}");
        }
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut store = match cli.config.clone().or_else(SettingsStore::default_path) {
        Some(path) => SettingsStore::open(path),
        None => SettingsStore::in_memory(),
    };
    let options = TextRenderOptions {
        verbose: cli.verbose,
    };

    match &cli.command {
        Command::Summary => {
            let session = open_stats(cli, &mut store)?;
            if cli.json {
                print_json(&render_json_summary(&session, JsonStyle::CanonicalV1))?;
            } else {
                print!("{}", render_text_summary(&session, options));
            }
        }
        Command::Runs(args) => {
            let session = open_stats(cli, &mut store)?;
            let rows = args.filter().apply(session.runs());
            if cli.json {
                print_json(&render_json_runs(&rows, JsonStyle::CanonicalV1))?;
            } else {
                print!("{}", render_text_runs(&rows, options));
            }
        }
        Command::Run { index } => {
            let session = open_stats(cli, &mut store)?;
            let run = session.run(*index).ok_or_else(|| {
                anyhow!(
                    "run {index} does not exist; the file holds {} runs",
                    session.runs().len()
                )
            })?;
            if cli.json {
                print_json(&render_json_run(*index, run, JsonStyle::CanonicalV1))?;
            } else {
                print!("{}", render_text_run(*index, run, options));
            }
        }
        Command::Export { output } => {
            let session = open_stats(cli, &mut store)?;
            let exported = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let envelope = session.export(&exported);
            let text = export_to_string(&envelope)?;
            fs::write(output, text)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Exported {} runs to {}",
                envelope.runs.len(),
                output.display()
            );
        }
        Command::Import { file } => {
            let text = fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let runs = import_runs(&text)
                .with_context(|| format!("failed to import {}", file.display()))?;
            let summary = summarize(&runs);
            let issues: Vec<CapabilityIssue> = if summary.reconstructed_runs > 0 {
                vec![CapabilityIssue::ReconstructedHistory]
            } else {
                Vec::new()
            };
            if cli.json {
                print_json(&render_json_run_summary(
                    &summary,
                    &issues,
                    JsonStyle::CanonicalV1,
                ))?;
            } else {
                print!("{}", render_text_run_summary(&summary, &issues, options));
            }
        }
        Command::Extract { section, depth } => {
            let path = match &cli.save {
                Some(save) => save.clone(),
                None => stats_target(cli, &store)?,
            };
            let session = open_session(cli, &mut store, &path)?;
            let graph = session.graph();
            let (label, value) = match section {
                Some(name) => {
                    let value = session.section(name).ok_or_else(|| {
                        anyhow!(
                            "section '{name}' not found; available: {}",
                            session.section_names().join(", ")
                        )
                    })?;
                    (name.as_str(), value)
                }
                None => ("<root>", graph.root()),
            };
            if cli.json {
                print_json(&render_json_section(graph, value))?;
            } else {
                print!(
                    "{}",
                    render_graph_dump(graph, Some(session.resolver()), label, value, *depth)
                );
            }
        }
        Command::SetCruciball { class, level } => {
            let path = save_target(cli, &store)?;
            let mut session = open_session(cli, &mut store, &path)?;
            session.set_class_cruciball(class, *level)?;
            let report = session.write_update(&path)?;
            println!(
                "Set {class} cruciball level to {level} in {}",
                report.path.display()
            );
            if let Some(backup) = &report.backup {
                println!("Backup written to {}", backup.display());
            }
        }
        Command::Watch { debounce_ms } => {
            watch_stats(cli, &mut store, Duration::from_millis(*debounce_ms), options)?;
        }
        Command::Config {
            set_install,
            set_save,
        } => {
            if let Some(dir) = set_install {
                store.set_install_path(dir.clone())?;
            }
            if let Some(file) = set_save {
                store.set_save_path(file.clone())?;
            }
            print_settings(cli, &store)?;
        }
    }
    Ok(())
}

fn print_json(value: &JsonValue) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn print_settings(cli: &Cli, store: &SettingsStore) -> Result<()> {
    let settings = store.settings();
    if cli.json {
        return print_json(&serde_json::to_value(settings)?);
    }
    let show = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    };
    println!("settings file: {}", store.path().display());
    println!("install_path: {}", show(&settings.install_path));
    println!("save_path: {}", show(&settings.save_path));
    if let Some(cache) = &settings.install_cache {
        for path in &cache.paths {
            println!(
                "detected install: {} (at {})",
                path.display(),
                cache.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
    }
    Ok(())
}

/// Explicit `--stats`, else the stats file paired with `--save` or the stored save.
fn stats_target(cli: &Cli, store: &SettingsStore) -> Result<PathBuf> {
    if let Some(stats) = &cli.stats {
        return Ok(stats.clone());
    }
    let save = cli
        .save
        .clone()
        .or_else(|| store.settings().save_path.clone())
        .ok_or_else(|| {
            anyhow!("no stats file given; pass --stats or --save, or store one with `config --set-save`")
        })?;
    stats_path_for_save(&save).ok_or_else(|| {
        anyhow!(
            "cannot derive a stats file from {}; pass --stats explicitly",
            save.display()
        )
    })
}

fn save_target(cli: &Cli, store: &SettingsStore) -> Result<PathBuf> {
    cli.save
        .clone()
        .or_else(|| store.settings().save_path.clone())
        .ok_or_else(|| anyhow!("no save file given; pass --save or store one with `config --set-save`"))
}

fn open_stats(cli: &Cli, store: &mut SettingsStore) -> Result<Session> {
    let path = stats_target(cli, store)?;
    open_session(cli, store, &path)
}

fn open_session(cli: &Cli, store: &mut SettingsStore, path: &Path) -> Result<Session> {
    let engine = Engine::new();
    match resolve_install(cli, store, path) {
        Some(dir) => {
            if !engine.load_type_library(&dir) {
                tracing::warn!(install = %dir.display(), "continuing without a type library");
            }
        }
        None => tracing::warn!("game install not found; enum values will be shown as numbers"),
    }
    engine
        .open_path(path, cli.dialect)
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Install directory from, in order: `--install`, stored settings, the save
/// file's ancestors, the detection cache, then the usual Steam locations.
fn resolve_install(cli: &Cli, store: &mut SettingsStore, path: &Path) -> Option<PathBuf> {
    if let Some(dir) = cli
        .install
        .clone()
        .or_else(|| store.settings().install_path.clone())
    {
        return Some(dir);
    }
    if let Some(dir) = detect_install_dir_from_save_path(path) {
        return Some(dir);
    }

    let now = Utc::now();
    if let Some(dir) = store.cached_install(now) {
        return Some(dir);
    }
    let home = BaseDirs::new()?.home_dir().to_path_buf();
    let dir = first_install_dir(conventional_install_dirs(&home))?;
    if let Err(e) = store.remember_install(dir.clone(), now) {
        tracing::warn!("failed to cache install location: {e:#}");
    }
    Some(dir)
}

fn watch_stats(
    cli: &Cli,
    store: &mut SettingsStore,
    debounce: Duration,
    options: TextRenderOptions,
) -> Result<()> {
    let path = stats_target(cli, store)?;
    let engine = Engine::new();
    if let Some(dir) = resolve_install(cli, store, &path) {
        engine.load_type_library(&dir);
    }

    let report = |engine: &Engine| match engine.open_path(&path, cli.dialect) {
        Ok(session) => {
            println!(
                "[{}] {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                path.display()
            );
            print!("{}", render_text_summary(&session, options));
        }
        Err(e) => tracing::warn!(path = %path.display(), "stats file unreadable: {e}"),
    };

    report(&engine);
    let mut debouncer = Debouncer::new(debounce, FileStamp::read(&path));
    tracing::info!(path = %path.display(), "watching for changes");
    loop {
        thread::sleep(POLL_INTERVAL.min(debounce.max(Duration::from_millis(1))));
        if debouncer.observe(FileStamp::read(&path), Instant::now()) {
            report(&engine);
        }
    }
}
