// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use trainerhub::catalog::HttpCatalog;
use trainerhub::config::{self, Settings};
use trainerhub::download::{DownloadQueue, DownloadRequest, TaskOutcome, TaskReport};
use trainerhub::plugin::{load_plugins, PluginContext};
use trainerhub::refresh::RefreshCoordinator;
use trainerhub::status::{Severity, StatusEvent, StatusSink};
use trainerhub::{library, migrate, TrainerError, TrainerSource};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const UPDATE_API: &str = "https://api.github.com/repos/jeranaias/trainerhub/releases/latest";

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn finish_success(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("\x1b[32m[OK]\x1b[0m {}", message);
    }

    pub fn finish_error(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("\x1b[31m[X]\x1b[0m {}", message);
    }
}

/// trainerhub - local trainer library manager
#[derive(Parser)]
#[command(name = "trainerhub")]
#[command(version = VERSION)]
#[command(about = "Search, download, update and launch game trainers.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed trainers
    List,

    /// Search the trainer catalogs
    Search {
        /// Keyword to search for
        keyword: String,
    },

    /// Download one or more trainers by name
    Download {
        /// Trainer names (catalog search is used to resolve them)
        names: Vec<String>,
    },

    /// Check installed trainers against the catalog and install updates
    Update,

    /// Refresh catalog metadata and translations now
    Refresh,

    /// Launch an installed trainer
    Launch {
        /// Trainer name as shown by `list`
        name: String,
    },

    /// Delete an installed trainer
    Delete {
        /// Trainer name as shown by `list`
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Import trainer executables into the library
    Import {
        /// Executable files to import
        files: Vec<PathBuf>,
        /// Remove the original files after importing
        #[arg(long)]
        delete_originals: bool,
    },

    /// Move the trainer library to a new directory
    SetPath {
        /// New library root
        dir: PathBuf,
    },

    /// Run in the background: periodic catalog refreshes and trainer updates
    Watch {
        /// Seconds between refresh ticks
        #[arg(short, long, default_value_t = 3600)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Two instances would race on the library directory and the queue's
    // single-flight guarantee; refuse to start a second one.
    let _instance_lock = acquire_instance_lock()?;

    let mut settings = Settings::load()?;
    settings.ensure_library_root()?;

    match cli.command {
        Commands::List => cmd_list(&settings),
        Commands::Search { keyword } => cmd_search(&settings, &keyword).await,
        Commands::Download { names } => cmd_download(&settings, names).await,
        Commands::Update => cmd_update(&settings).await,
        Commands::Refresh => cmd_refresh(&settings).await,
        Commands::Launch { name } => cmd_launch(&settings, &name),
        Commands::Delete { name, yes } => cmd_delete(&settings, &name, yes),
        Commands::Import {
            files,
            delete_originals,
        } => cmd_import(&settings, files, delete_originals),
        Commands::SetPath { dir } => cmd_set_path(&mut settings, dir).await,
        Commands::Watch { interval } => cmd_watch(&settings, interval).await,
    }
}

fn acquire_instance_lock() -> Result<File> {
    let lock_path = config::config_dir()?.join("instance.lock");
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open lock file {:?}", lock_path))?;
    if lock_file.try_lock_exclusive().is_err() {
        anyhow::bail!("another trainerhub instance is already running");
    }
    Ok(lock_file)
}

fn fling_source(settings: &Settings) -> Result<Arc<dyn TrainerSource>> {
    let data_dir = config::data_dir()?;
    Ok(Arc::new(HttpCatalog::fling(
        &settings.fling_download_server,
        &data_dir,
    )))
}

fn xiaoxing_source(settings: &Settings) -> Result<Option<Arc<dyn TrainerSource>>> {
    if !settings.enable_xiao_xing {
        return Ok(None);
    }
    let data_dir = config::data_dir()?;
    Ok(Some(Arc::new(HttpCatalog::xiaoxing(&data_dir))))
}

fn print_event(event: &StatusEvent) {
    match event {
        StatusEvent::Line(line) => match line.severity {
            Severity::Info => println!("    {}", line.text),
            Severity::Success => println!("    {}", line.text.green()),
            Severity::Failure => println!("    {}", line.text.red()),
        },
        StatusEvent::WidgetCreate { name, text } => {
            println!("{} {}", format!("[{name}]").dimmed(), text.dimmed());
        }
        StatusEvent::WidgetUpdate { name, text, state } => {
            let tag = format!("[{name}]").dimmed();
            match state {
                Severity::Failure => println!("{tag} {}", text.red()),
                Severity::Success => println!("{tag} {}", text.green()),
                Severity::Info => println!("{tag} {text}"),
            }
        }
        StatusEvent::WidgetRemove { .. } => {}
    }
}

fn print_report(report: &TaskReport) {
    match &report.outcome {
        TaskOutcome::Succeeded { installed_path } => {
            println!(
                "{} {} -> {}",
                "[OK]".green(),
                report.name,
                installed_path.display()
            );
        }
        TaskOutcome::Failed { error } => {
            println!("{} {}: {}", "[X]".red(), report.name, error);
        }
    }
}

fn cmd_list(settings: &Settings) -> Result<()> {
    let index = library::rescan(&settings.download_path)?;
    if index.is_empty() {
        println!("No trainers installed under {}", settings.download_path.display());
        println!("Get started with: {}", "trainerhub search <keyword>".cyan());
        return Ok(());
    }
    println!("{} trainer(s) in {}:", index.len(), settings.download_path.display());
    for (name, path) in &index {
        println!("  {}  {}", name.bold(), path.display().to_string().dimmed());
    }
    Ok(())
}

async fn cmd_search(settings: &Settings, keyword: &str) -> Result<()> {
    if keyword.trim().is_empty() {
        anyhow::bail!("please enter a search keyword");
    }
    let fling = fling_source(settings)?;
    let spin = spinner::create("Searching...");
    match fling.search(keyword).await {
        Ok(entries) if entries.is_empty() => {
            spinner::finish_error(&spin, "No trainers found.");
        }
        Ok(entries) => {
            spinner::finish_success(&spin, &format!("{} result(s):", entries.len()));
            for entry in entries {
                println!("  {}", entry.name);
            }
        }
        Err(err) => {
            spinner::finish_error(&spin, &format!("Search failed: {err}"));
        }
    }
    Ok(())
}

async fn cmd_download(settings: &Settings, names: Vec<String>) -> Result<()> {
    if names.is_empty() {
        anyhow::bail!("please name at least one trainer to download");
    }

    let fling = fling_source(settings)?;
    let (events, mut events_rx) = StatusSink::channel();
    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let queue = DownloadQueue::spawn(fling.clone(), events, reports_tx);

    let snapshot = library::rescan(&settings.download_path)?;
    let mut queued = 0usize;
    for name in &names {
        let entries = fling.search(name).await?;
        let entry = entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .or_else(|| entries.first())
            .cloned();
        match entry {
            Some(entry) => {
                println!("Queued {}", entry.name.bold());
                queue.enqueue(DownloadRequest::new(
                    entry,
                    snapshot.clone(),
                    settings.download_path.clone(),
                ))?;
                queued += 1;
            }
            None => println!("{} no catalog match for {name}", "[X]".red()),
        }
    }

    if queued == 0 {
        queue.shutdown();
        anyhow::bail!("nothing to download");
    }

    let mut remaining = queued;
    let mut failed = 0usize;
    while remaining > 0 {
        tokio::select! {
            Some(event) = events_rx.recv() => print_event(&event),
            Some(report) = reports_rx.recv() => {
                print_report(&report);
                if !report.outcome.is_success() {
                    failed += 1;
                }
                remaining -= 1;
            }
        }
    }

    queue.shutdown();
    if failed > 0 {
        anyhow::bail!("{failed} download(s) failed");
    }
    Ok(())
}

async fn cmd_update(settings: &Settings) -> Result<()> {
    let fling = fling_source(settings)?;

    let spin = spinner::create("Checking for trainer updates...");
    let index = library::rescan(&settings.download_path)?;
    let updates = match fling.check_updates(&index).await {
        Ok(updates) => updates,
        Err(err) => {
            spinner::finish_error(&spin, &format!("Update check failed: {err}"));
            std::process::exit(1);
        }
    };
    if updates.is_empty() {
        spinner::finish_success(&spin, "All trainers are up to date.");
        return Ok(());
    }
    spinner::finish_success(&spin, &format!("{} trainer update(s) found", updates.len()));

    let (events, mut events_rx) = StatusSink::channel();
    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let queue = DownloadQueue::spawn(fling.clone(), events, reports_tx);

    let mut remaining = updates.len();
    for update in updates {
        queue.enqueue(DownloadRequest::update(
            update.name,
            update.existing_path,
            update.download_url,
            settings.download_path.clone(),
        ))?;
    }

    let mut failed = 0usize;
    while remaining > 0 {
        tokio::select! {
            Some(event) = events_rx.recv() => print_event(&event),
            Some(report) = reports_rx.recv() => {
                print_report(&report);
                if !report.outcome.is_success() {
                    failed += 1;
                }
                remaining -= 1;
            }
        }
    }
    queue.shutdown();
    if failed > 0 {
        anyhow::bail!("{failed} update(s) failed");
    }
    Ok(())
}

async fn cmd_refresh(settings: &Settings) -> Result<()> {
    let fling = fling_source(settings)?;
    let xiaoxing = xiaoxing_source(settings)?;
    let data_dir = config::data_dir()?;

    let spin = spinner::create("Refreshing catalog data...");
    match fling.refresh_index().await {
        Ok(count) => spinner::finish_success(&spin, &format!("Fling: {count} trainers indexed")),
        Err(err) => spinner::finish_error(&spin, &format!("Fling refresh failed: {err}")),
    }

    if let Some(xiaoxing) = xiaoxing {
        let spin = spinner::create("Refreshing XiaoXing data...");
        match xiaoxing.refresh_index().await {
            Ok(count) => {
                spinner::finish_success(&spin, &format!("XiaoXing: {count} trainers indexed"))
            }
            Err(err) => spinner::finish_error(&spin, &format!("XiaoXing refresh failed: {err}")),
        }
    }

    if settings.auto_update_translations {
        let spin = spinner::create("Refreshing translations...");
        match fling.fetch_translations(&data_dir).await {
            Ok(bytes) => spinner::finish_success(&spin, &format!("Translations: {bytes} bytes")),
            Err(err) => spinner::finish_error(&spin, &format!("Translation refresh failed: {err}")),
        }
    }
    Ok(())
}

fn cmd_launch(settings: &Settings, name: &str) -> Result<()> {
    let index = library::rescan(&settings.download_path)?;
    library::launch(&index, name)?;
    println!("{} launched {}", "[OK]".green(), name.bold());
    Ok(())
}

fn cmd_delete(settings: &Settings, name: &str, yes: bool) -> Result<()> {
    let index = library::rescan(&settings.download_path)?;
    if !index.contains_key(name) {
        anyhow::bail!("no trainer named {name}");
    }

    if !yes {
        let confirmed = inquire::Confirm::new(&format!("Delete {name}?"))
            .with_default(false)
            .prompt()
            .unwrap_or(false);
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match library::delete(&index, name) {
        Ok(()) => {
            println!("{} deleted {}", "[OK]".green(), name.bold());
            Ok(())
        }
        Err(err @ TrainerError::InUse { .. }) => {
            println!("{} {}", "[X]".red(), err);
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_import(settings: &Settings, files: Vec<PathBuf>, delete_originals: bool) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("please name at least one .exe file to import");
    }
    let count = library::import(&settings.download_path, &files)?;
    println!("{} imported {count} trainer(s)", "[OK]".green());

    if delete_originals {
        for file in &files {
            if let Err(err) = std::fs::remove_file(file) {
                println!(
                    "{} failed to delete original {}: {err}",
                    "[X]".red(),
                    file.display()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_set_path(settings: &mut Settings, dir: PathBuf) -> Result<()> {
    let spin = spinner::create("Migrating existing trainers...");
    match migrate::migrate(settings.download_path.clone(), dir).await {
        Ok(new_root) => {
            settings.download_path = new_root;
            settings.save()?;
            spinner::finish_success(
                &spin,
                &format!("Migration complete! Library is now at {}", settings.download_path.display()),
            );
            Ok(())
        }
        Err(err) => {
            spinner::finish_error(&spin, &format!("Error migrating trainers: {err}"));
            std::process::exit(1);
        }
    }
}

async fn cmd_watch(settings: &Settings, interval: u64) -> Result<()> {
    if settings.show_warning {
        println!(
            "{}",
            "Trainers modify running games. Only use them in single-player, and only \
             download from sources you trust."
                .yellow()
        );
    }

    let fling = fling_source(settings)?;
    let xiaoxing = xiaoxing_source(settings)?;
    let data_dir = config::data_dir()?;

    let ctx = PluginContext {
        library_root: settings.download_path.clone(),
        temp_download_dir: config::temp_download_dir(),
    };
    let mut plugins = load_plugins(&ctx);

    if settings.check_app_update {
        tokio::spawn(check_app_update());
    }

    let (events, mut events_rx) = StatusSink::channel();
    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let queue = DownloadQueue::spawn(fling.clone(), events.clone(), reports_tx);

    let coordinator = RefreshCoordinator::new(
        fling,
        xiaoxing,
        queue.clone(),
        data_dir,
        settings.clone(),
        events,
    );

    println!(
        "Watching. Refresh every {interval}s, library at {}. Ctrl-C to stop.",
        settings.download_path.display()
    );

    let timer = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .run_timer(Duration::from_secs(interval.max(1)))
                .await;
        })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events_rx.recv() => print_event(&event),
            Some(report) = reports_rx.recv() => print_report(&report),
        }
    }

    timer.abort();
    queue.shutdown();
    for plugin in &mut plugins {
        if let Err(err) = plugin.cleanup() {
            tracing::warn!("plugin {} cleanup failed: {err}", plugin.name());
        }
    }
    println!("Stopped.");
    Ok(())
}

async fn check_app_update() {
    let client = match reqwest::Client::builder()
        .user_agent(concat!("trainerhub/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(_) => return,
    };
    let response = match client.get(UPDATE_API).send().await {
        Ok(r) => r,
        Err(err) => {
            tracing::debug!("update check failed: {err}");
            return;
        }
    };
    let Ok(json) = response.json::<serde_json::Value>().await else {
        return;
    };
    if let Some(latest) = json.get("tag_name").and_then(|v| v.as_str()) {
        let latest = latest.trim_start_matches('v');
        if latest != VERSION {
            println!(
                "{}",
                format!("Update available: {VERSION} -> {latest}").yellow()
            );
        }
    }
}
