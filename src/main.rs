mod cli;
mod daemon;
mod monitor;
mod notify;
mod scan;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, DbAction, SettingsAction};
use dovarr_analyze::{describe_verdict, Classifier};
use dovarr_av::tools::ToolRegistry;
use dovarr_convert::{ConvertOptions, Converter};
use dovarr_core::{Config, Result};
use dovarr_db::queries::{admin, current, discovered, failed, processed, settings};
use dovarr_db::{get_conn, init_pool};
use monitor::{ArrMonitor, Monitor};
use notify::Notifier;

/// Exit code for an interactive abort (SIGINT) during a non-batch operation.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dovarr=debug,dovarr_analyze=debug,dovarr_convert=debug,dovarr_av=debug".to_string()
        } else {
            "dovarr=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(dispatch(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_env();

    match cli.command {
        Commands::Start => start_daemon(config).await,
        Commands::Scan { full, limit } => run_scan(config, full, limit).await,
        Commands::Probe { file, json } => probe_file(config, &file, json).await,
        Commands::Convert {
            file,
            safe,
            force,
            hdr10,
            delete_backup,
            output_dir,
            temp_dir,
        } => {
            let opts = ConvertOptions {
                safe,
                force,
                hdr10,
                delete_backup,
                output_dir,
                temp_dir,
            };
            convert_file(config, &file, opts).await
        }
        Commands::Status => show_status(config),
        Commands::Settings { action } => manage_settings(config, action),
        Commands::Db { action } => manage_db(config, action),
        Commands::CheckTools => check_tools(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn start_daemon(config: Config) -> Result<ExitCode> {
    for warning in config.validate()? {
        tracing::warn!("{warning}");
    }

    let tools = Arc::new(ToolRegistry::discover());
    tools.require_all()?;

    let db = init_pool(&config.database_path())?;

    let notifier = config
        .webhook_url
        .as_deref()
        .map(|url| Arc::new(Notifier::new(url)));

    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
    if let Some(radarr) = &config.radarr {
        monitors.push(Box::new(ArrMonitor::radarr(radarr)));
    }
    if let Some(sonarr) = &config.sonarr {
        monitors.push(Box::new(ArrMonitor::sonarr(sonarr)));
    }

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone());

    daemon::Scheduler::new(config, db, tools, notifier, monitors, cancel)
        .run()
        .await?;

    Ok(ExitCode::SUCCESS)
}

async fn run_scan(config: Config, full: bool, limit: Option<usize>) -> Result<ExitCode> {
    config.validate()?;
    let tools = Arc::new(ToolRegistry::discover());
    tools.require_all()?;

    let db = init_pool(&config.database_path())?;
    let classifier = Classifier::new(tools, config.temp_dir.clone());

    // One-shot scans cover every mounted root regardless of the
    // auto-process mode; the mode only gates the daemon.
    let roots = scan::scan_roots(dovarr_core::AutoProcessMode::All, &config);
    if roots.is_empty() {
        eprintln!("no media roots are mounted");
        return Ok(ExitCode::from(1));
    }

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone());

    let outcome = if full {
        scan::full_scan(&db, &classifier, &roots, limit, &cancel).await?
    } else {
        scan::delta_scan(&db, &classifier, &roots, limit, &cancel).await?
    };

    println!(
        "Scanned {} file(s): {} Profile 7, {} skipped, {} error(s)",
        outcome.scanned, outcome.profile7, outcome.skipped, outcome.errors
    );

    let conn = get_conn(&db)?;
    let pending = discovered::get_discovered(&conn)?;
    if !pending.is_empty() {
        println!("\nAwaiting conversion:");
        for entry in pending.iter().take(20) {
            println!(
                "  [{}] {}",
                entry.el_type.as_deref().unwrap_or("?"),
                entry.title
            );
        }
        if pending.len() > 20 {
            println!("  ... and {} more", pending.len() - 20);
        }
    }

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

async fn probe_file(config: Config, file: &Path, json: bool) -> Result<ExitCode> {
    let tools = Arc::new(ToolRegistry::discover());
    let classifier = Classifier::new(tools, config.temp_dir.clone());

    let verdict = classifier.classify(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("File: {}", verdict.path.display());
    println!("Size: {} bytes", verdict.file_size);
    if let Some(codec) = &verdict.video_codec {
        println!("Codec: {codec}");
    }
    println!("Verdict: {}", describe_verdict(&verdict));
    if verdict.default_peak_used {
        println!("Note: no usable MaxCLL tag; assumed a 1000 nit base layer");
    }
    if verdict.needs_conversion() {
        println!(
            "Conversion: needed ({})",
            if verdict.safe_to_auto_convert() {
                "safe for auto mode"
            } else {
                "manual force required"
            }
        );
    } else {
        println!("Conversion: not needed");
    }

    Ok(ExitCode::SUCCESS)
}

async fn convert_file(config: Config, file: &Path, opts: ConvertOptions) -> Result<ExitCode> {
    let tools = Arc::new(ToolRegistry::discover());
    tools.require_all()?;

    let classifier = Classifier::new(Arc::clone(&tools), config.temp_dir.clone());
    let converter = Converter::new(Arc::clone(&tools), config.temp_dir.clone());

    // The catalog is optional for one-shot conversions; without it the
    // default backup policy applies and no processed row is written.
    let db = init_pool(&config.database_path())
        .map_err(|e| {
            tracing::warn!("catalog unavailable ({e}); conversion will not be recorded");
            e
        })
        .ok();

    let backup_enabled = match &db {
        Some(db) => {
            let conn = get_conn(db)?;
            settings::get_bool(&conn, settings::BACKUP_ENABLED, true)?
        }
        None => true,
    };

    println!("Analyzing {}...", file.display());
    let verdict = classifier.classify(file).await?;
    println!("Verdict: {}", describe_verdict(&verdict));

    let outcome = tokio::select! {
        result = converter.convert_to_p8(&verdict, &opts, backup_enabled) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    if let Some(db) = &db {
        let conn = get_conn(db)?;
        let path_str = file.to_string_lossy();
        processed::mark_processed(
            &conn,
            &path_str,
            "7",
            if opts.hdr10 { "hdr10" } else { "8" },
            verdict.el_type_label(),
            verdict.file_size as i64,
        )?;
        discovered::remove_discovered(&conn, &path_str)?;
    }

    println!("Converted: {}", outcome.output.display());
    println!("Frames verified: {}", outcome.frame_count);
    if outcome.used_safe_path {
        println!("Used the safe (disk extraction) path");
    }
    match outcome.backup {
        Some(backup) => println!("Backup: {}", backup.display()),
        None => println!("Backup: none (disabled)"),
    }

    Ok(ExitCode::SUCCESS)
}

fn show_status(config: Config) -> Result<ExitCode> {
    let db = init_pool(&config.database_path())?;
    let conn = get_conn(&db)?;

    match current::get_current_conversion(&conn)? {
        Some(marker) => {
            println!("Converting: {} (started {})", marker.title, marker.started_at);
        }
        None => println!("Converting: nothing in flight"),
    }

    let stats = admin::stats(&conn)?;
    println!();
    println!("Scanned:    {} files ({} with Dolby Vision)", stats.scanned_total, stats.scanned_with_dovi);
    println!("Profile 7:  {} found, {} awaiting conversion", stats.scanned_profile7, stats.discovered);
    println!("Profile 8:  {}", stats.scanned_profile8);
    println!(
        "Processed:  {} files ({:.1} GB)",
        stats.processed,
        stats.processed_bytes as f64 / 1e9
    );
    println!("Failed:     {}", stats.failed);

    let failures = failed::get_failed(&conn, 10)?;
    if !failures.is_empty() {
        println!("\nRecent failures:");
        for failure in failures {
            println!(
                "  {} (retries: {})\n    {}",
                failure.file_path, failure.retry_count, failure.error_message
            );
        }
    }

    let mode = settings::get_setting(&conn, settings::AUTO_PROCESS_MODE)?
        .unwrap_or_else(|| "off".to_string());
    let setup = settings::initial_setup_complete(&conn)?;
    println!("\nAuto mode: {mode} (setup {})", if setup { "complete" } else { "incomplete" });

    Ok(ExitCode::SUCCESS)
}

fn manage_settings(config: Config, action: SettingsAction) -> Result<ExitCode> {
    let db = init_pool(&config.database_path())?;
    let conn = get_conn(&db)?;

    match action {
        SettingsAction::List => {
            for (key, value) in settings::get_all_settings(&conn)? {
                println!("{key} = {value}");
            }
        }
        SettingsAction::Get { key } => match settings::get_setting(&conn, &key)? {
            Some(value) => println!("{value}"),
            None => {
                eprintln!("{key} is not set");
                return Ok(ExitCode::from(1));
            }
        },
        SettingsAction::Set { key, value } => {
            settings::validate_setting(&key, &value)?;
            settings::set_setting(&conn, &key, &value)?;
            println!("{key} = {value}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn manage_db(config: Config, action: DbAction) -> Result<ExitCode> {
    let db = init_pool(&config.database_path())?;
    let conn = get_conn(&db)?;

    match action {
        DbAction::Export => {
            let json = admin::export_json(&conn)?;
            let path = config.config_dir.join("dovarr_export.json");
            std::fs::write(&path, json)?;
            println!("Exported to {}", path.display());
        }
        DbAction::Clear => {
            let removed = admin::clear_database(&conn)?;
            println!("Database cleared ({removed} records removed)");
            println!("Scans and initial setup are required again.");
        }
        DbAction::ClearFailed { path } => {
            let path_str = path.as_ref().map(|p| p.to_string_lossy().into_owned());
            let removed = failed::clear_failed(&conn, path_str.as_deref())?;
            println!("Cleared {removed} failed record(s)");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn check_tools() -> Result<ExitCode> {
    let registry = ToolRegistry::discover();
    let tools = registry.check_all();

    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in &tools {
        let status = if tool.available {
            "OK"
        } else {
            all_ok = false;
            "MISSING"
        };

        print!("[{status:>7}] {}", tool.name);
        if let Some(version) = &tool.version {
            print!(" ({version})");
        }
        if let Some(path) = &tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some tools are missing; install them before running the daemon.");
        Ok(ExitCode::from(1))
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Flip the cancellation token on SIGINT or SIGTERM; the loops observe the
/// token at their next suspension point.
fn install_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
