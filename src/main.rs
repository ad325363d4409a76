use clap::Parser;
use cpu_idle_stabilizer::cli::Cli;
use cpu_idle_stabilizer::{LoadScheduler, UserSettings};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cpu_idle_stabilizer=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Blocks until an interrupt or terminate signal. SIGHUP reloads `settings_path` into the
/// running scheduler.
#[cfg(unix)]
async fn run_until_shutdown(
    scheduler: &mut LoadScheduler,
    settings_path: &Path,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupt received");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("terminate received");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!(path = %settings_path.display(), "reloading settings");
                let settings = UserSettings::load(settings_path);
                scheduler.update_settings(settings.target_total_percent, settings.eco_mode);
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_until_shutdown(
    _scheduler: &mut LoadScheduler,
    _settings_path: &Path,
) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let settings_path = cli.settings_path();
    let persisted = UserSettings::load(&settings_path);
    let settings = cli.apply_overrides(persisted);

    // Flags on the command line become the new persisted defaults.
    if cli.has_overrides() && settings != persisted {
        if let Err(e) = settings.save(&settings_path) {
            warn!(error = %e, "could not persist settings");
        }
    }

    let mut scheduler = LoadScheduler::new();
    info!(
        target_percent = settings.target_total_percent,
        eco_mode = settings.eco_mode,
        cores = scheduler.core_count(),
        settings = %settings_path.display(),
        "starting in CLI mode"
    );

    scheduler.start(settings.target_total_percent, settings.eco_mode);
    println!(
        "CPU Idle Stabilizer\nTarget: {}%\nEco: {}\nPress Ctrl+C to stop.",
        scheduler.target_total_percent(),
        if scheduler.eco_mode() { "on" } else { "off" }
    );

    let result = run_until_shutdown(&mut scheduler, &settings_path).await;
    scheduler.stop();
    result?;
    Ok(())
}
