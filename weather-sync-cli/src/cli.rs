use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use weather_sync_core::{
    Config, LocationStore, ManifestStore, ObjectKey, OpenWeatherClient, Reconciler, UnitSystem,
};

use crate::runner;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-sync", version, about = "Keep Location resources in sync with live weather")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "weather_sync=info,weather_sync_core=info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set controller options. Prompts interactively when no flag is given.
    Configure {
        #[arg(long)]
        endpoint: Option<String>,

        /// One of "standard", "metric", "imperial".
        #[arg(long)]
        units: Option<String>,

        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Period used by locations without `refreshPeriod`, e.g. "5m".
        #[arg(long)]
        refresh_period: Option<String>,

        /// Default manifest for `run`, `reconcile` and `get`.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Reconcile one location once and print the result.
    Reconcile {
        /// Location key, `<namespace>/<name>`.
        key: ObjectKey,

        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Keep every location in the manifest in sync until interrupted.
    Run {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// List locations with their last observed weather.
    Get {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Configure { endpoint, units, timeout_secs, refresh_period, manifest } => {
                let flags = ConfigureFlags { endpoint, units, timeout_secs, refresh_period, manifest };
                configure(config, &config_path, flags)
            }
            Command::Reconcile { key, manifest } => {
                let manifest = resolve_manifest(manifest, &config)?;
                let (store, reconciler) = build(&config, &manifest).await?;
                let cancel = shutdown_token();

                let action = reconciler
                    .reconcile(&key, &cancel)
                    .await
                    .with_context(|| format!("Reconcile of '{key}' failed"))?;

                match action.requeue_after() {
                    Some(next) => {
                        println!("{key}: synced, next refresh in {}", runner::format_period(next));
                        runner::print_table(&store.list().await?);
                    }
                    None => println!("{key}: not found in {}", manifest.display()),
                }
                Ok(())
            }
            Command::Run { manifest } => {
                let manifest = resolve_manifest(manifest, &config)?;
                let (store, reconciler) = build(&config, &manifest).await?;
                let keys = store.list().await?.iter().map(|loc| loc.key()).collect();

                runner::run(&reconciler, keys, shutdown_token()).await
            }
            Command::Get { manifest } => {
                let manifest = resolve_manifest(manifest, &config)?;
                let store = ManifestStore::load(&manifest).await?;

                runner::print_table(&store.list().await?);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
struct ConfigureFlags {
    endpoint: Option<String>,
    units: Option<String>,
    timeout_secs: Option<u64>,
    refresh_period: Option<String>,
    manifest: Option<PathBuf>,
}

impl ConfigureFlags {
    fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.units.is_none()
            && self.timeout_secs.is_none()
            && self.refresh_period.is_none()
            && self.manifest.is_none()
    }
}

fn configure(mut config: Config, path: &Path, flags: ConfigureFlags) -> Result<()> {
    let flags = if flags.is_empty() { prompt(&config)? } else { flags };

    if let Some(endpoint) = flags.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(units) = flags.units {
        config.units = units;
    }
    if let Some(timeout_secs) = flags.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    if let Some(refresh_period) = flags.refresh_period {
        config.default_refresh_period = refresh_period;
    }
    if let Some(manifest) = flags.manifest {
        config.manifest = Some(manifest);
    }

    // Refuse to persist something the reconciler would reject.
    config.settings()?;
    config.save_to(path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn prompt(config: &Config) -> Result<ConfigureFlags> {
    let endpoint = inquire::Text::new("Provider endpoint:")
        .with_default(&config.endpoint)
        .prompt()?;

    let current = UnitSystem::try_from(config.units.as_str()).unwrap_or_default();
    let cursor = UnitSystem::all().iter().position(|u| *u == current).unwrap_or(0);
    let units = inquire::Select::new("Unit system:", UnitSystem::all().to_vec())
        .with_starting_cursor(cursor)
        .prompt()?;

    let timeout_secs = inquire::CustomType::<u64>::new("Request timeout (seconds):")
        .with_default(config.timeout_secs)
        .prompt()?;

    let refresh_period = inquire::Text::new("Default refresh period:")
        .with_default(&config.default_refresh_period)
        .prompt()?;

    let manifest = inquire::Text::new("Manifest path (empty to skip):")
        .with_default(
            &config.manifest.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        )
        .prompt()?;

    Ok(ConfigureFlags {
        endpoint: Some(endpoint),
        units: Some(units.to_string()),
        timeout_secs: Some(timeout_secs),
        refresh_period: Some(refresh_period),
        manifest: (!manifest.trim().is_empty()).then(|| PathBuf::from(manifest.trim())),
    })
}

fn resolve_manifest(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or_else(|| config.manifest.clone()).ok_or_else(|| {
        anyhow!(
            "No manifest configured.\n\
             Hint: pass --manifest <path> or run `weather-sync configure --manifest <path>`."
        )
    })
}

async fn build(config: &Config, manifest: &Path) -> Result<(Arc<ManifestStore>, Reconciler)> {
    let settings = config.settings().context("Invalid configuration")?;
    let store = Arc::new(ManifestStore::load(manifest).await?);
    tracing::debug!(manifest = %store.path().display(), "loaded manifest");
    let client =
        OpenWeatherClient::from_settings(&settings).context("Failed to build HTTP client")?;

    let reconciler = Reconciler::with_store(settings, Arc::new(client), store.clone());
    Ok((store, reconciler))
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            trigger.cancel();
        }
    });
    token
}
