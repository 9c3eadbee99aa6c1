//! modbay CLI - command-line interface
//!
//! This binary is a thin shell over the modbay library:
//! - `Cli` / `Commands`: argument parsing (clap)
//! - `CliError`: centralized error handling with documented exit codes
//!
//! Settings are loaded from `~/.modbay/config.ini` on startup; CLI
//! arguments override config file values when specified.

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use modbay::config::{default_cache_dir, ConfigFile};
use modbay::download::{CancellationToken, HttpDownloader, ReqwestFetch};
use modbay::game::StaticGame;
use modbay::registry::RegistryView;
use modbay::release::Stability;
use modbay::repository::{
    fetch_repository_list, RepoDataManager, Repository, Staleness, UpdateResult,
};
use modbay::resolver::{RelationshipResolver, ResolverOptions};
use modbay::user::User;
use modbay::version::GameVersionCriteria;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "modbay", version, about = "Mod package manager")]
struct Cli {
    /// Game build to resolve against (e.g. 1.12.5)
    #[arg(long, global = true)]
    game_version: Option<String>,

    /// Config file path (default: ~/.modbay/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Refresh repository metadata
    Update {
        /// Re-download even when ETags say nothing changed
        #[arg(long)]
        force: bool,
    },
    /// Compute and print an installation plan
    Install {
        /// Module identifiers to install
        identifiers: Vec<String>,
        /// Also expand suggested modules
        #[arg(long)]
        with_suggests: bool,
        /// Skip recommended modules
        #[arg(long)]
        no_recommends: bool,
    },
    /// Show what depends on the given modules
    Remove {
        /// Module identifiers to remove
        identifiers: Vec<String>,
    },
    /// List available modules
    List,
}

/// Console implementation of the presentation collaborator.
struct ConsoleUser;

impl User for ConsoleUser {
    fn raise_message(&self, text: &str) {
        println!("{}", text);
    }

    fn raise_progress(&self, text: &str, percent: u8) {
        println!("[{:>3}%] {}", percent, text);
    }

    fn raise_error(&self, text: &str) {
        eprintln!("{}", text);
    }
}

/// Nag when the cached metadata is old enough to mislead.
fn warn_if_stale(manager: &RepoDataManager, repos: &[Repository], user: &ConsoleUser) {
    match manager.staleness(repos) {
        Staleness::Fresh => {}
        Staleness::Stale => user.raise_message(
            "Repository metadata is more than 3 days old; consider running 'modbay update'.",
        ),
        Staleness::VeryStale => user.raise_error(
            "Repository metadata is more than 14 days old; run 'modbay update' first.",
        ),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => {}
        Err(e) => e.exit(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let _guard = modbay::logging::init_logging("logs", "modbay.log")
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path),
        None => ConfigFile::load(),
    }
    .map_err(|e| CliError::Config(e.to_string()))?;

    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(default_cache_dir);

    let game_version = cli.game_version.as_deref().unwrap_or("1.12.5");
    let game = StaticGame::new(
        "KSP",
        "https://meta.modbay.example/repositories.json",
        "https://meta.modbay.example/default.json",
        vec![game_version
            .parse()
            .map_err(|e| CliError::Config(format!("bad --game-version: {}", e)))?],
    );

    let fetch = ReqwestFetch::new(
        Duration::from_secs(config.download_timeout),
        &modbay::user_agent(),
    )
    .map_err(|e| CliError::Config(e.to_string()))?;
    let downloader = HttpDownloader::new(fetch);

    let manager = RepoDataManager::new(&cache_dir);
    let user = ConsoleUser;

    // Extra repositories add to the game's default list; duplicates by URL
    // are collapsed downstream.
    let mut repos = fetch_repository_list(&game, &downloader).await;
    repos.extend(config.extra_repositories.clone());
    info!(repos = repos.len(), cache_dir = %cache_dir.display(), "repositories configured");
    manager.prepopulate(&repos, &user);

    let criteria = GameVersionCriteria::single(
        game_version
            .parse()
            .map_err(|e| CliError::Config(format!("bad --game-version: {}", e)))?,
    );

    match cli.command {
        Commands::Update { force } => {
            let cancel = CancellationToken::new();
            let result = manager
                .update(
                    &repos,
                    &game,
                    force,
                    &downloader,
                    &cancel,
                    &user,
                    &modbay::user_agent(),
                )
                .await?;
            match result {
                UpdateResult::Updated => println!("Repositories updated."),
                UpdateResult::NoChanges => println!("Already up to date."),
                UpdateResult::OutdatedClient => {
                    println!("Updated, but some repositories need a newer modbay.")
                }
            }
            Ok(())
        }

        Commands::Install {
            identifiers,
            with_suggests,
            no_recommends,
        } => {
            warn_if_stale(&manager, &repos, &user);
            let view = RegistryView::new(&manager, repos, vec![], vec![], vec![]);
            let tolerance = config.stability_tolerance;

            let mut requests = Vec::new();
            for identifier in &identifiers {
                let release = view
                    .latest_available(identifier, &criteria, tolerance)
                    .ok_or_else(|| CliError::NotFound(identifier.clone()))?;
                requests.push(release);
            }

            let options = ResolverOptions {
                with_recommends: !no_recommends,
                with_suggests,
                stability_tolerance: tolerance,
                ..Default::default()
            };
            let mut resolver = RelationshipResolver::new(&view, criteria, options);
            resolver.resolve(&requests, &[])?;

            println!("Installation plan:");
            for release in resolver.mod_list() {
                let size = release
                    .download_size
                    .map(|bytes| format!(" ({} bytes)", bytes))
                    .unwrap_or_default();
                println!("  {}{}", release, size);
                if let Some(url) = &release.download {
                    println!("      {}", url);
                }
            }
            Ok(())
        }

        Commands::Remove { identifiers } => {
            let view = RegistryView::new(&manager, repos, vec![], vec![], vec![]);
            for identifier in &identifiers {
                let dependents: Vec<String> = view
                    .all_available()
                    .into_iter()
                    .filter(|release| {
                        release
                            .depends
                            .iter()
                            .any(|d| d.identifiers().contains(&identifier.as_str()))
                    })
                    .map(|release| release.to_string())
                    .collect();
                if dependents.is_empty() {
                    println!("{}: nothing depends on it", identifier);
                } else {
                    println!("{}: required by {}", identifier, dependents.join(", "));
                }
            }
            Ok(())
        }

        Commands::List => {
            warn_if_stale(&manager, &repos, &user);
            let view = RegistryView::new(&manager, repos, vec![], vec![], vec![]);
            let mut rows: Vec<(String, String, u64)> = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for release in view.all_available() {
                if !seen.insert(release.identifier.clone()) {
                    continue;
                }
                if let Some(latest) =
                    view.latest_available(&release.identifier, &criteria, Stability::Development)
                {
                    let downloads = view.downloads(&latest.identifier).unwrap_or(0);
                    rows.push((
                        latest.identifier.clone(),
                        latest.version.to_string(),
                        downloads,
                    ));
                }
            }
            rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
            for (identifier, version, downloads) in rows {
                println!("{:<40} {:<16} {:>10}", identifier, version, downloads);
            }
            Ok(())
        }
    }
}
