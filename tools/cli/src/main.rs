//! worldsync CLI - command line interface for world backup providers.
//!
//! Loads the configured providers, registers them, and runs backup,
//! list, restore and delete operations against a provider by name.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use worldsync_common::{BackupName, Instance, InstanceName};
use worldsync_storage::{ProviderCatalog, SettingKind};
use worldsync_sync::{DispatchConfig, JobRequest, SyncDispatcher};

#[derive(Parser)]
#[command(name = "worldsync")]
#[command(about = "worldsync - World backup and sync providers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Providers file (default: platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered providers.
    Providers,

    /// Show the settings a provider accepts.
    Settings {
        /// Provider name.
        provider: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a providers file with a single local provider.
    InitConfig {
        /// Folder the local provider stores backups in.
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Back up a world folder.
    Backup {
        /// Provider name.
        #[arg(short, long, default_value = config::DEFAULT_PROVIDER)]
        provider: String,

        /// Instance the world belongs to.
        #[arg(short, long)]
        instance: String,

        /// World folder to capture.
        #[arg(short, long)]
        world: PathBuf,

        /// Backup name.
        #[arg(short, long)]
        name: String,
    },

    /// List backups of an instance.
    List {
        /// Provider name.
        #[arg(short, long, default_value = config::DEFAULT_PROVIDER)]
        provider: String,

        /// Instance name.
        #[arg(short, long)]
        instance: String,
    },

    /// Restore a backup into an instance's saves folder.
    Restore {
        /// Provider name.
        #[arg(short, long, default_value = config::DEFAULT_PROVIDER)]
        provider: String,

        /// Instance name.
        #[arg(short, long)]
        instance: String,

        /// Instance root directory (worlds go to <dir>/saves).
        #[arg(short = 'd', long)]
        instance_dir: PathBuf,

        /// Backup name.
        #[arg(short, long)]
        name: String,
    },

    /// Delete a backup.
    Delete {
        /// Provider name.
        #[arg(short, long, default_value = config::DEFAULT_PROVIDER)]
        provider: String,

        /// Instance name.
        #[arg(short, long)]
        instance: String,

        /// Instance root directory.
        #[arg(short = 'd', long, default_value = ".")]
        instance_dir: PathBuf,

        /// Backup name.
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::InitConfig { root, force } = &cli.command {
        return cmd_init_config(cli.config.as_deref(), root.as_deref(), *force).await;
    }

    let providers = config::load(cli.config.as_deref()).await?;
    let registry = providers
        .build_registry(&ProviderCatalog::with_builtin())
        .context("Failed to register providers")?;

    let (dispatcher, handle) = SyncDispatcher::new(Arc::new(registry), DispatchConfig::default());
    let dispatcher_task = tokio::spawn(handle.run());

    let result = match cli.command {
        Commands::Providers => cmd_providers(&dispatcher),
        Commands::Settings { provider, json } => cmd_settings(&dispatcher, &provider, json),
        Commands::InitConfig { .. } => Ok(()),
        Commands::Backup {
            provider,
            instance,
            world,
            name,
        } => cmd_backup(&dispatcher, provider, &instance, world, &name).await,
        Commands::List { provider, instance } => cmd_list(&dispatcher, &provider, &instance).await,
        Commands::Restore {
            provider,
            instance,
            instance_dir,
            name,
        } => cmd_restore(&dispatcher, provider, &instance, instance_dir, &name).await,
        Commands::Delete {
            provider,
            instance,
            instance_dir,
            name,
        } => cmd_delete(&dispatcher, provider, &instance, instance_dir, &name).await,
    };

    dispatcher.shutdown().await;
    dispatcher_task.await.context("Dispatcher task failed")?;
    result
}

fn parse_names(instance: &str, backup: &str) -> Result<(InstanceName, BackupName)> {
    let instance = InstanceName::new(instance).context("Invalid instance name")?;
    let backup = BackupName::new(backup).context("Invalid backup name")?;
    Ok((instance, backup))
}

/// Write a default providers file.
async fn cmd_init_config(path: Option<&Path>, root: Option<&Path>, force: bool) -> Result<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(config::default_config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let root = root.map(PathBuf::from).unwrap_or_else(config::default_backup_root);
    config::default_config(&root)
        .save(&path)
        .await
        .context("Failed to write config")?;

    println!("Config written to {}", path.display());
    println!("  Provider: {} (local, {})", config::DEFAULT_PROVIDER, root.display());
    Ok(())
}

/// List registered providers.
fn cmd_providers(dispatcher: &SyncDispatcher) -> Result<()> {
    let registry = dispatcher.registry();
    if registry.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("Providers:");
    for name in registry.names() {
        let settings = dispatcher.settings(&name)?;
        println!("  {} ({})", name, settings.title);
    }
    Ok(())
}

/// Show provider settings.
fn cmd_settings(dispatcher: &SyncDispatcher, provider: &str, json: bool) -> Result<()> {
    let settings = dispatcher.settings(provider)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    if settings.is_empty() {
        println!("Provider '{}' has no settings.", provider);
        return Ok(());
    }

    println!("{}:", settings.title);
    for field in &settings.fields {
        let kind = match field.kind {
            SettingKind::Text => "text",
            SettingKind::Secret => "secret",
            SettingKind::Path => "path",
            SettingKind::Bool => "bool",
            SettingKind::Integer => "integer",
        };
        let required = if field.required { ", required" } else { "" };
        println!("  {} [{}{}] {}", field.key, kind, required, field.label);
        if let Some(default) = &field.default {
            println!("      default: {}", default);
        }
        if let Some(description) = &field.description {
            println!("      {}", description);
        }
    }
    Ok(())
}

/// Back up a world.
async fn cmd_backup(
    dispatcher: &SyncDispatcher,
    provider: String,
    instance: &str,
    world: PathBuf,
    name: &str,
) -> Result<()> {
    let (instance, backup) = parse_names(instance, name)?;
    info!("Backing up {} as {}/{}", world.display(), instance, backup);

    dispatcher
        .run(JobRequest::Backup {
            provider,
            backup: backup.clone(),
            world_data: world,
            instance: instance.clone(),
        })
        .await
        .context("Backup failed")?;

    println!("Backup created: {}/{}", instance, backup);
    Ok(())
}

/// List backups of an instance.
async fn cmd_list(dispatcher: &SyncDispatcher, provider: &str, instance: &str) -> Result<()> {
    let instance = InstanceName::new(instance).context("Invalid instance name")?;
    let backups = dispatcher
        .backups_for_instance(provider, &instance)
        .await
        .context("Failed to list backups")?;

    if backups.is_empty() {
        println!("No backups for {}.", instance);
    } else {
        println!("Backups of {} ({}):", instance, provider);
        for backup in backups {
            println!("  {}", backup);
        }
    }
    Ok(())
}

/// Restore a backup.
async fn cmd_restore(
    dispatcher: &SyncDispatcher,
    provider: String,
    instance: &str,
    instance_dir: PathBuf,
    name: &str,
) -> Result<()> {
    let (instance, backup) = parse_names(instance, name)?;
    let instance = Instance::new(instance, instance_dir);
    info!("Restoring {}/{} into {}", instance.name(), backup, instance.saves_dir().display());

    dispatcher
        .run(JobRequest::Restore {
            provider,
            backup: backup.clone(),
            instance: instance.clone(),
        })
        .await
        .context("Restore failed")?;

    println!("Restored {} into {}", backup, instance.saves_dir().display());
    Ok(())
}

/// Delete a backup.
async fn cmd_delete(
    dispatcher: &SyncDispatcher,
    provider: String,
    instance: &str,
    instance_dir: PathBuf,
    name: &str,
) -> Result<()> {
    let (instance, backup) = parse_names(instance, name)?;
    let instance = Instance::new(instance, instance_dir);

    dispatcher
        .run(JobRequest::Delete {
            provider,
            backup: backup.clone(),
            instance: instance.clone(),
        })
        .await
        .context("Delete failed")?;

    println!("Deleted {}/{}", instance.name(), backup);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backup() {
        let cli = Cli::try_parse_from([
            "worldsync", "backup", "-i", "SurvivalInstance", "-w", "/worlds/survival", "-n", "save1",
        ])
        .unwrap();
        match cli.command {
            Commands::Backup { provider, name, .. } => {
                assert_eq!(provider, config::DEFAULT_PROVIDER);
                assert_eq!(name, "save1");
            }
            _ => panic!("expected backup command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "worldsync", "list", "-i", "SurvivalInstance", "-v", "-c", "/tmp/providers.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/providers.json")));
    }

    #[test]
    fn test_parse_names_rejects_separators() {
        assert!(parse_names("Survival", "a/b").is_err());
        assert!(parse_names("", "save1").is_err());
        assert!(parse_names("Survival", "save1").is_ok());
    }
}
