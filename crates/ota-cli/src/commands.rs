use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use ota_acquisition::{
    get_update_package_info, parse_history, UpdateCheckCacheResponse, UpdateCheckRequest,
    UpdateCheckResponse,
};
use ota_storage::{Storage, StorageConfig, TableStorage};
use ota_store::{InMemoryBlobStore, InMemoryTableStore};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command, format, ..
    } = cli;
    match command {
        Command::Resolve(args) => cmd_resolve(args, format),
        Command::Config(ConfigArgs {
            action: ConfigAction::Show { file },
        }) => cmd_config_show(file.as_deref(), format),
        Command::Config(ConfigArgs {
            action: ConfigAction::Validate { file },
        }) => cmd_config_validate(&file),
        Command::Health(args) => cmd_health(args, format).await,
    }
}

fn load_config(file: Option<&Path>) -> anyhow::Result<StorageConfig> {
    match file {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(StorageConfig::default()),
    }
}

fn cmd_resolve(args: ResolveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.history)
        .with_context(|| format!("reading {}", args.history.display()))?;
    let history = parse_history(&text)
        .with_context(|| format!("parsing {}", args.history.display()))?;

    let mut request = UpdateCheckRequest::new(args.app_version);
    request.package_hash = args.package_hash;
    request.label = args.label;
    request.is_companion = args.companion;
    request.client_unique_id = args.client_id;

    let info = get_update_package_info(&history, &request);
    let response = info.select(request.client_unique_id.as_deref());
    tracing::debug!(releases = history.len(), rollout = ?info.rollout, "resolved");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
        OutputFormat::Text => print_response(response, &info),
    }
    Ok(())
}

fn print_response(response: &UpdateCheckResponse, info: &UpdateCheckCacheResponse) {
    if response.is_available {
        let mandatory = if response.is_mandatory { " (mandatory)" } else { "" };
        println!(
            "{} Update available: {}{}",
            "✓".green().bold(),
            response.label.yellow().bold(),
            mandatory.red()
        );
        println!("  Hash: {}", response.package_hash.cyan());
        println!("  Download: {} ({} bytes)", response.download_url.blue(), response.package_size);
        if !response.description.is_empty() {
            println!("  Description: {}", response.description);
        }
    } else {
        println!("No update available.");
        if response.should_run_binary_version {
            println!("  Run the version bundled with the binary.");
        }
        if response.update_app_version {
            println!("  Update the app binary to {}", response.app_version.yellow());
        } else if !response.app_version.is_empty() {
            println!("  Newest release targets {}", response.app_version.yellow());
        }
    }
    if let Some(rollout) = info.rollout {
        println!("  Rollout: {}%", rollout.to_string().bold());
    }
}

fn cmd_config_show(file: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(file)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn cmd_config_validate(file: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(file))?;
    println!("{} {} is valid", "✓".green().bold(), file.display().to_string().bold());
    println!("  Table: {}", config.table_name);
    println!(
        "  Containers: {} (packages), {} (history)",
        config.package_container, config.history_container
    );
    Ok(())
}

async fn cmd_health(args: HealthArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let table = InMemoryTableStore::new(config.table_name.clone());
    let blobs = InMemoryBlobStore::new(config.blob_base_url.clone());
    let storage = TableStorage::connect(table, blobs, config)
        .await
        .context("storage setup failed")?;
    storage.check_health().await.context("health check failed")?;

    let config = storage.config();
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "healthy": true,
                "table": config.table_name,
                "containers": [config.package_container, config.history_container],
            })
        ),
        OutputFormat::Text => {
            println!("{} Storage healthy", "✓".green().bold());
            println!("  Table: {} ({} rows)", config.table_name.bold(), storage.table().len());
            println!(
                "  Containers: {}, {}",
                config.package_container.bold(),
                config.history_container.bold()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn history_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn resolve_args(path: &Path) -> ResolveArgs {
        ResolveArgs {
            history: path.to_path_buf(),
            app_version: "1.0.0".into(),
            package_hash: Some("H0".into()),
            label: None,
            companion: false,
            client_id: None,
        }
    }

    #[test]
    fn resolve_reads_history_file() {
        let file = history_file(
            r#"[{"appVersion":"1.0.0","packageHash":"H1","blobUrl":"u","label":"v1","size":3}]"#,
        );
        cmd_resolve(resolve_args(file.path()), OutputFormat::Json).unwrap();
        cmd_resolve(resolve_args(file.path()), OutputFormat::Text).unwrap();
    }

    #[test]
    fn resolve_reports_malformed_history() {
        let file = history_file("{ nope");
        assert!(cmd_resolve(resolve_args(file.path()), OutputFormat::Text).is_err());
        assert!(cmd_resolve(resolve_args(Path::new("/nonexistent/history.json")), OutputFormat::Text).is_err());
    }

    #[test]
    fn config_commands() {
        cmd_config_show(None, OutputFormat::Text).unwrap();
        let file = history_file("max_package_history = 10\n");
        cmd_config_validate(file.path()).unwrap();
        let bad = history_file("max_package_history = 0\n");
        assert!(cmd_config_validate(bad.path()).is_err());
    }

    #[tokio::test]
    async fn health_against_in_memory_storage() {
        cmd_health(HealthArgs { config: None }, OutputFormat::Text)
            .await
            .unwrap();
    }
}
