use clap::Parser;
use datalake_etl::adapters::adls::{split_adls_path, AdlsClient};
use datalake_etl::adapters::github::GitHubClient;
use datalake_etl::adapters::http::build_client;
use datalake_etl::adapters::storage::file_name_of;
use datalake_etl::app::context::{build_vidclub_to_adls, AzureContext, REQUEST_TIMEOUT};
use datalake_etl::app::tasks::{
    run_task, AzureDataLakeDownload, AzureDataLakeToDf, AzureDataLakeUpload,
    CreateAzureKeyVaultSecret, DownloadGitHubFile, FileFormat, ReadAzureKeyVaultSecret,
    SqliteInsert, TaskPolicy,
};
use datalake_etl::config::cli::{
    AdlsCommand, AzureArgs, Command, GithubCommand, RunArgs, SecretCommand, SqliteCommand,
};
use datalake_etl::config::toml_config::parse_separator;
use datalake_etl::domain::ports::SecretStore;
use datalake_etl::utils::error::ErrorSeverity;
use datalake_etl::utils::{logger, validation::Validate};
use datalake_etl::{Cli, EtlConfig, EtlEngine, EtlError, Frame, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting datalake-etl {}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Command::Run(args) => run_pipeline(args).await,
        Command::Adls { azure, action } => adls(azure, action).await,
        Command::Secret { azure, action } => secret(azure, action).await,
        Command::Github { azure, action } => github(azure, action).await,
        Command::Sqlite { action } => sqlite(action).await,
    };

    match result {
        Ok(message) => {
            tracing::info!("✅ {}", message);
            println!("✅ {}", message);
        }
        Err(e) => {
            tracing::error!(
                "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

async fn run_pipeline(args: RunArgs) -> Result<String> {
    tracing::info!("📁 Loading configuration from: {}", args.config);
    let mut config = match EtlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(from_date) = args.from_date {
        config.source.from_date = Some(from_date);
    }
    if let Some(to_date) = args.to_date {
        config.source.to_date = Some(to_date);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }
    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, args.dry_run)?;

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        return Ok("Dry run finished".to_string());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let pipeline = build_vidclub_to_adls(&config).await?;
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);
    let output = engine.run().await?;
    Ok(format!("ETL process completed, output: {}", output))
}

fn display_config_summary(config: &EtlConfig, dry_run: bool) -> Result<()> {
    let query = config.vidclub_query()?;
    println!("📋 Configuration Summary:");
    println!("  Pipeline: {}", config.pipeline.name);
    println!("  Source: Vid Club '{}'", query.source);
    println!(
        "  Dates: {} to {}",
        query.from_date,
        query.to_date.as_deref().unwrap_or("today")
    );
    println!(
        "  Paging: {} items per page, {} day windows",
        query.items_per_page, query.days_interval
    );
    println!("  Local file: {}", config.load.local_file_path);
    println!(
        "  Data lake: {} (overwrite: {})",
        config.load.adls_file_path,
        config.adls_overwrite()
    );
    if dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    Ok(())
}

async fn adls_client(azure: &AzureArgs, filesystem: &str) -> Result<AdlsClient> {
    azure.validate()?;
    AzureContext::new(build_client(REQUEST_TIMEOUT)?, azure.to_config())
        .adls_client(filesystem)
        .await
}

async fn adls(azure: AzureArgs, action: AdlsCommand) -> Result<String> {
    let policy = TaskPolicy::default();
    match action {
        AdlsCommand::Upload {
            from_path,
            to_path,
            no_overwrite,
        } => {
            let (filesystem, path) = split_adls_path(&to_path)?;
            let client = adls_client(&azure, &filesystem).await?;
            let task = AzureDataLakeUpload::new(client, from_path, path, !no_overwrite, policy);
            let url = run_task(&task).await?;
            Ok(format!("Uploaded to {}", url))
        }
        AdlsCommand::Download {
            from_path,
            to_path,
            overwrite,
        } => {
            let (filesystem, path) = split_adls_path(&from_path)?;
            let client = adls_client(&azure, &filesystem).await?;
            let task = AzureDataLakeDownload::new(client, path, to_path, overwrite, policy);
            let saved = run_task(&task).await?;
            Ok(format!("Downloaded to {}", saved.display()))
        }
        AdlsCommand::Ls { path } => {
            let trimmed = path.trim_matches('/');
            let (filesystem, directory) = trimmed.split_once('/').unwrap_or((trimmed, ""));
            let client = adls_client(&azure, filesystem).await?;
            let entries = client.list(directory).await?;
            for entry in &entries {
                let kind = if entry.is_directory() { "dir " } else { "file" };
                println!(
                    "{}  {:>12}  {}",
                    kind,
                    entry.content_length.as_deref().unwrap_or("-"),
                    entry.name
                );
            }
            Ok(format!("{} entries under {}", entries.len(), path))
        }
        AdlsCommand::Preview { path, rows, sep } => {
            let (filesystem, file) = split_adls_path(&path)?;
            let client = adls_client(&azure, &filesystem).await?;
            let mut task = AzureDataLakeToDf::new(client, file, policy);
            if let Some(sep) = sep {
                task = task.with_sep(parse_separator(&sep)?);
            }
            let frame = run_task(&task).await?;
            let total = frame.len();
            let preview = Frame {
                columns: frame.columns,
                rows: frame.rows.into_iter().take(rows).collect(),
            };
            print!("{}", preview.to_delimited(b'\t')?);
            Ok(format!("{} rows in {}", total, path))
        }
    }
}

async fn secret(azure: AzureArgs, action: SecretCommand) -> Result<String> {
    azure.validate()?;
    let context = AzureContext::new(build_client(REQUEST_TIMEOUT)?, azure.to_config());
    let store: Arc<dyn SecretStore> = Arc::new(context.require_key_vault()?);
    let policy = TaskPolicy::default();

    match action {
        SecretCommand::Get { name } => {
            let task = ReadAzureKeyVaultSecret::new(store, name.clone(), policy);
            let value = run_task(&task).await?;
            println!("{}", value);
            Ok(format!("Read secret '{}'", name))
        }
        SecretCommand::Set { name, value } => {
            datalake_etl::utils::validation::validate_secret_name(&name)?;
            let task = CreateAzureKeyVaultSecret::new(store, name, value, policy);
            let id = run_task(&task).await?;
            Ok(format!("Secret stored: {}", id))
        }
    }
}

async fn github(azure: AzureArgs, action: GithubCommand) -> Result<String> {
    action.validate()?;
    match action {
        GithubCommand::Download {
            repo,
            path,
            branch,
            to_path,
            token,
            token_secret,
        } => {
            let http = build_client(REQUEST_TIMEOUT)?;
            let token = match (token, token_secret) {
                (Some(token), _) => Some(token),
                (None, Some(secret)) => {
                    azure.validate()?;
                    let vault = AzureContext::new(http.clone(), azure.to_config())
                        .require_key_vault()?;
                    Some(vault.get_secret(&secret).await?)
                }
                (None, None) => None,
            };
            let client = GitHubClient::new(http, token);
            let to_path = to_path.unwrap_or_else(|| file_name_of(&path));
            let task =
                DownloadGitHubFile::new(client, repo, path, branch, to_path, TaskPolicy::default());
            let saved = run_task(&task).await?;
            Ok(format!("Downloaded to {}", saved.display()))
        }
    }
}

async fn sqlite(action: SqliteCommand) -> Result<String> {
    match action {
        SqliteCommand::Load {
            input,
            database,
            table,
            if_exists,
            if_empty,
            sep,
        } => {
            let sep = sep.as_deref().map(parse_separator).transpose()?;
            let data = tokio::fs::read(&input).await.map_err(EtlError::IoError)?;
            let frame = FileFormat::from_path(&input)?.parse(&data, sep)?;

            let task = SqliteInsert::new(
                database.clone(),
                table.clone(),
                frame,
                if_exists,
                if_empty,
                TaskPolicy::default(),
            );
            let inserted = run_task(&task).await?;
            Ok(format!("Loaded {} rows into {}.{}", inserted, database, table))
        }
    }
}
