use crate::adapters::github::DEFAULT_BRANCH;
use crate::adapters::sqlite::IfExists;
use crate::config::toml_config::AzureConfig;
use crate::domain::model::IfEmpty;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_github_repo, validate_non_empty_string, validate_secret_name, validate_url, Validate,
};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "datalake-etl")]
#[command(about = "Moves Vid Club data into Azure Data Lake, plus Azure, GitHub and SQLite helpers")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the Vid Club to data lake pipeline from a TOML file
    Run(RunArgs),
    /// Azure Data Lake Storage Gen2 file operations
    Adls {
        #[command(flatten)]
        azure: AzureArgs,
        #[command(subcommand)]
        action: AdlsCommand,
    },
    /// Azure Key Vault secrets
    Secret {
        #[command(flatten)]
        azure: AzureArgs,
        #[command(subcommand)]
        action: SecretCommand,
    },
    /// GitHub repository files
    Github {
        #[command(flatten)]
        azure: AzureArgs,
        #[command(subcommand)]
        action: GithubCommand,
    },
    /// SQLite loading
    Sqlite {
        #[command(subcommand)]
        action: SqliteCommand,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "etl-config.toml")]
    pub config: String,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Override source.from_date (YYYY-MM-DD)
    #[arg(long)]
    pub from_date: Option<String>,

    /// Override source.to_date (YYYY-MM-DD)
    #[arg(long)]
    pub to_date: Option<String>,

    /// Show what would be processed without executing
    #[arg(long)]
    pub dry_run: bool,
}

/// Connection settings shared by the Azure subcommands. Service principal
/// credentials come from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
/// `AZURE_CLIENT_SECRET` and `ACCOUNT_NAME`.
#[derive(Debug, Clone, Args)]
pub struct AzureArgs {
    #[arg(long, env = "AZURE_KEY_VAULT_NAME")]
    pub vault_name: Option<String>,

    #[arg(long, env = "AZURE_KEY_VAULT_URL")]
    pub vault_url: Option<String>,

    /// Key Vault secret holding the data lake service principal
    #[arg(long)]
    pub sp_credentials_secret: Option<String>,

    /// Overrides https://{ACCOUNT_NAME}.dfs.core.windows.net
    #[arg(long, env = "AZURE_ADLS_ENDPOINT")]
    pub adls_endpoint: Option<String>,

    #[arg(long, env = "AZURE_AUTHORITY_HOST")]
    pub authority_host: Option<String>,
}

impl AzureArgs {
    pub fn to_config(&self) -> AzureConfig {
        AzureConfig {
            vault_name: self.vault_name.clone(),
            vault_url: self.vault_url.clone(),
            authority_host: self.authority_host.clone(),
            sp_credentials_secret: self.sp_credentials_secret.clone(),
            adls_endpoint: self.adls_endpoint.clone(),
        }
    }
}

impl Validate for AzureArgs {
    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.vault_url {
            validate_url("vault_url", url)?;
        }
        if let Some(endpoint) = &self.adls_endpoint {
            validate_url("adls_endpoint", endpoint)?;
        }
        if let Some(host) = &self.authority_host {
            validate_url("authority_host", host)?;
        }
        if let Some(secret) = &self.sp_credentials_secret {
            validate_secret_name(secret)?;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum AdlsCommand {
    /// Upload a local file to filesystem/path
    Upload {
        from_path: String,
        to_path: String,
        /// Fail if the target already exists
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Download filesystem/path to a local file
    Download {
        from_path: String,
        to_path: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// List a filesystem or a directory in it
    Ls { path: String },
    /// Read a csv, tsv or json file into a table and print the first rows
    Preview {
        path: String,
        #[arg(long, default_value = "10")]
        rows: usize,
        /// Column separator, overrides the one implied by the extension
        #[arg(long)]
        sep: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SecretCommand {
    Get { name: String },
    Set { name: String, value: String },
}

#[derive(Debug, Subcommand)]
pub enum GithubCommand {
    /// Download one file from a repository
    Download {
        /// owner/repo
        repo: String,
        /// Path of the file in the repository
        path: String,
        #[arg(long, default_value = DEFAULT_BRANCH)]
        branch: String,
        /// Local destination, defaults to the file name
        #[arg(long)]
        to_path: Option<String>,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Key Vault secret holding the token, used when no token is given
        #[arg(long)]
        token_secret: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SqliteCommand {
    /// Load a csv, tsv or json file into a table
    Load {
        /// Local file to load
        input: String,
        #[arg(long)]
        database: String,
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "replace")]
        if_exists: IfExists,
        #[arg(long, default_value = "warn")]
        if_empty: IfEmpty,
        #[arg(long)]
        sep: Option<String>,
    },
}

impl Validate for GithubCommand {
    fn validate(&self) -> Result<()> {
        match self {
            GithubCommand::Download {
                repo,
                path,
                branch,
                token_secret,
                ..
            } => {
                validate_github_repo(repo)?;
                validate_non_empty_string("path", path)?;
                validate_non_empty_string("branch", branch)?;
                if let Some(secret) = token_secret {
                    validate_secret_name(secret)?;
                }
                Ok(())
            }
        }
    }
}
