use crate::error::{AppError, AppResult};
use crate::github::{Credential, GITHUB_API_BASE_URL};
use crate::migrator::MigrationOptions;
use crate::retry::{ConsistencyPolicy, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_REPORT_DIR: &str = "migration-report";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConsistencySection {
    pub attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

/// Optional YAML settings file. Tokens are deliberately not accepted here.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source_org: Option<String>,
    pub target_org: Option<String>,
    pub mapping_file: Option<PathBuf>,
    pub dry_run: Option<bool>,
    pub report_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub allow_login_fallback: Option<bool>,
    pub retry: RetrySection,
    pub consistency: ConsistencySection,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let file = std::fs::File::open(path).map_err(AppError::Io)?;
        let config = serde_yaml::from_reader(file).map_err(AppError::Serialization)?;
        Ok(config)
    }
}

/// Values given on the command line or through the environment. Each one
/// wins over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_org: Option<String>,
    pub target_org: Option<String>,
    pub mapping_file: Option<PathBuf>,
    pub dry_run: bool,
    pub report_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub allow_login_fallback: bool,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub source_token: Option<String>,
    pub target_token: Option<String>,
}

/// Validated, immutable run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_org: String,
    pub target_org: String,
    pub mapping_file: PathBuf,
    pub dry_run: bool,
    pub report_dir: PathBuf,
    pub api_url: String,
    pub allow_login_fallback: bool,
    pub retry: RetryPolicy,
    pub consistency: ConsistencyPolicy,
    pub source_credential: Credential,
    pub target_credential: Credential,
}

impl Settings {
    /// Merge file and command line values and reject anything that would
    /// make the run fail before it issues its first request.
    pub fn resolve(file: FileConfig, cli: Overrides) -> AppResult<Self> {
        let source_org = required("source organization", cli.source_org.or(file.source_org))?;
        let target_org = required("target organization", cli.target_org.or(file.target_org))?;
        if source_org.eq_ignore_ascii_case(&target_org) {
            return Err(AppError::Config(format!(
                "Source and target organization are both '{}'",
                source_org
            )));
        }

        let mapping_file = cli
            .mapping_file
            .or(file.mapping_file)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| AppError::Config("Missing identity mapping file".to_string()))?;
        if !mapping_file.is_file() {
            return Err(AppError::Config(format!(
                "Identity mapping file {} does not exist",
                mapping_file.display()
            )));
        }

        let max_attempts = cli.max_attempts.or(file.retry.max_attempts).unwrap_or(3);
        if max_attempts == 0 {
            return Err(AppError::Config("max_attempts must be at least 1".to_string()));
        }
        let retry_delay = cli.retry_delay_ms.or(file.retry.delay_ms).unwrap_or(2000);
        let consistency = ConsistencyPolicy {
            attempts: file.consistency.attempts.unwrap_or(5).max(1),
            delay: Duration::from_millis(file.consistency.delay_ms.unwrap_or(2000)),
        };

        let source_credential = credential("source", cli.source_token)?;
        let target_credential = credential("target", cli.target_token)?;

        Ok(Settings {
            source_org,
            target_org,
            mapping_file,
            dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
            report_dir: cli
                .report_dir
                .or(file.report_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
            api_url: cli
                .api_url
                .or(file.api_url)
                .unwrap_or_else(|| GITHUB_API_BASE_URL.to_string()),
            allow_login_fallback: cli.allow_login_fallback || file.allow_login_fallback.unwrap_or(false),
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(retry_delay)),
            consistency,
            source_credential,
            target_credential,
        })
    }

    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            dry_run: self.dry_run,
            allow_login_fallback: self.allow_login_fallback,
            consistency: self.consistency,
        }
    }
}

fn required(what: &str, value: Option<String>) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("Missing {}", what)))
}

fn credential(side: &str, token: Option<String>) -> AppResult<Credential> {
    let token = token.ok_or_else(|| AppError::Config(format!("Missing {} organization token", side)))?;
    Credential::new(&token).map_err(|e| AppError::Config(format!("{} organization token: {}", side, e)))
}
