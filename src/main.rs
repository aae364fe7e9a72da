use clap::Parser;
use gh_org_migrate::config::{FileConfig, Overrides, Settings};
use gh_org_migrate::error::AppResult;
use gh_org_migrate::github::GitHubClient;
use gh_org_migrate::mapping::IdentityMapping;
use gh_org_migrate::migrator::Migrator;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(version, about = "Copy GitHub teams, team permissions and memberships between organizations")]
struct Args {
    /// Organization to copy from (read only)
    #[arg(long)]
    source_org: Option<String>,

    /// Organization to copy into
    #[arg(long)]
    target_org: Option<String>,

    /// CSV file mapping source logins to emails
    #[arg(short, long)]
    mapping_file: Option<PathBuf>,

    /// Optional YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Token for the source organization
    #[arg(long, env = "SOURCE_GITHUB_TOKEN", hide_env_values = true)]
    source_token: Option<String>,

    /// Token for the target organization
    #[arg(long, env = "TARGET_GITHUB_TOKEN", hide_env_values = true)]
    target_token: Option<String>,

    /// Dry run mode (reads only, every change is logged instead of applied)
    #[arg(long)]
    dry_run: bool,

    /// Directory the CSV reports are written to
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// GitHub API root, for GitHub Enterprise Server
    #[arg(long)]
    api_url: Option<String>,

    /// Attempts per API call before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Use the same login in the target when a member has no mapping entry
    #[arg(long)]
    allow_login_fallback: bool,
}

impl Args {
    fn into_overrides(self) -> Overrides {
        Overrides {
            source_org: self.source_org,
            target_org: self.target_org,
            mapping_file: self.mapping_file,
            dry_run: self.dry_run,
            report_dir: self.report_dir,
            api_url: self.api_url,
            allow_login_fallback: self.allow_login_fallback,
            max_attempts: self.max_attempts,
            retry_delay_ms: self.retry_delay_ms,
            source_token: self.source_token,
            target_token: self.target_token,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let mut args = Args::parse();
    let file = match args.config.take() {
        Some(path) => {
            info!("Reading settings from {}", path.display());
            FileConfig::from_file(&path)?
        }
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(file, args.into_overrides())?;
    let mapping = IdentityMapping::from_file(&settings.mapping_file)?;
    info!(
        "Migrating {} -> {} via {}",
        settings.source_org, settings.target_org, settings.api_url
    );

    let source = GitHubClient::with_api_base(
        settings.source_credential.clone(),
        &settings.source_org,
        &settings.api_url,
        settings.retry,
    );
    let target = GitHubClient::with_api_base(
        settings.target_credential.clone(),
        &settings.target_org,
        &settings.api_url,
        settings.retry,
    );

    let report = Migrator::new(&source, &target, mapping, settings.migration_options())
        .run()
        .await?;

    match report.write_csv(&settings.report_dir) {
        Ok(paths) => {
            for path in paths {
                println!("Report written to {}", path.display());
            }
        }
        Err(e) => warn!("Could not write reports to {}: {}", settings.report_dir.display(), e),
    }
    report.print_summary();
    Ok(())
}
