use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};

use depaudit::audit::{AuditContext, AuditError, Auditor};
use depaudit::config::{self, AuditConfig, Policy};
use depaudit::interrupt::Interrupt;
use depaudit::parser::guess_manifest;
use depaudit::version::cache::Cache;
use depaudit::version::registries::PypiRegistry;
use depaudit::vuln::{NvdFeed, RateLimiter};

#[derive(Parser)]
#[command(name = "depaudit")]
#[command(version, about = "Report stale and vulnerable packages in a Python requirements file")]
struct Cli {
    /// Directory to audit
    #[arg(short = 'C', long = "directory", default_value = ".")]
    dir: PathBuf,

    /// Requirements file (default: requirements.txt or Packages in the directory)
    #[arg(short = 'r', long = "requirements")]
    requirements: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Ignore cached registry and feed responses
    #[arg(long)]
    no_cache: bool,

    /// Do not query the vulnerability feed
    #[arg(long)]
    skip_cves: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = depaudit::logging::init(&config::log_path())?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let audit_config = match &cli.config {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };

    let manifest = match cli.requirements {
        Some(path) => cli.dir.join(path),
        None => match guess_manifest(&cli.dir) {
            Some(path) => path,
            None => bail!("no requirements file found in {}", cli.dir.display()),
        },
    };

    let interrupt = Interrupt::new();
    let cache = Cache::new(
        config::cache_dir(),
        audit_config.cache.enabled && !cli.no_cache,
        audit_config.cache_max_age(),
    )
    .with_interrupt(interrupt.clone());
    let context = AuditContext::new(
        cache,
        RateLimiter::new(audit_config.min_gap()),
        Policy::load_or_default(&cli.dir),
    );

    let registry = Arc::new(PypiRegistry::new(audit_config.registry.pypi_url.clone()));
    let mut auditor = Auditor::new(registry, context);
    if audit_config.vulnerabilities.enabled && !cli.skip_cves {
        auditor = auditor.with_vulnerabilities(Arc::new(NvdFeed::new(
            audit_config.vulnerabilities.feed_url.clone(),
        )));
    }

    let audit = auditor.audit(&manifest, chrono::Utc::now());
    tokio::pin!(audit);
    let rows = tokio::select! {
        rows = &mut audit => rows,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            interrupt.trigger();
            // lets the in-flight lookup observe the interrupt and unwind
            tokio::time::timeout(Duration::from_secs(5), audit)
                .await
                .unwrap_or(Err(AuditError::Interrupted))
        }
    }?;

    let report = serde_json::to_string_pretty(&rows)?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", report),
    }

    Ok(())
}
