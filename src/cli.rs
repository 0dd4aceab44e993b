use crate::api::{HttpLicenseApi, LicenseApi};
use crate::editor::LicenseDraft;
use crate::gate::Prompt;
use crate::lifecycle::{GrantTerms, LifecycleAction, DEFAULT_GRANT_DAYS, DEFAULT_RENEW_DAYS};
use crate::logging::{self, LogTarget};
use crate::model::ClientConfig;
use crate::notify::Notifier;
use crate::orchestrator::scripted::{self, AssumeYes, Confirmer, ListOptions};
use crate::query::{SearchCategory, StatusFilter, DEFAULT_PAGE_SIZE};
use crate::render;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "license-desk",
    version,
    about = "Browse, check out, renew and return software licenses, with an optional TUI"
)]
pub struct Cli {
    /// Base URL of the license service
    #[arg(long, env = "LICENSE_DESK_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "LICENSE_DESK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout; a timed out mutation counts as failed
    #[arg(long, default_value = "10s")]
    pub timeout: humantime::Duration,

    /// Rows per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Days granted when applying for a license
    #[arg(long, default_value_t = DEFAULT_GRANT_DAYS)]
    pub grant_days: u32,

    /// Days added when renewing a license
    #[arg(long, default_value_t = DEFAULT_RENEW_DAYS)]
    pub renew_days: u32,

    /// Print JSON and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Start the TUI at a sub-view address, e.g. /software/softwareLicenseDetail?id=42
    #[arg(long, value_name = "ADDRESS")]
    pub open: Option<String>,

    /// Write logs here instead of the default location
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Any subcommand or output flag selects the one-shot mode.
    pub fn is_scripted(&self) -> bool {
        self.json || self.text || self.command.is_some()
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List licenses
    List(ListArgs),
    /// Show one license
    Show { id: i64 },
    /// Check out an available license
    Apply { id: i64 },
    /// Extend an assigned license
    Renew { id: i64 },
    /// Give an assigned license back
    Return { id: i64 },
    /// Create a license record
    Create(DraftArgs),
    /// Update a license record
    Update {
        id: i64,
        #[command(flatten)]
        fields: DraftArgs,
    },
}

#[derive(Debug, Args, Clone, Default)]
pub struct ListArgs {
    /// Status scope
    #[arg(long, value_enum, default_value_t = StatusFilter::Assigned)]
    pub status: StatusFilter,

    /// Zero-based page
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    /// Search category used with --search
    #[arg(long, value_enum, default_value_t = SearchCategory::SoftwareName)]
    pub category: SearchCategory,

    /// Search keywords
    #[arg(long)]
    pub search: Option<String>,
}

/// Field overrides for create/update. Unset fields keep their current value.
#[derive(Debug, Args, Clone, Default)]
pub struct DraftArgs {
    #[arg(long)]
    pub software_info_id: Option<String>,

    /// Numeric license type code
    #[arg(long)]
    pub license_type: Option<i64>,

    /// Numeric license status code
    #[arg(long)]
    pub license_status: Option<i64>,

    #[arg(long)]
    pub key: Option<String>,

    /// RFC 3339 or YYYY-MM-DDTHH:MM[:SS]; empty clears it
    #[arg(long)]
    pub expires: Option<String>,

    #[arg(long)]
    pub level_limit: Option<String>,

    #[arg(long)]
    pub remark: Option<String>,
}

impl DraftArgs {
    pub fn apply_to(&self, draft: &mut LicenseDraft) {
        if let Some(v) = &self.software_info_id {
            draft.software_info_id = v.clone();
        }
        if let Some(code) = self.license_type {
            draft.license_type = code.into();
        }
        if let Some(code) = self.license_status {
            draft.license_status = code.into();
        }
        if let Some(v) = &self.key {
            draft.license_key = v.clone();
        }
        if let Some(v) = &self.expires {
            draft.expired_at = v.clone();
        }
        if let Some(v) = &self.level_limit {
            draft.level_limit = v.clone();
        }
        if let Some(v) = &self.remark {
            draft.remark = v.clone();
        }
    }
}

/// Build the client configuration from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.clone(),
        token: args.token.clone(),
        timeout: Duration::from(args.timeout),
        page_size: args.page_size.max(1),
        grant_days: args.grant_days,
        renew_days: args.renew_days,
        user_agent: format!("license-desk/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub fn terms(cfg: &ClientConfig) -> GrantTerms {
    GrantTerms {
        grant_days: cfg.grant_days,
        renew_days: cfg.renew_days,
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.is_scripted() {
        #[cfg(feature = "tui")]
        {
            let path = args.log_file.clone().or_else(logging::default_log_path);
            if let Some(path) = path {
                logging::init(&LogTarget::File(path), "license_desk=debug")?;
            }
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_scripted(args).await;
        }
    }

    run_scripted(args).await
}

/// Asks on the terminal. The prompt goes through the output writer, which holds the
/// stderr lock.
struct TerminalConfirmer {
    out_tx: mpsc::UnboundedSender<OutputLine>,
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, prompt: &Prompt) -> bool {
        let _ = self.out_tx.send(OutputLine::Stderr(format!(
            "{}: {} [y/N]",
            prompt.title, prompt.body
        )));
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_yes(&line),
            _ => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn run_scripted(args: Cli) -> Result<()> {
    let log_target = match &args.log_file {
        Some(path) => LogTarget::File(path.clone()),
        None => LogTarget::Stderr,
    };
    logging::init(&log_target, "license_desk=info")?;

    let cfg = build_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (notifier, mut notices) = Notifier::channel();
    let notice_tx = out_tx.clone();
    let notice_task = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let _ = notice_tx.send(OutputLine::Stderr(notice.to_message()));
        }
    });

    let result = match HttpLicenseApi::new(&cfg, Some(notifier)) {
        Ok(api) => {
            let confirmer: Box<dyn Confirmer> = if args.yes {
                Box::new(AssumeYes)
            } else {
                Box::new(TerminalConfirmer {
                    out_tx: out_tx.clone(),
                })
            };
            execute_command(&args, &cfg, &api, confirmer.as_ref()).await
        }
        Err(e) => Err(e),
    };

    // The api (and its notifier) is gone here, so the notice task drains and ends.
    let _ = notice_task.await;
    if let Ok(lines) = &result {
        for line in lines {
            let _ = out_tx.send(OutputLine::Stdout(line.clone()));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    result.map(|_| ())
}

async fn execute_command(
    args: &Cli,
    cfg: &ClientConfig,
    api: &dyn LicenseApi,
    confirmer: &dyn Confirmer,
) -> Result<Vec<String>> {
    let command = args
        .command
        .clone()
        .unwrap_or_else(|| Command::List(ListArgs::default()));
    let terms = terms(cfg);
    let action = |a: LifecycleAction, id: i64| scripted::run_action(api, terms, id, a, confirmer);

    let lines = match command {
        Command::List(list) => {
            let opts = ListOptions {
                filter: list.status,
                page: list.page,
                page_size: cfg.page_size,
                category: list.category,
                keywords: list.search,
            };
            let page = scripted::list(api, &opts).await?;
            if args.json {
                vec![render::to_json(&page.rows)?]
            } else {
                render::list_lines(&page)
            }
        }
        Command::Show { id } => {
            let license = scripted::show(api, id).await?;
            if args.json {
                vec![render::to_json(&license)?]
            } else {
                render::detail_lines(&license)
            }
        }
        Command::Apply { id } => outcome(args, action(LifecycleAction::Apply, id).await?)?,
        Command::Renew { id } => outcome(args, action(LifecycleAction::Renew, id).await?)?,
        Command::Return { id } => outcome(args, action(LifecycleAction::Return, id).await?)?,
        Command::Create(fields) => {
            let saved = scripted::save(api, None, |d| fields.apply_to(d), confirmer).await?;
            outcome(args, saved)?
        }
        Command::Update { id, fields } => {
            let saved = scripted::save(api, Some(id), |d| fields.apply_to(d), confirmer).await?;
            outcome(args, saved)?
        }
    };
    Ok(lines)
}

fn outcome(args: &Cli, outcome: scripted::Outcome) -> Result<Vec<String>> {
    if args.json {
        Ok(vec![render::outcome_json(&outcome).context("encode result")?])
    } else {
        Ok(render::outcome_lines(&outcome))
    }
}
