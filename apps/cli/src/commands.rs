//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadqual_core::{
    BatchReport, LeadOutcome, LeadReport, Orchestrator, PipelineContext, ProgressReporter,
    RunOptions, draft_identity, read_leads,
};
use leadqual_shared::{
    AppConfig, EvaluationStatus, LeadIdentity, OfferMode, Stage, expand_home, init_config,
    load_config, load_config_from, write_default_config,
};
use leadqual_storage::{
    LibsqlRecordStore, RecordRef, RecordStore, Table, drafts, leads, stage_fields,
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadqual: score B2B leads against an ideal customer profile.
#[derive(Parser)]
#[command(
    name = "leadqual",
    version,
    about = "Enrich, score and draft outreach for B2B leads against an ideal customer profile.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.leadqual/leadqual.toml).
    #[arg(long, global = true, env = "LEADQUAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Offer selection mode.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ModeArg {
    /// Score every catalogue offer and keep the best.
    FindBest,
    /// Score only the offer given with --offer-id.
    EvaluateSingle,
}

impl From<ModeArg> for OfferMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FindBest => OfferMode::FindBest,
            ModeArg::EvaluateSingle => OfferMode::EvaluateSingle,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Qualify every lead in a CSV file.
    Run {
        /// Lead CSV with a header row.
        #[arg(short, long)]
        file: PathBuf,

        /// Offer selection mode.
        #[arg(short, long, value_enum, default_value = "find-best")]
        mode: ModeArg,

        /// Offer to evaluate in evaluate-single mode.
        #[arg(long, required_if_eq("mode", "evaluate-single"))]
        offer_id: Option<String>,

        /// Re-run stages that are already completed.
        #[arg(long)]
        force: bool,

        /// Record store path (defaults to [defaults].db_path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write the detailed model usage log to this JSON file.
        #[arg(long)]
        usage_log: Option<PathBuf>,
    },

    /// Show a stored lead, or the most recently updated leads.
    Status {
        /// Lead identity (`email:...`, `linkedin:...`, `domain:...`) or a bare email.
        identity: Option<String>,

        /// Record store path (defaults to [defaults].db_path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Leads to list when no identity is given.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadqual=info",
        1 => "leadqual=debug",
        _ => "leadqual=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            file,
            mode,
            offer_id,
            force,
            db,
            usage_log,
        } => {
            let options = RunOptions {
                mode: mode.into(),
                offer_id,
                force,
            };
            cmd_run(config_path, &file, options, db.as_deref(), usage_log.as_deref()).await
        }
        Command::Status { identity, db, limit } => {
            cmd_status(config_path, identity.as_deref(), db.as_deref(), limit).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

async fn open_store(config: &AppConfig, db: Option<&Path>) -> leadqual_shared::Result<LibsqlRecordStore> {
    let path = match db {
        Some(path) => path.to_path_buf(),
        None => expand_home(&config.defaults.db_path),
    };
    info!(path = %path.display(), "opening record store");
    LibsqlRecordStore::open(&path).await
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    file: &Path,
    options: RunOptions,
    db: Option<&Path>,
    usage_log: Option<&Path>,
) -> Result<()> {
    // Config and input problems abort before any lead is touched.
    let config = resolve_config(config_path)?;
    options.validate()?;
    let ingest = read_leads(file)?;
    for skipped in &ingest.skipped {
        warn!(line = skipped.line, reason = %skipped.reason, "row skipped");
    }
    if ingest.leads.is_empty() {
        return Err(eyre!("no usable leads in {}", file.display()));
    }

    let ctx = PipelineContext::from_config(&config, options, || async {
        let store: Arc<dyn RecordStore> = Arc::new(open_store(&config, db).await?);
        Ok(store)
    })
    .await?;
    let orchestrator = Orchestrator::new(ctx, &config.pipeline)?;

    info!(
        file = %file.display(),
        leads = ingest.leads.len(),
        skipped = ingest.skipped.len(),
        "qualifying leads"
    );

    let progress = CliProgress::new();
    let report = orchestrator.run_batch(ingest.leads, &progress).await;

    print_batch(&report, ingest.skipped.len());

    if let Some(path) = usage_log {
        let json = serde_json::to_string_pretty(&report.usage_log())?;
        std::fs::write(path, json).map_err(|e| eyre!("cannot write {}: {e}", path.display()))?;
        println!("  Usage log: {}", path.display());
    }
    Ok(())
}

fn print_batch(report: &BatchReport, skipped: usize) {
    println!();
    for lead in &report.leads {
        let score = lead
            .score
            .as_ref()
            .map(|s| format!("{:>5.1} {:<6}", s.overall, s.tier.as_str()))
            .unwrap_or_else(|| format!("{:>12}", "-"));
        let detail = match lead.outcome {
            LeadOutcome::Failed => lead.first_error().unwrap_or_else(|| "skipped".into()),
            _ => lead.company.clone(),
        };
        println!(
            "  {:<12} {score}  {:<40} {detail}",
            outcome_label(lead.outcome),
            lead.identity
        );
    }

    println!();
    println!("  Succeeded:    {}", report.succeeded);
    println!("  Needs review: {}", report.needs_review);
    println!("  Failed:       {}", report.failed);
    if skipped > 0 {
        println!("  Skipped rows: {skipped}");
    }
    println!(
        "  Tokens:       {} ({} prompt / {} completion)",
        report.cost.total_tokens, report.cost.total_prompt_tokens, report.cost.total_completion_tokens
    );
    println!("  Cost:         ${:.4}", report.cost.total_cost);
    for (stage, totals) in &report.cost.by_stage {
        println!(
            "    {stage:<12} {:>4} calls {:>8} tokens  ${:.4}",
            totals.calls, totals.total_tokens, totals.total_cost
        );
    }
    println!("  Time:         {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn outcome_label(outcome: LeadOutcome) -> &'static str {
    match outcome {
        LeadOutcome::Succeeded => "ok",
        LeadOutcome::NeedsReview => "needs review",
        LeadOutcome::Failed => "FAILED",
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn lead_finished(&self, report: &LeadReport, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(format!(
            "{} {}",
            outcome_label(report.outcome),
            report.identity
        ));
    }

    fn done(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(
    config_path: Option<&Path>,
    identity: Option<&str>,
    db: Option<&Path>,
    limit: u32,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = open_store(&config, db).await?;

    let Some(raw) = identity else {
        let recent = store.list_recent(Table::Leads, limit).await?;
        if recent.is_empty() {
            println!("No leads stored yet.");
        }
        for record in &recent {
            print_summary_line(record);
        }
        return Ok(());
    };

    let identity = LeadIdentity::parse(raw)
        .or_else(|| LeadIdentity::from_parts(raw, raw, raw))
        .ok_or_else(|| eyre!("'{raw}' is not a lead identity"))?;
    let record = store
        .find_by_identity(Table::Leads, identity.as_str())
        .await?
        .ok_or_else(|| eyre!("no stored lead with identity {identity}"))?;

    println!();
    println!("  {} ({})", record.identity, record.id);
    for stage in Stage::ALL {
        let fields = stage_fields(stage);
        let score = fields
            .score
            .and_then(|f| record.number(f))
            .map(|s| format!("{s:.1}"))
            .unwrap_or_default();
        println!(
            "  {stage:<12} {:<14} {score}",
            record.text(fields.status).unwrap_or(EvaluationStatus::NotStarted.as_str())
        );
    }
    println!();
    for (name, value) in &record.fields {
        if value.as_json().is_some() {
            continue;
        }
        println!("  {name:<30} {}", value.display());
    }

    let mut position = 1;
    while let Some(draft) = store
        .find_by_identity(Table::CampaignDrafts, &draft_identity(&record.identity, position))
        .await?
    {
        if position == 1 {
            println!();
            println!("  Campaign drafts:");
        }
        println!(
            "  {position}. [{}] {} (wait {} days)",
            draft.text(drafts::STATUS).unwrap_or("Drafted"),
            draft.text(drafts::SUBJECT).unwrap_or_default(),
            draft.number(drafts::WAIT_DAYS).unwrap_or_default()
        );
        position += 1;
    }
    println!();
    Ok(())
}

fn print_summary_line(record: &RecordRef) {
    let score = record
        .number(leads::LEAD_SCORE)
        .map(|s| format!("{s:>5.1}"))
        .unwrap_or_else(|| format!("{:>5}", "-"));
    let done = Stage::ALL
        .iter()
        .filter(|&&stage| record.text(stage_fields(stage).status) == Some(EvaluationStatus::Completed.as_str()))
        .count();
    println!(
        "  {score} {:<7} {done}/{} stages  {:<40} {}",
        record.text(leads::LEAD_TIER).unwrap_or("-"),
        Stage::ALL.len(),
        record.identity,
        record.text(leads::COMPANY).unwrap_or_default()
    );
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => {
            write_default_config(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
