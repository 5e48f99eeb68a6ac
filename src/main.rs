//! # BizAudit: task, workflow and lead-nurturing automation
//!
//! Usage:
//!   bizaudit serve                                  # Run the scheduler daemon
//!   bizaudit task audit "Review our pricing page"   # Process one task
//!   bizaudit workflow create --blueprint audit-follow-up
//!   bizaudit lead add --email a@b.com --business Acme --size small --source free_audit
//!   bizaudit init-config                            # Write ~/.bizaudit/config.toml

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use bizaudit_core::BizAuditConfig;
use bizaudit_core::traits::{Clock, CollectionStore, EmailSender, GenerateParams, Prunable, SystemClock};
use bizaudit_nurture::{CompanySize, LeadNurturer, LeadStatus, NewLead};
use bizaudit_scheduler::blueprints;
use bizaudit_scheduler::jobs::{self, JobContext, SummaryLog};
use bizaudit_scheduler::{
    NewWorkflow, Scheduler, StepRunner, TaskProcessor, TaskStatus, TaskStore, WorkflowEngine,
    WorkflowStore, email_sender_from_config,
};

#[derive(Parser)]
#[command(
    name = "bizaudit",
    version,
    about = "📊 BizAudit: task, workflow and lead-nurturing automation"
)]
struct Cli {
    /// Config file (default: ~/.bizaudit/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler: task sweep, daily summary, log cleanup, email queue, scheduled workflows
    Serve,
    /// Process one AI task
    Task {
        /// Task type (summarize, rewrite, audit, generate-copy, insights)
        task_type: String,
        query: String,
    },
    /// List tasks
    Tasks {
        /// pending, completed or error
        #[arg(long)]
        status: Option<String>,
    },
    /// Workflow management
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Lead nurturing
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },
    /// Show the jobs the daemon registers
    Jobs,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    List,
    Show { id: String },
    /// Execute a workflow now
    Run {
        id: String,
        /// JSON input passed to the steps
        #[arg(long)]
        input: Option<String>,
    },
    /// Create from a JSON definition or a blueprint
    Create {
        #[arg(long, conflicts_with = "blueprint")]
        file: Option<String>,
        #[arg(long)]
        blueprint: Option<String>,
    },
    /// List built-in blueprints
    Blueprints,
    /// Show past runs
    Runs { id: String },
    Pause { id: String },
    Resume { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum LeadAction {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        business: String,
        #[arg(long, default_value = "")]
        contact: String,
        /// startup, small, medium or large
        #[arg(long)]
        size: String,
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "")]
        challenges: String,
    },
    List {
        #[arg(long)]
        status: Option<String>,
    },
    Show { id: String },
    /// Record an interaction (open, click, demo-request, ...)
    Interact {
        id: String,
        kind: String,
        /// JSON metadata
        #[arg(long)]
        metadata: Option<String>,
    },
    Status { id: String, status: String },
    Stats,
    /// Show queued sequence emails
    Outbox,
    /// Send due emails now
    Dispatch,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_json_arg(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(s).context("invalid JSON argument"))
        .transpose()
}

fn load_config(path: Option<&str>) -> Result<BizAuditConfig> {
    let config = match path {
        Some(p) => BizAuditConfig::load_from(&PathBuf::from(shellexpand::tilde(p).to_string()))?,
        None => BizAuditConfig::load()?,
    };
    Ok(config)
}

fn generate_params(config: &BizAuditConfig) -> GenerateParams {
    GenerateParams {
        model: config.llm.model.clone(),
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
    }
}

/// Shared services built from the config.
struct Services {
    config: BizAuditConfig,
    store: Arc<dyn CollectionStore>,
    clock: Arc<dyn Clock>,
}

impl Services {
    fn open(config: BizAuditConfig) -> Result<Self> {
        let store = bizaudit_db::open_store(&config.storage)?;
        tracing::debug!("Store: {}", store.name());
        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    fn tasks(&self) -> Arc<TaskStore> {
        Arc::new(TaskStore::new(self.store.clone()))
    }

    fn mailer(&self) -> Result<Arc<dyn EmailSender>> {
        Ok(email_sender_from_config(&self.config.email)?)
    }

    fn processor(&self) -> Result<Arc<TaskProcessor>> {
        let provider = bizaudit_providers::create_provider(&self.config.llm)?;
        Ok(Arc::new(TaskProcessor::new(
            self.tasks(),
            Arc::from(provider),
            self.clock.clone(),
            generate_params(&self.config),
        )))
    }

    fn workflows(&self) -> Arc<WorkflowStore> {
        Arc::new(WorkflowStore::new(self.store.clone()))
    }

    fn engine(&self, workflows: Arc<WorkflowStore>, mailer: Arc<dyn EmailSender>) -> Result<Arc<WorkflowEngine>> {
        let provider = bizaudit_providers::create_provider(&self.config.llm)?;
        let runner = StepRunner::new(Arc::from(provider), mailer, generate_params(&self.config));
        Ok(Arc::new(WorkflowEngine::new(workflows, runner, self.clock.clone())))
    }

    fn nurturer(&self) -> Arc<LeadNurturer> {
        Arc::new(LeadNurturer::new(self.store.clone(), self.clock.clone()))
    }
}

/// Register every daemon job on `scheduler`. Returns the number of bound workflows.
async fn register_jobs(services: &Services, scheduler: &Arc<Scheduler>) -> Result<usize> {
    let config = &services.config.scheduler;
    let mailer = services.mailer()?;
    let workflows = services.workflows();
    let nurturer = services.nurturer();
    let summaries = Arc::new(SummaryLog::new(services.store.clone()));

    let prunables: Vec<Arc<dyn Prunable>> = vec![
        workflows.clone() as Arc<dyn Prunable>,
        nurturer.outbox() as Arc<dyn Prunable>,
        summaries.clone() as Arc<dyn Prunable>,
    ];
    let ctx = JobContext {
        processor: services.processor()?,
        summaries,
        clock: services.clock.clone(),
        prunables,
    };
    jobs::register_default_jobs(scheduler, ctx, config)?;

    let queue_mailer = mailer.clone();
    scheduler.schedule(jobs::EMAIL_QUEUE, &config.email_queue_cron, move || {
        let nurturer = nurturer.clone();
        let mailer = queue_mailer.clone();
        async move {
            nurturer.dispatch_due_emails(mailer.as_ref()).await?;
            Ok(())
        }
    })?;

    let engine = services.engine(workflows, mailer)?;
    Ok(jobs::register_workflow_sync(scheduler, engine, &config.workflow_sync_cron).await?)
}

async fn serve(services: Services) -> Result<()> {
    if !services.config.scheduler.enabled {
        tracing::warn!("⚠️ Scheduler disabled in config, nothing to run");
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new(services.clock.clone()));
    let bound = register_jobs(&services, &scheduler).await?;

    println!("📊 BizAudit v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Store:      {}", services.store.name());
    println!("   🤖 Provider:   {} ({})", services.config.llm.provider, services.config.llm.model);
    println!("   ⏰ Jobs:       {}", scheduler.job_count());
    println!("   🔁 Workflows:  {bound} scheduled");
    println!();

    let every = std::time::Duration::from_secs(services.config.scheduler.check_interval_secs.max(1));
    let handle = scheduler.clone().spawn(every);

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down scheduler");
    handle.abort();
    Ok(())
}

async fn workflow_command(services: &Services, action: WorkflowAction) -> Result<()> {
    let workflows = services.workflows();
    match action {
        WorkflowAction::List => print_json(&workflows.list().await?),
        WorkflowAction::Show { id } => match workflows.get(&id).await? {
            Some(w) => print_json(&w),
            None => anyhow::bail!("workflow '{id}' not found"),
        },
        WorkflowAction::Run { id, input } => {
            let input = parse_json_arg(input.as_deref())?;
            let engine = services.engine(workflows, services.mailer()?)?;
            let run = engine.execute(&id, input).await?;
            print_json(&run)
        }
        WorkflowAction::Create { file, blueprint } => {
            let new: NewWorkflow = match (file, blueprint) {
                (Some(path), _) => {
                    let path = shellexpand::tilde(&path).to_string();
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {path}"))?;
                    serde_json::from_str(&content).context("invalid workflow definition")?
                }
                (None, Some(id)) => blueprints::find(&id)?.instantiate("cli"),
                (None, None) => anyhow::bail!("pass --file or --blueprint"),
            };
            let created = workflows.create(new, services.clock.now()).await?;
            println!("✅ Workflow created: {} ({})", created.name, created.id);
            Ok(())
        }
        WorkflowAction::Blueprints => print_json(&blueprints::catalogue()),
        WorkflowAction::Runs { id } => print_json(&workflows.runs(&id).await?),
        WorkflowAction::Pause { id } => {
            let w = workflows.set_active(&id, false).await?;
            println!("⏸️  {} paused", w.name);
            Ok(())
        }
        WorkflowAction::Resume { id } => {
            let w = workflows.set_active(&id, true).await?;
            println!("▶️  {} resumed", w.name);
            Ok(())
        }
        WorkflowAction::Delete { id } => {
            if !workflows.delete(&id).await? {
                anyhow::bail!("workflow '{id}' not found");
            }
            println!("🗑️  Workflow {id} deleted");
            Ok(())
        }
    }
}

async fn lead_command(services: &Services, action: LeadAction) -> Result<()> {
    let nurturer = services.nurturer();
    match action {
        LeadAction::Add {
            email,
            business,
            contact,
            size,
            source,
            challenges,
        } => {
            let company_size: CompanySize = size.parse()?;
            let lead = nurturer
                .add_lead(NewLead {
                    email,
                    business_name: business,
                    contact_name: contact,
                    company_size,
                    source,
                    challenges,
                })
                .await?;
            print_json(&lead)
        }
        LeadAction::List { status } => {
            let status = status.map(|s| s.parse::<LeadStatus>()).transpose()?;
            print_json(&nurturer.list(status).await?)
        }
        LeadAction::Show { id } => match nurturer.get(&id).await? {
            Some(lead) => print_json(&lead),
            None => anyhow::bail!("lead '{id}' not found"),
        },
        LeadAction::Interact { id, kind, metadata } => {
            let metadata = parse_json_arg(metadata.as_deref())?.unwrap_or(serde_json::Value::Null);
            print_json(&nurturer.record_interaction(&id, &kind, metadata).await?)
        }
        LeadAction::Status { id, status } => {
            let status: LeadStatus = status.parse()?;
            print_json(&nurturer.update_lead_status(&id, status).await?)
        }
        LeadAction::Stats => print_json(&nurturer.stats().await?),
        LeadAction::Outbox => print_json(&nurturer.outbox().list(None).await?),
        LeadAction::Dispatch => {
            let mailer = services.mailer()?;
            print_json(&nurturer.dispatch_due_emails(mailer.as_ref()).await?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "bizaudit=debug,bizaudit_scheduler=debug,bizaudit_nurture=debug,bizaudit_providers=debug,bizaudit_db=debug"
    } else {
        "bizaudit=info,bizaudit_scheduler=info,bizaudit_nurture=info,bizaudit_providers=info,bizaudit_db=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if let Command::InitConfig { force } = cli.command {
        let path = match cli.config.as_deref() {
            Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
            None => BizAuditConfig::default_path(),
        };
        if path.exists() && !force {
            println!("⚠️  {} already exists (use --force to overwrite)", path.display());
            return Ok(());
        }
        BizAuditConfig::default().save_to(&path)?;
        println!("✅ Config written to {}", path.display());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let services = Services::open(config)?;

    match cli.command {
        Command::Serve => serve(services).await,
        Command::Task { task_type, query } => {
            let result = services.processor()?.process(&query, &task_type).await?;
            print_json(&result)
        }
        Command::Tasks { status } => {
            let status = status.map(|s| s.parse::<TaskStatus>()).transpose()?;
            print_json(&services.tasks().list_latest(status).await?)
        }
        Command::Workflow { action } => workflow_command(&services, action).await,
        Command::Lead { action } => lead_command(&services, action).await,
        Command::Jobs => {
            let scheduler = Arc::new(Scheduler::new(services.clock.clone()));
            register_jobs(&services, &scheduler).await?;
            print_json(&scheduler.jobs())
        }
        Command::InitConfig { .. } => Ok(()),
    }
}
