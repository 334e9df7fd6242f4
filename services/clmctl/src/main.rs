//! clmctl
//!
//! Command-line front end for the CLM backend. Signs in, keeps the session
//! in a token file between runs, and drives the contract, template,
//! approval, review and AI drafting calls of `clm-client`.

mod config;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clm_auth::{FileTokenStore, Session};
use clm_client::models::ReportFormat;
use clm_client::{
    ApiClient, ApiResponse, CancellationToken, ClientConfig, GenerationOutcome, GenerationRequest,
    GenerationSink, ListParams, fill_placeholders, placeholders,
};
use common::Secret;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "clmctl", version, about = "Work with a CLM backend from the terminal")]
struct Cli {
    /// Config file (default: $CONFIG_PATH, then ./clmctl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend origin; overrides the config file and CLM_API_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CLMCTL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    #[command(subcommand)]
    Contracts(ContractsCommand),
    #[command(subcommand)]
    Templates(TemplatesCommand),
    /// Stream an AI draft to stdout (Ctrl-C stops it)
    Generate {
        #[arg(long)]
        prompt: String,
        /// File holding the current editor text
        #[arg(long)]
        text_file: Option<PathBuf>,
        #[arg(long)]
        contract_type: Option<String>,
    },
    /// Approve an approval request
    Approve {
        id: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Reject an approval request
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    #[command(subcommand)]
    Review(ReviewCommand),
    /// Check the backend is up
    Health,
}

#[derive(Debug, Subcommand)]
enum ContractsCommand {
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Get {
        id: String,
    },
    Recent {
        #[arg(long)]
        limit: Option<u32>,
    },
    Stats,
}

#[derive(Debug, Subcommand)]
enum TemplatesCommand {
    /// List library template files
    List,
    /// Print a template file, optionally filling placeholders
    Show {
        filename: String,
        /// `key=value`; repeat for each placeholder
        #[arg(long = "fill", value_parser = parse_fill)]
        fill: Vec<(String, String)>,
    },
    /// Print a template's data-entry fields
    Schema {
        filename: String,
    },
}

#[derive(Debug, Subcommand)]
enum ReviewCommand {
    List,
    /// Start analysis of an uploaded contract
    Analyze {
        id: String,
    },
    /// Download the review report
    Report {
        id: String,
        #[arg(long, value_enum, default_value = "pdf")]
        format: ReportArg,
        /// Output path (default: derived from the contract title)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ReportArg {
    Txt,
    Pdf,
}

impl From<ReportArg> for ReportFormat {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::Txt => ReportFormat::Txt,
            ReportArg::Pdf => ReportFormat::Pdf,
        }
    }
}

fn parse_fill(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got: {raw}")),
    }
}

fn init_tracing(format: LogFormat) {
    // Logs go to stderr; stdout carries command output.
    let (json, pretty) = match format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(json)
        .with(pretty)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config_path, explicit) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(cli.log_format.unwrap_or(config.log.format));

    let base_url = cli
        .base_url
        .clone()
        .or_else(|| config.api.base_url.clone());
    let client_config = ClientConfig::new(&clm_client::config::resolve_base_url(base_url.as_deref()))
        .context("invalid base URL")?
        .with_timeout(config.api.timeout());

    let token_file = config.token_file();
    info!(
        config = %config_path.display(),
        base_url = client_config.base_url(),
        token_file = %token_file.display(),
        "configuration loaded"
    );

    let session = Session::new(Arc::new(FileTokenStore::open(token_file)));
    let client = ApiClient::new(client_config, session).context("failed to build API client")?;

    run(&client, cli.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let resp = client.login(&email, &Secret::new(password)).await;
            let tokens = resp.into_result().context("login failed")?;
            let name = tokens
                .user
                .map(|u| u.display_name())
                .unwrap_or_else(|| email.clone());
            println!("Signed in as {name}");
        }
        Command::Logout => {
            let resp = client.logout().await;
            if !resp.success {
                warn!(status = resp.status, error = ?resp.error, "backend logout failed");
            }
            println!("Signed out");
        }
        Command::Whoami => {
            require_session(client)?;
            emit(client.current_user().await)?;
        }
        Command::Contracts(cmd) => contracts(client, cmd).await?,
        Command::Templates(cmd) => templates(client, cmd).await?,
        Command::Generate {
            prompt,
            text_file,
            contract_type,
        } => generate(client, prompt, text_file, contract_type).await?,
        Command::Approve { id, comment } => {
            emit(client.approve(&id, comment.as_deref()).await)?;
        }
        Command::Reject { id, reason } => {
            emit(client.reject(&id, reason.as_deref()).await)?;
        }
        Command::Review(cmd) => review(client, cmd).await?,
        Command::Health => emit(client.health().await)?,
    }
    Ok(())
}

async fn contracts(client: &ApiClient, cmd: ContractsCommand) -> Result<()> {
    match cmd {
        ContractsCommand::List {
            page,
            search,
            status,
        } => {
            let mut params = ListParams::new();
            if let Some(page) = page {
                params = params.page(page);
            }
            if let Some(search) = search {
                params = params.search(&search);
            }
            if let Some(status) = status {
                params = params.status(&status);
            }
            emit(client.list_contracts(&params).await)
        }
        ContractsCommand::Get { id } => emit(client.get_contract(&id).await),
        ContractsCommand::Recent { limit } => emit(client.recent_contracts(limit).await),
        ContractsCommand::Stats => emit(client.contract_statistics().await),
    }
}

async fn templates(client: &ApiClient, cmd: TemplatesCommand) -> Result<()> {
    match cmd {
        TemplatesCommand::List => emit(client.list_template_files().await),
        TemplatesCommand::Show { filename, fill } => {
            let content = client
                .template_file_content(&filename)
                .await
                .into_result()
                .with_context(|| format!("failed to load template {filename}"))?;
            let values: BTreeMap<String, String> = fill.into_iter().collect();
            let unfilled: Vec<String> = placeholders(&content.content)
                .into_iter()
                .filter(|key| !values.contains_key(key))
                .collect();
            if !unfilled.is_empty() {
                debug!(?unfilled, "placeholders left unfilled");
            }
            println!("{}", fill_placeholders(&content.content, &values));
            Ok(())
        }
        TemplatesCommand::Schema { filename } => {
            let schema = client
                .template_file_schema(&filename)
                .await
                .into_result()
                .with_context(|| format!("failed to load schema for {filename}"))?;
            for section in &schema.sections {
                println!("{}", section.title);
                for field in &section.fields {
                    let marker = if field.required { "*" } else { " " };
                    println!("  {marker} {} ({}) {}", field.key, field.field_type, field.label);
                }
            }
            Ok(())
        }
    }
}

/// Writes deltas to `out` as they arrive. A failed write stops the stream
/// through `cancel` and is kept for the caller.
struct WriterSink<W> {
    out: W,
    cancel: CancellationToken,
    error: Option<std::io::Error>,
}

impl<W: Write> WriterSink<W> {
    fn new(out: W, cancel: CancellationToken) -> Self {
        Self {
            out,
            cancel,
            error: None,
        }
    }

    fn write(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
        {
            warn!(error = %e, "failed to write generated text; stopping");
            self.error = Some(e);
            self.cancel.cancel();
        }
    }
}

impl<W: Write + Send> GenerationSink for WriterSink<W> {
    fn on_delta(&mut self, delta: &str) {
        self.write(delta);
    }

    fn on_done(&mut self, _text: &str) {
        self.write("\n");
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\ngeneration failed: {message}");
    }
}

async fn generate(
    client: &ApiClient,
    prompt: String,
    text_file: Option<PathBuf>,
    contract_type: Option<String>,
) -> Result<()> {
    require_session(client)?;
    let current_text = match text_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => String::new(),
    };
    let request = GenerationRequest {
        prompt,
        current_text,
        contract_type,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut sink = WriterSink::new(std::io::stdout(), cancel.clone());
    let outcome = client.stream_generation(&request, &mut sink, &cancel).await;
    if let Some(e) = sink.error {
        return Err(e).context("failed to write generated text");
    }
    match outcome {
        GenerationOutcome::Completed(text) => {
            debug!(chars = text.len(), "generation complete");
            Ok(())
        }
        GenerationOutcome::Cancelled { partial } => {
            eprintln!("\ncancelled after {} characters", partial.len());
            Ok(())
        }
        GenerationOutcome::Failed { message, .. } => bail!("generation failed: {message}"),
    }
}

async fn review(client: &ApiClient, cmd: ReviewCommand) -> Result<()> {
    match cmd {
        ReviewCommand::List => emit(client.list_review_contracts(&ListParams::new()).await),
        ReviewCommand::Analyze { id } => emit(client.analyze_review_contract(&id).await),
        ReviewCommand::Report { id, format, out } => {
            let format = ReportFormat::from(format);
            let out = match out {
                Some(path) => path,
                None => {
                    let contract = client
                        .get_review_contract(&id)
                        .await
                        .into_result()
                        .with_context(|| format!("failed to load review contract {id}"))?;
                    report_path_in_cwd(&contract.report_filename(format))?
                }
            };
            let bytes = client
                .download_review_report(&id, format)
                .await
                .into_result()
                .context("failed to download report")?;
            std::fs::write(&out, &bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Saved {} ({} bytes)", out.display(), bytes.len());
            Ok(())
        }
    }
}

/// Default report destination: the file name alone, in the working directory.
fn report_path_in_cwd(name: &str) -> Result<PathBuf> {
    match Path::new(name).file_name() {
        Some(file) if Path::new(file) == Path::new(name) => Ok(PathBuf::from(file)),
        _ => bail!("refusing to write report to {name:?}; pass --out"),
    }
}

fn require_session(client: &ApiClient) -> Result<()> {
    if !client.is_authenticated() {
        bail!("not signed in; run `clmctl login` first");
    }
    Ok(())
}

/// Print a successful envelope's data as JSON, or fail with its error.
fn emit<T: Serialize>(resp: ApiResponse<T>) -> Result<()> {
    if resp.is_unauthorized() {
        bail!("session expired; run `clmctl login` again");
    }
    let data = resp.into_result()?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
