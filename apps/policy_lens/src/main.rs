use std::{
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings_from, load_settings, render, run_search, search::NO_RECORDS_MESSAGE,
    ApiConfig, ExtractionProgress, HttpPolicyGateway, PdfUpload, PolicyGateway, SearchOutcome,
    WorkflowController,
};
use shared::{
    dates::{ddmmyyyy_to_iso, format_for_display, iso_to_ddmmyyyy},
    domain::{PolicyField, Stage},
    protocol::SearchQuery,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod edits;

use edits::{normalize_value, parse_field_edit, FieldEdit};

#[derive(Parser, Debug)]
#[command(name = "policy-lens", about = "Extract and verify insurance policy PDFs")]
struct Cli {
    /// Overrides the backend base URL from settings and environment.
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    /// Settings file; defaults to `policy_lens.toml` in the working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a policy PDF, extract its data, apply corrections and verify.
    Process {
        pdf: PathBuf,
        /// Correction applied before verification, e.g. `--set policy_number=P-2`.
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_field_edit)]
        edits: Vec<FieldEdit>,
        /// Prompt for every field before submitting.
        #[arg(long)]
        interactive: bool,
    },
    /// Look up verified records.
    Search {
        #[arg(long)]
        policy_holder: Option<String>,
        #[arg(long)]
        registration_no: Option<String>,
        /// DD/MM/YYYY or YYYY-MM-DD.
        #[arg(long)]
        expiry_date: Option<String>,
    },
    /// Convert between DD/MM/YYYY and ISO dates.
    Date {
        #[command(subcommand)]
        command: DateCommand,
    },
    /// Print the resolved backend endpoints.
    ShowConfig,
}

#[derive(Subcommand, Debug)]
enum DateCommand {
    ToIso { date: String },
    FromIso { date: String },
    Display { date: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Date { command } => {
            println!("{}", convert_date(command));
            Ok(())
        }
        Command::ShowConfig => {
            let config = resolve_config(cli.config.as_deref(), cli.api_base_url.as_deref())?;
            show_config(&config);
            Ok(())
        }
        Command::Search {
            policy_holder,
            registration_no,
            expiry_date,
        } => {
            let config = resolve_config(cli.config.as_deref(), cli.api_base_url.as_deref())?;
            let query = SearchQuery {
                policy_holder,
                registration_no,
                expiry_date: expiry_date.map(|d| normalize_value(PolicyField::ExpiringDate, &d)),
            };
            search(&config, &query).await
        }
        Command::Process {
            pdf,
            edits,
            interactive,
        } => {
            let config = resolve_config(cli.config.as_deref(), cli.api_base_url.as_deref())?;
            process(&config, &pdf, edits, interactive).await
        }
    }
}

fn resolve_config(path: Option<&Path>, base_url: Option<&str>) -> Result<ApiConfig> {
    let config = match path {
        Some(path) => load_settings_from(path, |key| std::env::var(key).ok())?,
        None => load_settings()?,
    };
    let config = match base_url {
        Some(url) => config.with_base_url(url)?,
        None => config,
    };
    info!(base_url = config.base_url(), environment = %config.environment, "settings loaded");
    Ok(config)
}

fn show_config(config: &ApiConfig) {
    println!("environment: {}", config.environment);
    println!("base url:    {}", config.base_url());
    println!("upload:      {}", config.upload_url());
    println!("verify:      {}", config.verify_url());
    println!("results:     {}", config.results_url());
    println!("summary:     {}", config.summary_url());
    println!("search:      {}", config.search_url());
    match config.request_timeout {
        Some(timeout) => println!("timeout:     {}s", timeout.as_secs()),
        None => println!("timeout:     none"),
    }
}

fn convert_date(command: DateCommand) -> String {
    match command {
        DateCommand::ToIso { date } => ddmmyyyy_to_iso(&date),
        DateCommand::FromIso { date } => iso_to_ddmmyyyy(&date),
        DateCommand::Display { date } => format_for_display(date.as_deref()),
    }
}

async fn search(config: &ApiConfig, query: &SearchQuery) -> Result<()> {
    if query.normalized().is_empty() {
        bail!("provide at least one of --policy-holder, --registration-no, --expiry-date");
    }
    let gateway = HttpPolicyGateway::new(config)?;
    match run_search(&gateway, query).await? {
        SearchOutcome::NoRecords => println!("{NO_RECORDS_MESSAGE}"),
        SearchOutcome::Records(records) => {
            for (index, record) in records.iter().enumerate() {
                println!("Record {}", index + 1);
                for (column, value) in record {
                    println!("  {column:<18} {value}");
                }
            }
        }
    }
    Ok(())
}

async fn process(
    config: &ApiConfig,
    pdf: &Path,
    edits: Vec<FieldEdit>,
    interactive: bool,
) -> Result<()> {
    let gateway = Arc::new(HttpPolicyGateway::new(config)?);
    let mut workflow = WorkflowController::new(gateway.clone());

    let file = PdfUpload::from_path(pdf)
        .await
        .with_context(|| format!("cannot upload {}", pdf.display()))?;
    if workflow.submit_upload(file).await? != Stage::Extracting {
        print!("{}", render(workflow.state(), workflow.draft()));
        bail!("upload was not accepted");
    }
    print!("{}", render(workflow.state(), workflow.draft()));

    let extracted =
        extract_with_progress(&mut workflow, gateway.as_ref(), tokio::signal::ctrl_c()).await?;
    if extracted != Stage::Verify {
        print!("{}", render(workflow.state(), workflow.draft()));
        bail!("extraction did not produce data to verify");
    }

    for edit in edits {
        workflow.edit_field(edit.field, edit.value)?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    if interactive {
        print!("{}", render(workflow.state(), workflow.draft()));
        prompt_for_fields(&mut workflow, &mut stdin).await?;
    }

    loop {
        print!("{}", render(workflow.state(), workflow.draft()));
        if workflow.submit_draft().await? == Stage::Complete {
            break;
        }
        let message = workflow.state().error_message.clone().unwrap_or_default();
        if !interactive || !confirm(&mut stdin, "Verification failed. Retry?").await? {
            bail!("{message}");
        }
    }

    print!("{}", render(workflow.state(), workflow.draft()));
    Ok(())
}

/// Drives the extraction call while redrawing the progress line. If `cancel`
/// resolves first the workflow is reset so a late response cannot be applied.
async fn extract_with_progress<C: Future>(
    workflow: &mut WorkflowController,
    gateway: &dyn PolicyGateway,
    cancel: C,
) -> Result<Stage> {
    let ticket = workflow.begin_extraction()?;
    let file_id = ticket.file_id().clone();
    let progress = ExtractionProgress::start();
    let mut updates = progress.subscribe();

    let call = gateway.extract(&file_id);
    tokio::pin!(call);
    tokio::pin!(cancel);

    let result = loop {
        tokio::select! {
            result = &mut call => break result,
            _ = &mut cancel => {
                drop(progress);
                eprintln!();
                workflow.reset();
                bail!("extraction cancelled");
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut call).await;
                }
                let snapshot = *updates.borrow_and_update();
                eprint!("\r{:>3}% {:<32}", snapshot.percent, snapshot.caption);
                let _ = std::io::stderr().flush();
            }
        }
    };

    let done = progress.finish();
    eprintln!("\r{:>3}% {:<32}", done.percent, "Done");
    Ok(workflow.complete_extraction(ticket, result))
}

async fn prompt_for_fields(
    workflow: &mut WorkflowController,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    println!("Press enter to keep a value, or type a replacement.");
    for field in PolicyField::trackable() {
        let current = workflow
            .draft()
            .and_then(|draft| draft.record.get(field))
            .unwrap_or_default()
            .to_string();
        print!("{} [{}]: ", field.label(), current);
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            warn!("stdin closed while prompting; keeping remaining values");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        workflow.edit_field(field, normalize_value(field, &line))?;
    }
    Ok(())
}

async fn confirm(stdin: &mut Lines<BufReader<Stdin>>, question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    std::io::stdout().flush()?;
    let answer = stdin.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
