//! AgentRAG terminal client
//!
//! Streams answers from an AgentRAG backend and manages its document store.
//!
//! Usage:
//! ```bash
//! # One-shot question
//! agentrag ask "What is Amazon Bedrock?"
//!
//! # Interactive session
//! agentrag --base-url http://localhost:8000 chat
//!
//! # Document management
//! agentrag upload notes.md guide.pdf
//! agentrag documents
//! agentrag delete notes.md
//! ```

mod config;
mod render;

use agentrag_client::{ApiClient, SseTransport, create_client, is_supported_document};
use agentrag_core::Error;
use agentrag_session::{SessionController, SessionMetrics, SessionStatus};
use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ClientConfig;
use render::{TerminalRenderer, format_document, format_file_size};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// AgentRAG - multi-agent RAG client
#[derive(Parser)]
#[command(name = "agentrag")]
#[command(about = "Ask questions and manage documents on an AgentRAG backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "AGENTRAG_CONFIG",
        global = true
    )]
    config: Option<String>,

    /// Backend base URL (overrides config and environment)
    #[arg(short = 'u', long, value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Print session metrics in Prometheus text format on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and stream the answer
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Interactive question loop
    Chat,
    /// Show backend health and provider
    Health,
    /// Upload documents to the knowledge base (.txt, .md, .pdf)
    Upload {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// List documents in the knowledge base
    Documents,
    /// Delete a document from the knowledge base
    Delete {
        /// File name as shown by `documents`
        name: String,
    },
}

type Controller = SessionController<SseTransport, TerminalRenderer<std::io::Stdout>>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            let config_path = shellexpand::tilde(config_path).to_string();
            ClientConfig::from_file(&config_path)
                .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", config_path, e))?
        }
        None => ClientConfig::default(),
    };

    // Environment overrides the file, CLI flags override both
    config.merge_env();
    if let Some(base_url) = &cli.base_url {
        config.server.base_url = base_url.clone();
    }

    init_tracing(&config)?;
    debug!("Using backend at {}", config.server.base_url);

    let metrics = SessionMetrics::new()?;
    let http_config = config.http_client_config();
    let client = create_client(&http_config)?;
    let api = ApiClient::with_client(client.clone(), &config.server.base_url, &http_config);

    let new_controller = || {
        let transport = SseTransport::with_client(client.clone(), &config.server.base_url);
        let renderer = TerminalRenderer::stdout(config.logging.show_step_data);
        let controller = SessionController::new(transport, renderer).with_metrics(metrics.clone());
        match config.idle_timeout() {
            Some(timeout) => controller.with_idle_timeout(timeout),
            None => controller,
        }
    };

    let code = match cli.command {
        Commands::Ask { query } => ask(new_controller(), &query.join(" ")).await?,
        Commands::Chat => chat(new_controller()).await?,
        Commands::Health => health(&api).await?,
        Commands::Upload { files } => upload(&api, &files).await,
        Commands::Documents => documents(&api).await?,
        Commands::Delete { name } => delete(&api, &name).await?,
    };

    if cli.metrics {
        print!("{}", metrics.gather_text());
    }

    Ok(code)
}

fn init_tracing(config: &ClientConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // Connection pool chatter is only useful when debugging the HTTP layer
    match "hyper_util=warn".parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Warning: Failed to set hyper log filter: {}", e),
    }

    // Logs go to stderr so they never interleave with rendered answers
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Run one session to its end, aborting it on Ctrl-C
async fn run_session(controller: &mut Controller, query: &str) -> anyhow::Result<SessionStatus> {
    controller.submit(query).await?;

    let interrupted = tokio::select! {
        _ = controller.run() => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        controller.reset();
        println!("Interrupted.");
    }

    Ok(controller.status())
}

async fn ask(mut controller: Controller, query: &str) -> anyhow::Result<ExitCode> {
    match run_session(&mut controller, query).await {
        Ok(SessionStatus::Completed) => Ok(ExitCode::SUCCESS),
        Ok(_) => Ok(ExitCode::FAILURE),
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::InvalidQuery(_)) => {
                eprintln!("Please enter a question.");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(e),
        },
    }
}

async fn chat(mut controller: Controller) -> anyhow::Result<ExitCode> {
    println!("AgentRAG chat. Type 'exit' to leave, 'clear' to start over.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        // Once a session has listened for Ctrl-C the default SIGINT handler is
        // gone, so the prompt has to handle it too
        let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };

        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" | "q" => break,
            "clear" => {
                controller.reset();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        if let Err(e) = run_session(&mut controller, input).await {
            warn!("Could not start session: {}", e);
            println!("Error: {}", e);
        }
    }

    info!("Chat ended");
    Ok(ExitCode::SUCCESS)
}

/// Next line of chat input, or `None` once input ends or `interrupt` fires
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

async fn health(api: &ApiClient) -> anyhow::Result<ExitCode> {
    let health = api.health().await.context("Backend unreachable")?;

    println!("Status:      {}", health.status);
    println!("Provider:    {}", health.provider.to_uppercase());
    if let Some(environment) = &health.environment {
        println!("Environment: {}", environment);
    }

    Ok(if health.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn upload(api: &ApiClient, files: &[PathBuf]) -> ExitCode {
    let mut failed = false;

    for file in files {
        let path = PathBuf::from(shellexpand::tilde(&file.to_string_lossy()).to_string());

        if !is_supported_document(&path) {
            println!(
                "Skipping {}: only .txt, .md and .pdf files are supported",
                path.display()
            );
            failed = true;
            continue;
        }

        match api.upload_document(&path).await {
            Ok(receipt) => println!(
                "Uploaded {} ({})",
                receipt.filename,
                format_file_size(receipt.size)
            ),
            Err(e) => {
                println!("Failed to upload {}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn documents(api: &ApiClient) -> anyhow::Result<ExitCode> {
    let documents = api.list_documents().await?;

    if documents.is_empty() {
        println!("No documents uploaded yet.");
    } else {
        for document in &documents {
            println!("{}", format_document(document));
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn delete(api: &ApiClient, name: &str) -> anyhow::Result<ExitCode> {
    match api.delete_document(name).await {
        Ok(()) => {
            println!("Deleted {}", name);
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Http {
            status_code: 404,
            message,
        }) => {
            println!("{}", message);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}
