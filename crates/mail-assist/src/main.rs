//! mail-assist: inbox summarizer and reply drafter
//!
//! Usage:
//!   mail-assist            - Load the inbox, summarize unread mail and print it
//!   mail-assist --cli      - Start interactive mode
//!   mail-assist --folders  - List folders with message counts
//!   mail-assist --check    - Test the text generation backends
//!   mail-assist --help     - Show help

mod cli;

use std::sync::Arc;

use ma_core::Config;
use ma_inbox::Orchestrator;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// One-shot load and print
    Summary,
    /// Interactive mode
    Cli,
    /// Print folders
    Folders,
    /// Text generation self-test
    Check,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("mail-assist {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting mail-assist...");
    tracing::info!(
        "Mailbox: {} on {}:{}",
        config.imap.folder,
        config.imap.host,
        config.imap.port
    );

    let orchestrator = Arc::new(
        Orchestrator::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to create text generation clients: {}", e))?,
    );

    if let RunMode::Check = mode {
        let ok = orchestrator.check_generation().await;
        cli::print_status(&orchestrator.snapshot());
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    if !config.has_credentials() {
        anyhow::bail!("MAIL_ADDRESS and MAIL_SECRET must be set (or [account] in mail-assist.toml)");
    }

    orchestrator
        .connect(
            &config.account.address,
            &config.account.secret,
            &config.imap.host,
            config.imap.port,
        )
        .await?;

    let result = match mode {
        RunMode::Cli => cli::run_cli(Arc::clone(&orchestrator)).await,
        RunMode::Folders => {
            let folders = orchestrator.load_folders().await;
            cli::print_folders(&folders);
            Ok(())
        }
        _ => run_summary(&orchestrator).await,
    };

    orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    result
}

/// Load the selection once and print it with its summaries
async fn run_summary(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let progress = cli::spawn_progress(orchestrator.subscribe());

    orchestrator.load_emails().await;
    progress.abort();

    let state = orchestrator.snapshot();
    cli::print_messages(&state);
    cli::print_status(&state);
    Ok(())
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--cli" | "-c" => return RunMode::Cli,
            "--folders" | "-f" => return RunMode::Folders,
            "--check" => return RunMode::Check,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Summary
}

/// Print help message
fn print_help() {
    println!("mail-assist - inbox summarizer and reply drafter");
    println!();
    println!("Usage:");
    println!("  mail-assist            Load the inbox, summarize unread mail and print it");
    println!("  mail-assist --cli      Start interactive mode");
    println!("  mail-assist --folders  List folders with message counts");
    println!("  mail-assist --check    Test the text generation backends");
    println!("  mail-assist --help     Show this help message");
    println!("  mail-assist --version  Show version");
    println!();
    println!("Environment Variables:");
    println!("  MAIL_ADDRESS           IMAP login (required)");
    println!("  MAIL_SECRET            Password or app password (required)");
    println!("  IMAP_HOST              IMAP server (default: imap.gmail.com)");
    println!("  IMAP_PORT              IMAP port (default: 993)");
    println!("  IMAP_FOLDER            Folder to load (default: INBOX)");
    println!("  IMAP_MAX_TOTAL         Messages per load (default: 20)");
    println!("  IMAP_MAX_UNREAD        Unread messages summarized per load (default: 5)");
    println!("  SUMMARIZER_MODE        retrying or fallback (default: retrying)");
    println!("  HUGGING_FACE_API_KEY   Summarization backends");
    println!("  GEMINI_API_KEY         Reply generation backend");
    println!();
    println!("Settings can also be read from ./mail-assist.toml");
}
