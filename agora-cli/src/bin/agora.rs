use std::path::PathBuf;

use agora_cli::config::{partial_show_secret, resolve_secrets};
use agora_core::config::AgoraConfig;
use agora_core::llm::LlmClient;
use agora_core::platform::PlatformClient;
use agora_core::sandbox::{ComputeMode, Evaluation, ExecutionContext, Sandbox};
use agora_core::session::SessionRunner;
use clap::{command, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Autonomous store-benchmark agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Path to secret file
    #[arg(short, long, default_value = "secret.json", global = true)]
    secret: PathBuf,

    /// Platform API key
    #[arg(long, env = "AGORA_PLATFORM_API_KEY", global = true)]
    platform_api_key: Option<String>,

    /// LLM provider API key
    #[arg(long, env = "AGORA_LLM_API_KEY", global = true)]
    llm_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full benchmark session
    Run(RunArgs),

    /// Evaluate a single expression in the local sandbox
    Eval(EvalArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Skip the startup schema capability probe
    #[arg(long)]
    skip_probe: bool,
}

#[derive(Parser)]
struct EvalArgs {
    /// The expression to evaluate
    expression: String,

    /// Compute mode (analytics or validation)
    #[arg(short, long, default_value = "analytics", value_parser = parse_mode)]
    mode: ComputeMode,
}

fn parse_mode(value: &str) -> Result<ComputeMode, String> {
    match value {
        "analytics" => Ok(ComputeMode::Analytics),
        "validation" => Ok(ComputeMode::Validation),
        other => Err(format!(
            "unknown mode '{}', expected analytics or validation",
            other
        )),
    }
}

fn load_config(cli: &Cli) -> Result<AgoraConfig, Box<dyn std::error::Error>> {
    if cli.config.exists() {
        Ok(AgoraConfig::from_file(&cli.config)?)
    } else {
        info!(path = %cli.config.display(), "config file not found, using defaults");
        Ok(AgoraConfig::default())
    }
}

async fn run_session(cli: &Cli, args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let secrets = resolve_secrets(
        &cli.secret,
        cli.platform_api_key.clone(),
        cli.llm_api_key.clone(),
    )?;
    info!(
        platform_key = %partial_show_secret(&secrets.platform_api_key),
        llm_key = %partial_show_secret(&secrets.llm_api_key),
        "credentials resolved"
    );

    let llm = LlmClient::new(&config.llm, &secrets.llm_api_key);
    if !args.skip_probe && !llm.check_schema_capability().await {
        warn!("model may not support schema-aligned tool calls; expect failures on tool usage");
    }

    let platform = PlatformClient::new(&config.platform, secrets.platform_api_key.clone())?;
    let runner = SessionRunner::new(&llm, &platform, &config);
    let metrics = runner.run().await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn run_eval(cli: &Cli, args: &EvalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let sandbox = Sandbox::new(config.sandbox);
    let mut context = ExecutionContext::new();

    match sandbox.evaluate(&args.expression, &mut context, args.mode) {
        Evaluation::Success { value } => {
            println!("{}", value);
            Ok(())
        }
        failure => {
            let text = failure
                .error_text()
                .unwrap_or_else(|| "unknown failure".to_string());
            Err(text.into())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => run_session(&cli, args).await,
        Commands::Eval(args) => run_eval(&cli, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
