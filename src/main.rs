//! destroyclaim: validate, evaluate, execute and sign destroy claims
//!
//! Usage:
//!   destroyclaim validate claim.json           → list every validation error
//!   destroyclaim evaluate claim.json           → print the evaluation state
//!   destroyclaim process claim.json [--yes]    → destroy matching files
//!   destroyclaim sign claim.json --key k.pem   → attach a JWS signature
//!   destroyclaim verify claim.json --public-key k.pub
//!   destroyclaim keygen --output keys/         → new Ed25519 key pair
//!   destroyclaim init-config                   → print the default config

use anyhow::Context;
use clap::{Parser, Subcommand};
use destroyclaim::{Agent, AgentConfig, Confirmation};
use destroyclaim_engine::Error;
use destroyclaim_jws::Algorithm;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "destroyclaim",
    about = "Destroy-claim agent: checks, evaluates and executes data destruction requests",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the agent config file (TOML)
    #[arg(long, global = true, default_value = "destroyclaim.toml")]
    config: PathBuf,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a claim against this agent and list every problem
    Validate { claim: PathBuf },
    /// Evaluate a claim and print the per-element results
    Evaluate { claim: PathBuf },
    /// Execute a claim against the configured storage
    Process {
        claim: PathBuf,
        /// Confirm manual-mode claims without asking
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Sign a claim with a PKCS#8 private key
    Sign {
        claim: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long, default_value = "rs256")]
        alg: String,
        /// Write the signed claim here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a signed claim
    Verify {
        claim: PathBuf,
        #[arg(long)]
        public_key: PathBuf,
    },
    /// Generate an Ed25519 key pair
    Keygen {
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Print the default config
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref(), cli.json)?;

    match cli.command {
        Commands::Validate { claim } => {
            let agent = start(&cli.config, Confirmation::Assume(false)).await?;
            match agent.claim(read_json(&claim)?) {
                Ok(claim) => {
                    println!("destroy claim {} is valid", claim.id());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    report(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Evaluate { claim } => {
            let agent = start(&cli.config, Confirmation::Assume(false)).await?;
            let claim = match agent.claim(read_json(&claim)?) {
                Ok(claim) => claim,
                Err(e) => {
                    report(&e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            let state = claim.evaluate().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Process { claim, yes } => {
            let confirmation = if yes {
                Confirmation::Assume(true)
            } else {
                Confirmation::Prompt
            };
            let agent = start(&cli.config, confirmation).await?;
            let claim = match agent.claim(read_json(&claim)?) {
                Ok(claim) => claim,
                Err(e) => {
                    report(&e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            match claim.process().await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Sign {
            claim,
            key,
            alg,
            output,
        } => {
            let alg: Algorithm = alg.parse()?;
            let pem = read_text(&key)?;
            let private = destroyclaim_jws::private_key_from_pem(&pem)?;
            let signed = destroyclaim_jws::sign_claim(&read_json(&claim)?, &private, alg)?;
            let rendered = serde_json::to_string_pretty(&signed)?;
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", rendered),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Verify { claim, public_key } => {
            let bytes = std::fs::read(&public_key)
                .with_context(|| format!("reading {}", public_key.display()))?;
            let armored = std::str::from_utf8(&bytes)
                .ok()
                .filter(|text| text.contains("-----BEGIN"))
                .map(str::to_owned);
            let key = match armored {
                Some(text) => destroyclaim_jws::public_key_from_pem(&text)?,
                None => bytes,
            };
            if destroyclaim_jws::verify_claim(&read_json(&claim)?, &key)? {
                println!("signature valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("signature invalid");
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Keygen { output } => {
            std::fs::create_dir_all(&output)?;
            let (private, public) = destroyclaim_jws::generate_ed25519()?;
            let private_path = output.join("destroyclaim.key");
            let public_path = output.join("destroyclaim.pub");
            std::fs::write(
                &private_path,
                destroyclaim_jws::encode_pem("PRIVATE KEY", &private),
            )?;
            std::fs::write(
                &public_path,
                destroyclaim_jws::encode_pem("PUBLIC KEY", &destroyclaim_jws::ed25519_spki(&public)),
            )?;
            println!("{}", private_path.display());
            println!("{}", public_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::InitConfig => {
            print!("{}", AgentConfig::default().to_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(log_file: Option<&Path>, json: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "destroyclaim=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file needs a file name"))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn start(config_path: &Path, confirmation: Confirmation) -> anyhow::Result<Agent> {
    let config = AgentConfig::load(config_path);
    Agent::start(&config, confirmation).await
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    serde_json::from_str(&read_text(path)?).with_context(|| format!("parsing {}", path.display()))
}

/// Print a claim error, one line per accumulated validation failure.
fn report(error: &Error) {
    eprintln!("{}", error);
    for inner in error.validation_errors() {
        eprintln!("  - {}", inner);
        if let Error::SchemaValidation { errors, .. } = inner {
            for detail in errors {
                eprintln!("      {}", detail);
            }
        }
    }
}
