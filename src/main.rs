use anyhow::Context;
use canvas_rs::canvas::server;
use canvas_rs::canvas::workflow::descriptor;
use canvas_rs::canvas::workflow::loader::WorkflowLoader;
use canvas_rs::canvas::workflow::{WorkflowEngine, WorkflowResponse};
use canvas_rs::kit::config::Settings;
use canvas_rs::kit::provider::ProviderKind;
use clap::{Parser, Subcommand};
use dotenv::dotenv;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the upload root (CANVAS_UPLOAD_DIR)
    #[arg(long, global = true)]
    upload_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
    /// Execute a workflow file (JSON or YAML) and print the response
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        /// Provider credential as provider=secret; repeatable
        #[arg(short, long = "key", value_parser = parse_key)]
        keys: Vec<(String, String)>,
    },
    /// Print the node type catalogue
    NodeTypes,
    /// Print the models a provider offers
    Models {
        #[arg(short, long)]
        provider: String,
    },
}

fn parse_key(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((provider, secret)) if !provider.is_empty() && !secret.is_empty() => {
            Ok((provider.to_string(), secret.to_string()))
        }
        _ => Err(format!("expected provider=secret, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut settings = Settings::from_env();
    if let Some(dir) = args.upload_dir {
        settings = settings.with_upload_dir(dir);
    }

    match args.command {
        Commands::Serve { port, host } => {
            let engine = Arc::new(WorkflowEngine::from_settings(&settings)?);
            log::info!(
                "Serving uploads from {} at {}",
                settings.upload_dir.display(),
                settings.public_url
            );
            server::serve(engine, SocketAddr::new(host, port)).await?;
        }
        Commands::Run { file, keys } => {
            let mut request = WorkflowLoader::new()
                .load_workflow(&file)
                .with_context(|| format!("Failed to load workflow {}", file.display()))?;
            for (provider, secret) in keys {
                request.credentials.insert(provider, secret);
            }

            let engine = WorkflowEngine::from_settings(&settings)?;
            println!(
                "Running workflow: {}",
                request.name.as_deref().unwrap_or("unnamed")
            );
            let outcome = engine.execute_request(&request).await?;
            let response = WorkflowResponse::from(outcome);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::NodeTypes => {
            println!("{}", serde_json::to_string_pretty(&descriptor::catalogue())?);
        }
        Commands::Models { provider } => {
            let kind: ProviderKind = provider.parse()?;
            for model in kind.models() {
                println!("{}", model);
            }
        }
    }

    Ok(())
}
