use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use retrieval_gateway::config::load_config;
use retrieval_gateway::executor::ExecutionContext;
use retrieval_gateway::observability::logging;
use retrieval_gateway::{Gateway, RetrievalOptions};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the retrieval gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness check
    Status,
    /// Per-adapter health and circuit state
    Adapters,
    /// Readiness verdict
    Ready {
        /// Override the configured readiness threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// System status with every circuit
    System,
    /// Call and transition history of one adapter
    History {
        name: String,
        /// Everything retained instead of the recent window
        #[arg(long)]
        full: bool,
    },
    /// Reset an adapter's circuit breaker
    Reset {
        name: String,
        #[arg(long)]
        clear_history: bool,
    },
    /// Run a query in-process against the adapters of a config file
    Query {
        #[arg(short, long)]
        config: PathBuf,
        query: String,
        /// Adapters to query; every enabled adapter when omitted
        #[arg(short, long)]
        adapter: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = format!("{}/health", cli.url.trim_end_matches('/'));
    let request = match cli.command {
        Commands::Status => client.get(&base),
        Commands::Adapters => client.get(format!("{base}/adapters")),
        Commands::Ready { threshold } => {
            let request = client.get(format!("{base}/ready"));
            match threshold {
                Some(t) => request.query(&[("threshold", t)]),
                None => request,
            }
        }
        Commands::System => client.get(format!("{base}/system")),
        Commands::History { name, full } => {
            let suffix = if full { "/full" } else { "" };
            client.get(format!("{base}/adapters/{name}/history{suffix}"))
        }
        Commands::Reset {
            name,
            clear_history,
        } => client
            .post(format!("{base}/adapters/{name}/reset"))
            .query(&[("clear_history", clear_history)]),
        Commands::Query {
            config,
            query,
            adapter,
        } => return run_query(config, query, adapter).await,
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await?;
    Ok(())
}

async fn run_query(
    config: PathBuf,
    query: String,
    adapters: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config)?;
    logging::init_logging(&config.observability);

    let gateway = Gateway::build(config);
    let names = (!adapters.is_empty()).then_some(adapters.as_slice());
    let options = RetrievalOptions::new(ExecutionContext::new());

    let result = gateway
        .manager()
        .get_relevant_context(&query, names, options)
        .await;
    gateway.shutdown().await;

    let items = result?;
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{body}");
    } else {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("Response: {}", body);
    }
    Ok(())
}
