use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "dispatcher-cli")]
#[command(about = "Inspection CLI for the failover dispatcher", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the breaker snapshot
    Breaker,
    /// Send one request through the dispatcher
    Dispatch {
        /// Number of requests to send
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Check dispatcher liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Breaker => {
            let res = client.get(format!("{}/breaker", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Dispatch { count } => {
            for _ in 0..count {
                let res = client.get(format!("{}/consulta", cli.url)).send().await?;
                print_response(res).await?;
            }
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: dispatcher returned status {}", status);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
