//! FX CLI
//!
//! Command-line interface for the exchange rate API.

use anyhow::Result;
use clap::{Parser, Subcommand};

use fx_client::RatesClient;

#[derive(Parser)]
#[command(name = "fx")]
#[command(author, version, about = "Exchange rate API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the rates API
    #[arg(long, env = "FX_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "FX_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the rate for one currency pair
    Rate {
        /// Base currency code (e.g. USD)
        base: String,
        /// Target currency code (e.g. EUR)
        target: String,
    },
    /// Get every known rate for a base currency
    Rates {
        /// Base currency code (e.g. USD)
        base: String,
    },
    /// Remove a cached pair (requires an API key)
    Delete {
        base: String,
        target: String,
    },
    /// Check API health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = RatesClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            if health.breaker != "closed" {
                eprintln!("upstream circuit breaker is {}", health.breaker);
            }
        }

        Commands::Rate { base, target } => {
            let rate = client.get_rate(&base, &target).await?;
            println!("{}", serde_json::to_string_pretty(&rate)?);
            if rate.stale {
                eprintln!("warning: upstream unavailable, rate served from cache");
            }
        }

        Commands::Rates { base } => {
            let rates = client.get_rates(&base).await?;
            println!("{}", serde_json::to_string_pretty(&rates)?);
            if rates.stale {
                eprintln!("warning: upstream unavailable, some rates served from cache");
            }
        }

        Commands::Delete { base, target } => {
            client.delete_rate(&base, &target).await?;
            println!("✓ cached rate {}/{} deleted", base, target);
        }
    }

    Ok(())
}
