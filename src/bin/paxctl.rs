use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "paxctl")]
#[command(about = "CLI for reading and writing the paxlog diary")]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:7000")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Status,
    Log,
    Read,
    Alive,
    Write {
        #[arg(required = true)]
        words: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base_url = cli.addr;

    let resp: Value = match cli.command {
        Commands::Status => get(&client, &base_url, "status").await?,
        Commands::Log => get(&client, &base_url, "log").await?,
        Commands::Alive => get(&client, &base_url, "alive").await?,
        Commands::Read => {
            let resp = get(&client, &base_url, "read").await?;
            match resp.get("value").and_then(Value::as_str) {
                Some(value) => {
                    println!("Reading: '{}'", value);
                    return Ok(());
                }
                None => resp,
            }
        }
        Commands::Write { words } => {
            let body = serde_json::json!({ "value": words.join(" ") });
            client
                .post(format!("{}/write", base_url))
                .json(&body)
                .send()
                .await?
                .json()
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn get(client: &reqwest::Client, base_url: &str, path: &str) -> Result<Value> {
    Ok(client
        .get(format!("{}/{}", base_url, path))
        .send()
        .await?
        .json()
        .await?)
}
