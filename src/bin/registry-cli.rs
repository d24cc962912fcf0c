use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use registry_sdk::RegistryClient;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Management CLI for the gateway registry", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8090")]
    url: String,

    /// Admin API key (also read from REGISTRY_ADMIN_API_KEY).
    #[arg(short, long, env = "REGISTRY_ADMIN_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show registry status
    Status,
    /// Print the latest merged schema
    Schema,
    /// Run the policy attachment reconciliation sweep
    Reconcile,
    /// Run an operation (e.g. updateSchemas) with JSON input from a file or stdin
    Exec {
        operation: String,
        /// Input file; `-` or absent reads stdin
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut client = RegistryClient::new(&cli.url);
    if let Some(key) = cli.key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Status => print_json(&client.status().await?)?,
        Commands::Reconcile => print_json(&client.reconcile().await?)?,
        Commands::Schema => match client.schema().await? {
            Some(published) => {
                if let Some(sequence) = published.sequence {
                    eprintln!("# sequence {}", sequence);
                }
                println!("{}", published.sdl);
            }
            None => eprintln!("No schema has been published yet"),
        },
        Commands::Exec { operation, input } => {
            let input = read_input(input)?;
            client.execute(&operation, &input).await?;
            println!("{} succeeded", operation);
        }
    }

    Ok(())
}

fn read_input(path: Option<PathBuf>) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)?,
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    Ok(serde_json::from_str(&text)?)
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
