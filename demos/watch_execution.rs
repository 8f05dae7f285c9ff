//! Demo: follow one execution's stream from the terminal.
//!
//! Run the server demo first, then:
//!   cargo run --example watch_execution
//!
//! Point it elsewhere with FLOWRELAY_BASE_URL. The client reconnects with
//! doubling backoff if the server goes away mid-stream, so it is safe to
//! restart the server while this is running.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use flowrelay::client::{RelayClient, StreamUpdate};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let base_url = std::env::var("FLOWRELAY_BASE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let client = RelayClient::new(base_url).with_bearer("demo-user");
    let subscription = client.subscribe("exec-demo");

    while let Ok(update) = subscription.updates().recv_async().await {
        match update {
            StreamUpdate::Connected => println!("-- connected --"),
            StreamUpdate::Event(event) => println!("{event}"),
            StreamUpdate::Terminal(summary) => {
                let metrics = subscription.snapshot().metrics();
                println!("-- {} --", summary.status);
                println!(
                    "tokens: {}, cost: {:.4}, nodes completed: {}",
                    metrics.totals.total_tokens,
                    metrics.totals.total_cost,
                    metrics.completed_nodes
                );
                break;
            }
            StreamUpdate::TimedOut { message } => println!("-- timed out: {message} --"),
            StreamUpdate::Disconnected { retry_in } => {
                println!("-- disconnected, retrying in {retry_in:?} --");
            }
            StreamUpdate::Failed(error) => {
                println!("-- gave up: {error} --");
                break;
            }
        }
    }

    Ok(())
}
