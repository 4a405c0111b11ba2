//! Interactive terminal driver for a DeepThink session.
//!
//! ```text
//! OPENAI_API_KEY=... cargo run --example deepthink_repl
//! ```
//!
//! Plain lines are sent to the latest branch. Commands:
//! - `/next`  run the transition the latest entry enables
//! - `/log`   print the whole log
//! - `/reset` clear the log
//! - `/quit`  exit

use deepthink::clients::openai::OpenAIGateway;
use deepthink::{CallingConvention, DeepThink, DeepThinkConfig, Entry};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        println!("{}\n", entry);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    deepthink::init_logger();

    let gateway = Arc::new(OpenAIGateway::from_env()?);
    let convention = match std::env::var("DEEPTHINK_CONTINUATION") {
        Ok(_) => CallingConvention::Continuation,
        Err(_) => CallingConvention::FullHistory,
    };
    let session = DeepThink::new(gateway)
        .with_config(DeepThinkConfig::default().with_calling_convention(convention));

    println!("Enter task details (/next, /log, /reset, /quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let before = session.len().await;
        let outcome = match line {
            "/quit" => break,
            "/log" => {
                print_entries(&session.entries().await);
                continue;
            }
            "/reset" => session.reset().await.map(|_| Vec::new()),
            "/next" => session.advance().await,
            text => session.send(text).await,
        };

        match outcome {
            Ok(_) => {
                let entries = session.entries().await;
                print_entries(&entries[before.min(entries.len())..]);
                if let Some(transition) = session.available_transition().await {
                    println!("[/next: {}]", transition.name());
                }
            }
            Err(err) => eprintln!("error: {}", err),
        }
    }
    Ok(())
}
