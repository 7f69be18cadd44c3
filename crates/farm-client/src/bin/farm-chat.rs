use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use farm_client::{ClientConfig, ConnectionManager, ConnectionState, WsConnector};
use farm_client::config::DEFAULT_SERVER_URL;

/// Chat with other marketplace users from the terminal.
///
/// Each stdin line is `<receiverId> <message>`.
#[derive(Debug, Parser)]
#[command(name = "farm-chat", version)]
struct Args {
    /// Identity to connect as, e.g. customer-1
    #[arg(short, long)]
    user: String,

    /// Relay base address
    #[arg(short, long, env = "FARM_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farm_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::new(&args.server);
    let connector = Arc::new(WsConnector::from_config(&config));
    // Fail early on a malformed address instead of inside the reconnect loop
    connector.session_url(&args.user)?;

    let manager = ConnectionManager::new(config, connector);
    let _subscription = manager.on_message(|msg| {
        println!("[{}] {}: {}", msg.created_at.format("%H:%M:%S"), msg.sender_id, msg.message);
    });

    let mut states = manager.watch();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                ConnectionState::Connected => eprintln!("* connected"),
                ConnectionState::Reconnecting { attempt } => eprintln!("* reconnecting (attempt {})", attempt),
                ConnectionState::GaveUp => eprintln!("* gave up reconnecting; restart to try again"),
                ConnectionState::Connecting | ConnectionState::Disconnected => {}
            }
        }
    });

    manager.connect(&args.user);
    info!("Chatting as {} via {}", args.user, args.server);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim().split_once(' ') {
                    Some((receiver, text)) => {
                        if !manager.send_message(receiver, text.trim()) {
                            eprintln!("* not sent");
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("* usage: <receiverId> <message>"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.disconnect();
    Ok(())
}
