use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tandem_server::RelayConfig;
use tracing_subscriber::EnvFilter;

mod chat;
mod serve;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Two-person rooms with chat, files and video filters over WebRTC")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay
    Serve {
        /// Address to listen on
        #[arg(long, env = "TANDEM_LISTEN", default_value = "0.0.0.0:3000")]
        listen: SocketAddr,

        /// Traversal-credential service origin
        #[arg(long, env = "TURN_ORIGIN")]
        turn_origin: Option<String>,

        /// Credential-service token, sent base64-encoded as Basic authorization
        #[arg(long, env = "TURN_TOKEN", hide_env_values = true)]
        turn_token: Option<String>,
    },

    /// Join a room and chat with whoever else is in it
    Join {
        /// Relay base URL, e.g. ws://127.0.0.1:3000
        relay: String,

        /// Room name of the form word-word (prompted when omitted)
        room: Option<String>,

        /// Name shown to the other participant
        #[arg(short, long, default_value = "anonymous")]
        name: String,

        /// Directory received files are written to
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Serve {
            listen,
            turn_origin,
            turn_token,
        } => {
            let config = RelayConfig {
                listen_addr: listen,
                turn_origin: turn_origin.filter(|v| !v.trim().is_empty()),
                turn_token: turn_token.filter(|v| !v.trim().is_empty()),
            };
            serve::run(config).await
        }
        Commands::Join {
            relay,
            room,
            name,
            save_dir,
        } => chat::run(relay, room, name, save_dir).await,
    }
}
