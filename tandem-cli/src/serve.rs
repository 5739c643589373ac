use anyhow::{Context, Result};
use colored::*;
use tandem_server::RelayConfig;

pub async fn run(config: RelayConfig) -> Result<()> {
    println!("{}", "📡 Starting Tandem relay...".green().bold());
    println!("   🔌 Listen: ws://{}/ws/{{room}}", config.listen_addr);
    match (&config.turn_origin, &config.turn_token) {
        (Some(origin), Some(_)) => println!("   🧊 TURN:   {}", origin),
        _ => println!("   🧊 TURN:   {}", "not configured, handing out STUN only".yellow()),
    }

    tandem_server::serve(config).await.context("Relay stopped")?;
    Ok(())
}
