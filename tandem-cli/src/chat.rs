use anyhow::{Context, Result, bail};
use bytes::Bytes;
use colored::*;
use dialoguer::Input;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_core::{RoomId, VideoFilter};
use tandem_peer::{Peer, PeerConfig, PeerEvent, WebRtcTransportFactory};
use tokio::io::{AsyncBufReadExt, BufReader};

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    File(PathBuf),
    Filter(VideoFilter),
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Say(line.to_owned())));
        };

        let (name, arg) = rest.split_once(' ').map_or((rest, ""), |(n, a)| (n, a.trim()));
        let command = match (name, arg) {
            ("quit", _) => Self::Quit,
            ("file", "") => bail!("usage: /file <path>"),
            ("file", path) => Self::File(PathBuf::from(path)),
            ("filter", filter) => Self::Filter(filter.parse().map_err(anyhow::Error::msg)?),
            (other, _) => bail!("unknown command /{}", other),
        };
        Ok(Some(command))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn prompt_room() -> Result<RoomId> {
    let raw: String = Input::new()
        .with_prompt("Room (word-word)")
        .validate_with(|input: &String| RoomId::parse(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text()?;
    Ok(RoomId::parse(&raw)?)
}

pub async fn run(relay: String, room: Option<String>, name: String, save_dir: Option<PathBuf>) -> Result<()> {
    let room = match room {
        Some(raw) => RoomId::parse(&raw)?,
        None => tokio::task::spawn_blocking(prompt_room).await??,
    };

    let config = PeerConfig::new(relay, room, name);
    println!("{}", format!("🔗 Connecting to {}...", config.room_url()).cyan());
    let (peer, mut events) = Peer::connect(config, Arc::new(WebRtcTransportFactory))
        .await
        .context("Could not reach the relay")?;

    println!("   Type to chat. /file <path>, /filter <name>, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !show(event, save_dir.as_deref()).await {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = dispatch(&peer, command).await {
                            println!("{}", format!("⚠️  {:#}", e).yellow());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", format!("⚠️  {}", e).yellow()),
                }
            }
        }
    }

    peer.leave().await;
    println!("{}", "👋 Left the room".green());
    Ok(())
}

async fn dispatch(peer: &Peer, command: Command) -> Result<()> {
    match command {
        Command::Say(body) => peer.send_text(body)?,
        Command::File(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("File name is not valid UTF-8")?;
            peer.send_file(name, mime_for(&path), Bytes::from(bytes))?;
        }
        Command::Filter(filter) => peer.announce_filter(filter)?,
        Command::Quit => {}
    }
    Ok(())
}

/// Prints one event. Returns `false` when the session cannot continue.
async fn show(event: PeerEvent, save_dir: Option<&Path>) -> bool {
    match event {
        PeerEvent::Joined { room, peer_count, .. } => {
            println!("{}", format!("✨ Joined {} ({} present)", room, peer_count).green().bold());
        }
        PeerEvent::RoomFull => {
            println!("{}", "⛔ Room is full".red().bold());
            return false;
        }
        PeerEvent::PeerConnected => println!("{}", "👋 Someone joined".green()),
        PeerEvent::PeerDisconnected => println!("{}", "🚪 The other participant left".yellow()),
        PeerEvent::ConnectionStateChanged(state) => println!("{}", format!("   link: {:?}", state).dimmed()),
        PeerEvent::MessageSent { .. } => {}
        PeerEvent::MessageReceived { sender, body, .. } => println!("{} {}", format!("{}:", sender).cyan().bold(), body),
        PeerEvent::MessageDelivered { .. } => println!("{}", "   ✓ delivered".dimmed()),
        PeerEvent::FileReceived(file) => {
            println!("{}", format!("📦 Received {} ({} bytes)", file.name, file.bytes.len()).cyan());
            if let Some(dir) = save_dir {
                if let Err(e) = save(dir, &file.name, &file.bytes).await {
                    println!("{}", format!("⚠️  {:#}", e).yellow());
                }
            }
        }
        PeerEvent::FileDelivered { name, .. } => println!("{}", format!("   ✓ {} delivered", name).dimmed()),
        PeerEvent::FileFailed { name, reason, .. } => {
            println!("{}", format!("❌ Could not send {}: {}", name, reason).red())
        }
        PeerEvent::FilterChanged(filter) => println!("{}", format!("🎨 Peer switched to {}", filter).magenta()),
        PeerEvent::SessionFailed(reason) => println!("{}", format!("❌ Connection failed: {}", reason).red()),
        PeerEvent::ConnectionLost => {
            println!("{}", "❌ Lost the relay".red().bold());
            return false;
        }
    }
    true
}

async fn save(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let file_name = Path::new(name).file_name().context("Received file has no usable name")?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("   📂 {}", path.display());
    Ok(())
}
