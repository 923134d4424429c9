use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use portal::PortalRegistry;
use shared::domain::{Portal, PortalKey, RoomId};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::{load_settings, normalize_database_url};

/// Inspect and edit the bridge's portal table.
#[derive(Parser, Debug)]
#[command(name = "portal-tools")]
struct Cli {
    /// Overrides portal-tools.toml and DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Portals bridged to a room.
    ListRooms,
    ShowRoom {
        mxid: String,
    },
    ShowGroup {
        chat_id: String,
    },
    ShowPrivate {
        recipient: Uuid,
        receiver: String,
    },
    /// One-to-one portals owned by a local user.
    PrivateOf {
        receiver: String,
    },
    /// One-to-one portals with a remote user, across local users.
    PrivateWith {
        recipient: Uuid,
    },
    CreateGroup {
        chat_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    CreatePrivate {
        recipient: Uuid,
        receiver: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Attach an existing portal to a room.
    SetRoom {
        chat_id: String,
        mxid: String,
        #[arg(long, default_value = "")]
        receiver: String,
        #[arg(long)]
        encrypted: bool,
    },
    Rename {
        chat_id: String,
        name: String,
        #[arg(long, default_value = "")]
        receiver: String,
    },
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let raw_database_url = match cli.database_url {
        Some(url) => url,
        None => load_settings().database_url,
    };
    let database_url = normalize_database_url(&raw_database_url);
    let storage = Storage::new(&database_url).await?;

    run(PortalRegistry::new(storage), cli.command).await
}

async fn run(registry: PortalRegistry<Storage>, command: Command) -> Result<()> {
    match command {
        Command::ListRooms => print_all(&registry.all_with_room().await?)?,
        Command::ShowRoom { mxid } => {
            print_found(registry.find_by_room(&RoomId(mxid)).await?)?;
        }
        Command::ShowGroup { chat_id } => {
            print_found(registry.find_by_chat(&PortalKey::group(chat_id)).await?)?;
        }
        Command::ShowPrivate {
            recipient,
            receiver,
        } => {
            let key = PortalKey::private(recipient, receiver)?;
            print_found(registry.find_by_chat(&key).await?)?;
        }
        Command::PrivateOf { receiver } => {
            print_all(&registry.find_private_chats_of(&receiver).await?)?;
        }
        Command::PrivateWith { recipient } => {
            print_all(&registry.find_private_chats_with(recipient).await?)?;
        }
        Command::CreateGroup { chat_id, name } => {
            let portal = Portal::pending(PortalKey::group(chat_id), name);
            registry.create(&portal).await?;
            print_portal(&portal)?;
        }
        Command::CreatePrivate {
            recipient,
            receiver,
            name,
        } => {
            let portal = Portal::pending(PortalKey::private(recipient, receiver)?, name);
            registry.create(&portal).await?;
            print_portal(&portal)?;
        }
        Command::SetRoom {
            chat_id,
            mxid,
            receiver,
            encrypted,
        } => {
            let mut portal = existing_portal(&registry, &chat_id, receiver).await?;
            portal.mxid = Some(RoomId(mxid));
            portal.encrypted |= encrypted;
            registry.save(&portal).await?;
            info!(key = %portal.key, "attached portal to room");
            print_portal(&portal)?;
        }
        Command::Rename {
            chat_id,
            name,
            receiver,
        } => {
            let mut portal = existing_portal(&registry, &chat_id, receiver).await?;
            portal.name = Some(name);
            registry.save(&portal).await?;
            print_portal(&portal)?;
        }
        Command::Health => {
            registry
                .store()
                .health_check()
                .await
                .context("portal store unhealthy")?;
            println!("ok");
        }
    }

    Ok(())
}

fn parse_key(chat_id: &str, receiver: String) -> Result<PortalKey> {
    if receiver.is_empty() {
        return Ok(PortalKey::group(chat_id));
    }
    let recipient = Uuid::parse_str(chat_id)
        .with_context(|| format!("private chat id '{chat_id}' is not a uuid"))?;
    Ok(PortalKey::private(recipient, receiver)?)
}

async fn existing_portal(
    registry: &PortalRegistry<Storage>,
    chat_id: &str,
    receiver: String,
) -> Result<Portal> {
    let key = parse_key(chat_id, receiver)?;
    match registry.find_by_chat(&key).await? {
        Some(portal) => Ok(portal),
        None => bail!("no portal for {key}"),
    }
}

fn print_found(portal: Option<Portal>) -> Result<()> {
    match portal {
        Some(portal) => print_portal(&portal),
        None => bail!("portal not found"),
    }
}

fn print_all(portals: &[Portal]) -> Result<()> {
    for portal in portals {
        print_portal(portal)?;
    }
    Ok(())
}

fn print_portal(portal: &Portal) -> Result<()> {
    println!("{}", serde_json::to_string(portal)?);
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
