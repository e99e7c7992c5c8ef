mod logging;
mod matrix;
mod pipeline;
mod relay;

use core::time::Duration;
use std::{
    fs,
    io::IsTerminal as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, OriginalSyncRoomMemberEvent, StrippedRoomMemberEvent},
        message::OriginalSyncRoomMessageEvent,
    },
};
use plugin_core::{MessageSender, PipelineConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    logging::init_tracing,
    matrix::MatrixSender,
    pipeline::build_pipeline,
    relay::{Relay, RoomCluster, resolve_relay_plan},
};

#[derive(Parser, Debug)]
#[command(
    name = "matrix-relay-bot",
    version,
    about = "Matrix relay bot that normalizes mentions and hides error replies"
)]
struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    /// Device display name
    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "matrix-relay-bot")]
    device_name: String,

    /// Path to YAML config with room clusters and pipeline options
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    device_id: String,
}

#[derive(Debug, Deserialize, Clone)]
struct BotConfig {
    #[serde(default)]
    clusters: Vec<RoomCluster>,
    #[serde(flatten)]
    pipeline: PipelineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so clap and RUST_LOG pick up env vars.
    _ = dotenvy::dotenv();
    init_tracing()?;
    let args = Args::parse();

    let config = load_config(&args.config)?;

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    // Build client with SQLite store to persist E2EE state
    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    login(&client, &args).await?;

    let sender = MatrixSender::new(client.clone());
    let shared: Arc<dyn MessageSender> = Arc::new(sender.clone());
    let pipeline = build_pipeline(&config.pipeline, &shared);
    let plan = resolve_relay_plan(&client, &config.clusters).await;
    let relay = Arc::new(Relay::new(plan, pipeline, sender));

    if !args.no_autojoin {
        client.add_event_handler(
            |ev: StrippedRoomMemberEvent, room: Room, client: Client| async move {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    // Nickname tables go stale on every join, leave or rename.
    let members_relay = Arc::clone(&relay);
    client.add_event_handler(move |_ev: OriginalSyncRoomMemberEvent, room: Room| {
        let relay = Arc::clone(&members_relay);
        async move {
            relay.groups().invalidate(room.room_id()).await;
        }
    });

    let messages_relay = Arc::clone(&relay);
    client.add_event_handler(
        move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
            let relay = Arc::clone(&messages_relay);
            async move {
                if client.user_id().is_some_and(|own| ev.sender == own) {
                    debug!(room_id = %room.room_id(), "Skipping own message");
                    return;
                }
                if let Err(e) = relay.on_room_message(&room, &ev).await {
                    warn!(error = %format!("{e:#}"), room_id = %room.room_id(), sender = %ev.sender, "Pipeline failed; message not relayed");
                }
            }
        },
    );

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

/// Restores the saved session, or logs in with a password and saves one.
async fn login(client: &Client, args: &Args) -> Result<()> {
    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        return client
            .restore_session(matrix_session)
            .await
            .context("restoring session");
    }

    // Treat empty env/arg as missing; avoid prompting in non-interactive (Docker) mode.
    let password = if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        p.to_owned()
    } else {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow!(
                "No MATRIX_PASSWORD provided and no stored session. In Docker/non-interactive mode, set MATRIX_PASSWORD env or mount an existing session at {}",
                args.session_file.display()
            ));
        }
        warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
        #[cfg(feature = "rpassword")]
        {
            rpassword::prompt_password("Matrix password:")
                .map_err(|e| anyhow!("Failed to read password: {e}"))?
        }
        #[cfg(not(feature = "rpassword"))]
        {
            return Err(anyhow!(
                "rpassword feature is not enabled. Cannot prompt for password."
            ));
        }
    };

    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(
        "Logged in: user={} device={}",
        session.user_id, session.device_id
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    cfg.pipeline.validate().context("validating pipeline config")?;
    Ok(cfg)
}

fn load_session(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

fn save_session(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}
