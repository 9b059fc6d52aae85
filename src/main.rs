// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use xmsync::{
    Credentials, RadioFeed, ReconcilePolicy, ReqwestClient, SyncConfig, SyncOutcome, SyncService,
    TokenManager, TrackSource, WebPlaylistApi,
};

/// Mirror a radio station's recently played tracks into a playlist
#[derive(Parser, Debug)]
#[command(name = "xmsync")]
#[command(about = "Mirror a radio station's recently played tracks into a playlist")]
#[command(version)]
struct Args {
    /// Station identifier in the feed API
    #[arg(long, env = "XMSYNC_STATION", default_value = "lifewithjohnmayer")]
    station: String,

    /// Target playlist ID
    #[arg(long, env = "XMSYNC_PLAYLIST_ID", default_value = "")]
    playlist_id: String,

    /// OAuth client ID for the playlist API
    #[arg(long, env = "XMSYNC_CLIENT_ID", default_value = "")]
    client_id: String,

    /// OAuth client secret for the playlist API
    #[arg(long, env = "XMSYNC_CLIENT_SECRET", hide_env_values = true, default_value = "")]
    client_secret: String,

    /// Long-lived refresh token from the one-time authorization bootstrap
    #[arg(long, env = "XMSYNC_REFRESH_TOKEN", hide_env_values = true, default_value = "")]
    refresh_token: String,

    /// Seconds between scheduled syncs
    #[arg(long, env = "XMSYNC_INTERVAL", default_value = "7200")]
    interval: u64,

    /// Maximum feed tracks per run
    #[arg(long, env = "XMSYNC_MAX_TRACKS", default_value = "50")]
    max_tracks: usize,

    /// Reconciliation policy
    #[arg(long, env = "XMSYNC_POLICY", value_enum, default_value = "additive")]
    policy: ReconcilePolicy,

    /// Disable the recurring sync schedule
    #[arg(long, env = "XMSYNC_SYNC_DISABLED")]
    disable_sync: bool,

    /// Base URL of the station feed API
    #[arg(long, env = "XMSYNC_FEED_URL", default_value = "https://xmplaylist.com/api")]
    feed_url: String,

    /// Base URL of the playlist API
    #[arg(long, env = "XMSYNC_API_URL", default_value = "https://api.spotify.com/v1")]
    api_url: String,

    /// Token endpoint of the playlist API
    #[arg(
        long,
        env = "XMSYNC_TOKEN_URL",
        default_value = "https://accounts.spotify.com/api/token"
    )]
    token_url: String,

    /// Outbound request timeout in seconds
    #[arg(long, env = "XMSYNC_HTTP_TIMEOUT", default_value = "30")]
    http_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recurring sync service until interrupted
    Run,
    /// Perform a single sync and print the result as JSON
    Sync,
    /// Fetch the station feed and print it as JSON
    Tracks {
        /// Number of tracks to fetch
        #[arg(short, long, default_value = "24")]
        limit: usize,
    },
}

fn build_service(
    client: &ReqwestClient,
    source: RadioFeed<ReqwestClient>,
    args: &Args,
) -> Arc<SyncService<RadioFeed<ReqwestClient>, WebPlaylistApi<ReqwestClient>>> {
    let credentials = Credentials {
        client_id: args.client_id.clone(),
        client_secret: args.client_secret.clone(),
        refresh_token: args.refresh_token.clone(),
    };
    let tokens = TokenManager::new(client.clone(), &args.token_url, credentials);
    let target = WebPlaylistApi::new(client.clone(), tokens, &args.api_url);

    let config = SyncConfig {
        station: args.station.clone(),
        playlist_id: args.playlist_id.clone(),
        interval: Duration::from_secs(args.interval),
        max_tracks: args.max_tracks,
        enabled: !args.disable_sync,
        policy: args.policy,
    };

    Arc::new(SyncService::new(source, target, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = ReqwestClient::new(Duration::from_secs(args.http_timeout))
        .context("Failed to build HTTP client")?;
    let source = RadioFeed::new(client.clone(), &args.feed_url);

    match &args.command {
        Command::Tracks { limit } => {
            let tracks = source
                .get_recent_tracks(&args.station, *limit)
                .await
                .context("Failed to fetch station feed")?;
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }

        Command::Sync => {
            let service = build_service(&client, source, &args);
            match service.sync_once().await {
                SyncOutcome::Completed(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    if !result.success {
                        std::process::exit(1);
                    }
                }
                SyncOutcome::Busy => bail!("sync already in progress"),
            }
        }

        Command::Run => {
            let service = build_service(&client, source, &args);
            service
                .start()
                .await
                .context("Failed to start sync service")?;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            service.stop().await;
        }
    }

    Ok(())
}
