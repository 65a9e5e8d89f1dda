//! `wsphone`: register one or more softphones over SIP/WebSocket, answer
//! inbound calls and optionally place a call once registered.

mod args;
mod handler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wsphone_client_core::{Identity, Softphone};
use wsphone_media_webrtc::WebRtcEngine;

use crate::args::{Args, Settings};
use crate::handler::ConsoleHandler;

/// Delay between starting consecutive instances
const INSTANCE_STAGGER: Duration = Duration::from_millis(100);

/// Delay between registering and sending the INVITE
const INVITE_DELAY: Duration = Duration::from_secs(2);

fn init_logging(verbose: bool) {
    let default_directives = if verbose {
        "info,wsphone_cli=debug,wsphone_client_core=debug,wsphone_sip_transport=debug,webrtc=warn"
    } else {
        "info,webrtc=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}

async fn run_instance(index: usize, phone: Softphone<WebRtcEngine>, invite: Option<String>) {
    if let Err(e) = phone.register().await {
        error!("[{}] Registration failed: {}", index, e);
        return;
    }

    let Some(extension) = invite else {
        return;
    };
    tokio::time::sleep(INVITE_DELAY).await;
    match phone.invite(&extension).await {
        Ok(()) => info!("[{}] Call to {} connected", index, extension),
        Err(e) => error!("[{}] Call to {} failed: {}", index, extension, e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = Settings::from_args(&args)?;
    let identity = Arc::new(Identity::generate());
    info!(
        "Starting {} softphone(s) as {} against {} (identity {})",
        settings.count,
        settings.softphone.username,
        settings.softphone.server_url(),
        identity
    );

    let mut phones = Vec::with_capacity(settings.count);
    for index in 0..settings.count {
        let engine = WebRtcEngine::new(settings.media.clone());
        let phone = Softphone::new(settings.softphone.clone(), Arc::clone(&identity), engine);
        phone.set_event_handler(Arc::new(ConsoleHandler::new(index, settings.progress)));

        tokio::spawn(run_instance(index, phone.clone(), settings.invite.clone()));
        phones.push(phone);
        tokio::time::sleep(INSTANCE_STAGGER).await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");

    for phone in &phones {
        if phone.is_connected() {
            if let Err(e) = phone.close().await {
                error!("Failed to close connection: {}", e);
            }
        }
    }
    Ok(())
}
