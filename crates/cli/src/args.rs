//! Command-line flags and the optional TOML configuration file
//!
//! Values are resolved in three layers: built-in defaults, then the file
//! given with `--config`, then flags given on the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use wsphone_client_core::SoftphoneConfig;
use wsphone_media_webrtc::WebRtcConfig;
use wsphone_sip_transport::TransportKind;

#[derive(Debug, Parser)]
#[command(name = "wsphone", version, about = "SIP over WebSocket softphone")]
pub struct Args {
    /// Number of softphone instances
    #[arg(short = 'c', long, env = "WSPHONE_COUNT")]
    pub count: Option<usize>,

    /// Number to call once registered
    #[arg(short = 'i', long, value_name = "NUMBER")]
    pub invite: Option<String>,

    /// Account user [default: 101]
    #[arg(long, env = "WSPHONE_USERNAME")]
    pub username: Option<String>,

    /// Account password [default: 101]
    #[arg(long, env = "WSPHONE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// SIP domain [default: local]
    #[arg(long, env = "WSPHONE_DOMAIN")]
    pub domain: Option<String>,

    /// ws or wss [default: ws]
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// WebSocket server host [default: 192.168.100.10]
    #[arg(long, env = "WSPHONE_HOST")]
    pub host: Option<String>,

    /// Path on the server, for example /webrtc/socket
    #[arg(long)]
    pub path: Option<String>,

    /// WebSocket server port [default: 5071]
    #[arg(long, env = "WSPHONE_PORT")]
    pub port: Option<u16>,

    /// Seconds to wait for a final response to REGISTER or INVITE
    #[arg(long, value_name = "SECONDS")]
    pub response_timeout: Option<u64>,

    /// STUN/TURN server, may be repeated [default: stun:stun.l.google.com:19302]
    #[arg(long = "ice-server", value_name = "URL")]
    pub ice_servers: Vec<String>,

    /// Log RTP progress of remote tracks
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Log every SIP message
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Contents of a `--config` file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub count: Option<usize>,
    pub invite: Option<String>,
    pub progress: Option<bool>,
    pub softphone: SoftphoneConfig,
    pub media: WebRtcConfig,
}

impl FileConfig {
    pub fn load(path: &PathBuf) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved run settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub count: usize,
    pub invite: Option<String>,
    pub progress: bool,
    pub softphone: SoftphoneConfig,
    pub media: WebRtcConfig,
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    /// Apply command-line overrides on top of `file`
    pub fn merge(args: &Args, file: FileConfig) -> Self {
        let mut softphone = file.softphone;
        if let Some(username) = &args.username {
            softphone.username = username.clone();
        }
        if let Some(password) = &args.password {
            softphone.password = password.clone();
        }
        if let Some(domain) = &args.domain {
            softphone.domain = domain.clone();
        }
        if let Some(transport) = args.transport {
            softphone.transport = transport;
        }
        if let Some(host) = &args.host {
            softphone.host = host.clone();
        }
        if let Some(path) = &args.path {
            softphone.path = path.clone();
        }
        if let Some(port) = args.port {
            softphone.port = port;
        }
        if let Some(timeout) = args.response_timeout {
            softphone.response_timeout_secs = Some(timeout);
        }

        let mut media = file.media;
        if !args.ice_servers.is_empty() {
            media.ice_servers = args.ice_servers.clone();
        }

        Self {
            count: args.count.or(file.count).unwrap_or(1).max(1),
            invite: args.invite.clone().or(file.invite),
            progress: args.progress || file.progress.unwrap_or(false),
            softphone,
            media,
        }
    }
}
