use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "hookdash", about = "Terminal dashboard for webhook deliveries")]
pub struct Config {
    /// Base URL of the webhook service.
    #[arg(
        long = "api-url",
        env = "HOOKDASH_API_URL",
        value_name = "URL",
        default_value = "http://localhost:8071",
        help = "Base URL of the webhook service API"
    )]
    pub api_url: String,

    #[arg(
        long = "token",
        env = "HOOKDASH_API_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        help = "Bearer token sent with every API request"
    )]
    pub token: Option<String>,

    #[arg(
        long = "timeout",
        env = "HOOKDASH_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 10,
        help = "Per-request timeout in seconds"
    )]
    pub timeout_secs: u64,

    /// Application to open on start; required by the subcommands.
    #[arg(
        long = "app",
        env = "HOOKDASH_APP",
        value_name = "APP_ID",
        global = true,
        help = "Application id to open or operate on"
    )]
    pub app_id: Option<String>,

    /// Optional file path that receives one line per API exchange.
    #[arg(
        long = "request-log",
        env = "HOOKDASH_REQUEST_LOG",
        value_name = "FILE",
        help = "Append a line for every API request to FILE"
    )]
    pub request_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Trigger a replay without opening the dashboard.
    Replay {
        #[command(subcommand)]
        action: ReplayAction,
    },
    /// Send a message to an application.
    Send(SendArgs),
    /// Print one message and its payload.
    Message {
        #[arg(long = "msg", value_name = "MSG_ID")]
        msg_id: String,
    },
    /// Print the event-type hierarchy.
    EventTypes,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ReplayAction {
    /// Resend one message to one endpoint.
    Resend {
        #[arg(long = "endpoint", value_name = "ENDPOINT_ID")]
        endpoint_id: String,
        #[arg(long = "msg", value_name = "MSG_ID")]
        msg_id: String,
    },
    /// Resend every failed message since a point in time.
    Recover {
        #[arg(long = "endpoint", value_name = "ENDPOINT_ID")]
        endpoint_id: String,
        #[arg(long, value_name = "RFC3339")]
        since: DateTime<Utc>,
    },
    /// Send messages the endpoint never received since a point in time.
    Missing {
        #[arg(long = "endpoint", value_name = "ENDPOINT_ID")]
        endpoint_id: String,
        #[arg(long, value_name = "RFC3339")]
        since: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    #[arg(long = "event-type", value_name = "NAME")]
    pub event_type: String,

    /// JSON object to deliver; read from stdin when omitted.
    #[arg(long, value_name = "JSON")]
    pub payload: Option<String>,

    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,
}
