mod app;
mod client;
mod config;
mod draft;
mod filter;
mod form;
mod protocol;
mod replay;
mod state;
mod tui;
mod ui;

use std::{process::ExitCode, sync::Arc};

use chrono::Utc;
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    client::{ApiClient, ClientConfig, RequestLog},
    config::{Command, Config, ReplayAction, SendArgs},
    draft::MessageDraft,
    filter::FilterTree,
    replay::{ReplayDialog, ReplayStrategy, ReplayTarget},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing()?;

    let config = Config::parse();
    let request_log = config.request_log.clone().map(RequestLog::new);
    let client = ApiClient::new(ClientConfig {
        base_url: config.api_url.clone(),
        token: config.token.clone(),
        timeout: config.timeout(),
        request_log: request_log.clone(),
    })
    .map_err(|err| eyre!("invalid client configuration: {}", err))?;

    let result = run(client, config).await;

    // Queued log lines are lost once the runtime shuts down.
    if let Some(log) = request_log {
        log.close().await;
    }
    result
}

async fn run(client: ApiClient, config: Config) -> Result<ExitCode> {
    match config.command {
        Some(Command::Replay { action }) => {
            let app_id = require_app(config.app_id)?;
            run_replay(&client, app_id, action).await
        }
        Some(Command::Send(args)) => {
            let app_id = require_app(config.app_id)?;
            run_send(&client, &app_id, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Message { msg_id }) => {
            let app_id = require_app(config.app_id)?;
            print_message(&client, &app_id, &msg_id).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::EventTypes) => {
            print_event_types(&client).await?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let state = Arc::new(AppState::new(client));
            app::HookdashApp::bootstrap(state, config.app_id)
                .await?
                .run()
                .await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("hookdash=info,hookdash::app=debug"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| eyre!(err))?;

    Ok(())
}

fn require_app(app_id: Option<String>) -> Result<String> {
    app_id.ok_or_else(|| eyre!("--app (or HOOKDASH_APP) is required for this command"))
}

async fn run_replay(client: &ApiClient, app_id: String, action: ReplayAction) -> Result<ExitCode> {
    let (strategy, endpoint_id, msg_id, since) = match action {
        ReplayAction::Resend {
            endpoint_id,
            msg_id,
        } => (ReplayStrategy::ResendOne, endpoint_id, msg_id, Utc::now()),
        ReplayAction::Recover { endpoint_id, since } => {
            (ReplayStrategy::RecoverSince, endpoint_id, String::new(), since)
        }
        ReplayAction::Missing { endpoint_id, since } => {
            (ReplayStrategy::ReplayMissingSince, endpoint_id, String::new(), since)
        }
    };

    let mut dialog = ReplayDialog::new(ReplayTarget {
        app_id,
        endpoint_id,
        msg_id,
        since,
    });
    dialog.select(strategy);

    let outcome = dialog
        .submit(client, || info!("replay accepted, check the attempts list for progress"))
        .await
        .ok_or_else(|| eyre!("replay could not be submitted"))?;

    if outcome.succeeded() {
        println!("{}: accepted", strategy.label());
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "{}: {}",
        strategy.label(),
        outcome.error_message().unwrap_or(replay::FALLBACK_FAILURE_MESSAGE)
    );
    Ok(ExitCode::FAILURE)
}

async fn run_send(client: &ApiClient, app_id: &str, args: SendArgs) -> Result<()> {
    let payload_text = match args.payload {
        Some(text) => text,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            text
        }
    };

    let draft = MessageDraft {
        event_type: args.event_type,
        payload_text,
        channels: args.channels,
    };
    let payload = draft.validate()?;
    let message = client
        .create_message(app_id, &payload)
        .await
        .map_err(|err| eyre!("failed to send message: {}", err))?;

    println!("{}", message.id);
    Ok(())
}

async fn print_message(client: &ApiClient, app_id: &str, msg_id: &str) -> Result<()> {
    let message = client
        .get_message(app_id, msg_id)
        .await
        .map_err(|err| eyre!("failed to load message {}: {}", msg_id, err))?;

    println!("{} {} {}", message.id, message.event_type, message.timestamp.to_rfc3339());
    if let Some(channels) = message.channels.as_ref().filter(|channels| !channels.is_empty()) {
        println!("channels: {}", channels.join(", "));
    }
    println!("{}", serde_json::to_string_pretty(&message.payload)?);
    Ok(())
}

async fn print_event_types(client: &ApiClient) -> Result<()> {
    let names: Vec<String> = client
        .list_event_types()
        .await
        .map_err(|err| eyre!("failed to list event types: {}", err))?
        .into_iter()
        .map(|event_type| event_type.name)
        .collect();

    let tree = FilterTree::build(&names);
    if tree.is_empty() {
        eprintln!("no event types defined");
        return Ok(());
    }
    for row in tree.rows() {
        let marker = if row.node.is_leaf() { "" } else { " *" };
        println!("{}{}{}", "  ".repeat(row.depth), row.node.name, marker);
    }
    Ok(())
}
