//! Pizzeria operator chat console.
//!
//! # Usage
//!
//! ```bash
//! # List open conversations for the signed-in operator
//! pz-chat conversations --status open
//!
//! # Show the transcript for one order
//! pz-chat history --user U1 --order O1
//!
//! # Reply to a customer
//! pz-chat send --user U1 --order O1 Your pizza is on its way
//!
//! # Close a conversation without the confirmation prompt
//! pz-chat close --order O1 --yes
//!
//! # Interactive session with realtime delivery
//! pz-chat console
//! ```
//!
//! The operator is read from the persisted admin session
//! (`PIZZERIA_SESSION_FILE`). Logs go to stderr; `LOG_FORMAT=json` switches
//! them to JSON.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pizzeria_chat::ChatConfig;
use pizzeria_core::ConversationStatus;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "pz-chat")]
#[command(author, version, about = "Pizzeria operator chat console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the operator's conversations
    Conversations {
        /// Only show conversations in this status (`open`, `closed`)
        #[arg(short, long)]
        status: Option<ConversationStatus>,
    },
    /// Print the message history of a conversation
    History {
        /// Customer id
        #[arg(short, long)]
        user: String,

        /// Order id
        #[arg(short, long)]
        order: String,
    },
    /// Send a message to a customer
    Send {
        /// Customer id
        #[arg(short, long)]
        user: String,

        /// Order id
        #[arg(short, long)]
        order: String,

        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Close the conversation for an order
    Close {
        /// Order id
        #[arg(short, long)]
        order: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Interactive chat session
    Console,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ChatConfig) -> Option<sentry::ClientInitGuard> {
    let sentry = config.sentry.as_ref()?;

    let guard = sentry::init((
        sentry.dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: sentry.environment.clone().map(std::borrow::Cow::Owned),
            sample_rate: sentry.sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the tracing subscriber. Output goes to stderr so stdout stays
/// reserved for command output.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pizzeria_chat=info,pz_chat=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    // Must run before any TLS: REST, Sentry and the realtime channel.
    let _ = pizzeria_chat::install_crypto_provider();

    let cli = Cli::parse();

    // Configuration is needed before tracing so Sentry can be initialized first
    let config = ChatConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    if let Ok(config) = &config {
        for warning in config.warnings() {
            tracing::warn!("Configuration warning: {warning}");
        }
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ChatConfig) -> Result<(), commands::CliError> {
    let session = commands::Session::open(config)?;

    match cli.command {
        Commands::Conversations { status } => commands::conversations::run(&session, status).await,
        Commands::History { user, order } => commands::history::run(&session, &user, &order).await,
        Commands::Send {
            user,
            order,
            message,
        } => commands::send::run(&session, &user, &order, &message.join(" ")).await,
        Commands::Close { order, yes } => commands::close::run(&session, &order, yes).await,
        Commands::Console => commands::console::run(&session).await,
    }
}
