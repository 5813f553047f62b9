use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use teamsync_assistant::api::{self, AppState};
use teamsync_assistant::assistant::{Assistant, SessionState, SubmitOutcome, WELCOME};
use teamsync_assistant::config::AppConfig;
use teamsync_assistant::db::Database;

#[derive(Parser)]
#[command(name = "teamsync")]
#[command(about = "Project assistant for TeamSync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Talk to the assistant interactively
    Chat {
        /// Signed-in user id (defaults to TEAMSYNC_USER_ID)
        #[arg(short, long)]
        user: Option<Uuid>,
    },
    /// Run a single assistant command and print the reply
    Ask {
        /// Signed-in user id (defaults to TEAMSYNC_USER_ID)
        #[arg(short, long)]
        user: Option<Uuid>,
        /// The command text, e.g. `list projects`
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Create or upgrade the database schema
    Migrate,
}

/// Initialize tracing with output to stderr (for interactive modes) or stdout
fn init_tracing(use_stderr: bool) {
    let default_filter = if use_stderr {
        "teamsync_assistant=warn"
    } else {
        "teamsync_assistant=debug,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );

    if use_stderr {
        // Replies go to stdout, keep it free of log lines
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    let path = config
        .database_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No database path; set TEAMSYNC_DB_PATH"))?;
    let db = Database::open(path)?;
    db.migrate()?;
    Ok(db)
}

/// The assistant runs unconfigured when no database is available, so that
/// users get the configuration hint as a reply.
fn build_assistant(config: &AppConfig) -> Assistant {
    match open_database(config) {
        Ok(db) => Assistant::new(Arc::new(db), config.assistant.clone()),
        Err(e) => {
            tracing::warn!("Assistant running without a data store: {:#}", e);
            Assistant::unconfigured(config.assistant.clone())
        }
    }
}

fn print_outcome(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Replied { message } => println!("{}", message),
        SubmitOutcome::Rejected { message } | SubmitOutcome::Failed { message } => {
            eprintln!("! {}", message)
        }
        SubmitOutcome::Ignored => {}
    }
}

async fn serve(config: AppConfig, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting TeamSync server on port {}", port);

    let db = open_database(&config)?;
    let state = AppState::new(db, config.assistant.clone());
    let app = api::create_router_with(state, config.security.clone());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("TeamSync server listening on http://127.0.0.1:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn chat(config: AppConfig, user: Option<Uuid>) -> anyhow::Result<()> {
    let assistant = build_assistant(&config);
    let mut session = SessionState::new(user.or(config.user_id));

    println!("{}", WELCOME);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }

        let outcome = assistant.submit(&mut session, &line).await;
        print_outcome(&outcome);
    }

    Ok(())
}

async fn ask(config: AppConfig, user: Option<Uuid>, text: Vec<String>) -> anyhow::Result<()> {
    let assistant = build_assistant(&config);
    let mut session = SessionState::new(user.or(config.user_id));

    let outcome = assistant.submit(&mut session, &text.join(" ")).await;
    print_outcome(&outcome);

    match outcome {
        SubmitOutcome::Replied { .. } => Ok(()),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = matches!(
        cli.command,
        Some(Commands::Chat { .. }) | Some(Commands::Ask { .. })
    );
    init_tracing(use_stderr);

    let config = AppConfig::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => serve(config, port).await?,
        Some(Commands::Chat { user }) => chat(config, user).await?,
        Some(Commands::Ask { user, text }) => ask(config, user, text).await?,
        Some(Commands::Migrate) => {
            let path = config
                .database_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("No database path; set TEAMSYNC_DB_PATH"))?;
            open_database(&config)?;
            println!("Database ready at {}", path.display());
        }
        None => serve(config, 3000).await?,
    }

    Ok(())
}
