use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetdesk::config::{BackendConfig, RetryPolicy, SessionConfig};
use fleetdesk::error::AuthError;
use fleetdesk::identity::{GoTrueIdentity, PostgrestRoleStore};
use fleetdesk::prefs::Preferences;
use fleetdesk::session::{SessionManager, SessionState};
use fleetdesk::storage::JsonFileStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "fleetdesk", about = "Fleet admin console session tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Session(SessionCommand),
    /// Toggle the persisted sidebar preference.
    Sidebar,
}

/// Commands that bootstrap a `SessionManager`.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Bootstrap the session, print the resulting state, exit.
    Status,
    /// Bootstrap and log every state change until Ctrl-C.
    Watch,
    SignIn {
        #[arg(long, env = "FLEETDESK_EMAIL")]
        email: String,
        #[arg(long, env = "FLEETDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    SignOut,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let backend = BackendConfig::from_env()?;
    let storage = Arc::new(JsonFileStore::new(backend.state_path.clone()));

    match cli.command {
        Command::Sidebar => run_sidebar(storage).await,
        Command::Session(command) => run_session(&backend, storage, command).await,
    }
}

async fn run_sidebar(storage: Arc<JsonFileStore>) -> Result<(), CliError> {
    let mut prefs = Preferences::load(storage).await;
    let open = prefs.toggle_sidebar().await;
    print_json(&json!({ "sidebar_open": open }))
}

async fn run_session(
    backend: &BackendConfig,
    storage: Arc<JsonFileStore>,
    command: SessionCommand,
) -> Result<(), CliError> {
    let config = SessionConfig::from_env();
    let identity = Arc::new(GoTrueIdentity::new(backend, storage)?);
    let roles = Arc::new(PostgrestRoleStore::new(backend, Arc::clone(&identity))?);
    let manager = SessionManager::start(identity, roles, config);

    let result = match command {
        SessionCommand::Status => print_json(&render_state(&manager.wait_until_loaded().await)),
        SessionCommand::Watch => run_watch(&manager).await,
        SessionCommand::SignIn { email, password } => {
            run_sign_in(&manager, &config.role_lookup, &email, &password).await
        }
        SessionCommand::SignOut => {
            manager.wait_until_loaded().await;
            manager.sign_out().await;
            print_json(&render_state(&manager.state()))
        }
    };

    manager.teardown();
    result
}

async fn run_watch(manager: &SessionManager) -> Result<(), CliError> {
    let mut states = manager.subscribe();
    print_json(&render_state(&states.borrow_and_update()))?;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted; stopping watch");
                return Ok(());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = states.borrow_and_update().clone();
                info!(
                    authenticated = state.is_authenticated(),
                    role = state.role.map(|r| r.as_str()),
                    loading = state.loading,
                    "session state changed"
                );
                print_json(&render_state(&state))?;
            }
        }
    }
}

async fn run_sign_in(
    manager: &SessionManager,
    role_lookup: &RetryPolicy,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    manager.wait_until_loaded().await;
    let mut states = manager.subscribe();
    manager.sign_in(email, password).await?;
    // The signed-in event reaches the store through the listener; wait for
    // its role resolution to settle before printing.
    let state = match states.wait_for(|s| s.is_authenticated()).await {
        Ok(state) => state.clone(),
        Err(_) => manager.state(),
    };
    let settled = settle_role(manager, role_lookup, state).await;
    print_json(&render_state(&settled))
}

async fn settle_role(manager: &SessionManager, role_lookup: &RetryPolicy, state: SessionState) -> SessionState {
    if state.role.is_some() {
        return state;
    }
    let mut states = manager.subscribe();
    let _ = tokio::time::timeout(role_lookup.max_duration(), states.wait_for(|s| s.role.is_some())).await;
    manager.state()
}

fn render_state(state: &SessionState) -> Value {
    json!({
        "authenticated": state.is_authenticated(),
        "admin": state.is_admin(),
        "loading": state.loading,
        "principal": state.principal,
        "role": state.role,
        "expires_at": state.session.as_ref().and_then(|s| s.expires_at),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
