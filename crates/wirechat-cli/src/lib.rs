use anyhow::{Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use wirechat_client::{ApiClient, ClientError};
use wirechat_session::{
    CredentialStore, SessionConfig, SessionController, SessionPhase, SessionSnapshot,
};

#[derive(Parser)]
#[command(name = "wirechat")]
#[command(about = "Wirechat terminal client", version)]
pub struct WirechatCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Log in and persist the session for later commands
    Login { username: String, password: String },
    /// Create an account (does not log in)
    Register { username: String, password: String },
    /// Resume the stored session and chat interactively
    Chat,
    /// Print the persisted message history
    History,
    /// Delete the persisted message history on the server
    ClearHistory,
    /// Clear the stored session
    Logout,
    /// Show whether a session is stored and where
    Status,
}

pub async fn run() -> Result<()> {
    let cli = WirechatCli::parse();
    let config = SessionConfig::from_env();
    match cli.command {
        Commands::Login { username, password } => login(&config, &username, &password).await,
        Commands::Register { username, password } => register(&config, &username, &password).await,
        Commands::Chat => chat(&config).await,
        Commands::History => history(&config).await,
        Commands::ClearHistory => clear_history(&config).await,
        Commands::Logout => logout(&config),
        Commands::Status => status(&config),
    }
}

async fn login(config: &SessionConfig, username: &str, password: &str) -> Result<()> {
    let controller = SessionController::new(config)?;
    controller.login(username, password).await?;
    let snapshot = controller.snapshot();
    println!(
        "logged in as {username} ({} stored messages)",
        snapshot.messages.len()
    );
    println!("run `wirechat chat` to start chatting");
    Ok(())
}

async fn register(config: &SessionConfig, username: &str, password: &str) -> Result<()> {
    let controller = SessionController::new(config)?;
    controller.register(username, password).await?;
    println!("registered {username}; run `wirechat login {username} <password>` to sign in");
    Ok(())
}

async fn chat(config: &SessionConfig) -> Result<()> {
    let controller = SessionController::new(config)?;
    if !controller.resume().await? {
        bail!("not logged in; run `wirechat login <username> <password>` first");
    }

    let snapshot = controller.snapshot();
    for line in &snapshot.messages {
        println!("{line}");
    }
    let mut printed = snapshot.messages.len();
    if let Some(username) = snapshot.username() {
        println!("connected as {username}. commands: /quit, /logout, /clear");
    }

    let mut updates = controller.subscribe();
    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                printed = print_new_lines(&snapshot, printed);
                if snapshot.phase == SessionPhase::LoggedOut {
                    match snapshot.last_error {
                        Some(reason) => println!("session ended: {reason}"),
                        None => println!("session ended"),
                    }
                    break;
                }
            }
            line = input_lines.next_line() => {
                let Some(input) = line? else {
                    // stdin closed; detach but stay logged in
                    break;
                };
                match input.trim() {
                    "/quit" => {
                        println!("detached; the session stays logged in");
                        break;
                    }
                    "/logout" => {
                        controller.logout().await?;
                        println!("logged out");
                        break;
                    }
                    "/clear" => match controller.clear_history().await {
                        Ok(()) => println!("history cleared"),
                        Err(error) => println!("clear failed: {error}"),
                    },
                    _ => controller.send_message(&input).await?,
                }
            }
        }
    }
    Ok(())
}

/// Print messages beyond `printed` and return the new high-water mark.
/// A shrunken list means the log was cleared; start over.
fn print_new_lines(snapshot: &SessionSnapshot, printed: usize) -> usize {
    let from = if snapshot.messages.len() < printed {
        0
    } else {
        printed
    };
    for line in &snapshot.messages[from..] {
        println!("{line}");
    }
    snapshot.messages.len()
}

async fn history(config: &SessionConfig) -> Result<()> {
    let store = config.credential_store();
    let Some(session) = store.load()? else {
        bail!("not logged in; run `wirechat login <username> <password>` first");
    };
    let api = ApiClient::new(config.api_config())?;
    match api.fetch_history(&session.token).await {
        Ok(entries) => {
            if entries.is_empty() {
                println!("no messages");
            }
            for entry in &entries {
                println!("{entry}");
            }
            Ok(())
        }
        Err(ClientError::Unauthorized) => {
            store.clear()?;
            bail!("session expired; stored credentials cleared, log in again");
        }
        Err(error) => Err(error.into()),
    }
}

async fn clear_history(config: &SessionConfig) -> Result<()> {
    let store = config.credential_store();
    let Some(session) = store.load()? else {
        bail!("not logged in; run `wirechat login <username> <password>` first");
    };
    let api = ApiClient::new(config.api_config())?;
    match api.clear_history(&session.token).await {
        Ok(()) => {
            println!("history cleared");
            Ok(())
        }
        Err(ClientError::Unauthorized) => {
            store.clear()?;
            bail!("session expired; stored credentials cleared, log in again");
        }
        Err(error) => Err(error.into()),
    }
}

fn logout(config: &SessionConfig) -> Result<()> {
    let store = config.credential_store();
    store.clear()?;
    println!("logged out");
    Ok(())
}

fn status(config: &SessionConfig) -> Result<()> {
    let store = config.credential_store();
    match store.load()? {
        Some(session) => println!(
            "logged in as {} (credentials at {})",
            session.username,
            store.path().display()
        ),
        None => println!("logged out"),
    }
    Ok(())
}
