use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use carlock::auth::oauth::{self, parse_redirect};
use carlock::auth::storage::SECRET_NAMES;
use carlock::auth::{self, CredentialSource, CredentialStore, TokenClient};
use carlock::config::{AuthMode, Config, KNOWN_KEYS, Settings};
use carlock::consts::{SKILL_NAME, default_db_path};
use carlock::engine::{Engine, LockEngine, TokenSource};
use carlock::intents::{self, IntentRouter, TokenMode};
use carlock::vehicle::HttpVehicleApi;

#[derive(Parser)]
#[command(name = "carlock", version, about = "Lock your car by voice.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database holding settings and credentials
    #[arg(short, long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one voice platform request envelope and print the response
    Handle {
        /// Read the envelope from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Lock the car now and print what the skill would say
    Lock,
    /// Authorize with the vehicle provider and keep the refresh token
    Login,
    /// Forget stored tokens
    Logout,
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage credentials (client_id, client_secret, authorization_code, refresh_token)
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    Set { name: String, value: String },
    Unset { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    Unset { key: String },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carlock=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let db = prepare_db(cli.db);

    match cli.command {
        Command::Handle { file } => handle_request(db, file).await,
        Command::Lock => lock_now(&db?).await,
        Command::Login => login(&db?).await,
        Command::Logout => {
            auth::logout(&CredentialStore::open(&db?)?)?;
            println!("✓ Stored tokens removed.");
            Ok(())
        }
        Command::Config { action } => config_command(&db?, action),
        Command::Secret { action } => secret_command(&db?, action),
    }
}

/// Resolve the database path and create its directory.
fn prepare_db(path: Option<PathBuf>) -> anyhow::Result<String> {
    let db_path = path.unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    db_path
        .to_str()
        .map(str::to_string)
        .context("database path is not valid UTF-8")
}

/// Wire the engine to the real HTTP clients.
fn build_engine(settings: &Settings) -> anyhow::Result<Arc<LockEngine>> {
    let tokens = TokenClient::new(
        &settings.token_url,
        &settings.redirect_uri,
        settings.request_timeout,
    )?;
    let api = HttpVehicleApi::new(&settings.api_base_url, settings.request_timeout)?;
    Ok(Arc::new(LockEngine::new(
        Arc::new(tokens),
        Arc::new(api),
        settings.vehicle.clone(),
        settings.poll.clone(),
    )))
}

/// Always prints a response envelope. Setup failures are logged and the
/// request is answered without the lock path.
async fn handle_request(db: anyhow::Result<String>, file: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = read_request(file).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to read request envelope");
        String::new()
    });
    let router = db.and_then(|db| build_router(&db));

    let response = intents::respond(&raw, router).await;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn read_request(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

fn build_router(db: &str) -> anyhow::Result<IntentRouter> {
    let settings = Settings::load(&Config::open(db)?)?;
    let tokens = match settings.auth_mode {
        AuthMode::AccountLinking => TokenMode::AccountLinking,
        AuthMode::Stored => TokenMode::Stored(Arc::new(CredentialStore::open(db)?)),
    };
    Ok(IntentRouter::new(build_engine(&settings)?, tokens))
}

async fn lock_now(db: &str) -> anyhow::Result<()> {
    let settings = Settings::load(&Config::open(db)?)?;
    let store = CredentialStore::open(db)?;
    let engine = build_engine(&settings)?;

    let source = match settings.auth_mode {
        AuthMode::AccountLinking => {
            TokenSource::AccountLinked(std::env::var("CARLOCK_ACCESS_TOKEN").ok())
        }
        AuthMode::Stored => TokenSource::Grant(store.load()?),
    };

    let report = engine.run_detailed(source).await;
    store.settle(report.spent.as_ref(), report.issued.as_ref())?;
    println!("{SKILL_NAME}: {}", report.reply);
    Ok(())
}

async fn login(db: &str) -> anyhow::Result<()> {
    let settings = Settings::load(&Config::open(db)?)?;
    let store = CredentialStore::open(db)?;
    let client = store
        .client()?
        .context("set client_id and client_secret first: carlock secret set client_id <id>")?;

    let (url, state) = oauth::build_authorize_url(
        &settings.authorize_url,
        &client.client_id,
        &settings.redirect_uri,
        &settings.scopes,
    );

    // Try to open browser, silently ignore failures (e.g. headless/SSH)
    let _ = open::that(&url);

    println!("Open this URL to authenticate:\n");
    println!("  {url}\n");

    print!("Paste the redirect URL or the authorization code: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let Some(redirect) = parse_redirect(&input) else {
        bail!("no authorization code provided");
    };
    if let Some(returned) = &redirect.state
        && returned != &state
    {
        bail!("state mismatch: the redirect does not belong to this login");
    }

    println!("\nExchanging code for tokens...");
    let exchange = TokenClient::new(
        &settings.token_url,
        &settings.redirect_uri,
        settings.request_timeout,
    )?;
    auth::login(&store, &exchange, &redirect.code).await?;

    println!("✓ Logged in. The refresh token is stored in {db}");
    Ok(())
}

fn secret_command(db: &str, action: SecretAction) -> anyhow::Result<()> {
    let store = CredentialStore::open(db)?;
    match action {
        SecretAction::Set { name, value } => {
            if !SECRET_NAMES.contains(&name.as_str()) {
                bail!("unknown secret {name}, expected one of: {}", SECRET_NAMES.join(", "));
            }
            store.set(&name, &value)?;
            println!("✓ {name} stored.");
        }
        SecretAction::Unset { name } => {
            store.remove(&name)?;
            println!("✓ {name} removed");
        }
    }
    Ok(())
}

fn config_command(db: &str, action: ConfigAction) -> anyhow::Result<()> {
    let config = Config::open(db)?;
    match action {
        ConfigAction::Get { key } => match config.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                bail!("unknown key {key}, expected one of: {}", KNOWN_KEYS.join(", "));
            }
            let previous = config.get(&key)?;
            config.set(&key, &value)?;
            // Fail now rather than at the next invocation.
            if let Err(e) = Settings::load(&config) {
                match previous {
                    Some(old) => config.set(&key, &old)?,
                    None => config.remove(&key)?,
                }
                return Err(e);
            }
            println!("✓ {key} = {value}");
        }
        ConfigAction::Unset { key } => {
            config.remove(&key)?;
            println!("✓ {key} removed");
        }
        ConfigAction::List => {
            for (key, value) in config.list()? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
