use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nameward::auth::{TokenGenerator, TokenGrant};
use nameward::config::{IdentityConfig, ServerConfig};
use nameward::identity::{
    HttpIdentityProvider, IdentityProvider, IdentityService, SessionOnlyProvider,
};
use nameward::scheduler;
use nameward::server::{AppState, create_router};
use nameward::store::SqliteStore;

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "nameward")]
#[command(about = "A username and identity claim service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database and trusted token
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Identity settings (TOML). Defaults to <data-dir>/nameward.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Sweep expired pending identities and username holds once
    Cleanup {
        /// Data directory for the database and trusted token
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Identity settings (TOML). Defaults to <data-dir>/nameward.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and trusted token)
    Init {
        /// Data directory for the database and trusted token
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Mint a session token for a subject, as the auth provider would
    Session {
        /// Data directory for the database and trusted token
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Subject the session authenticates
        #[arg(long)]
        subject: String,

        /// Email claim carried by the session
        #[arg(long)]
        email: Option<String>,

        /// Lifetime of the token in seconds; no expiry when omitted
        #[arg(long)]
        expires_in_seconds: Option<i64>,
    },
}

fn server_config(data_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        data_dir,
        ..ServerConfig::default()
    }
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = server_config(data_dir);
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = config.trusted_token_path();

    if store.query(|store| store.has_trusted_token())? {
        bail!(
            "Server already initialized. Trusted token exists at: {}",
            token_file.display()
        );
    }

    let (token, raw_token) = TokenGenerator::new().issue(TokenGrant::Trusted, Utc::now())?;
    store.mutation(|store| store.create_token(&token))?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Trusted token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_session(
    data_dir: PathBuf,
    subject: String,
    email: Option<String>,
    expires_in_seconds: Option<i64>,
) -> anyhow::Result<()> {
    let config = server_config(data_dir);
    let store = open_initialized_store(&config)?;

    let now = Utc::now();
    let expires_at = match expires_in_seconds {
        Some(seconds) if seconds <= 0 => bail!("--expires-in-seconds must be positive"),
        Some(seconds) => Some(now + chrono::Duration::seconds(seconds)),
        None => None,
    };

    let grant = TokenGrant::Session {
        subject,
        email,
        expires_at,
    };
    let (token, raw_token) = TokenGenerator::new().issue(grant, now)?;
    store.mutation(|store| store.create_token(&token))?;

    println!("{raw_token}");
    Ok(())
}

fn open_initialized_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    let not_initialized = || {
        anyhow::anyhow!(
            "Server not initialized. Run 'nameward admin init' first to create the database and trusted token."
        )
    };

    if !config.db_path().exists() {
        return Err(not_initialized());
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.query(|store| store.has_trusted_token())? {
        return Err(not_initialized());
    }
    Ok(store)
}

fn load_identity_config(
    config: &ServerConfig,
    path: Option<&Path>,
) -> anyhow::Result<IdentityConfig> {
    let identity = match path {
        Some(path) => IdentityConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => IdentityConfig::load_or_default(&config.default_identity_config_path())?,
    };
    Ok(identity)
}

fn identity_service(
    config: &ServerConfig,
    config_path: Option<&Path>,
) -> anyhow::Result<IdentityService> {
    let store = open_initialized_store(config)?;
    let identity = load_identity_config(config, config_path)?;

    let provider: Arc<dyn IdentityProvider> = match &identity.provider {
        Some(provider) => {
            info!("Looking up users at {}", provider.base_url);
            Arc::new(HttpIdentityProvider::new(provider)?)
        }
        None => Arc::new(SessionOnlyProvider),
    };

    Ok(IdentityService::new(Arc::new(store), provider, identity))
}

fn run_cleanup(data_dir: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = server_config(data_dir);
    let service = identity_service(&config, config_path.as_deref())?;

    let now = Utc::now();
    let pending = service.cleanup_expired_pending_identities(now)?;
    let holds = service.cleanup_expired_username_holds(now)?;

    println!("Removed {pending} expired pending identities and {holds} expired username holds");
    Ok(())
}

async fn run_serve(config: ServerConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let service = Arc::new(identity_service(&config, config_path.as_deref())?);

    for registration in service.ensure_cleanup_crons(Utc::now())? {
        info!(
            id = %registration.id,
            created = registration.created,
            "Cleanup job registered"
        );
    }

    let tick = Duration::from_secs(service.config().scheduler_tick_seconds);
    tokio::spawn(scheduler::run(Arc::clone(&service), tick));

    info!(
        "Trusted token available at {}",
        config.trusted_token_path().display()
    );

    let state = Arc::new(AppState::new(service, config.data_dir.clone()));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nameward=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
            AdminCommands::Session {
                data_dir,
                subject,
                email,
                expires_in_seconds,
            } => run_session(data_dir, subject, email, expires_in_seconds)?,
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            config,
        } => {
            let server = ServerConfig {
                host,
                port,
                data_dir,
            };
            run_serve(server, config).await?;
        }
        Commands::Cleanup { data_dir, config } => run_cleanup(data_dir, config)?,
    }

    Ok(())
}
