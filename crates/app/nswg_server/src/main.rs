//! NSWG1 portal API server binary.
//!
//! Reads configuration from flags or the environment (`.env` is honoured),
//! runs migrations, then serves the portal API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nswg_core::auth::config::{
    AuthConfig, DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS, EncryptionKey,
    ProviderConfig, TokenPolicy,
};
use nswg_core::auth::crypto::TokenCipher;
use nswg_core::auth::directory::PgUserDirectory;
use nswg_core::auth::jwt::SessionCodec;
use nswg_core::auth::login_state::{LoginStateStore, spawn_purge};
use nswg_core::auth::provider::DiscordProvider;
use nswg_core::auth::session::SessionManager;
use nswg_core::auth::token_store::{PgTokenRows, TokenStore};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// CLI arguments for the portal server.
#[derive(Parser, Debug)]
#[command(name = "nswg_server", about = "NSWG1 portal API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/nswg"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// 32-byte refresh-token encryption key, hex encoded.
    #[arg(long, env = "KEY", hide_env_values = true)]
    key: Option<String>,

    /// Secret used to sign session cookies.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,

    /// Discord OAuth2 client id.
    #[arg(long, env = "DISCORD_CLIENT_ID", default_value = "")]
    discord_client_id: String,

    /// Discord OAuth2 client secret.
    #[arg(long, env = "DISCORD_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    discord_client_secret: String,

    /// Externally visible base URL of this server.
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:3100")]
    public_url: String,

    /// Override the Discord authorize endpoint.
    #[arg(long, env = "DISCORD_AUTHORIZE_URL")]
    discord_authorize_url: Option<String>,

    /// Override the Discord token endpoint.
    #[arg(long, env = "DISCORD_TOKEN_URL")]
    discord_token_url: Option<String>,

    /// Override the Discord REST API base.
    #[arg(long, env = "DISCORD_API_BASE")]
    discord_api_base: Option<String>,

    /// Timeout for each provider request, in seconds.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 10)]
    provider_timeout_secs: u64,

    /// Access-token lifetime when the provider omits `expires_in`.
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    access_token_ttl_secs: i64,

    /// Refresh-token lifetime when the provider omits `expires_in`.
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    refresh_token_ttl_secs: i64,

    /// Mark the session cookie `Secure`.
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    secure_cookies: bool,
}

impl Args {
    fn api_config(&self) -> nswg_api::config::ApiConfig {
        nswg_api::config::ApiConfig {
            bind_addr: self.bind_addr.clone(),
            public_url: self.public_url.clone(),
            secure_cookies: self.secure_cookies,
        }
    }

    fn auth_config(&self, redirect_uri: &str) -> Result<AuthConfig, nswg_core::auth::AuthError> {
        let encryption_key = EncryptionKey::from_optional_hex(self.key.as_deref())?;
        let mut provider =
            ProviderConfig::discord(&self.discord_client_id, &self.discord_client_secret, redirect_uri)?;
        if let Some(url) = &self.discord_authorize_url {
            provider.authorize_url = url.clone();
        }
        if let Some(url) = &self.discord_token_url {
            provider.token_url = url.clone();
        }
        if let Some(url) = &self.discord_api_base {
            provider.api_base = url.clone();
        }
        provider.request_timeout = Duration::from_secs(self.provider_timeout_secs);
        Ok(AuthConfig {
            encryption_key,
            provider,
            policy: TokenPolicy {
                access_token_ttl_secs: self.access_token_ttl_secs,
                refresh_token_ttl_secs: self.refresh_token_ttl_secs,
            }
            .validated()?,
        })
    }

    /// `SESSION_SECRET`, falling back to `AUTH_SECRET`.
    fn session_secret(&self) -> Option<String> {
        self.session_secret
            .clone()
            .or_else(|| std::env::var("AUTH_SECRET").ok())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        return;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nswg_api=debug,nswg_core=debug")),
        )
        .init();

    let args = Args::parse();
    let api_config = args.api_config();

    // Configuration errors are fatal before anything binds.
    let auth = args.auth_config(&api_config.redirect_uri())?;
    let session_secret = args.session_secret().unwrap_or_default();
    let cipher = TokenCipher::new(auth.encryption_key.clone());
    let codec = SessionCodec::new(session_secret.as_bytes(), cipher.clone(), auth.policy.refresh_token_ttl_secs)?;
    let provider = Arc::new(DiscordProvider::new(auth.provider.clone())?);

    info!(
        bind_addr = %api_config.bind_addr,
        max_connections = args.max_connections,
        provider = ?auth.provider,
        "starting nswg_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    nswg_core::migrate::migrate(&pool).await?;

    let tokens = TokenStore::new(Arc::new(PgTokenRows::new(pool.clone())), cipher);
    let sessions = Arc::new(SessionManager::new(provider.clone(), tokens, auth.policy));
    let login_states = Arc::new(LoginStateStore::new());
    let _purge = spawn_purge(login_states.clone(), Duration::from_secs(60));

    let state = nswg_api::AppState {
        config: api_config.clone(),
        provider,
        sessions,
        users: Arc::new(PgUserDirectory::new(pool)),
        codec,
        login_states,
    };

    let app = nswg_api::router(state);
    let listener = tokio::net::TcpListener::bind(&api_config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "portal API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
