//! Command-line interface

use crate::api::{router, AppState};
use crate::auth::{hash_password, Role, TokenService};
use crate::config::AppConfig;
use crate::push::{HttpPushApi, PushConfig, PushGateway};
use crate::storage::{
    NewUser, PostgresConfig, PostgresStore, SessionStore, StorageError, UserStore,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "khedma", about = "Khedma delivery platform auth and push server", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Create the database schema and exit
    Init,

    /// Create the demo accounts
    Seed,

    /// User administration
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Deactivate a user and cut their live push connections
    Deactivate { username: String },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { bind } => serve(bind).await,
            Command::Init => init().await,
            Command::Seed => seed().await,
            Command::User {
                action: UserAction::Deactivate { username },
            } => deactivate(&username).await,
        }
    }
}

async fn connect() -> anyhow::Result<Arc<PostgresStore>> {
    let config = PostgresConfig::from_env()
        .ok_or_else(|| anyhow::anyhow!("set DATABASE_URL or PGUSER/PGDATABASE"))?;
    let store = PostgresStore::new(config).await?;
    Ok(Arc::new(store))
}

async fn serve(bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind = bind;
    }

    let store = connect().await?;
    let push = PushGateway::new(&config.push, Arc::new(HttpPushApi::new(&config.push)));

    let state = AppState {
        users: store.clone(),
        sessions: store,
        tokens: TokenService::new(&config.tokens),
        push,
    };

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "Listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn init() -> anyhow::Result<()> {
    connect().await?;
    info!("Schema is up to date");
    Ok(())
}

async fn seed() -> anyhow::Result<()> {
    let store = connect().await?;

    let demo_users = [
        ("admin", "admin", "admin@khedma.local", "System Administrator", Role::Admin, None),
        ("demo", "demo", "demo@khedma.local", "John Smith", Role::Dispatcher, Some("Operations")),
        ("driver", "driver", "driver@khedma.local", "Mike Wilson", Role::Driver, None),
        ("customer", "customer", "customer@khedma.local", "Sara Ben Ali", Role::Customer, None),
    ];

    for (username, password, email, full_name, role, department) in demo_users {
        let result = store
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password)?,
                full_name: full_name.to_string(),
                role,
                department: department.map(str::to_string),
                phone: None,
            })
            .await;

        match result {
            Ok(user) => info!(username, role = %user.role, "Seeded demo user"),
            Err(StorageError::Conflict(_)) => info!(username, "Demo user already exists, skipping"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

async fn deactivate(username: &str) -> anyhow::Result<()> {
    let store = connect().await?;

    let user = store
        .find_by_username(username)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no such user: {username}"))?;

    store.deactivate(user.id).await?;
    if let Err(e) = store.revoke(user.id).await {
        warn!(error = %e, "Failed to revoke push session");
    }

    // Cut live connections if the gateway is reachable
    match PushConfig::from_env() {
        Ok(config) => {
            let gateway = PushGateway::new(&config, Arc::new(HttpPushApi::new(&config)));
            PushGateway::tolerate(gateway.disconnect(user.id).await, "deactivate disconnect");
        }
        Err(_) => warn!("Push gateway not configured, live connections left to expire"),
    }

    info!(username, user_id = %user.id, "User deactivated");
    Ok(())
}
