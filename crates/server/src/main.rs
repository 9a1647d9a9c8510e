use crm_auth::AppResources;
use crm_auth::api::start_webserver;
use crm_auth::config::{AppConfig, StorageBackend, load_config};
use crm_auth::oauth2::{AuthService, AuthStores, hash_password};
use crm_auth::settings::{SettingsClient, spawn_refresh_task};
use crm_auth::store::DbUserDirectory;
use crm_auth::sweeper::spawn_sweeper;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "crm_auth=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

/// `crm-auth hash-password` reads one password per line from stdin and
/// prints its Argon2id hash, for the `users` config section.
fn hash_passwords_from_stdin() -> color_eyre::Result<()> {
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let hash = hash_password(line.trim_end())
            .map_err(|e| color_eyre::eyre::eyre!("failed to hash password: {e}"))?;
        println!("{hash}");
    }
    Ok(())
}

async fn build_stores(config: &AppConfig) -> color_eyre::Result<AuthStores> {
    match config.storage {
        StorageBackend::Memory => Ok(AuthStores::memory(&config.users)),
        StorageBackend::Database => {
            let db = Arc::new(Database::connect(&config.database_url).await?);
            Migrator::up(db.as_ref(), None).await?;

            let seeded = DbUserDirectory::new(db.clone())
                .seed(&config.users)
                .await?;
            if seeded > 0 {
                tracing::info!(seeded, "seeded users from configuration");
            }
            Ok(AuthStores::database(db))
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        return hash_passwords_from_stdin();
    }

    let _ = dotenvy::dotenv();
    initialize_tracing();

    let config = Arc::new(load_config()?);
    tracing::info!(
        storage = ?config.storage,
        clients = config.clients.len(),
        users = config.users.len(),
        remote_settings = config.superadmin.base_url.is_some(),
        "configuration loaded"
    );

    let stores = build_stores(&config).await?;
    let auth = AuthService::from_config(&config, stores);

    if let Some(client) = SettingsClient::from_config(&config.superadmin)? {
        client.refresh(auth.policy()).await;
        spawn_refresh_task(
            client,
            auth.policy().clone(),
            Duration::from_secs(config.superadmin.refresh_interval_secs.max(1)),
        );
    }

    spawn_sweeper(
        auth.clone(),
        Duration::from_secs(config.oauth2.sweep_interval_secs),
    );

    start_webserver(AppResources { config, auth }).await?;
    Ok(())
}
