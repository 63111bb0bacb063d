//! Check-in Demo
//!
//! Walks one registration through the admission lifecycle:
//! - Mint a credential
//! - Resolve it
//! - Admit at Gate-A, then reject a second scan at Gate-B
//! - Undo the admission and read the status back
//!
//! # Usage
//!
//! ```bash
//! # In-memory store
//! cargo run --bin checkin-demo
//!
//! # Against Redis or PostgreSQL (see .env)
//! CHECKIN_BACKEND=redis cargo run --bin checkin-demo
//! CHECKIN_BACKEND=postgres cargo run --bin checkin-demo --features postgres
//! ```

use anyhow::Context;
use checkin::config::Backend;
use checkin::mocks::MockRegistrationStore;
use checkin::stores::RedisRegistrationStore;
use checkin::{
    AdmissionOrchestrator, Config, CredentialIssuer, RegistrationId, RegistrationStore, SystemClock,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkin=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    checkin::metrics::register_checkin_metrics();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(backend = ?config.backend, "Configuration loaded");

    let registration_id = RegistrationId::new();

    match config.backend {
        Backend::Memory => {
            let store = MockRegistrationStore::new();
            store.register(registration_id);
            run(store, &config, registration_id).await
        }
        Backend::Redis => {
            let store = RedisRegistrationStore::new(&config.redis.url).await?;
            store.register(registration_id).await?;
            run(store, &config, registration_id).await
        }
        Backend::Postgres => postgres(&config, registration_id).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres(config: &Config, registration_id: RegistrationId) -> anyhow::Result<()> {
    use checkin::stores::PostgresRegistrationStore;

    let store = PostgresRegistrationStore::connect(&config.postgres).await?;
    store.migrate().await?;
    store.insert_registration(registration_id).await?;
    run(store, config, registration_id).await
}

#[cfg(not(feature = "postgres"))]
async fn postgres(_config: &Config, _registration_id: RegistrationId) -> anyhow::Result<()> {
    anyhow::bail!("CHECKIN_BACKEND=postgres requires building with --features postgres")
}

async fn run<S: RegistrationStore>(
    store: S,
    config: &Config,
    registration_id: RegistrationId,
) -> anyhow::Result<()> {
    let issuer = CredentialIssuer::with_config(store, SystemClock, &config.checkin);
    let orchestrator = AdmissionOrchestrator::with_config(issuer, config.checkin.clone());

    println!("\n🎟️  Check-in lifecycle for registration {registration_id}\n");

    let credential = orchestrator.issuer().mint(registration_id).await?;
    println!("  mint      → {credential}");

    let resolved = orchestrator
        .issuer()
        .resolve(credential.as_str())
        .await?
        .context("freshly minted credential did not resolve")?;
    println!("  resolve   → {} ({})", resolved.id, resolved.credential_status);

    let first = orchestrator.admit(credential.as_str(), Some("Gate-A")).await?;
    println!(
        "  admit A   → success={} at={:?} by={:?}",
        first.is_success(),
        first.admitted_at(),
        first.admitted_by()
    );

    let second = orchestrator.admit(credential.as_str(), Some("Gate-B")).await?;
    println!(
        "  admit B   → success={} reason={:?} by={:?}",
        second.is_success(),
        second.reason(),
        second.admitted_by()
    );

    let undone = orchestrator.undo(credential.as_str()).await?;
    println!("  undo      → {undone}");

    let status = orchestrator.status(credential.as_str()).await?;
    println!("  status    → is_admitted={}", status.is_admitted);

    let probe = orchestrator.status("not-a-real-credential").await?;
    println!(
        "  unknown   → is_admitted={} status={}\n",
        probe.is_admitted, probe.credential_status
    );

    Ok(())
}
