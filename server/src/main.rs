#[macro_use]
extern crate rocket;

mod entrypoints;

use std::sync::Arc;
use std::time::Duration;

use rocket::fairing::AdHoc;
use rocket_prometheus::PrometheusMetrics;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pact_engine::config::EnginePolicy;
use pact_server::health_monitor::HealthMonitor;
use pact_server::services::CollaboratorConfig;
use pact_server::{db, services, sweep};

#[derive(Debug, serde::Deserialize)]
pub struct Env {
    friend_directory_url: String,
    telemetry_url: String,
    event_webhook_url: Option<String>,
    sweep_interval_in_minutes: Option<u32>,
    grace_hours: Option<u32>,
    invitation_ttl_days: Option<u32>,
    max_consecutive_misses: Option<u32>,
    sweep_workers: Option<usize>,
}

#[launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = envy::from_env::<Env>().expect("Failed to load environment variables");
    let defaults = EnginePolicy::default();
    let policy = EnginePolicy {
        grace_hours: env.grace_hours.unwrap_or(defaults.grace_hours),
        invitation_ttl_days: env
            .invitation_ttl_days
            .unwrap_or(defaults.invitation_ttl_days),
        max_consecutive_misses: env.max_consecutive_misses.or(defaults.max_consecutive_misses),
        sweep_workers: env.sweep_workers.unwrap_or(defaults.sweep_workers),
    };
    let collaborators = CollaboratorConfig {
        friend_directory_url: env.friend_directory_url,
        telemetry_url: env.telemetry_url,
        event_webhook_url: env.event_webhook_url,
    };
    let sweep_duration =
        Duration::from_secs(env.sweep_interval_in_minutes.unwrap_or(60) as u64 * 60);
    let atomic_bool = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let atomic_bool_clone = atomic_bool.clone();

    let prometheus = PrometheusMetrics::new();
    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("Failed to build CORS options");

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();

    rocket::build()
        .attach(db::stage())
        .attach(services::stage(collaborators, policy))
        .manage(Arc::new(HealthMonitor::new()))
        .attach(entrypoints::stage())
        .attach(sweep::stage(sweep_duration, atomic_bool))
        .attach(AdHoc::on_shutdown("Stop evaluation sweep", |_| {
            Box::pin(async move {
                atomic_bool_clone.store(false, std::sync::atomic::Ordering::Relaxed);
            })
        }))
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .attach(cors)
        .mount(
            "/",
            SwaggerUi::new("/docs/<_..>").url("/api-docs/openapi.json", entrypoints::ApiDoc::openapi()),
        )
}
