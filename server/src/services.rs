use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket_db_pools::Database;

use pact_engine::collaborators::{
    FriendshipDirectory, HttpFriendshipDirectory, HttpTelemetrySource, NotificationDispatcher,
    TelemetrySource, TracingDispatcher, WebhookDispatcher,
};
use pact_engine::config::EnginePolicy;
use pact_engine::evaluation::EvaluationEngine;
use pact_engine::lifecycle::LifecycleManager;
use pact_engine::store::{PactStore, PgPactStore};

use crate::db::DB;

/// External collaborator endpoints, read from the environment.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub friend_directory_url: String,
    pub telemetry_url: String,
    pub event_webhook_url: Option<String>,
}

/// Builds the engine on top of the database pool and hands the lifecycle
/// manager and evaluation engine to Rocket as managed state.
pub fn stage(config: CollaboratorConfig, policy: EnginePolicy) -> AdHoc {
    AdHoc::try_on_ignite("Engine services", move |rocket| async move {
        let Some(db) = DB::fetch(&rocket) else {
            rocket::error!("Failed to get DB connection for engine services");
            return Err(rocket);
        };
        let store: Arc<dyn PactStore> = Arc::new(PgPactStore::new(db.0.clone()));

        let directory: Arc<dyn FriendshipDirectory> =
            match HttpFriendshipDirectory::new(config.friend_directory_url.clone()) {
                Ok(directory) => Arc::new(directory),
                Err(e) => {
                    rocket::error!("Failed to create friend directory client: {e}");
                    return Err(rocket);
                }
            };
        let telemetry: Arc<dyn TelemetrySource> =
            match HttpTelemetrySource::new(config.telemetry_url.clone()) {
                Ok(telemetry) => Arc::new(telemetry),
                Err(e) => {
                    rocket::error!("Failed to create telemetry client: {e}");
                    return Err(rocket);
                }
            };
        let notifier: Arc<dyn NotificationDispatcher> = match &config.event_webhook_url {
            Some(url) => match WebhookDispatcher::new(url.clone()) {
                Ok(dispatcher) => Arc::new(dispatcher),
                Err(e) => {
                    rocket::error!("Failed to create event webhook dispatcher: {e}");
                    return Err(rocket);
                }
            },
            None => Arc::new(TracingDispatcher),
        };

        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            directory,
            notifier.clone(),
            policy.clone(),
        ));
        let engine = Arc::new(EvaluationEngine::new(store, telemetry, notifier, policy));

        Ok(rocket.manage(lifecycle).manage(engine))
    })
}
