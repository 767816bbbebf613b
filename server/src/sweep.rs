use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use rocket::fairing::AdHoc;

use pact_engine::evaluation::EvaluationEngine;

use crate::health_monitor::HealthMonitor;

const TASK_NAME: &str = "evaluation sweep";

/// Runs the daily evaluation sweep on a fixed cadence for the lifetime of
/// the server. Each tick re-checks day closures lazily, so a sweep that
/// finds nothing to do is cheap and a missed tick is caught up by the next.
pub fn stage(sleep_duration: Duration, atomic_bool: Arc<AtomicBool>) -> AdHoc {
    AdHoc::on_liftoff("Evaluate pacts every X minutes", move |rocket| {
        Box::pin(async move {
            let engine: Arc<EvaluationEngine> = rocket
                .state::<Arc<EvaluationEngine>>()
                .cloned()
                .expect("Failed to get evaluation engine");
            let health: Arc<HealthMonitor> = rocket
                .state::<Arc<HealthMonitor>>()
                .cloned()
                .expect("Failed to get health monitor");

            rocket::tokio::spawn(async move {
                let mut interval = rocket::tokio::time::interval(sleep_duration);
                while atomic_bool.load(std::sync::atomic::Ordering::Relaxed) {
                    interval.tick().await;

                    let summary = engine.run_sweep(chrono::Utc::now()).await;
                    if summary.failures > 0 {
                        tracing::warn!(
                            "evaluation sweep finished with {} failures",
                            summary.failures
                        );
                    }
                    health.heartbeat(TASK_NAME);
                }
            });
        })
    })
}
