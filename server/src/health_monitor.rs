use std::collections::HashMap;
use std::time::{Duration, Instant};

use rocket::tokio::sync::mpsc;

const CHECK_INTERVAL: Duration = Duration::from_secs(15);
const STALL_THRESHOLD: Duration = Duration::from_secs(600);

/// Watches the background loops. The sweep reports a heartbeat after every
/// pass; if a loop goes quiet for ten minutes something is wedged and the
/// process exits so the supervisor restarts it.
pub struct HealthMonitor {
    sender: mpsc::UnboundedSender<String>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

        rocket::tokio::spawn(async move {
            let mut last_seen: HashMap<String, Instant> = HashMap::new();
            let mut interval = rocket::tokio::time::interval(CHECK_INTERVAL);
            loop {
                rocket::tokio::select! {
                    _ = interval.tick() => {
                        for (task, heartbeat) in &last_seen {
                            if heartbeat.elapsed() > STALL_THRESHOLD {
                                tracing::error!(
                                    "no heartbeat from {task} for {}s - shutting down",
                                    STALL_THRESHOLD.as_secs()
                                );
                                std::process::exit(1);
                            }
                        }
                    }
                    Some(task) = receiver.recv() => {
                        last_seen.insert(task, Instant::now());
                    }
                }
            }
        });

        Self { sender }
    }

    pub fn heartbeat(&self, task: &str) {
        let _ = self.sender.send(task.to_string());
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
