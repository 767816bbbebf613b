/// Product-policy knobs for the engine. Everything here is deliberately
/// configurable rather than hard-coded; deployments tune them through the
/// server environment.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    /// Hours past a participant's local day-end before a missing or unmet
    /// report stops counting as "not yet reported".
    pub grace_hours: u32,
    /// Days an invitation stays answerable before it auto-declines.
    pub invitation_ttl_days: u32,
    /// Consecutive broken days after which a Pact terminates on its own.
    /// `None` keeps the Pact running through any number of breaks.
    pub max_consecutive_misses: Option<u32>,
    /// Upper bound on Pacts evaluated concurrently during a sweep.
    pub sweep_workers: usize,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            grace_hours: 12,
            invitation_ttl_days: 7,
            max_consecutive_misses: None,
            sweep_workers: 8,
        }
    }
}
