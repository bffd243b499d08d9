use chrono::Duration;
use std::collections::BTreeSet;
use vexium_types::UserId;

/// Engine-wide tunables. Per-world rates live on the world itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of a pending transaction intent.
    pub intent_ttl: Duration,
    /// Spacing between loan due dates.
    pub loan_payment_interval: Duration,
    /// Recent treasury-related transactions included in a report.
    pub treasury_report_limit: usize,
    /// Identities holding `PROTOCOL_ADMIN` in every world.
    pub protocol_admins: BTreeSet<UserId>,
}

impl EngineConfig {
    pub fn with_protocol_admin(mut self, user: UserId) -> Self {
        self.protocol_admins.insert(user);
        self
    }

    pub fn with_intent_ttl(mut self, ttl: Duration) -> Self {
        self.intent_ttl = ttl;
        self
    }

    pub fn is_protocol_admin(&self, user: &UserId) -> bool {
        self.protocol_admins.contains(user)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intent_ttl: Duration::minutes(15),
            loan_payment_interval: Duration::days(30),
            treasury_report_limit: 20,
            protocol_admins: BTreeSet::new(),
        }
    }
}
