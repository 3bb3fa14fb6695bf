//! Startup cutoff: transports often redeliver history on (re)connect, and anything
//! sent before the engine started must not be answered.

use chrono::{DateTime, SubsecRound, Utc};

use super::event::InboundEvent;

#[derive(Debug, Clone, Copy)]
pub struct SessionBoundary {
    startup: DateTime<Utc>,
}

impl Default for SessionBoundary {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBoundary {
    /// Capture the current instant as the cutoff.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(startup: DateTime<Utc>) -> Self {
        Self { startup }
    }

    /// Round the cutoff down to whole seconds, for transports whose timestamps carry no
    /// sub-second part (a message from the startup second would otherwise count as stale).
    pub fn to_whole_seconds(self) -> Self {
        Self::starting_at(self.startup.trunc_subsecs(0))
    }

    pub fn startup(&self) -> DateTime<Utc> {
        self.startup
    }

    /// False iff the event was sent before startup.
    pub fn accept(&self, event: &InboundEvent) -> bool {
        event.sent_at >= self.startup
    }
}
