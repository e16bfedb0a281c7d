//! User-facing advisory messages
//!
//! Capture failures are reported as leveled text rather than errors threaded
//! up to the caller. The default sink forwards everything to `tracing`.

use tracing::{error, info, warn};

/// Severity of an advisory message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryLevel {
    Info,
    Warning,
    Error,
}

/// Receiver for advisory messages
pub trait AdvisorySink: Send + Sync {
    fn advise(&self, level: AdvisoryLevel, message: &str);

    fn info(&self, message: &str) {
        self.advise(AdvisoryLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.advise(AdvisoryLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.advise(AdvisoryLevel::Error, message);
    }
}

/// Sink that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAdvisor;

impl AdvisorySink for TracingAdvisor {
    fn advise(&self, level: AdvisoryLevel, message: &str) {
        match level {
            AdvisoryLevel::Info => info!("{}", message),
            AdvisoryLevel::Warning => warn!("{}", message),
            AdvisoryLevel::Error => error!("{}", message),
        }
    }
}
