//! Diagnostic line sink.
//!
//! Every load, save and lifecycle event produces exactly one line. Lines go
//! to the user supplied [`Logger`] when one is configured, otherwise to
//! `tracing` at info (success) or warn (failure) level.

use std::{fmt, sync::Arc};

use tracing::{info, warn};

/// Single-argument sink replacing the default `tracing` output.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Diag {
    logger: Option<Logger>,
}

impl fmt::Debug for Diag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Diag").field("custom", &self.logger.is_some()).finish()
    }
}

impl Diag {
    pub fn new(logger: Option<Logger>) -> Self {
        Self {
            logger,
        }
    }

    pub fn info(
        &self,
        line: &str,
    ) {
        match &self.logger {
            Some(logger) => logger(line),
            None => info!("{line}"),
        }
    }

    pub fn warn(
        &self,
        line: &str,
    ) {
        match &self.logger {
            Some(logger) => logger(line),
            None => warn!("{line}"),
        }
    }
}
