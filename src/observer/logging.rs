//! Observer that forwards notifications to the `log` facade.
//!
//! Phase boundaries and per-object lines go out at `info`, trigger
//! boundaries at `debug`. A phase that ends `Failed` is logged at `warn`.

use log::{debug, info, warn};

use super::{Observer, PhaseStatus};
use crate::changeset::FsObject;
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl LoggingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LoggingObserver {
    fn phase_start(&self, phase: &str) {
        info!("starting {}", phase);
    }

    fn phase_end(&self, phase: &str, status: &PhaseStatus) {
        if status.is_failure() {
            warn!("finished {}: {}", phase, status);
        } else {
            info!("finished {}: {}", phase, status);
        }
    }

    fn trigger_start(&self, hook: &str, trigger: &Trigger) {
        debug!("hook {}: trigger: starting {}", hook, trigger);
    }

    fn trigger_end(&self, hook: &str, trigger: &Trigger) {
        debug!("hook {}: trigger: finished {}", hook, trigger);
    }

    fn installing_fs_obj(&self, obj: &FsObject) {
        info!(">>> {}", obj);
    }

    fn removing_fs_obj(&self, obj: &FsObject) {
        info!("<<< {}", obj);
    }
}
