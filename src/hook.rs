//! Hooks: named execution points owning an ordered trigger list

use log::{debug, warn};

use crate::engine::{CsetStore, EngineContext};
use crate::error::{Error, Result};
use crate::trigger::Trigger;

/// A warning raised by a trigger and caught by its hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWarning {
    pub hook: String,
    pub trigger: String,
    pub message: String,
}

/// A named execution point in the merge pipeline.
///
/// Triggers fire in registration order (as arranged by their registration
/// strategies). Once a hook has started firing it is sealed and refuses
/// further registrations.
#[derive(Debug)]
pub struct Hook {
    name: String,
    triggers: Vec<Trigger>,
    sealed: bool,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            sealed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Add a trigger, letting its registration strategy position it.
    pub fn register_trigger(&mut self, trigger: Trigger) -> Result<()> {
        if self.sealed {
            return Err(Error::HookSealed {
                hook: self.name.clone(),
            });
        }
        debug!("hook {}: registering {}", self.name, trigger);
        trigger.register(&self.name, &mut self.triggers)
    }

    /// Fire every trigger in order.
    ///
    /// Trigger warnings are caught and returned; any other error aborts the
    /// hook immediately, wrapped in `TriggerFailed`. `trigger_end` is only
    /// sent for triggers that completed (cleanly or with a warning).
    pub fn fire(&mut self, ctx: &EngineContext<'_>, csets: &mut CsetStore) -> Result<Vec<RecordedWarning>> {
        self.sealed = true;
        let observer = ctx.observer();
        let mut warnings = Vec::new();

        for trigger in &self.triggers {
            observer.trigger_start(&self.name, trigger);

            csets.resolve(trigger.required_csets());
            match trigger.invoke(&self.name, ctx, csets.sets_mut()) {
                Ok(()) => {}
                Err(Error::TriggerWarning { message }) => {
                    warn!("hook {}: trigger {}: {}", self.name, trigger.name(), message);
                    warnings.push(RecordedWarning {
                        hook: self.name.clone(),
                        trigger: trigger.name().to_string(),
                        message,
                    });
                }
                Err(err) => {
                    return Err(Error::TriggerFailed {
                        hook: self.name.clone(),
                        trigger: trigger.name().to_string(),
                        source: Box::new(err),
                    });
                }
            }

            observer.trigger_end(&self.name, trigger);
        }

        Ok(warnings)
    }
}
