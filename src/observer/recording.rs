//! Observer that records every notification.

use std::cell::RefCell;
use std::path::PathBuf;

use super::{Observer, PhaseStatus};
use crate::changeset::FsObject;
use crate::trigger::Trigger;

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    PhaseStart(String),
    PhaseEnd(String, PhaseStatus),
    TriggerStart { hook: String, trigger: String },
    TriggerEnd { hook: String, trigger: String },
    Installing(PathBuf),
    Removing(PathBuf),
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.borrow().clone()
    }

    /// Phase names in the order their `phase_start` arrived.
    pub fn phases_started(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::PhaseStart(phase) => Some(phase.clone()),
                _ => None,
            })
            .collect()
    }

    /// Trigger names in the order they started.
    pub fn triggers_started(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::TriggerStart { trigger, .. } => Some(trigger.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn installed(&self) -> Vec<PathBuf> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Installing(location) => Some(location.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Removing(location) => Some(location.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObserverEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Observer for RecordingObserver {
    fn phase_start(&self, phase: &str) {
        self.push(ObserverEvent::PhaseStart(phase.to_string()));
    }

    fn phase_end(&self, phase: &str, status: &PhaseStatus) {
        self.push(ObserverEvent::PhaseEnd(phase.to_string(), status.clone()));
    }

    fn trigger_start(&self, hook: &str, trigger: &Trigger) {
        self.push(ObserverEvent::TriggerStart {
            hook: hook.to_string(),
            trigger: trigger.name().to_string(),
        });
    }

    fn trigger_end(&self, hook: &str, trigger: &Trigger) {
        self.push(ObserverEvent::TriggerEnd {
            hook: hook.to_string(),
            trigger: trigger.name().to_string(),
        });
    }

    fn installing_fs_obj(&self, obj: &FsObject) {
        self.push(ObserverEvent::Installing(obj.location.clone()));
    }

    fn removing_fs_obj(&self, obj: &FsObject) {
        self.push(ObserverEvent::Removing(obj.location.clone()));
    }
}
