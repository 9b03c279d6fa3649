//! Progress notification for merge runs.
//!
//! ## Overview
//!
//! An [`Observer`] is a notification sink. The engine tells it when each hook
//! (phase) starts and ends, when each trigger starts and ends, and the livefs
//! routines tell it about every object installed or removed. Observers never
//! influence the run; they log, render, or record.
//!
//! Implementations shipped here:
//! - [`NullObserver`] - ignores everything
//! - [`LoggingObserver`] - forwards to the `log` facade
//! - [`ConsoleObserver`] - `>>>`/`<<<` lines on a terminal
//! - [`RecordingObserver`] - keeps every event for later inspection
//!
//! [`PhaseGuard`] and [`with_phase`] pair every `phase_start` with a
//! `phase_end`, on every exit path.

use std::fmt;
use std::rc::Rc;

use crate::changeset::FsObject;
use crate::error::Result;
use crate::trigger::Trigger;

pub mod console;
pub mod logging;
pub mod recording;

pub use console::ConsoleObserver;
pub use logging::LoggingObserver;
pub use recording::{ObserverEvent, RecordingObserver};

/// Outcome of a phase, reported through `phase_end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Every trigger completed cleanly.
    Success,
    /// The phase completed, but this many triggers raised warnings.
    Warned(usize),
    /// The phase was aborted by a fatal error (or a panic).
    Failed,
}

impl PhaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, PhaseStatus::Failed)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Success => write!(f, "ok"),
            PhaseStatus::Warned(1) => write!(f, "1 warning"),
            PhaseStatus::Warned(n) => write!(f, "{} warnings", n),
            PhaseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Capability set every observer must provide.
pub trait Observer {
    fn phase_start(&self, phase: &str);
    fn phase_end(&self, phase: &str, status: &PhaseStatus);
    fn trigger_start(&self, hook: &str, trigger: &Trigger);
    fn trigger_end(&self, hook: &str, trigger: &Trigger);
    fn installing_fs_obj(&self, obj: &FsObject);
    fn removing_fs_obj(&self, obj: &FsObject);
}

impl<O: Observer + ?Sized> Observer for Rc<O> {
    fn phase_start(&self, phase: &str) {
        (**self).phase_start(phase)
    }

    fn phase_end(&self, phase: &str, status: &PhaseStatus) {
        (**self).phase_end(phase, status)
    }

    fn trigger_start(&self, hook: &str, trigger: &Trigger) {
        (**self).trigger_start(hook, trigger)
    }

    fn trigger_end(&self, hook: &str, trigger: &Trigger) {
        (**self).trigger_end(hook, trigger)
    }

    fn installing_fs_obj(&self, obj: &FsObject) {
        (**self).installing_fs_obj(obj)
    }

    fn removing_fs_obj(&self, obj: &FsObject) {
        (**self).removing_fs_obj(obj)
    }
}

/// Observer that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn phase_start(&self, _phase: &str) {}
    fn phase_end(&self, _phase: &str, _status: &PhaseStatus) {}
    fn trigger_start(&self, _hook: &str, _trigger: &Trigger) {}
    fn trigger_end(&self, _hook: &str, _trigger: &Trigger) {}
    fn installing_fs_obj(&self, _obj: &FsObject) {}
    fn removing_fs_obj(&self, _obj: &FsObject) {}
}

/// Scoped phase notification.
///
/// `phase_start` fires on creation; `phase_end` fires when the guard is
/// dropped. A guard dropped without [`PhaseGuard::finish`] (early `?`
/// return, panic) reports [`PhaseStatus::Failed`].
pub struct PhaseGuard<'a> {
    observer: &'a dyn Observer,
    phase: String,
    status: Option<PhaseStatus>,
}

impl<'a> PhaseGuard<'a> {
    pub fn start(observer: &'a dyn Observer, phase: &str) -> Self {
        observer.phase_start(phase);
        Self {
            observer,
            phase: phase.to_string(),
            status: None,
        }
    }

    /// Close the phase with an explicit status.
    pub fn finish(mut self, status: PhaseStatus) {
        self.status = Some(status);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let status = self.status.take().unwrap_or(PhaseStatus::Failed);
        self.observer.phase_end(&self.phase, &status);
    }
}

/// Run `work` inside a phase: notify, call, then notify again whatever happens.
pub fn with_phase<T, F>(observer: &dyn Observer, phase: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let guard = PhaseGuard::start(observer, phase);
    let ret = work()?;
    guard.finish(PhaseStatus::Success);
    Ok(ret)
}
