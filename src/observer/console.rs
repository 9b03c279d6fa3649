//! Terminal observer.
//!
//! Prints `>>> obj` for every installed object and `<<< obj` for every
//! removed one, plus phase and trigger boundaries, in the style of a package
//! manager's merge output.
//!
//! ## Colour
//!
//! Colour follows a `--color`-style choice (`always`, `never`, `auto`). In
//! `auto` mode it is disabled when:
//! - `NO_COLOR` is set (any value, including empty)
//! - `CLICOLOR=0` is set
//! - `TERM=dumb` is set
//! - stdout is not a terminal (unless `CLICOLOR_FORCE=1`)

use std::cell::RefCell;
use std::env;
use std::io::{self, Write};

use console::Style;

use super::{Observer, PhaseStatus};
use crate::changeset::FsObject;
use crate::trigger::Trigger;

/// Decide whether to colour output from a choice string and the environment.
pub fn use_color(choice: &str) -> bool {
    match choice.to_lowercase().as_str() {
        "always" => true,
        "never" => false,
        _ => detect_color_support(),
    }
}

fn detect_color_support() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
        return false;
    }
    if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
        return true;
    }
    if env::var("TERM").is_ok_and(|v| v == "dumb") {
        return false;
    }
    console::Term::stdout().features().colors_supported()
}

/// Writes merge progress to a terminal (or any writer).
pub struct ConsoleObserver<W: Write = io::Stdout> {
    out: RefCell<W>,
    install: Style,
    remove: Style,
    phase: Style,
    failed: Style,
    verbose: bool,
}

impl ConsoleObserver<io::Stdout> {
    /// Observer on stdout with colour decided by `color_choice`.
    pub fn stdout(color_choice: &str) -> Self {
        Self::with_writer(io::stdout(), use_color(color_choice))
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn with_writer(out: W, color: bool) -> Self {
        Self {
            out: RefCell::new(out),
            install: Style::new().green().force_styling(color),
            remove: Style::new().red().force_styling(color),
            phase: Style::new().bold().force_styling(color),
            failed: Style::new().red().bold().force_styling(color),
            verbose: false,
        }
    }

    /// Also print trigger start/finish lines.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, text: std::fmt::Arguments<'_>) {
        // Observers cannot fail the run; a closed stdout just loses progress lines.
        let _ = writeln!(self.out.borrow_mut(), "{}", text);
    }
}

impl<W: Write> Observer for ConsoleObserver<W> {
    fn phase_start(&self, phase: &str) {
        self.line(format_args!("starting {}", self.phase.apply_to(phase)));
    }

    fn phase_end(&self, phase: &str, status: &PhaseStatus) {
        let status = if status.is_failure() {
            self.failed.apply_to(status.to_string())
        } else {
            Style::new().apply_to(status.to_string())
        };
        self.line(format_args!(
            "finished {}: {}",
            self.phase.apply_to(phase),
            status
        ));
    }

    fn trigger_start(&self, hook: &str, trigger: &Trigger) {
        if self.verbose {
            self.line(format_args!("hook {}: trigger: starting {}", hook, trigger));
        }
    }

    fn trigger_end(&self, hook: &str, trigger: &Trigger) {
        if self.verbose {
            self.line(format_args!("hook {}: trigger: finished {}", hook, trigger));
        }
    }

    fn installing_fs_obj(&self, obj: &FsObject) {
        self.line(format_args!("{} {}", self.install.apply_to(">>>"), obj));
    }

    fn removing_fs_obj(&self, obj: &FsObject) {
        self.line(format_args!("{} {}", self.remove.apply_to("<<<"), obj));
    }
}
