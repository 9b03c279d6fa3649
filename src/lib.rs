//! # Package Merge Library
//!
//! This library provides the filesystem merge machinery a package manager
//! needs when it installs, removes or replaces a package: typed change-sets
//! describing filesystem objects, triggers that inspect and act on them, and
//! an engine that fires triggers at named hooks in a fixed order.
//!
//! ## Quick Example
//!
//! ```
//! use pkgmerge::changeset::{ChangeSet, ChangeSets, FsObject};
//! use pkgmerge::engine::MergeEngine;
//! use pkgmerge::trigger::Trigger;
//!
//! let csets = ChangeSets::new().with(
//!     "install",
//!     ChangeSet::from(vec![FsObject::file("usr/bin/hello").with_owner(250, 250)]),
//! );
//!
//! let engine = MergeEngine::new(csets, ["pre_merge"])
//!     .unwrap()
//!     .with_trigger(
//!         "pre_merge",
//!         Trigger::simple("count", "install", |_, cset| {
//!             assert_eq!(cset.len(), 1);
//!             Ok(())
//!         })
//!         .unwrap(),
//!     )
//!     .unwrap();
//!
//! let report = engine.run().unwrap();
//! assert!(report.is_clean());
//! ```
//!
//! ## Core Concepts
//!
//! - **Change-sets (`changeset`)**: Ordered, location-keyed sets of
//!   filesystem objects, plus the labelled collection an engine works on.
//! - **Triggers (`trigger`, `triggers`)**: Named actions over one or more
//!   labelled change-sets, with pluggable registration strategies. The
//!   built-in triggers fix default ownership, merge and unmerge the livefs,
//!   and refresh the dynamic linker cache.
//! - **Hooks (`hook`)**: Ordered trigger lists, sealed once fired.
//! - **Engine (`engine`)**: Runs hooks in order under an observer, records
//!   warnings, and aborts on the first fatal error.
//! - **Observers (`observer`)**: Receive phase, trigger and per-object
//!   progress events.
//! - **Collaborators (`spawn`, `plugins`, `fs_ops`)**: Process spawning and
//!   the `fs_ops` content operations triggers look up by name.
//! - **Configuration (`config`, `defaults`)**: Build ids, linker settings,
//!   well-known labels and hook names.

pub mod changeset;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod fs_ops;
pub mod hook;
pub mod observer;
pub mod plugins;
pub mod spawn;
pub mod trigger;
pub mod triggers;

pub use changeset::{ChangeSet, ChangeSets, FsKind, FsObject};
pub use engine::{MergeEngine, MergeReport};
pub use error::{Error, Result};
pub use trigger::Trigger;

#[cfg(test)]
mod changeset_proptest;
