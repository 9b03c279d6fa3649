//! Shared test utilities for integration tests.
//!
//! This module provides a fake process spawner, an image/root fixture pair,
//! and object builders to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = MergeFixture::new().with_image_file("usr/bin/hello", "#!/bin/sh\n");
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pkgmerge::changeset::{DataSource, FsObject};
use pkgmerge::spawn::{FdRedirects, Spawner};
use pkgmerge::Result;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::init_logging;
    #[allow(unused_imports)]
    pub use super::FakeSpawner;
    pub use super::MergeFixture;
}

/// Route `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A [`Spawner`] that records every argv and answers with a fixed exit code.
///
/// Clones share the same call log, so a test can hand one clone to the
/// engine and inspect the other afterwards.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    exit_code: i32,
    calls: Rc<RefCell<Vec<Vec<String>>>>,
}

#[allow(dead_code)]
impl FakeSpawner {
    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            calls: Rc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, argv: &[String], _fd_pipes: &FdRedirects) -> Result<i32> {
        self.calls.borrow_mut().push(argv.to_vec());
        Ok(self.exit_code)
    }
}

/// A build image directory and an empty root to merge it into.
///
/// Files added with [`MergeFixture::with_image_file`] are written into the
/// image and recorded as change-set objects pointing back at it, owned by
/// the current user so merges never need privileges.
pub struct MergeFixture {
    image: assert_fs::TempDir,
    root: assert_fs::TempDir,
    objects: Vec<FsObject>,
}

#[allow(dead_code)]
impl MergeFixture {
    pub fn new() -> Self {
        Self {
            image: assert_fs::TempDir::new().expect("Failed to create image directory"),
            root: assert_fs::TempDir::new().expect("Failed to create root directory"),
            objects: Vec::new(),
        }
    }

    /// Add a directory record.
    pub fn with_dir(mut self, location: &str) -> Self {
        let obj = self.owned(FsObject::dir(location));
        self.objects.push(obj);
        self
    }

    /// Write a file into the image and record it.
    pub fn with_image_file(mut self, location: &str, content: &str) -> Self {
        let child = self.image.child(location);
        child.write_str(content).expect("Failed to write image file");
        let obj = self.owned(FsObject::file(location).with_data(DataSource::Path(child.path().to_path_buf())));
        self.objects.push(obj);
        self
    }

    /// Add a symlink record.
    pub fn with_symlink(mut self, location: &str, target: &str) -> Self {
        let obj = self.owned(FsObject::symlink(location, target));
        self.objects.push(obj);
        self
    }

    /// Add an arbitrary record as is.
    pub fn with_object(mut self, obj: FsObject) -> Self {
        self.objects.push(obj);
        self
    }

    fn owned(&self, obj: FsObject) -> FsObject {
        let (uid, gid) = current_owner(self.root.path());
        obj.with_owner(uid, gid)
    }

    pub fn objects(&self) -> Vec<FsObject> {
        self.objects.clone()
    }

    pub fn root(&self) -> &assert_fs::TempDir {
        &self.root
    }

    pub fn root_path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn image_path(&self) -> &Path {
        self.image.path()
    }
}

impl Default for MergeFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of an existing path, i.e. whoever runs the tests.
pub fn current_owner(path: &Path) -> (u32, u32) {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).expect("Failed to stat path");
    (meta.uid(), meta.gid())
}
