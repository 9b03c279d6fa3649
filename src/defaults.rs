//! Default values and well-known names.
//!
//! This module centralizes the identifiers the built-in triggers and standard
//! pipelines fall back to when no configuration overrides them, plus the
//! change-set labels and hook names shared between them.

/// Uid of the unprivileged build user; files it owns are handed to root on merge.
pub const BUILD_UID: u32 = 250;
/// Gid of the unprivileged build group.
pub const BUILD_GID: u32 = 250;
pub const ROOT_UID: u32 = 0;
pub const ROOT_GID: u32 = 0;

/// Dynamic linker configuration file, relative to the merge offset.
pub const LD_SO_CONF: &str = "etc/ld.so.conf";
/// Dynamic linker cache refresh command.
pub const LDCONFIG: &str = "/sbin/ldconfig";

// Change-set labels
pub const NEW_CSET: &str = "new_cset";
pub const OLD_CSET: &str = "old_cset";
pub const INSTALL: &str = "install";
pub const UNINSTALL: &str = "uninstall";
pub const MODIFYING: &str = "modifying";

// Hook names
pub const PRE_MERGE: &str = "pre_merge";
pub const MERGE: &str = "merge";
pub const POST_MERGE: &str = "post_merge";
pub const PRE_UNMERGE: &str = "pre_unmerge";
pub const UNMERGE: &str = "unmerge";
pub const POST_UNMERGE: &str = "post_unmerge";
