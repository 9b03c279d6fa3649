//! Built-in triggers
//!
//! Factories returning pre-configured [`Trigger`]s for the work every merge
//! needs:
//!
//! - [`merge_trigger`] / [`unmerge_trigger`]: apply or remove a change-set on
//!   the livefs through the `fs_ops` plugins
//! - [`ldconfig_trigger`]: refresh the dynamic linker cache when libraries
//!   were touched
//! - [`fix_default_uid`] / [`fix_default_gid`]: hand files owned by the build
//!   user or group over to the replacement owner before they are placed
//!
//! Configurable values are passed in as small value structs ([`IdFixup`],
//! [`LdconfigOptions`]) and moved into the trigger body.

use std::fs;
use std::path::PathBuf;

use log::{debug, info};

use crate::changeset::{AttrChange, ChangeSet, FsObject};
use crate::defaults;
use crate::engine::EngineContext;
use crate::error::{Error, Result};
use crate::plugins::{FS_OPS, MERGE_CONTENTS, UNMERGE_CONTENTS};
use crate::spawn::passthrough_stdio;
use crate::trigger::Trigger;

/// Trigger that copies a change-set onto the livefs.
pub fn merge_trigger(cset: &str) -> Result<Trigger> {
    Trigger::simple("livefs-merge", cset, |ctx, cset| {
        let merge_contents = ctx.get_plugin(FS_OPS, MERGE_CONTENTS)?;
        merge_contents(ctx, cset)
    })
}

/// Trigger that removes a change-set from the livefs.
pub fn unmerge_trigger(cset: &str) -> Result<Trigger> {
    Trigger::simple("livefs-unmerge", cset, |ctx, cset| {
        let unmerge_contents = ctx.get_plugin(FS_OPS, UNMERGE_CONTENTS)?;
        unmerge_contents(ctx, cset)
    })
}

/// Where the linker configuration lives and how to refresh the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdconfigOptions {
    /// Relative to the merge offset
    pub ld_so_conf: PathBuf,
    pub ldconfig: PathBuf,
}

impl Default for LdconfigOptions {
    fn default() -> Self {
        Self {
            ld_so_conf: PathBuf::from(defaults::LD_SO_CONF),
            ldconfig: PathBuf::from(defaults::LDCONFIG),
        }
    }
}

fn looks_like_library(obj: &FsObject) -> bool {
    if obj.location.to_string_lossy().ends_with(".so") {
        return true;
    }
    obj.basename()
        .is_some_and(|name| name.to_lowercase().starts_with("lib"))
}

/// Whether any regular file in `cset` looks like a shared library.
///
/// Coarse on purpose: `libtool` trips it too.
pub fn needs_ldconfig(cset: &ChangeSet) -> bool {
    cset.iter_files().any(looks_like_library)
}

/// Refresh the linker cache beneath the offset if `cset` touched libraries.
///
/// Makes sure the linker configuration file exists first, always beneath
/// the offset even when configured as an absolute path. A nonzero exit
/// from the refresh command is a `TriggerWarning`.
pub fn run_ldconfig(ctx: &EngineContext<'_>, cset: &ChangeSet, options: &LdconfigOptions) -> Result<()> {
    if !needs_ldconfig(cset) {
        debug!("ldconfig: no libraries touched, skipping");
        return Ok(());
    }

    let root = ctx.root();
    let conf = ctx.livefs_path(&options.ld_so_conf);
    if let Some(dir) = conf.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    if !conf.exists() {
        fs::File::create(&conf)?;
    }

    let argv = vec![
        options.ldconfig.to_string_lossy().into_owned(),
        "-r".to_string(),
        root.to_string_lossy().into_owned(),
    ];
    info!("running {}", argv.join(" "));
    let ret = ctx.spawner().spawn(&argv, &passthrough_stdio())?;
    if ret != 0 {
        return Err(Error::warning(format!("ldconfig returned {} from execution", ret)));
    }
    Ok(())
}

/// Trigger running [`run_ldconfig`] over `cset`.
pub fn ldconfig_trigger(cset: &str, options: LdconfigOptions) -> Result<Trigger> {
    Trigger::simple("ldconfig", cset, move |ctx, cset| run_ldconfig(ctx, cset, &options))
}

/// Replace one owner id with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFixup {
    pub default: u32,
    pub replacement: u32,
}

impl IdFixup {
    /// Rewrite every object owned by uid `default`; returns how many changed.
    pub fn apply_uid(&self, cset: &mut ChangeSet) -> usize {
        let default = self.default;
        cset.replace_where(|obj| obj.uid == default, &AttrChange::uid(self.replacement))
    }

    /// Rewrite every object owned by gid `default`; returns how many changed.
    pub fn apply_gid(&self, cset: &mut ChangeSet) -> usize {
        let default = self.default;
        cset.replace_where(|obj| obj.gid == default, &AttrChange::gid(self.replacement))
    }
}

pub fn fix_default_uid(fixup: IdFixup, cset: &str) -> Result<Trigger> {
    Trigger::simple("fix-default-uid", cset, move |_, cset| {
        let changed = fixup.apply_uid(cset);
        debug!(
            "uid {} -> {} on {} object(s)",
            fixup.default, fixup.replacement, changed
        );
        Ok(())
    })
}

pub fn fix_default_gid(fixup: IdFixup, cset: &str) -> Result<Trigger> {
    Trigger::simple("fix-default-gid", cset, move |_, cset| {
        let changed = fixup.apply_gid(cset);
        debug!(
            "gid {} -> {} on {} object(s)",
            fixup.default, fixup.replacement, changed
        );
        Ok(())
    })
}
