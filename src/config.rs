//! # Merge Configuration
//!
//! [`MergeConfig`] holds the environment-specific identifiers the built-in
//! triggers need: which uid/gid counts as the build owner and what it is
//! replaced with, where the dynamic linker configuration lives, and which
//! command refreshes the linker cache.
//!
//! Every field is optional in the YAML form and falls back to the values in
//! [`crate::defaults`]:
//!
//! ```yaml
//! default_uid: 250
//! default_gid: 250
//! replacement_uid: 0
//! replacement_gid: 0
//! ld_so_conf: etc/ld.so.conf
//! ldconfig: /sbin/ldconfig
//! ```
//!
//! Nothing here is global; the engine and trigger factories take the values
//! they need explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::triggers::{IdFixup, LdconfigOptions};

/// Identifiers injected into the built-in triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Uid to rewrite during `pre_merge`
    pub default_uid: u32,
    /// Gid to rewrite during `pre_merge`
    pub default_gid: u32,
    pub replacement_uid: u32,
    pub replacement_gid: u32,
    /// Linker configuration file, relative to the offset
    pub ld_so_conf: PathBuf,
    /// Linker cache refresh command
    pub ldconfig: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_uid: defaults::BUILD_UID,
            default_gid: defaults::BUILD_GID,
            replacement_uid: defaults::ROOT_UID,
            replacement_gid: defaults::ROOT_GID,
            ld_so_conf: PathBuf::from(defaults::LD_SO_CONF),
            ldconfig: PathBuf::from(defaults::LDCONFIG),
        }
    }
}

impl MergeConfig {
    pub fn uid_fixup(&self) -> IdFixup {
        IdFixup {
            default: self.default_uid,
            replacement: self.replacement_uid,
        }
    }

    pub fn gid_fixup(&self) -> IdFixup {
        IdFixup {
            default: self.default_gid,
            replacement: self.replacement_gid,
        }
    }

    pub fn ldconfig_options(&self) -> LdconfigOptions {
        LdconfigOptions {
            ld_so_conf: self.ld_so_conf.clone(),
            ldconfig: self.ldconfig.clone(),
        }
    }
}

/// Parse a YAML configuration string.
pub fn parse(yaml: &str) -> Result<MergeConfig> {
    if yaml.trim().is_empty() {
        return Ok(MergeConfig::default());
    }
    let config: MergeConfig = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
    })?;
    if config.ld_so_conf.is_absolute() {
        return Err(Error::ConfigParse {
            message: format!(
                "ld_so_conf must be relative to the merge offset, got {}",
                config.ld_so_conf.display()
            ),
        });
    }
    Ok(config)
}

/// Load configuration from a YAML file.
pub fn from_file(path: &Path) -> Result<MergeConfig> {
    let content = fs::read_to_string(path)?;
    parse(&content)
}
