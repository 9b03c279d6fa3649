//! Livefs content operations
//!
//! These are the routines the stock `fs_ops` plugins point at:
//!
//! - [`merge_contents`] places every object of a change-set beneath the
//!   engine offset. Directories go first, shallowest first, then everything
//!   else in change-set order.
//! - [`unmerge_contents`] removes a change-set's objects. Non-directories
//!   first, then directories deepest first; a directory is only removed when
//!   empty, since other packages may still own entries in it.
//! - [`scan_livefs`] builds a change-set from an on-disk tree.
//!
//! Ownership is applied best-effort: without the privilege to chown, the
//! failure is logged and the merge continues. Device and fifo nodes cannot be
//! created here and are rejected.

use std::cmp::Reverse;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{lchown, symlink, FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::changeset::{ChangeSet, DataSource, FsKind, FsObject};
use crate::engine::EngineContext;
use crate::error::{Error, Result};

fn depth(obj: &FsObject) -> usize {
    obj.location.components().count()
}

/// Apply `cset` to the livefs beneath the engine offset.
pub fn merge_contents(ctx: &EngineContext<'_>, cset: &ChangeSet) -> Result<()> {
    let mut dirs: Vec<&FsObject> = cset.iter_dirs().collect();
    dirs.sort_by_key(|obj| depth(obj));

    for obj in dirs.into_iter().chain(cset.iter().filter(|obj| !obj.is_dir())) {
        ctx.observer().installing_fs_obj(obj);
        let dest = ctx.livefs_path(&obj.location);
        merge_obj(obj, &dest)?;
    }
    Ok(())
}

fn merge_obj(obj: &FsObject, dest: &Path) -> Result<()> {
    match &obj.kind {
        FsKind::Dir => {
            match fs::symlink_metadata(dest) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    // A symlink to a directory (lib -> lib64) stands in for the directory.
                    if fs::metadata(dest).is_ok_and(|target| target.is_dir()) {
                        debug!("{} is a symlink to a directory, keeping it", dest.display());
                        return Ok(());
                    }
                    return Err(Error::Filesystem {
                        message: format!(
                            "Refusing to replace symlink '{}' with {}",
                            dest.display(),
                            obj
                        ),
                    });
                }
                Ok(meta) if !meta.is_dir() => {
                    return Err(Error::Filesystem {
                        message: format!(
                            "Refusing to replace non-directory '{}' with {}",
                            dest.display(),
                            obj
                        ),
                    });
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            fs::create_dir_all(dest).map_err(|e| Error::Filesystem {
                message: format!("Failed to create directory '{}': {}", dest.display(), e),
            })?;
            apply_owner(obj, dest)?;
            set_mode(obj, dest)?;
        }
        FsKind::File => {
            prepare_slot(obj, dest)?;
            match &obj.data {
                Some(DataSource::Path(source)) => {
                    fs::copy(source, dest).map_err(|e| Error::Filesystem {
                        message: format!(
                            "Failed to copy '{}' to '{}': {}",
                            source.display(),
                            dest.display(),
                            e
                        ),
                    })?;
                }
                Some(DataSource::Bytes(bytes)) => write_file(dest, bytes)?,
                None => write_file(dest, &[])?,
            }
            apply_owner(obj, dest)?;
            set_mode(obj, dest)?;
        }
        FsKind::Symlink { target } => {
            prepare_slot(obj, dest)?;
            symlink(target, dest).map_err(|e| Error::Filesystem {
                message: format!(
                    "Failed to create symlink '{}' -> '{}': {}",
                    dest.display(),
                    target.display(),
                    e
                ),
            })?;
            apply_owner(obj, dest)?;
        }
        FsKind::Fifo | FsKind::Device { .. } => {
            return Err(Error::Filesystem {
                message: format!("Cannot create {} node '{}'", obj.kind.as_str(), dest.display()),
            });
        }
    }
    Ok(())
}

fn write_file(dest: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(dest, bytes).map_err(|e| Error::Filesystem {
        message: format!("Failed to write file '{}': {}", dest.display(), e),
    })
}

/// Make room for a non-directory at `dest`: create parents, clear whatever is there.
fn prepare_slot(obj: &FsObject, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
            message: format!("Failed to create directory '{}': {}", parent.display(), e),
        })?;
    }
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => Err(Error::Filesystem {
            message: format!("Refusing to replace directory '{}' with {}", dest.display(), obj),
        }),
        Ok(_) => Ok(fs::remove_file(dest)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn set_mode(obj: &FsObject, dest: &Path) -> Result<()> {
    fs::set_permissions(dest, fs::Permissions::from_mode(obj.mode)).map_err(|e| Error::Filesystem {
        message: format!("Failed to set permissions on '{}': {}", dest.display(), e),
    })
}

fn apply_owner(obj: &FsObject, dest: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(dest)?;
    if meta.uid() == obj.uid && meta.gid() == obj.gid {
        return Ok(());
    }
    match lchown(dest, Some(obj.uid), Some(obj.gid)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!(
                "not permitted to set owner {}:{} on '{}'",
                obj.uid,
                obj.gid,
                dest.display()
            );
            Ok(())
        }
        Err(e) => Err(Error::Filesystem {
            message: format!("Failed to set owner on '{}': {}", dest.display(), e),
        }),
    }
}

/// Remove `cset` from the livefs beneath the engine offset.
pub fn unmerge_contents(ctx: &EngineContext<'_>, cset: &ChangeSet) -> Result<()> {
    for obj in cset.iter().filter(|obj| !obj.is_dir()) {
        ctx.observer().removing_fs_obj(obj);
        let dest = ctx.livefs_path(&obj.location);
        match fs::symlink_metadata(&dest) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} already gone", dest.display());
            }
            Err(e) => return Err(e.into()),
            Ok(meta) if meta.is_dir() => {
                warn!("{} is a directory on the livefs, leaving it", dest.display());
            }
            Ok(_) => fs::remove_file(&dest).map_err(|e| Error::Filesystem {
                message: format!("Failed to remove '{}': {}", dest.display(), e),
            })?,
        }
    }

    let mut dirs: Vec<&FsObject> = cset.iter_dirs().collect();
    dirs.sort_by_key(|obj| Reverse(depth(obj)));
    for obj in dirs {
        if obj.location == Path::new("/") {
            continue;
        }
        ctx.observer().removing_fs_obj(obj);
        let dest = ctx.livefs_path(&obj.location);
        match fs::symlink_metadata(&dest) {
            Ok(meta) if meta.is_dir() => match fs::remove_dir(&dest) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
                    debug!("{} not empty, keeping", dest.display());
                }
                Err(e) => {
                    return Err(Error::Filesystem {
                        message: format!("Failed to remove directory '{}': {}", dest.display(), e),
                    })
                }
            },
            Ok(_) => debug!("{} is no longer a directory, leaving it", dest.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn split_rdev(rdev: u64) -> (u32, u32) {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff);
    let minor = (rdev & 0xff) | ((rdev >> 12) & !0xff);
    (major as u32, minor as u32)
}

/// Record every object beneath `root` as a change-set.
///
/// Locations are relative to `root`, files reference their on-disk path as
/// content, and entries are visited in file-name order.
pub fn scan_livefs(root: &Path) -> Result<ChangeSet> {
    let mut cset = ChangeSet::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let meta = entry.metadata()?;
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FsKind::Dir
        } else if file_type.is_symlink() {
            FsKind::Symlink {
                target: fs::read_link(entry.path())?,
            }
        } else if file_type.is_fifo() {
            FsKind::Fifo
        } else if file_type.is_block_device() || file_type.is_char_device() {
            let (major, minor) = split_rdev(meta.rdev());
            FsKind::Device {
                block: file_type.is_block_device(),
                major,
                minor,
            }
        } else {
            FsKind::File
        };

        let relative = entry.path().strip_prefix(root).map_err(|e| Error::Filesystem {
            message: format!("{} escaped scan root: {}", entry.path().display(), e),
        })?;
        let mut obj = FsObject::new(PathBuf::from("/").join(relative), kind)
            .with_owner(meta.uid(), meta.gid())
            .with_mode(meta.mode());
        if obj.is_file() {
            obj = obj.with_data(DataSource::Path(entry.path().to_path_buf()));
        }
        cset.insert(obj);
    }
    Ok(cset)
}
