//! Change-sets: ordered collections of filesystem object records
//!
//! A [`ChangeSet`] holds the filesystem objects relevant to one stage of a
//! merge (`new_cset`, `install`, `uninstall`, `modifying`, ...), keyed by
//! location. Locations are unique within a change-set and iteration follows
//! insertion order, which keeps logs and observer output deterministic.
//!
//! Objects are plain values. Attribute rewrites produce a new [`FsObject`]
//! through [`FsObject::change_attributes`], and the caller writes the
//! result back with [`ChangeSet::update`].

use crate::error::Result;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

/// The type of a filesystem object, with any type-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FsKind {
    File,
    Dir,
    Symlink { target: PathBuf },
    Fifo,
    Device { block: bool, major: u32, minor: u32 },
}

impl FsKind {
    fn default_mode(&self) -> u32 {
        match self {
            FsKind::File => 0o644,
            FsKind::Dir => 0o755,
            FsKind::Symlink { .. } => 0o777,
            FsKind::Fifo | FsKind::Device { .. } => 0o600,
        }
    }

    /// Short name used in observer and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FsKind::File => "file",
            FsKind::Dir => "dir",
            FsKind::Symlink { .. } => "sym",
            FsKind::Fifo => "fifo",
            FsKind::Device { .. } => "dev",
        }
    }
}

/// Where the content of a regular file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Copy from a path on the build host (usually inside the image directory).
    Path(PathBuf),
    /// Inline content.
    Bytes(Vec<u8>),
}

/// A single filesystem object record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsObject {
    /// Absolute location relative to the merge offset; normalized on insert
    pub location: PathBuf,
    #[serde(flatten)]
    pub kind: FsKind,
    pub uid: u32,
    pub gid: u32,
    /// Permission bits (no file-type bits)
    pub mode: u32,
    /// Content reference; only meaningful for regular files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSource>,
}

impl FsObject {
    /// Create a record of the given kind with root ownership and the kind's default mode.
    pub fn new<P: AsRef<Path>>(location: P, kind: FsKind) -> Self {
        Self {
            location: normalize_location(location.as_ref()),
            mode: kind.default_mode(),
            kind,
            uid: 0,
            gid: 0,
            data: None,
        }
    }

    pub fn file<P: AsRef<Path>>(location: P) -> Self {
        Self::new(location, FsKind::File)
    }

    pub fn dir<P: AsRef<Path>>(location: P) -> Self {
        Self::new(location, FsKind::Dir)
    }

    pub fn symlink<P: AsRef<Path>, T: AsRef<Path>>(location: P, target: T) -> Self {
        Self::new(
            location,
            FsKind::Symlink {
                target: target.as_ref().to_path_buf(),
            },
        )
    }

    pub fn fifo<P: AsRef<Path>>(location: P) -> Self {
        Self::new(location, FsKind::Fifo)
    }

    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o7777;
        self
    }

    pub fn with_data(mut self, data: DataSource) -> Self {
        self.data = Some(data);
        self
    }

    /// Shorthand for inline file content.
    pub fn with_bytes(self, content: impl Into<Vec<u8>>) -> Self {
        self.with_data(DataSource::Bytes(content.into()))
    }

    /// Return a copy of this object with the given attributes replaced.
    pub fn change_attributes(&self, change: &AttrChange) -> FsObject {
        let mut changed = self.clone();
        if let Some(uid) = change.uid {
            changed.uid = uid;
        }
        if let Some(gid) = change.gid {
            changed.gid = gid;
        }
        if let Some(mode) = change.mode {
            changed.mode = mode & 0o7777;
        }
        changed
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, FsKind::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, FsKind::Dir)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, FsKind::Symlink { .. })
    }

    /// Final path component, if it is valid UTF-8.
    pub fn basename(&self) -> Option<&str> {
        self.location.file_name().and_then(|name| name.to_str())
    }

    /// Size of inline content; `None` when the content lives elsewhere.
    pub fn size(&self) -> Option<u64> {
        match &self.data {
            Some(DataSource::Bytes(bytes)) => Some(bytes.len() as u64),
            _ => None,
        }
    }
}

impl std::fmt::Display for FsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FsKind::Symlink { target } => write!(
                f,
                "sym:{} -> {}",
                self.location.display(),
                target.display()
            ),
            kind => write!(f, "{}:{}", kind.as_str(), self.location.display()),
        }
    }
}

/// A set of attribute replacements; `None` leaves the attribute alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrChange {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

impl AttrChange {
    pub fn uid(uid: u32) -> Self {
        Self {
            uid: Some(uid),
            ..Self::default()
        }
    }

    pub fn gid(gid: u32) -> Self {
        Self {
            gid: Some(gid),
            ..Self::default()
        }
    }

    pub fn mode(mode: u32) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }
}

/// Normalize a location to an absolute path with no `.` or `..` components.
///
/// `..` never climbs above the root, so a normalized location always stays
/// beneath whatever offset it is later joined onto.
pub fn normalize_location(location: &Path) -> PathBuf {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in location.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut normalized = PathBuf::from("/");
    normalized.extend(parts);
    normalized
}

/// Insertion-ordered collection of [`FsObject`]s keyed by location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<FsObject>", into = "Vec<FsObject>")]
pub struct ChangeSet {
    entries: Vec<FsObject>,
    index: HashMap<PathBuf, usize>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, replacing (in place) any object at the same location.
    ///
    /// Returns the replaced object, if any.
    pub fn insert(&mut self, mut obj: FsObject) -> Option<FsObject> {
        obj.location = normalize_location(&obj.location);
        match self.index.get(&obj.location) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos], obj)),
            None => {
                self.index.insert(obj.location.clone(), self.entries.len());
                self.entries.push(obj);
                None
            }
        }
    }

    /// Remove the object at `location`.
    pub fn remove<P: AsRef<Path>>(&mut self, location: P) -> Option<FsObject> {
        let location = normalize_location(location.as_ref());
        let pos = self.index.remove(&location)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get<P: AsRef<Path>>(&self, location: P) -> Option<&FsObject> {
        let location = normalize_location(location.as_ref());
        self.index.get(&location).map(|&pos| &self.entries[pos])
    }

    pub fn contains<P: AsRef<Path>>(&self, location: P) -> bool {
        self.get(location).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FsObject> {
        self.entries.iter()
    }

    /// Iterate over regular files only.
    pub fn iter_files(&self) -> impl Iterator<Item = &FsObject> {
        self.entries.iter().filter(|obj| obj.is_file())
    }

    pub fn iter_dirs(&self) -> impl Iterator<Item = &FsObject> {
        self.entries.iter().filter(|obj| obj.is_dir())
    }

    pub fn iter_symlinks(&self) -> impl Iterator<Item = &FsObject> {
        self.entries.iter().filter(|obj| obj.is_symlink())
    }

    pub fn locations(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|obj| obj.location.as_path())
    }

    /// Set-union update: objects replace same-location entries, others are appended.
    pub fn update<I: IntoIterator<Item = FsObject>>(&mut self, objects: I) {
        for obj in objects {
            self.insert(obj);
        }
    }

    /// Apply `change` to every object matching `predicate` as one bulk update.
    ///
    /// The replacements are computed before anything is written back, so the
    /// predicate always sees the original objects. Returns how many objects
    /// were rewritten.
    pub fn replace_where<F>(&mut self, predicate: F, change: &AttrChange) -> usize
    where
        F: Fn(&FsObject) -> bool,
    {
        let resets: Vec<FsObject> = self
            .entries
            .iter()
            .filter(|obj| predicate(obj))
            .map(|obj| obj.change_attributes(change))
            .collect();
        let count = resets.len();
        self.update(resets);
        count
    }

    /// Objects whose location matches a glob pattern.
    ///
    /// Relative patterns are anchored at the root, so `usr/lib/*.so` and
    /// `/usr/lib/*.so` are equivalent.
    pub fn matching(&self, pattern: &str) -> Result<Vec<&FsObject>> {
        let anchored = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            format!("/{}", pattern)
        };
        let pattern = Pattern::new(&anchored)?;
        Ok(self
            .entries
            .iter()
            .filter(|obj| pattern.matches_path(&obj.location))
            .collect())
    }

    /// Objects in `self` whose location is absent from `other`.
    pub fn difference(&self, other: &ChangeSet) -> ChangeSet {
        self.entries
            .iter()
            .filter(|obj| !other.index.contains_key(&obj.location))
            .cloned()
            .collect()
    }

    /// Objects in `self` whose location is also present in `other`.
    pub fn intersection(&self, other: &ChangeSet) -> ChangeSet {
        self.entries
            .iter()
            .filter(|obj| other.index.contains_key(&obj.location))
            .cloned()
            .collect()
    }
}

impl PartialEq for ChangeSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ChangeSet {}

impl FromIterator<FsObject> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = FsObject>>(iter: I) -> Self {
        let mut cset = ChangeSet::new();
        cset.update(iter);
        cset
    }
}

impl Extend<FsObject> for ChangeSet {
    fn extend<I: IntoIterator<Item = FsObject>>(&mut self, iter: I) {
        self.update(iter);
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FsObject;
    type IntoIter = std::slice::Iter<'a, FsObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl From<Vec<FsObject>> for ChangeSet {
    fn from(objects: Vec<FsObject>) -> Self {
        objects.into_iter().collect()
    }
}

impl From<ChangeSet> for Vec<FsObject> {
    fn from(cset: ChangeSet) -> Self {
        cset.entries
    }
}

/// Labelled change-sets for one merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSets {
    sets: BTreeMap<String, ChangeSet>,
}

impl ChangeSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, label: impl Into<String>, cset: ChangeSet) -> Self {
        self.insert(label, cset);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, cset: ChangeSet) -> Option<ChangeSet> {
        self.sets.insert(label.into(), cset)
    }

    pub fn get(&self, label: &str) -> Option<&ChangeSet> {
        self.sets.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut ChangeSet> {
        self.sets.get_mut(label)
    }

    pub fn remove(&mut self, label: &str) -> Option<ChangeSet> {
        self.sets.remove(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.sets.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChangeSet)> {
        self.sets.iter().map(|(label, cset)| (label.as_str(), cset))
    }

    /// Borrow several distinct change-sets mutably at once.
    ///
    /// Labels that are not present are simply absent from the result.
    pub fn select_mut<'a>(&'a mut self, labels: &[String]) -> BTreeMap<&'a str, &'a mut ChangeSet> {
        self.sets
            .iter_mut()
            .filter(|(label, _)| labels.iter().any(|wanted| wanted == *label))
            .map(|(label, cset)| (label.as_str(), cset))
            .collect()
    }
}

impl<L: Into<String>> FromIterator<(L, ChangeSet)> for ChangeSets {
    fn from_iter<I: IntoIterator<Item = (L, ChangeSet)>>(iter: I) -> Self {
        let mut sets = ChangeSets::new();
        for (label, cset) in iter {
            sets.insert(label, cset);
        }
        sets
    }
}
