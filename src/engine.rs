//! # Merge Engine
//!
//! A [`MergeEngine`] drives one merge (or unmerge) operation: it owns the
//! labelled change-sets, the ordered hooks with their triggers, the optional
//! root offset, and the observer, spawner and plugin registry the triggers
//! work through.
//!
//! ## Execution flow
//!
//! 1. **Preflight**: every label every registered trigger needs must either
//!    be present or derivable. Otherwise the run fails with
//!    `MissingChangeSet` before any hook fires.
//! 2. **Hooks**: each hook fires in order inside a phase
//!    (`phase_start`/`phase_end`), its triggers in registration order.
//! 3. **Warnings**: a trigger raising `TriggerWarning` is recorded against its
//!    hook and the run continues.
//! 4. **Fatal errors**: anything else aborts the run. The failing phase still
//!    gets its `phase_end` (status `Failed`), no further hooks fire, and the
//!    livefs is left as the failing trigger left it. There is no rollback.
//!
//! ## Derived change-sets
//!
//! Some labels are computed from others (`install` from `new_cset`,
//! `modifying` from `install` and `uninstall`). A derivation runs lazily the
//! first time a trigger needs its label, so it sees every mutation earlier
//! hooks made to its inputs. The result is cached for the rest of the run.
//!
//! ## Standard pipelines
//!
//! [`MergeEngine::install`], [`MergeEngine::uninstall`] and
//! [`MergeEngine::replace`] build the usual hook order and register the
//! built-in triggers configured from a [`MergeConfig`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use log::info;

use crate::changeset::{ChangeSet, ChangeSets};
use crate::config::MergeConfig;
use crate::defaults;
use crate::error::{Error, Result};
use crate::hook::{Hook, RecordedWarning};
use crate::observer::{NullObserver, Observer, PhaseGuard, PhaseStatus};
use crate::plugins::{ContentOp, PluginRegistry};
use crate::spawn::{ProcessSpawner, Spawner};
use crate::trigger::Trigger;
use crate::triggers;

/// What a trigger body can reach while it runs.
pub struct EngineContext<'a> {
    offset: Option<&'a Path>,
    observer: &'a dyn Observer,
    spawner: &'a dyn Spawner,
    plugins: &'a PluginRegistry,
}

impl<'a> EngineContext<'a> {
    pub fn new(
        offset: Option<&'a Path>,
        observer: &'a dyn Observer,
        spawner: &'a dyn Spawner,
        plugins: &'a PluginRegistry,
    ) -> Self {
        Self {
            offset,
            observer,
            spawner,
            plugins,
        }
    }

    /// The configured offset, if any.
    pub fn offset(&self) -> Option<&Path> {
        self.offset
    }

    /// The filesystem root being merged into: the offset, or `/`.
    pub fn root(&self) -> &Path {
        self.offset.unwrap_or_else(|| Path::new("/"))
    }

    /// Where a change-set location lives on the livefs.
    pub fn livefs_path(&self, location: &Path) -> PathBuf {
        let relative = location.strip_prefix("/").unwrap_or(location);
        self.root().join(relative)
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer
    }

    pub fn spawner(&self) -> &dyn Spawner {
        self.spawner
    }

    pub fn get_plugin(&self, namespace: &str, name: &str) -> Result<ContentOp> {
        self.plugins.get_plugin(namespace, name)
    }
}

type DeriveFn = Box<dyn Fn(&ChangeSets) -> ChangeSet>;

struct Derivation {
    label: String,
    inputs: Vec<String>,
    derive: DeriveFn,
}

/// Change-sets plus the derivations that can fill in missing labels.
pub struct CsetStore {
    sets: ChangeSets,
    derivations: Vec<Derivation>,
}

impl CsetStore {
    pub fn new(sets: ChangeSets) -> Self {
        Self {
            sets,
            derivations: Vec::new(),
        }
    }

    fn add_derivation(&mut self, derivation: Derivation) {
        self.derivations.retain(|d| d.label != derivation.label);
        self.derivations.push(derivation);
    }

    pub fn sets(&self) -> &ChangeSets {
        &self.sets
    }

    pub fn sets_mut(&mut self) -> &mut ChangeSets {
        &mut self.sets
    }

    pub fn into_sets(self) -> ChangeSets {
        self.sets
    }

    /// Whether `label` is present or can be derived from what is present.
    pub fn can_provide(&self, label: &str) -> bool {
        self.can_provide_inner(label, &mut HashSet::new())
    }

    fn can_provide_inner<'s>(&'s self, label: &'s str, visiting: &mut HashSet<&'s str>) -> bool {
        if self.sets.contains(label) {
            return true;
        }
        if !visiting.insert(label) {
            return false;
        }
        let derivable = match self.derivations.iter().find(|d| d.label == label) {
            Some(derivation) => derivation
                .inputs
                .iter()
                .all(|input| self.can_provide_inner(input, visiting)),
            None => false,
        };
        visiting.remove(label);
        derivable
    }

    /// Derive any of `labels` that are missing. Labels that cannot be
    /// derived are left missing for the caller to report.
    pub fn resolve(&mut self, labels: &[String]) {
        for label in labels {
            self.resolve_one(label, 0);
        }
    }

    fn resolve_one(&mut self, label: &str, depth: usize) {
        if self.sets.contains(label) || depth > self.derivations.len() {
            return;
        }
        let Some(pos) = self.derivations.iter().position(|d| d.label == label) else {
            return;
        };
        let inputs = self.derivations[pos].inputs.clone();
        for input in &inputs {
            self.resolve_one(input, depth + 1);
        }
        if inputs.iter().all(|input| self.sets.contains(input)) {
            let derived = (self.derivations[pos].derive)(&self.sets);
            self.sets.insert(label, derived);
        }
    }
}

/// Final status of one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookReport {
    pub name: String,
    pub status: PhaseStatus,
}

/// Outcome of a successful run.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Hook statuses in firing order
    pub hooks: Vec<HookReport>,
    /// Every caught warning, in hook-then-trigger order
    pub warnings: Vec<RecordedWarning>,
    /// Change-sets as the triggers left them (including derived ones)
    pub csets: ChangeSets,
}

impl MergeReport {
    /// True when no trigger raised a warning.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn status_of(&self, hook: &str) -> Option<&PhaseStatus> {
        self.hooks
            .iter()
            .find(|report| report.name == hook)
            .map(|report| &report.status)
    }
}

/// One merge or unmerge operation.
pub struct MergeEngine {
    csets: CsetStore,
    hooks: Vec<Hook>,
    offset: Option<PathBuf>,
    observer: Box<dyn Observer>,
    spawner: Box<dyn Spawner>,
    plugins: PluginRegistry,
}

impl MergeEngine {
    /// Create an engine over `csets` with hooks fired in the given order.
    ///
    /// Hook names must be unique. The engine starts with no offset, a
    /// [`NullObserver`], a [`ProcessSpawner`] and the default plugins.
    pub fn new<I, S>(csets: ChangeSets, hooks: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut built = Vec::new();
        for name in hooks {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(Error::validation("hook name must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::validation(format!("hook '{}' listed twice", name)));
            }
            built.push(Hook::new(name));
        }

        Ok(Self {
            csets: CsetStore::new(csets),
            hooks: built,
            offset: None,
            observer: Box::new(NullObserver),
            spawner: Box::new(ProcessSpawner::new()),
            plugins: PluginRegistry::with_defaults(),
        })
    }

    /// Merge beneath `offset` instead of `/`.
    pub fn with_offset<P: Into<PathBuf>>(mut self, offset: P) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn with_observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_spawner<S: Spawner + 'static>(mut self, spawner: S) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Declare how to compute `label` from `inputs` when a trigger needs it.
    pub fn with_derivation<L, I, S, F>(mut self, label: L, inputs: I, derive: F) -> Self
    where
        L: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&ChangeSets) -> ChangeSet + 'static,
    {
        self.csets.add_derivation(Derivation {
            label: label.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            derive: Box::new(derive),
        });
        self
    }

    pub fn offset(&self) -> Option<&Path> {
        self.offset.as_deref()
    }

    pub fn change_sets(&self) -> &ChangeSets {
        self.csets.sets()
    }

    pub fn hook_names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(Hook::name)
    }

    pub fn hook(&self, name: &str) -> Option<&Hook> {
        self.hooks.iter().find(|hook| hook.name() == name)
    }

    /// Register a trigger into the named hook.
    pub fn register_trigger(&mut self, hook: &str, trigger: Trigger) -> Result<()> {
        self.hooks
            .iter_mut()
            .find(|h| h.name() == hook)
            .ok_or_else(|| Error::UnknownHook {
                hook: hook.to_string(),
            })?
            .register_trigger(trigger)
    }

    /// Builder-style [`MergeEngine::register_trigger`].
    pub fn with_trigger(mut self, hook: &str, trigger: Trigger) -> Result<Self> {
        self.register_trigger(hook, trigger)?;
        Ok(self)
    }

    fn preflight(&self) -> Result<()> {
        for hook in &self.hooks {
            for trigger in hook.triggers() {
                if let Some(label) = trigger
                    .required_csets()
                    .iter()
                    .find(|label| !self.csets.can_provide(label))
                {
                    return Err(Error::MissingChangeSet {
                        hook: hook.name().to_string(),
                        trigger: trigger.name().to_string(),
                        label: label.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Execute every hook in order. Consumes the engine.
    pub fn run(self) -> Result<MergeReport> {
        self.preflight()?;

        let MergeEngine {
            mut csets,
            mut hooks,
            offset,
            observer,
            spawner,
            plugins,
        } = self;
        let ctx = EngineContext::new(offset.as_deref(), observer.as_ref(), spawner.as_ref(), &plugins);
        info!(
            "merge run: {} hooks into {}",
            hooks.len(),
            ctx.root().display()
        );

        let mut report = MergeReport::default();
        for hook in hooks.iter_mut() {
            let guard = PhaseGuard::start(ctx.observer(), hook.name());
            let warnings = hook.fire(&ctx, &mut csets)?;
            let status = if warnings.is_empty() {
                PhaseStatus::Success
            } else {
                PhaseStatus::Warned(warnings.len())
            };
            guard.finish(status.clone());

            report.hooks.push(HookReport {
                name: hook.name().to_string(),
                status,
            });
            report.warnings.extend(warnings);
        }

        info!(
            "merge run finished with {} warning(s)",
            report.warnings.len()
        );
        report.csets = csets.into_sets();
        Ok(report)
    }

    /// Install pipeline: `pre_merge`, `merge`, `post_merge`.
    ///
    /// The caller supplies `new_cset`; `install` and `modifying` are derived
    /// from it after the uid/gid fixups in `pre_merge` have run.
    pub fn install(new_cset: ChangeSet, config: &MergeConfig) -> Result<Self> {
        let csets = ChangeSets::new().with(defaults::NEW_CSET, new_cset);
        let mut engine = Self::new(csets, [defaults::PRE_MERGE, defaults::MERGE, defaults::POST_MERGE])?
            .with_derivation(defaults::INSTALL, [defaults::NEW_CSET], |sets| {
                copy_of(sets, defaults::NEW_CSET)
            })
            .with_derivation(defaults::MODIFYING, [defaults::INSTALL], |sets| {
                copy_of(sets, defaults::INSTALL)
            });

        engine.register_fixups(config)?;
        engine.register_trigger(defaults::MERGE, triggers::merge_trigger(defaults::INSTALL)?)?;
        engine.register_trigger(
            defaults::POST_MERGE,
            triggers::ldconfig_trigger(defaults::MODIFYING, config.ldconfig_options())?,
        )?;
        Ok(engine)
    }

    /// Uninstall pipeline: `pre_unmerge`, `unmerge`, `post_unmerge`.
    pub fn uninstall(old_cset: ChangeSet, config: &MergeConfig) -> Result<Self> {
        let csets = ChangeSets::new().with(defaults::OLD_CSET, old_cset);
        let mut engine = Self::new(
            csets,
            [defaults::PRE_UNMERGE, defaults::UNMERGE, defaults::POST_UNMERGE],
        )?
        .with_derivation(defaults::UNINSTALL, [defaults::OLD_CSET], |sets| {
            copy_of(sets, defaults::OLD_CSET)
        })
        .with_derivation(defaults::MODIFYING, [defaults::UNINSTALL], |sets| {
            copy_of(sets, defaults::UNINSTALL)
        });

        engine.register_trigger(defaults::UNMERGE, triggers::unmerge_trigger(defaults::UNINSTALL)?)?;
        engine.register_trigger(
            defaults::POST_UNMERGE,
            triggers::ldconfig_trigger(defaults::MODIFYING, config.ldconfig_options())?,
        )?;
        Ok(engine)
    }

    /// Replace pipeline: merge `new_cset`, then unmerge whatever of
    /// `old_cset` the new contents no longer cover.
    pub fn replace(old_cset: ChangeSet, new_cset: ChangeSet, config: &MergeConfig) -> Result<Self> {
        let csets = ChangeSets::new()
            .with(defaults::OLD_CSET, old_cset)
            .with(defaults::NEW_CSET, new_cset);
        let mut engine = Self::new(
            csets,
            [
                defaults::PRE_MERGE,
                defaults::MERGE,
                defaults::POST_MERGE,
                defaults::PRE_UNMERGE,
                defaults::UNMERGE,
                defaults::POST_UNMERGE,
            ],
        )?
        .with_derivation(defaults::INSTALL, [defaults::NEW_CSET], |sets| {
            copy_of(sets, defaults::NEW_CSET)
        })
        .with_derivation(
            defaults::UNINSTALL,
            [defaults::OLD_CSET, defaults::NEW_CSET],
            |sets| match (sets.get(defaults::OLD_CSET), sets.get(defaults::NEW_CSET)) {
                (Some(old), Some(new)) => old.difference(new),
                _ => ChangeSet::new(),
            },
        )
        .with_derivation(
            defaults::MODIFYING,
            [defaults::INSTALL, defaults::UNINSTALL],
            |sets| {
                let mut modifying = copy_of(sets, defaults::INSTALL);
                modifying.update(copy_of(sets, defaults::UNINSTALL).iter().cloned());
                modifying
            },
        );

        engine.register_fixups(config)?;
        engine.register_trigger(defaults::MERGE, triggers::merge_trigger(defaults::INSTALL)?)?;
        engine.register_trigger(defaults::UNMERGE, triggers::unmerge_trigger(defaults::UNINSTALL)?)?;
        engine.register_trigger(
            defaults::POST_UNMERGE,
            triggers::ldconfig_trigger(defaults::MODIFYING, config.ldconfig_options())?,
        )?;
        Ok(engine)
    }

    fn register_fixups(&mut self, config: &MergeConfig) -> Result<()> {
        self.register_trigger(
            defaults::PRE_MERGE,
            triggers::fix_default_uid(config.uid_fixup(), defaults::NEW_CSET)?,
        )?;
        self.register_trigger(
            defaults::PRE_MERGE,
            triggers::fix_default_gid(config.gid_fixup(), defaults::NEW_CSET)?,
        )
    }
}

fn copy_of(sets: &ChangeSets, label: &str) -> ChangeSet {
    sets.get(label).cloned().unwrap_or_default()
}

impl fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeEngine")
            .field("hooks", &self.hooks)
            .field("offset", &self.offset)
            .field("csets", &self.csets.sets)
            .field("plugins", &self.plugins)
            .finish()
    }
}
