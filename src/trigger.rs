//! Triggers: named units of work bound to change-set labels
//!
//! A [`Trigger`] declares which change-sets it needs and wraps the body that
//! runs when its hook fires. Construction validates everything up front so a
//! malformed trigger can never reach a run:
//!
//! - the name must be non-empty
//! - the label list must be non-empty, with no empty or duplicate labels
//!
//! When a trigger declares exactly one label its body receives that
//! change-set directly ([`TriggerInput::Single`]); with two or more labels it
//! receives a label-keyed map ([`TriggerInput::Many`]). [`Trigger::simple`]
//! wraps the single-label case so the body can take `&mut ChangeSet`.
//!
//! Registration into a hook's trigger list appends by default. A custom
//! strategy (see [`registration`]) can prepend, replace, or reject instead.

use crate::changeset::{ChangeSet, ChangeSets};
use crate::engine::EngineContext;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// The change-sets handed to a trigger body.
#[derive(Debug)]
pub enum TriggerInput<'a> {
    /// The trigger declared exactly one label.
    Single(&'a mut ChangeSet),
    /// The trigger declared two or more labels; keyed by label.
    Many(BTreeMap<&'a str, &'a mut ChangeSet>),
}

impl<'a> TriggerInput<'a> {
    pub fn into_single(self) -> Option<&'a mut ChangeSet> {
        match self {
            TriggerInput::Single(cset) => Some(cset),
            TriggerInput::Many(_) => None,
        }
    }

    pub fn into_many(self) -> Option<BTreeMap<&'a str, &'a mut ChangeSet>> {
        match self {
            TriggerInput::Single(_) => None,
            TriggerInput::Many(map) => Some(map),
        }
    }
}

/// Signature of a trigger body.
pub type TriggerFn = dyn Fn(&EngineContext<'_>, TriggerInput<'_>) -> Result<()>;

/// Signature of a registration strategy: receives the trigger being
/// registered, the hook name, and the hook's current trigger list.
pub type RegisterFn = dyn Fn(Trigger, &str, &mut Vec<Trigger>) -> Result<()>;

/// A validated unit of work bound to one or more change-set labels.
pub struct Trigger {
    name: String,
    required_csets: Vec<String>,
    body: Box<TriggerFn>,
    register_fn: Option<Box<RegisterFn>>,
}

impl Trigger {
    /// Create a trigger requiring `csets`.
    pub fn new<N, I, S, F>(name: N, csets: I, body: F) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&EngineContext<'_>, TriggerInput<'_>) -> Result<()> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("trigger name must not be empty"));
        }

        let required_csets: Vec<String> = csets.into_iter().map(Into::into).collect();
        if required_csets.is_empty() {
            return Err(Error::validation(format!(
                "trigger '{}' requires at least one change-set label",
                name
            )));
        }
        for (pos, label) in required_csets.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(Error::validation(format!(
                    "trigger '{}': change-set label #{} is empty",
                    name, pos
                )));
            }
            if required_csets[..pos].contains(label) {
                return Err(Error::validation(format!(
                    "trigger '{}': change-set label '{}' listed twice",
                    name, label
                )));
            }
        }

        Ok(Self {
            name,
            required_csets,
            body: Box::new(body),
            register_fn: None,
        })
    }

    /// Create a trigger bound to exactly one change-set.
    pub fn simple<N, S, F>(name: N, cset: S, body: F) -> Result<Self>
    where
        N: Into<String>,
        S: Into<String>,
        F: Fn(&EngineContext<'_>, &mut ChangeSet) -> Result<()> + 'static,
    {
        let cset: String = cset.into();
        Self::new(name, [cset], move |ctx, input| match input {
            TriggerInput::Single(cset) => body(ctx, cset),
            TriggerInput::Many(map) => Err(Error::validation(format!(
                "single change-set trigger handed {} change-sets",
                map.len()
            ))),
        })
    }

    /// Attach a custom registration strategy.
    pub fn with_registration<F>(mut self, strategy: F) -> Self
    where
        F: Fn(Trigger, &str, &mut Vec<Trigger>) -> Result<()> + 'static,
    {
        self.register_fn = Some(Box::new(strategy));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_csets(&self) -> &[String] {
        &self.required_csets
    }

    pub fn has_registration(&self) -> bool {
        self.register_fn.is_some()
    }

    /// Add this trigger to `existing`, honouring any custom strategy.
    pub fn register(mut self, hook_name: &str, existing: &mut Vec<Trigger>) -> Result<()> {
        match self.register_fn.take() {
            Some(strategy) => strategy(self, hook_name, existing),
            None => {
                existing.push(self);
                Ok(())
            }
        }
    }

    /// Run the trigger body against the change-sets it declared.
    ///
    /// Fails with `MissingChangeSet` if any required label is absent.
    pub fn invoke(&self, hook: &str, ctx: &EngineContext<'_>, csets: &mut ChangeSets) -> Result<()> {
        if let Some(missing) = self.required_csets.iter().find(|label| !csets.contains(label)) {
            return Err(Error::MissingChangeSet {
                hook: hook.to_string(),
                trigger: self.name.clone(),
                label: missing.clone(),
            });
        }

        let input = if self.required_csets.len() == 1 {
            let label = &self.required_csets[0];
            let cset = csets.get_mut(label).ok_or_else(|| Error::MissingChangeSet {
                hook: hook.to_string(),
                trigger: self.name.clone(),
                label: label.clone(),
            })?;
            TriggerInput::Single(cset)
        } else {
            TriggerInput::Many(csets.select_mut(&self.required_csets))
        };

        (self.body)(ctx, input)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trigger: {} for csets({})",
            self.name,
            self.required_csets.join(", ")
        )
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("required_csets", &self.required_csets)
            .field("custom_registration", &self.register_fn.is_some())
            .finish()
    }
}

/// Stock registration strategies for [`Trigger::with_registration`].
pub mod registration {
    use super::Trigger;
    use crate::error::{Error, Result};

    /// Append to the end of the list (the default behaviour, spelled out).
    pub fn append(trigger: Trigger, _hook: &str, existing: &mut Vec<Trigger>) -> Result<()> {
        existing.push(trigger);
        Ok(())
    }

    /// Insert at the front of the list.
    pub fn prepend(trigger: Trigger, _hook: &str, existing: &mut Vec<Trigger>) -> Result<()> {
        existing.insert(0, trigger);
        Ok(())
    }

    /// Take the slot of an existing trigger with the same name, or append.
    pub fn replace_by_name(trigger: Trigger, _hook: &str, existing: &mut Vec<Trigger>) -> Result<()> {
        match existing.iter().position(|t| t.name() == trigger.name()) {
            Some(pos) => existing[pos] = trigger,
            None => existing.push(trigger),
        }
        Ok(())
    }

    /// Refuse to register a second trigger with the same name.
    pub fn unique_by_name(trigger: Trigger, hook: &str, existing: &mut Vec<Trigger>) -> Result<()> {
        if existing.iter().any(|t| t.name() == trigger.name()) {
            return Err(Error::RegistrationRejected {
                hook: hook.to_string(),
                trigger: trigger.name().to_string(),
                reason: "a trigger with this name is already registered".to_string(),
            });
        }
        existing.push(trigger);
        Ok(())
    }

    /// Insert just before the first trigger named `anchor`, or append if absent.
    pub fn insert_before(
        anchor: impl Into<String>,
    ) -> impl Fn(Trigger, &str, &mut Vec<Trigger>) -> Result<()> {
        let anchor = anchor.into();
        move |trigger, _hook, existing| {
            match existing.iter().position(|t| t.name() == anchor) {
                Some(pos) => existing.insert(pos, trigger),
                None => existing.push(trigger),
            }
            Ok(())
        }
    }
}
