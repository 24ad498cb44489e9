//! Manager configuration and validation.
//!
//! [`ManagerConfig`] lists the cruncher types a manager may use, in
//! preference order. [`validate()`](ManagerConfig::validate) picks the
//! first one able to run the simpack at construction time.

use std::sync::Arc;

use timetree_core::Simpack;

use crate::cruncher::CruncherType;
use crate::error::ConfigError;
use crate::thread::ThreadCruncherType;

// ── ManagerConfig ───────────────────────────────────────────────

/// Installed cruncher types, most preferred first.
pub struct ManagerConfig<Sp: Simpack> {
    pub(crate) types: Vec<Arc<dyn CruncherType<Sp>>>,
}

impl<Sp: Simpack> ManagerConfig<Sp> {
    /// No cruncher types. Fails validation until one is added.
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Only the standard thread cruncher type.
    pub fn thread_only() -> Self {
        Self::empty().with_type(ThreadCruncherType::new())
    }

    /// Install another cruncher type, least preferred so far.
    pub fn with_type(mut self, cruncher_type: impl CruncherType<Sp> + 'static) -> Self {
        self.types.push(Arc::new(cruncher_type));
        self
    }

    /// Names of the installed types, in preference order.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.name()).collect()
    }

    /// Check the configuration against `simpack` and return the index
    /// of the type to start with.
    ///
    /// The selected type is the first whose crunchers can run the step
    /// kind of the simpack's default profile.
    pub fn validate(&self, simpack: &Sp) -> Result<usize, ConfigError> {
        // 1. At least one type.
        if self.types.is_empty() {
            return Err(ConfigError::NoCruncherTypes);
        }
        // 2. Names are unique, since selection is by name.
        for (i, t) in self.types.iter().enumerate() {
            if self.types[..i].iter().any(|earlier| earlier.name() == t.name()) {
                return Err(ConfigError::DuplicateCruncherType(t.name()));
            }
        }
        // 3. Something can run the simpack.
        let kind = simpack.step_kind(&simpack.default_profile());
        self.types
            .iter()
            .position(|t| t.can_crunch(kind))
            .ok_or_else(|| ConfigError::NoUsableCruncher {
                simpack: simpack.name().to_owned(),
                kind,
            })
    }

    /// Index of the type named `name`.
    pub(crate) fn position(&self, name: &str) -> Result<usize, ConfigError> {
        self.types
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| ConfigError::UnknownCruncherType(name.to_owned()))
    }
}

impl<Sp: Simpack> Default for ManagerConfig<Sp> {
    fn default() -> Self {
        Self::thread_only()
    }
}
