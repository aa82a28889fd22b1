use crate::bypass::{ScheduleError, SoftwareBypasser};
use crate::machine::ResourceModel;
use crate::policy::{CommandLineOverrides, NamedOption, OptionError};
use std::collections::BTreeMap;
use thiserror::Error;

mod clb_bypasser;

pub use clb_bypasser::ClbBypasserModule;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error(transparent)]
    Option(#[from] OptionError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("Unknown scheduler pass `{name}`")]
    UnknownPass { name: String },
    #[error("Scheduler pass `{name}` does not provide a software bypasser")]
    NotABypasser { name: String },
}

/// A pluggable scheduler module driven by the outer scheduling pass.
pub trait SchedulerPass {
    fn name(&self) -> &'static str;

    fn short_description(&self) -> String;

    /// Usage notes, including the accepted options and their defaults.
    fn long_description(&self) -> String {
        String::new()
    }

    fn set_options(&mut self, options: &[NamedOption]) -> Result<(), OptionError>;

    /// Settings from the scheduler command line. Passes without such settings ignore them.
    fn set_overrides(&mut self, _overrides: CommandLineOverrides) {}

    fn as_bypasser_module(&mut self) -> Option<&mut dyn BypasserModule> {
        None
    }
}

/// A scheduler module that hands out a configured software bypasser.
pub trait BypasserModule {
    fn bypasser(&mut self, machine: &dyn ResourceModel) -> &mut dyn SoftwareBypasser;
}

pub type PassFactory = fn() -> Box<dyn SchedulerPass>;

/// Scheduler passes available by name.
#[derive(Default)]
pub struct PassRegistry {
    factories: BTreeMap<&'static str, PassFactory>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every pass of this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ClbBypasserModule::NAME, || Box::new(ClbBypasserModule::new()));
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &'static str, factory: PassFactory) {
        self.factories.insert(name, factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn SchedulerPass>, PassError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PassError::UnknownPass {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPass;

    impl SchedulerPass for NullPass {
        fn name(&self) -> &'static str {
            "NullPass"
        }

        fn short_description(&self) -> String {
            "does nothing".to_string()
        }

        fn set_options(&mut self, _options: &[NamedOption]) -> Result<(), OptionError> {
            Ok(())
        }
    }

    #[test]
    fn registry_creates_by_name() {
        let mut registry = PassRegistry::builtin();
        registry.register("NullPass", || Box::new(NullPass));

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["CLBBypasserModule", "NullPass"]
        );

        let mut null = registry.create("NullPass").unwrap();
        assert_eq!(null.name(), "NullPass");
        assert!(null.long_description().is_empty());
        assert!(null.as_bypasser_module().is_none());

        let mut clb = registry.create("CLBBypasserModule").unwrap();
        assert!(clb.as_bypasser_module().is_some());
    }

    #[test]
    fn unknown_pass() {
        let registry = PassRegistry::builtin();
        let err = registry.create("ListScheduler").err().unwrap();
        assert_eq!(err.to_string(), "Unknown scheduler pass `ListScheduler`");
    }
}
