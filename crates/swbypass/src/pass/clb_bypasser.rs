use super::{BypasserModule, SchedulerPass};
use crate::bypass::{CycleLookBackBypasser, SoftwareBypasser};
use crate::machine::ResourceModel;
use crate::policy::{
    BYPASS_FROM_REGS_OPTION, BYPASS_TO_REGS_OPTION, CommandLineOverrides,
    KILL_DEAD_RESULTS_OPTION, LOOKBACK_DISTANCE_OPTION, NO_DRE_LOOKBACK_DISTANCE_OPTION,
    NamedOption, OptionError, PolicySelector,
};

/// Helper scheduler module that creates a [`CycleLookBackBypasser`].
///
/// The policy is resolved against the target the first time the bypasser is
/// requested and the bypasser is reused afterwards.
#[derive(Debug, Default)]
pub struct ClbBypasserModule {
    selector: PolicySelector,
    overrides: CommandLineOverrides,
    bypasser: Option<CycleLookBackBypasser>,
}

impl ClbBypasserModule {
    pub const NAME: &'static str = "CLBBypasserModule";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: CommandLineOverrides) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    pub fn selector(&self) -> &PolicySelector {
        &self.selector
    }

    pub fn clb_bypasser(&mut self, machine: &dyn ResourceModel) -> &mut CycleLookBackBypasser {
        let bypasser = self.bypasser.get_or_insert_with(|| {
            CycleLookBackBypasser::new(self.selector.resolve(machine, &self.overrides))
        });
        let policy = bypasser.policy();
        log::info!(
            "bypasser: max distance: {} (no-DRE: {}, {} target)",
            policy.lookback_distance,
            policy.no_dre_lookback_distance,
            policy.class
        );
        bypasser
    }
}

impl SchedulerPass for ClbBypasserModule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn short_description(&self) -> String {
        format!("Helper: {}", Self::NAME)
    }

    fn long_description(&self) -> String {
        format!(
            "Helper: {}. Implements cycle look-back software bypassing. Accepts parameters \
             \"{LOOKBACK_DISTANCE_OPTION}\"=<uint> (default: 9 on bus-limited, 8 on \
             register-file-limited, 3 on function-unit-limited, otherwise 4), \
             \"{NO_DRE_LOOKBACK_DISTANCE_OPTION}\"=<uint> (used on targets without dead result \
             elimination; default: 3 on register-file-limited, otherwise 2), \
             \"{KILL_DEAD_RESULTS_OPTION}\"=true|false (default: true), \
             \"{BYPASS_FROM_REGS_OPTION}\"=true|false (default: false), \
             \"{BYPASS_TO_REGS_OPTION}\"=true|false (default: false).",
            Self::NAME
        )
    }

    /// A new option list starts a new run; the cached bypasser is dropped.
    fn set_options(&mut self, options: &[NamedOption]) -> Result<(), OptionError> {
        self.selector.set_options(options)?;
        self.bypasser = None;
        Ok(())
    }

    fn set_overrides(&mut self, overrides: CommandLineOverrides) {
        self.overrides = overrides;
        self.bypasser = None;
    }

    fn as_bypasser_module(&mut self) -> Option<&mut dyn BypasserModule> {
        Some(self)
    }
}

impl BypasserModule for ClbBypasserModule {
    fn bypasser(&mut self, machine: &dyn ResourceModel) -> &mut dyn SoftwareBypasser {
        self.clb_bypasser(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{ArchitectureClass, MachineSummary};

    fn bus_limited() -> MachineSummary {
        MachineSummary {
            buses: 2,
            rf_read_ports: 4,
            rf_write_ports: 2,
            function_units: 3,
            ..Default::default()
        }
    }

    #[test]
    fn bypasser_is_created_once() {
        let mut module = ClbBypasserModule::new();
        let machine = bus_limited();

        let policy = *module.clb_bypasser(&machine).policy();
        assert_eq!(policy.class, ArchitectureClass::BusLimited);
        assert_eq!(policy.lookback_distance, 9);
        assert_eq!(policy.no_dre_lookback_distance, 2);

        // A later request reuses the policy resolved for the first target.
        let other = MachineSummary {
            function_units: 1,
            buses: 10,
            ..Default::default()
        };
        assert_eq!(*module.clb_bypasser(&other).policy(), policy);
    }

    #[test]
    fn new_options_reset_the_bypasser() {
        let mut module = ClbBypasserModule::new();
        let machine = bus_limited();
        module.clb_bypasser(&machine);

        module
            .set_options(&[NamedOption::int(LOOKBACK_DISTANCE_OPTION, 5)])
            .unwrap();
        assert_eq!(module.clb_bypasser(&machine).policy().lookback_distance, 5);
    }

    #[test]
    fn overrides_beat_options() {
        let mut module = ClbBypasserModule::with_overrides(CommandLineOverrides {
            lookback_distance: Some(2),
        });
        module
            .set_options(&[NamedOption::int(LOOKBACK_DISTANCE_OPTION, 7)])
            .unwrap();
        assert_eq!(module.selector().lookback_distance(), Some(7));
        assert_eq!(
            module.clb_bypasser(&bus_limited()).policy().lookback_distance,
            2
        );
    }
}
