use crate::machine::{ArchitectureClass, ResourceModel};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const LOOKBACK_DISTANCE_OPTION: &str = "swb-lookback-distance";
pub const NO_DRE_LOOKBACK_DISTANCE_OPTION: &str = "no-dre-swb-lookback-distance";
pub const KILL_DEAD_RESULTS_OPTION: &str = "kill-dead-results";
pub const BYPASS_FROM_REGS_OPTION: &str = "bypass-from-regs";
pub const BYPASS_TO_REGS_OPTION: &str = "bypass-to-regs";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("only true or false value allowed for {option} (got `{value}`)")]
    InvalidOption { option: String, value: String },
    #[error("integer value expected for {option} (got `{value}`)")]
    InvalidDistance { option: String, value: String },
}

impl OptionError {
    /// Name of the offending option.
    pub fn option(&self) -> &str {
        match self {
            OptionError::InvalidOption { option, .. }
            | OptionError::InvalidDistance { option, .. } => option,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Text(v) => f.write_str(v),
        }
    }
}

/// A `name = value` pair from the option list shared by all scheduler passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedOption {
    pub name: String,
    pub value: OptionValue,
}

impl NamedOption {
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: OptionValue::Int(value),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: OptionValue::Text(value.to_string()),
        }
    }

    /// Parses `name=value`. Values that read as integers become [`OptionValue::Int`].
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, value) = spec.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        let value = match value.parse::<i64>() {
            Ok(v) => OptionValue::Int(v),
            Err(_) => OptionValue::Text(value.to_string()),
        };
        Some(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// Settings taken from the scheduler command line. They win over the option list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLineOverrides {
    pub lookback_distance: Option<u32>,
}

/// The resolved bypass policy of one scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub lookback_distance: u32,
    pub no_dre_lookback_distance: u32,
    pub kill_dead_results: bool,
    pub bypass_from_regs: bool,
    pub bypass_to_regs: bool,
    pub class: ArchitectureClass,
}

impl Policy {
    /// The look-back limit for a target with or without hardware dead-result elimination.
    pub fn effective_distance(&self, has_dead_result_elimination: bool) -> u32 {
        if has_dead_result_elimination {
            self.lookback_distance
        } else {
            self.no_dre_lookback_distance
        }
    }
}

/// Option state of the bypasser before the target is known.
///
/// Distances left unset are derived from the [`ArchitectureClass`] of the
/// target when the policy is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySelector {
    lookback_distance: Option<u32>,
    no_dre_lookback_distance: Option<u32>,
    kill_dead_results: bool,
    bypass_from_regs: bool,
    bypass_to_regs: bool,
}

impl Default for PolicySelector {
    fn default() -> Self {
        Self {
            lookback_distance: None,
            no_dre_lookback_distance: None,
            kill_dead_results: true,
            bypass_from_regs: false,
            bypass_to_regs: false,
        }
    }
}

impl PolicySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the recognized options in order; unknown names are skipped.
    ///
    /// Either every option of the list is applied or, on error, none is.
    pub fn set_options(&mut self, options: &[NamedOption]) -> Result<(), OptionError> {
        let mut next = *self;
        for option in options {
            match option.name.as_str() {
                LOOKBACK_DISTANCE_OPTION => {
                    next.lookback_distance =
                        parse_distance(LOOKBACK_DISTANCE_OPTION, &option.value)?;
                }
                NO_DRE_LOOKBACK_DISTANCE_OPTION => {
                    next.no_dre_lookback_distance =
                        parse_distance(NO_DRE_LOOKBACK_DISTANCE_OPTION, &option.value)?;
                }
                KILL_DEAD_RESULTS_OPTION => {
                    next.kill_dead_results = parse_flag(KILL_DEAD_RESULTS_OPTION, &option.value)?;
                }
                BYPASS_FROM_REGS_OPTION => {
                    next.bypass_from_regs = parse_flag(BYPASS_FROM_REGS_OPTION, &option.value)?;
                }
                BYPASS_TO_REGS_OPTION => {
                    next.bypass_to_regs = parse_flag(BYPASS_TO_REGS_OPTION, &option.value)?;
                }
                _ => {}
            }
        }
        *self = next;
        Ok(())
    }

    pub fn lookback_distance(&self) -> Option<u32> {
        self.lookback_distance
    }

    pub fn no_dre_lookback_distance(&self) -> Option<u32> {
        self.no_dre_lookback_distance
    }

    pub fn kill_dead_results(&self) -> bool {
        self.kill_dead_results
    }

    pub fn bypass_from_regs(&self) -> bool {
        self.bypass_from_regs
    }

    pub fn bypass_to_regs(&self) -> bool {
        self.bypass_to_regs
    }

    pub fn resolve(&self, machine: &dyn ResourceModel, overrides: &CommandLineOverrides) -> Policy {
        let class = ArchitectureClass::classify(machine);
        let lookback_distance = overrides
            .lookback_distance
            .or(self.lookback_distance)
            .unwrap_or_else(|| class.default_distance());
        let no_dre_lookback_distance = self
            .no_dre_lookback_distance
            .unwrap_or_else(|| class.default_no_dre_distance());

        Policy {
            lookback_distance,
            no_dre_lookback_distance,
            kill_dead_results: self.kill_dead_results,
            bypass_from_regs: self.bypass_from_regs,
            bypass_to_regs: self.bypass_to_regs,
            class,
        }
    }
}

fn parse_flag(option: &str, value: &OptionValue) -> Result<bool, OptionError> {
    match value {
        OptionValue::Text(text) if text == "true" => Ok(true),
        OptionValue::Text(text) if text == "false" => Ok(false),
        OptionValue::Bool(flag) => Ok(*flag),
        other => Err(OptionError::InvalidOption {
            option: option.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Negative distances reset the option to the architecture default.
fn parse_distance(option: &str, value: &OptionValue) -> Result<Option<u32>, OptionError> {
    let invalid = || OptionError::InvalidDistance {
        option: option.to_string(),
        value: value.to_string(),
    };
    let distance = match value {
        OptionValue::Int(v) => *v,
        OptionValue::Text(text) => text.trim().parse::<i64>().map_err(|_| invalid())?,
        OptionValue::Bool(_) => return Err(invalid()),
    };
    if distance < 0 {
        return Ok(None);
    }
    u32::try_from(distance).map(Some).map_err(|_| invalid())
}
