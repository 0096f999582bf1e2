//! Presence policy of a field.
//!
//! ```text
//! Disabled --> Optional <--> Required
//!     |            \           /
//!     +-----------> Mandatory <      (terminal)
//! ```
//!
//! A mandatory field may be re-requested as required (it stays mandatory) but never
//! relaxed to optional or disabled.

use std::fmt;
use std::str::FromStr;

use crate::errors::ModeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Not used by this packet.
    #[default]
    Disabled,
    /// Present or absent per packet, controlled by the linked enable.
    Optional,
    /// Always present for this packet definition.
    Required,
    /// Always present by protocol rule; cannot be relaxed.
    Mandatory,
}

impl Mode {
    /// Computes the mode after a change request.
    ///
    /// `field` only feeds the error diagnostic.
    pub fn transition(self, requested: Mode, field: &str) -> Result<Mode, ModeError> {
        match (self, requested) {
            (Mode::Mandatory, Mode::Mandatory | Mode::Required) => Ok(Mode::Mandatory),
            (Mode::Mandatory, _) => Err(ModeError::MandatoryLocked {
                field: field.to_string(),
                requested,
            }),
            (_, requested) => Ok(requested),
        }
    }

    /// Mode implied by assigning a concrete value: a disabled field becomes required.
    pub fn with_value(self) -> Mode {
        match self {
            Mode::Disabled => Mode::Required,
            other => other,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Mode::Disabled
    }

    pub fn is_optional(self) -> bool {
        self == Mode::Optional
    }

    /// Required or mandatory.
    pub fn is_required(self) -> bool {
        matches!(self, Mode::Required | Mode::Mandatory)
    }

    /// Presence implied for a linked enable, `None` when it is decided per packet.
    pub(crate) fn implied_presence(self) -> Option<bool> {
        match self {
            Mode::Disabled => Some(false),
            Mode::Optional => None,
            Mode::Required | Mode::Mandatory => Some(true),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Disabled => "disabled",
            Mode::Optional => "optional",
            Mode::Required => "required",
            Mode::Mandatory => "mandatory",
        };
        f.write_str(name)
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Mode::Disabled),
            "optional" => Ok(Mode::Optional),
            "required" => Ok(Mode::Required),
            "mandatory" => Ok(Mode::Mandatory),
            _ => Err(ModeError::UnknownMode(s.to_string())),
        }
    }
}
