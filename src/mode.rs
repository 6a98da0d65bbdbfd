//! The define/data and collective/independent mode of a dataset.

use crate::error::{Error, ErrorCode, Result};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Dimensions and variables may be declared. No data access.
    Define,
    /// Data access. The schema is fixed.
    Data,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Data operations are collective across the group.
    Collective,
    /// Each process performs data operations on its own.
    Independent,
}

/// The current mode of a dataset. `Define` is always `Collective`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mode {
    phase: Phase,
    access: Access,
}

/// A requested mode change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    EndDef,
    ReDef,
    BeginIndep,
    EndIndep,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Transition::EndDef => "enddef",
            Transition::ReDef => "redef",
            Transition::BeginIndep => "begin_indep",
            Transition::EndIndep => "end_indep",
        })
    }
}

/// Why an operation is not allowed in the current mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeFault {
    /// The operation needs data mode.
    InDefine,
    /// The operation needs define mode.
    NotInDefine,
    /// The operation is not allowed in independent mode.
    Independent,
    /// The operation needs independent mode.
    NotIndependent,
}

impl ModeFault {
    pub fn code(self) -> ErrorCode {
        match self {
            ModeFault::InDefine => ErrorCode::EINDEFINE,
            ModeFault::NotInDefine => ErrorCode::ENOTINDEFINE,
            ModeFault::Independent => ErrorCode::EINDEP,
            ModeFault::NotIndependent => ErrorCode::ENOTINDEP,
        }
    }
}

impl fmt::Display for ModeFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ModeFault::InDefine => "operation not allowed in define mode",
            ModeFault::NotInDefine => "operation requires define mode",
            ModeFault::Independent => "operation not allowed in independent data mode",
            ModeFault::NotIndependent => "operation requires independent data mode",
        })
    }
}

impl Mode {
    pub(crate) fn initial() -> Mode {
        Mode {
            phase: Phase::Define,
            access: Access::Collective,
        }
    }

    pub fn phase(self) -> Phase {
        self.phase
    }

    pub fn access(self) -> Access {
        self.access
    }

    pub fn is_define(self) -> bool {
        self.phase == Phase::Define
    }

    pub fn is_collective(self) -> bool {
        self.access == Access::Collective
    }

    pub(crate) fn require_define(self) -> Result<()> {
        match self.phase {
            Phase::Define => Ok(()),
            Phase::Data => Err(Error::InvalidModeTransition(ModeFault::NotInDefine)),
        }
    }

    pub(crate) fn require_data(self) -> Result<()> {
        match self.phase {
            Phase::Data => Ok(()),
            Phase::Define => Err(Error::InvalidModeTransition(ModeFault::InDefine)),
        }
    }

    /// The mode after `transition`, or `None` if the dataset is already
    /// there.
    pub(crate) fn after(self, transition: Transition) -> Result<Option<Mode>> {
        let next = match (transition, self.phase, self.access) {
            (Transition::EndDef, Phase::Define, _) => Mode {
                phase: Phase::Data,
                access: Access::Collective,
            },
            (Transition::ReDef, Phase::Data, Access::Independent) => {
                return Err(Error::InvalidModeTransition(ModeFault::Independent))
            }
            (Transition::ReDef, Phase::Data, Access::Collective) => Mode::initial(),
            (Transition::BeginIndep, Phase::Define, _) => {
                return Err(Error::InvalidModeTransition(ModeFault::InDefine))
            }
            (Transition::BeginIndep, Phase::Data, _) => Mode {
                phase: Phase::Data,
                access: Access::Independent,
            },
            (Transition::EndIndep, Phase::Data, _) => Mode {
                phase: Phase::Data,
                access: Access::Collective,
            },
            (Transition::EndDef, Phase::Data, _)
            | (Transition::ReDef, Phase::Define, _)
            | (Transition::EndIndep, Phase::Define, _) => self,
        };
        Ok(if next == self { None } else { Some(next) })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phase = match self.phase {
            Phase::Define => "define",
            Phase::Data => "data",
        };
        let access = match self.access {
            Access::Collective => "collective",
            Access::Independent => "independent",
        };
        write!(f, "{}/{}", phase, access)
    }
}
