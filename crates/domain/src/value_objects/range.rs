//! Pair-wise positioning between entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative range band between two entities. Stored pair-wise on each
/// character; symmetric updates are the mechanics engine's job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Range {
    Engaged,
    #[default]
    Near,
    Far,
    Extreme,
}

impl Range {
    pub fn as_str(&self) -> &'static str {
        match self {
            Range::Engaged => "Engaged",
            Range::Near => "Near",
            Range::Far => "Far",
            Range::Extreme => "Extreme",
        }
    }

    /// One band closer. Saturates at Engaged.
    pub fn closer(&self) -> Range {
        match self {
            Range::Engaged | Range::Near => Range::Engaged,
            Range::Far => Range::Near,
            Range::Extreme => Range::Far,
        }
    }

    /// One band further. Saturates at Extreme.
    pub fn further(&self) -> Range {
        match self {
            Range::Engaged => Range::Near,
            Range::Near => Range::Far,
            Range::Far | Range::Extreme => Range::Extreme,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
