//! Bonds: persistent relationships granting ritual bonuses

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// The six bond types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondType {
    Kinship,
    Ascendancy,
    Debt,
    Voidward,
    Passion,
    Faction,
}

impl BondType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondType::Kinship => "Kinship",
            BondType::Ascendancy => "Ascendancy",
            BondType::Debt => "Debt",
            BondType::Voidward => "Voidward",
            BondType::Passion => "Passion",
            BondType::Faction => "Faction",
        }
    }

    pub fn parse(input: &str) -> Result<Self, DomainError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "kinship" => Ok(BondType::Kinship),
            "ascendancy" => Ok(BondType::Ascendancy),
            "debt" => Ok(BondType::Debt),
            "voidward" => Ok(BondType::Voidward),
            "passion" => Ok(BondType::Passion),
            "faction" => Ok(BondType::Faction),
            other => Err(DomainError::validation(format!(
                "Unknown bond type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single bond. Targets are names, resolved through the registry when a
/// bond needs to reference a live entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub bond_type: BondType,
    pub target: String,
    /// Bond level, 1-3.
    pub level: u8,
}

impl Bond {
    pub fn new(bond_type: BondType, target: impl Into<String>, level: u8) -> Result<Self, DomainError> {
        if !(1..=3).contains(&level) {
            return Err(DomainError::validation(format!(
                "Bond level must be 1-3, got {level}"
            )));
        }
        Ok(Self {
            bond_type,
            target: target.into(),
            level,
        })
    }
}

/// Maximum bonds a character may hold.
pub const MAX_BONDS: usize = 3;
