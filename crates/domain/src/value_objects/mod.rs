pub mod attribute;
pub mod bond;
pub mod condition;
pub mod dice;
pub mod range;
pub mod skills;
pub mod tier;
pub mod void;

pub use attribute::Attribute;
pub use bond::{Bond, BondType, MAX_BONDS};
pub use condition::Condition;
pub use dice::{check_d20, DiceRoller, FixedRolls};
pub use range::Range;
pub use skills::{catalog_entry, normalize_skill, NormalizedSkill, SkillInfo, CATALOG, RITUAL_SKILL};
pub use tier::{clamp_difficulty, OutcomeTier, DEFAULT_DIFFICULTY};
pub use void::{
    corruption_tier, is_terminal, ritual_void_penalty, VoidChangeRecord, SOULCREDIT_MAX,
    SOULCREDIT_MIN, VOID_MAX, VOID_MIN,
};
