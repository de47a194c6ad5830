pub mod character;
pub mod clock;

pub use character::{AttributeBlock, Character, Role};
pub use clock::{AdvanceOutcome, SceneClock, Urgency, AUTO_ARCHIVE_OVERFLOW};
