pub mod sink;
pub mod transcript;
pub mod validate;

pub use sink::{read_log, EventLog};
pub use transcript::{verify_snapshot_determinism, TranscriptDoc};
pub use validate::{validate, CheckResult, ValidationReport};
