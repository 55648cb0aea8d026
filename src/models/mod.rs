pub mod evidence;
pub mod job;
pub mod loaders;
pub mod outcome;
pub mod record;

pub use evidence::{EvidenceId, EvidenceOutcome, EvidenceRecord};
pub use job::{DeadLetterReason, Job, JobError, JobState};
pub use loaders::{load_all_toml_files, load_toml_records};
pub use outcome::{
    AttemptOutcome, ErrorCategory, ErrorKind, EvidenceBlob, FillStatus, SelectorCandidate,
};
pub use record::{Record, ValidationResult};
