mod login;
mod posting;
mod runner;
mod types;

pub use login::LoginStep;
pub use posting::PostingStep;
pub use runner::JobRunner;
pub use types::{
    Credentials, FieldWarning, InvalidJob, JobDescriptor, JobResult, JobStatus, PostingDraft,
    Screenshot, StepError, StepKind, StepResult,
};
