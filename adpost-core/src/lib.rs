pub mod browser;
pub mod config;
pub mod job;

pub use browser::{
    ChallengeDetector, ChallengeVerdict, ChromiumProvider, PageDriver, SessionConfig,
    SessionError, SessionProvider, SessionResult,
};
pub use config::{
    load_worker_config, ChromiumSection, ConfigError, DetectorSection, PacingSection,
    SelectorSection, SiteSection, TimeoutSection, WorkerConfig,
};
pub use job::{
    Credentials, FieldWarning, InvalidJob, JobDescriptor, JobResult, JobRunner, JobStatus,
    PostingDraft, Screenshot, StepError, StepKind, StepResult,
};
