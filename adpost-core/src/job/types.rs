use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One request to log in and submit a single listing. Immutable once
/// accepted; owned by the runner for the duration of one execution.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub credentials: Credentials,
    pub posting: PostingDraft,
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// Credentials never reach logs, details, or wire output. The Debug impl is
// redacted so a stray `{:?}` on a descriptor cannot leak them.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostingDraft {
    pub city: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Error)]
#[error("invalid job: {0}")]
pub struct InvalidJob(pub String);

impl JobDescriptor {
    /// Domain preconditions only; shape validation belongs to the caller.
    pub fn validate(&self) -> Result<(), InvalidJob> {
        if self.job_id.trim().is_empty() {
            return Err(InvalidJob("job_id is empty".to_string()));
        }
        if self.credentials.email.trim().is_empty() || self.credentials.password.is_empty() {
            return Err(InvalidJob("credentials are empty".to_string()));
        }
        for (name, value) in [
            ("posting.city", &self.posting.city),
            ("posting.title", &self.posting.title),
            ("posting.category", &self.posting.category),
        ] {
            if value.trim().is_empty() {
                return Err(InvalidJob(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    DriverInit,
    Login,
    CreatePosting,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepKind::DriverInit => "driver_init",
            StepKind::Login => "login",
            StepKind::CreatePosting => "create_posting",
        };
        f.write_str(label)
    }
}

/// Blocking step failures. Non-blocking field issues travel separately as
/// [`FieldWarning`] entries inside the step result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    #[error("session error: {0}")]
    Session(String),
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),
    #[error("challenge required: {0}")]
    ChallengeRequired(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
}

impl StepError {
    pub fn is_blocking(&self) -> bool {
        // every variant halts the pipeline; warnings are the non-blocking path
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldWarning>,
}

impl StepResult {
    pub fn succeeded(step: StepKind, details: Option<serde_json::Value>) -> Self {
        Self {
            step,
            success: true,
            details,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failed(step: StepKind, error: StepError) -> Self {
        Self {
            step,
            success: false,
            details: None,
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<FieldWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Visual evidence for one step. Raw PNG bytes in memory; the wire form is
/// base64 text, applied at serialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub step: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Screenshot {
    pub fn encoded(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
    CaptchaDetected,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::CaptchaDetected => "captcha_detected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub steps: Vec<StepResult>,
    pub screenshots: Vec<Screenshot>,
    pub captcha_detected: bool,
}

impl JobResult {
    /// Derives the terminal status from the ledger: a challenge anywhere wins,
    /// then a successful submission, then failure.
    pub fn from_ledger(
        job_id: String,
        steps: Vec<StepResult>,
        screenshots: Vec<Screenshot>,
    ) -> Self {
        let captcha_detected = steps
            .iter()
            .any(|step| matches!(step.error, Some(StepError::ChallengeRequired(_))));
        let submitted = steps
            .iter()
            .any(|step| step.step == StepKind::CreatePosting && step.success);
        let status = if captcha_detected {
            JobStatus::CaptchaDetected
        } else if submitted {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        Self {
            job_id,
            status,
            steps,
            screenshots,
            captcha_detected,
        }
    }
}
