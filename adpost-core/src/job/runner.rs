use tracing::{info, warn};

use crate::browser::{ChallengeDetector, ChromiumProvider, PageDriver, SessionConfig, SessionProvider};
use crate::config::WorkerConfig;

use super::login::LoginStep;
use super::posting::PostingStep;
use super::types::{JobDescriptor, JobResult, Screenshot, StepError, StepKind, StepResult};

/// Pipeline states. Init covers session acquisition; Finalizing releases the
/// session and assembles the result, and is reached on every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Authenticating,
    Submitting,
    Finalizing,
}

/// Sequences one job through login and submission, accumulating the step
/// ledger and evidence buffer. One session per run, released exactly once;
/// step failures never escape the runner, they become the returned result.
pub struct JobRunner<P: SessionProvider> {
    config: WorkerConfig,
    provider: P,
    detector: ChallengeDetector,
}

impl JobRunner<ChromiumProvider> {
    pub fn with_chromium(config: WorkerConfig) -> Self {
        let provider = ChromiumProvider::new(SessionConfig::from(&config.chromium));
        Self::new(config, provider)
    }
}

impl<P: SessionProvider> JobRunner<P> {
    pub fn new(config: WorkerConfig, provider: P) -> Self {
        let detector = ChallengeDetector::new(config.detector.clone());
        Self {
            config,
            provider,
            detector,
        }
    }

    pub async fn run(&self, job: JobDescriptor) -> JobResult {
        info!(job_id = %job.job_id, city = %job.posting.city, "starting posting job");
        let mut ledger: Vec<StepResult> = Vec::new();
        let mut screenshots: Vec<Screenshot> = Vec::new();

        if let Err(err) = job.validate() {
            warn!(job_id = %job.job_id, error = %err, "job rejected before session acquisition");
            ledger.push(StepResult::failed(
                StepKind::DriverInit,
                StepError::Session(err.to_string()),
            ));
            return JobResult::from_ledger(job.job_id, ledger, screenshots);
        }

        let mut driver = match self.provider.acquire().await {
            Ok(driver) => {
                ledger.push(StepResult::succeeded(StepKind::DriverInit, None));
                driver
            }
            Err(err) => {
                warn!(job_id = %job.job_id, error = %err, "browser session acquisition failed");
                ledger.push(StepResult::failed(
                    StepKind::DriverInit,
                    StepError::Session(err.to_string()),
                ));
                return JobResult::from_ledger(job.job_id, ledger, screenshots);
            }
        };

        let mut state = PipelineState::Authenticating;
        loop {
            match state {
                PipelineState::Authenticating => {
                    let step = LoginStep::new(&self.config)
                        .run(driver.as_mut(), &self.detector, &job.credentials)
                        .await;
                    let advanced = step.success;
                    ledger.push(step);
                    capture(driver.as_mut(), StepKind::Login, &mut screenshots).await;
                    state = if advanced {
                        PipelineState::Submitting
                    } else {
                        PipelineState::Finalizing
                    };
                }
                PipelineState::Submitting => {
                    let step = PostingStep::new(&self.config)
                        .run(driver.as_mut(), &self.detector, &job.posting)
                        .await;
                    ledger.push(step);
                    capture(driver.as_mut(), StepKind::CreatePosting, &mut screenshots).await;
                    state = PipelineState::Finalizing;
                }
                PipelineState::Finalizing => {
                    driver.close().await;
                    break;
                }
            }
        }

        let result = JobResult::from_ledger(job.job_id, ledger, screenshots);
        info!(
            job_id = %result.job_id,
            status = %result.status,
            steps = result.steps.len(),
            screenshots = result.screenshots.len(),
            captcha = result.captcha_detected,
            "posting job finished"
        );
        result
    }
}

/// Best-effort evidence capture. A failure is logged and the screenshot
/// simply omitted; it never alters the outcome.
async fn capture(driver: &mut dyn PageDriver, step: StepKind, buffer: &mut Vec<Screenshot>) {
    match driver.screenshot_png().await {
        Ok(data) => buffer.push(Screenshot {
            step: step.to_string(),
            data,
        }),
        Err(err) => warn!(step = %step, error = %err, "evidence capture failed"),
    }
}
