use serde_json::json;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::browser::{ChallengeDetector, PageDriver, SessionError};
use crate::config::WorkerConfig;

use super::types::{Credentials, StepError, StepKind, StepResult};

/// Drives the account login form to one of four terminal outcomes:
/// authenticated, rejected, challenged, or timed out.
pub struct LoginStep<'a> {
    config: &'a WorkerConfig,
}

impl<'a> LoginStep<'a> {
    pub fn new(config: &'a WorkerConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        driver: &mut dyn PageDriver,
        detector: &ChallengeDetector,
        credentials: &Credentials,
    ) -> StepResult {
        let selectors = &self.config.selectors;
        let login_url = &self.config.site.login_url;

        if let Err(err) = driver.goto(login_url).await {
            warn!(error = %err, "login page navigation failed");
            return StepResult::failed(StepKind::Login, driver_fault("login page", err));
        }
        let _ = driver.idle(self.config.pacing.settle_delay_ms).await;

        let verdict = detector.detect(driver).await;
        if verdict.present {
            info!(kind = ?verdict.kind, "challenge present on login page");
            return StepResult::failed(
                StepKind::Login,
                StepError::ChallengeRequired(verdict.kind.unwrap_or_default()),
            );
        }

        if let Err(err) = driver.fill(&selectors.email_field, &credentials.email).await {
            return StepResult::failed(StepKind::Login, driver_fault("login form", err));
        }
        if let Err(err) = driver
            .fill(&selectors.password_field, &credentials.password)
            .await
        {
            return StepResult::failed(StepKind::Login, driver_fault("login form", err));
        }
        if let Err(err) = driver.click(&selectors.login_button).await {
            return StepResult::failed(StepKind::Login, driver_fault("login submit", err));
        }
        let _ = driver.idle(self.config.pacing.settle_delay_ms).await;

        self.wait_for_outcome(driver, detector).await
    }

    /// Bounded poll for the first terminal condition: challenge marker, error
    /// marker, or authenticated state. Probe faults are treated as "not yet":
    /// the page may legitimately be mid-navigation.
    async fn wait_for_outcome(
        &self,
        driver: &mut dyn PageDriver,
        detector: &ChallengeDetector,
    ) -> StepResult {
        let selectors = &self.config.selectors;
        let deadline =
            Instant::now() + Duration::from_secs(self.config.timeouts.login_wait_seconds);
        let poll = Duration::from_millis(self.config.timeouts.poll_interval_ms);

        loop {
            let verdict = detector.detect(driver).await;
            if verdict.present {
                info!(kind = ?verdict.kind, "challenge appeared after login submit");
                return StepResult::failed(
                    StepKind::Login,
                    StepError::ChallengeRequired(verdict.kind.unwrap_or_default()),
                );
            }

            match driver.visible_text(&selectors.login_error_markers).await {
                Ok(Some(message)) => {
                    info!("login rejected by site");
                    return StepResult::failed(
                        StepKind::Login,
                        StepError::AuthenticationRejected(message),
                    );
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "login error probe failed, retrying"),
            }

            if let Some(details) = self.authenticated_details(driver).await {
                info!("login confirmed");
                return StepResult::succeeded(StepKind::Login, Some(details));
            }

            if Instant::now() >= deadline {
                return StepResult::failed(
                    StepKind::Login,
                    StepError::Timeout("login confirmation".to_string()),
                );
            }
            sleep(poll).await;
        }
    }

    /// Authenticated when an account marker renders or the browser has left
    /// the login surface. Only non-sensitive confirmation data is retained.
    async fn authenticated_details(
        &self,
        driver: &mut dyn PageDriver,
    ) -> Option<serde_json::Value> {
        let selectors = &self.config.selectors;
        if let Ok(Some(marker)) = driver.find_present(&selectors.account_markers).await {
            let landing = driver.current_url().await.unwrap_or_default();
            return Some(json!({
                "marker": marker,
                "landing_url": landing,
            }));
        }
        match driver.current_url().await {
            Ok(url) if !url.is_empty() && !url.to_lowercase().contains("login") => {
                let host = url::Url::parse(&url)
                    .ok()
                    .and_then(|parsed| parsed.host_str().map(str::to_string));
                Some(json!({
                    "landing_url": url,
                    "landing_host": host,
                }))
            }
            _ => None,
        }
    }
}

pub(super) fn driver_fault(context: &str, err: SessionError) -> StepError {
    match err {
        SessionError::ElementMissing(detail) => {
            StepError::Timeout(format!("{context}: {detail}"))
        }
        other => StepError::Session(format!("{context}: {other}")),
    }
}
