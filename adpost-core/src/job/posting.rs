use serde_json::json;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::browser::{ChallengeDetector, PageDriver};
use crate::config::WorkerConfig;

use super::login::driver_fault;
use super::types::{FieldWarning, PostingDraft, StepError, StepKind, StepResult};

/// Drives the posting form through category, fields, and images to a
/// submission confirmation. Field-level faults that do not prevent submission
/// are collected as warnings; structural faults block.
pub struct PostingStep<'a> {
    config: &'a WorkerConfig,
}

impl<'a> PostingStep<'a> {
    pub fn new(config: &'a WorkerConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        driver: &mut dyn PageDriver,
        detector: &ChallengeDetector,
        posting: &PostingDraft,
    ) -> StepResult {
        let selectors = &self.config.selectors;
        let pacing = self.config.pacing.settle_delay_ms;
        let url = self.config.site.posting_url(&posting.city);

        if let Err(err) = driver.goto(&url).await {
            warn!(error = %err, "posting page navigation failed");
            return StepResult::failed(StepKind::CreatePosting, driver_fault("posting page", err));
        }
        let _ = driver.idle(pacing).await;

        let verdict = detector.detect(driver).await;
        if verdict.present {
            info!(kind = ?verdict.kind, "challenge present on posting page");
            return StepResult::failed(
                StepKind::CreatePosting,
                StepError::ChallengeRequired(verdict.kind.unwrap_or_default()),
            );
        }

        if let Err(err) = driver.click(&selectors.post_link).await {
            return StepResult::failed(
                StepKind::CreatePosting,
                StepError::SubmissionFailed(format!("posting entry point unavailable: {err}")),
            );
        }
        let _ = driver.idle(pacing).await;

        let mut warnings = Vec::new();

        let category_selector = selectors
            .category_option
            .replace("{category}", &posting.category);
        if let Err(err) = driver.click(&category_selector).await {
            debug!(error = %err, "category selection failed");
            warnings.push(FieldWarning {
                field: "category".to_string(),
                message: err.to_string(),
            });
        }

        let fields = [
            ("location", &selectors.location_field, posting.city.clone()),
            ("title", &selectors.title_field, posting.title.clone()),
            ("body", &selectors.body_field, posting.body.clone()),
            ("price", &selectors.price_field, posting.price.to_string()),
        ];
        for (name, selector, value) in fields {
            if let Err(err) = driver.fill(selector, &value).await {
                debug!(field = name, error = %err, "field population failed");
                warnings.push(FieldWarning {
                    field: name.to_string(),
                    message: err.to_string(),
                });
            }
        }

        let mut images_attached = 0usize;
        for (index, image) in posting.images.iter().enumerate() {
            match self.attach_image(driver, image).await {
                Ok(()) => images_attached += 1,
                Err(message) => {
                    debug!(index, error = %message, "image attach failed");
                    warnings.push(FieldWarning {
                        field: format!("images[{index}]"),
                        message,
                    });
                }
            }
        }

        if let Err(err) = driver.click(&selectors.submit_button).await {
            return StepResult::failed(
                StepKind::CreatePosting,
                StepError::SubmissionFailed(format!("submit control unavailable: {err}")),
            )
            .with_warnings(warnings);
        }
        let _ = driver.idle(pacing).await;

        self.wait_for_confirmation(driver, detector, images_attached)
            .await
            .with_warnings(warnings)
    }

    async fn attach_image(
        &self,
        driver: &mut dyn PageDriver,
        image_url: &str,
    ) -> Result<(), String> {
        let selectors = &self.config.selectors;
        driver
            .fill(&selectors.image_url_field, image_url)
            .await
            .map_err(|err| err.to_string())?;
        driver
            .click(&selectors.add_image_button)
            .await
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn wait_for_confirmation(
        &self,
        driver: &mut dyn PageDriver,
        detector: &ChallengeDetector,
        images_attached: usize,
    ) -> StepResult {
        let selectors = &self.config.selectors;
        let deadline =
            Instant::now() + Duration::from_secs(self.config.timeouts.posting_wait_seconds);
        let poll = Duration::from_millis(self.config.timeouts.poll_interval_ms);

        loop {
            let verdict = detector.detect(driver).await;
            if verdict.present {
                info!(kind = ?verdict.kind, "challenge appeared after submission");
                return StepResult::failed(
                    StepKind::CreatePosting,
                    StepError::ChallengeRequired(verdict.kind.unwrap_or_default()),
                );
            }

            match driver.find_present(&selectors.confirmation_markers).await {
                Ok(Some(marker)) => {
                    let confirmation_url = driver.current_url().await.unwrap_or_default();
                    info!(images_attached, "posting confirmed");
                    return StepResult::succeeded(
                        StepKind::CreatePosting,
                        Some(json!({
                            "marker": marker,
                            "confirmation_url": confirmation_url,
                            "images_attached": images_attached,
                        })),
                    );
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "confirmation probe failed, retrying"),
            }

            match driver.visible_text(&selectors.posting_error_markers).await {
                Ok(Some(message)) => {
                    info!("posting rejected by site");
                    return StepResult::failed(
                        StepKind::CreatePosting,
                        StepError::SubmissionFailed(message),
                    );
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "posting error probe failed, retrying"),
            }

            if Instant::now() >= deadline {
                return StepResult::failed(
                    StepKind::CreatePosting,
                    StepError::Timeout("submission confirmation".to_string()),
                );
            }
            sleep(poll).await;
        }
    }
}
