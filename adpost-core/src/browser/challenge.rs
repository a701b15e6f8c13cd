use tracing::debug;

use crate::config::DetectorSection;

use super::session::PageDriver;

/// Outcome of a challenge inspection. `kind` names the marker that fired so
/// operators can tune the marker lists when a site changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeVerdict {
    pub present: bool,
    pub kind: Option<String>,
}

impl ChallengeVerdict {
    pub fn clear() -> Self {
        Self {
            present: false,
            kind: None,
        }
    }

    fn positive(kind: String) -> Self {
        Self {
            present: true,
            kind: Some(kind),
        }
    }
}

/// Heuristic detector for automated-traffic challenges. False negatives are
/// tolerated; a positive verdict halts the pipeline, so the marker set stays
/// narrow. Any probe fault is treated as a clear page: the calling step will
/// surface its own failure if the page truly is unusable.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    config: DetectorSection,
}

impl ChallengeDetector {
    pub fn new(config: DetectorSection) -> Self {
        Self { config }
    }

    pub async fn detect(&self, driver: &mut dyn PageDriver) -> ChallengeVerdict {
        match driver.find_present(&self.config.css_markers).await {
            Ok(Some(selector)) => return ChallengeVerdict::positive(format!("element:{selector}")),
            Ok(None) => {}
            Err(err) => {
                debug!(error = %err, "challenge element probe failed, treating page as clear");
                return ChallengeVerdict::clear();
            }
        }

        match driver.current_url().await {
            Ok(url) => {
                let lower = url.to_lowercase();
                for fragment in &self.config.url_fragments {
                    if lower.contains(&fragment.to_lowercase()) {
                        return ChallengeVerdict::positive(format!("url:{fragment}"));
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "challenge url probe failed, treating page as clear");
                return ChallengeVerdict::clear();
            }
        }

        match driver.body_contains(&self.config.text_fragments).await {
            Ok(Some(fragment)) => ChallengeVerdict::positive(format!("text:{fragment}")),
            Ok(None) => ChallengeVerdict::clear(),
            Err(err) => {
                debug!(error = %err, "challenge text probe failed, treating page as clear");
                ChallengeVerdict::clear()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{SessionError, SessionResult};
    use async_trait::async_trait;

    struct ProbeStub {
        matched_selector: Option<String>,
        url: String,
        matched_fragment: Option<String>,
        fail_probes: bool,
    }

    impl ProbeStub {
        fn clear_page() -> Self {
            Self {
                matched_selector: None,
                url: "https://accounts.craigslist.org/login".to_string(),
                matched_fragment: None,
                fail_probes: false,
            }
        }
    }

    #[async_trait(?Send)]
    impl PageDriver for ProbeStub {
        async fn goto(&mut self, _url: &str) -> SessionResult<()> {
            Ok(())
        }

        async fn fill(&mut self, _selector: &str, _value: &str) -> SessionResult<()> {
            Ok(())
        }

        async fn click(&mut self, _selector: &str) -> SessionResult<()> {
            Ok(())
        }

        async fn find_present(&mut self, _selectors: &[String]) -> SessionResult<Option<String>> {
            if self.fail_probes {
                return Err(SessionError::Script("page is navigating".to_string()));
            }
            Ok(self.matched_selector.clone())
        }

        async fn visible_text(&mut self, _selectors: &[String]) -> SessionResult<Option<String>> {
            Ok(None)
        }

        async fn body_contains(&mut self, _fragments: &[String]) -> SessionResult<Option<String>> {
            if self.fail_probes {
                return Err(SessionError::Script("page is navigating".to_string()));
            }
            Ok(self.matched_fragment.clone())
        }

        async fn current_url(&mut self) -> SessionResult<String> {
            Ok(self.url.clone())
        }

        async fn screenshot_png(&mut self) -> SessionResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn idle(&mut self, _range_ms: [u64; 2]) -> SessionResult<()> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn detector() -> ChallengeDetector {
        ChallengeDetector::new(DetectorSection::default())
    }

    #[tokio::test]
    async fn clear_page_yields_negative_verdict() {
        let mut driver = ProbeStub::clear_page();
        let verdict = detector().detect(&mut driver).await;
        assert!(!verdict.present);
        assert!(verdict.kind.is_none());
    }

    #[tokio::test]
    async fn recaptcha_element_fires_with_kind() {
        let mut driver = ProbeStub {
            matched_selector: Some("iframe[src*='recaptcha']".to_string()),
            ..ProbeStub::clear_page()
        };
        let verdict = detector().detect(&mut driver).await;
        assert!(verdict.present);
        assert_eq!(
            verdict.kind.as_deref(),
            Some("element:iframe[src*='recaptcha']")
        );
    }

    #[tokio::test]
    async fn sorry_url_fires() {
        let mut driver = ProbeStub {
            url: "https://www.example.org/sorry/index?continue=1".to_string(),
            ..ProbeStub::clear_page()
        };
        let verdict = detector().detect(&mut driver).await;
        assert!(verdict.present);
        assert_eq!(verdict.kind.as_deref(), Some("url:/sorry/"));
    }

    #[tokio::test]
    async fn body_text_fires() {
        let mut driver = ProbeStub {
            matched_fragment: Some("unusual traffic".to_string()),
            ..ProbeStub::clear_page()
        };
        let verdict = detector().detect(&mut driver).await;
        assert!(verdict.present);
        assert_eq!(verdict.kind.as_deref(), Some("text:unusual traffic"));
    }

    #[tokio::test]
    async fn probe_fault_fails_open() {
        let mut driver = ProbeStub {
            fail_probes: true,
            ..ProbeStub::clear_page()
        };
        let verdict = detector().detect(&mut driver).await;
        assert!(!verdict.present);
    }
}
