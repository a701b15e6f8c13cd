use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Worker-wide configuration. Every section carries defaults so the worker
/// runs without a config file; a TOML file overrides section by section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub chromium: ChromiumSection,
    pub site: SiteSection,
    pub selectors: SelectorSection,
    pub detector: DetectorSection,
    pub timeouts: TimeoutSection,
    pub pacing: PacingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub request_timeout_seconds: u64,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            window_width: 1920,
            window_height: 1080,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub login_url: String,
    pub posting_domain: String,
}

impl SiteSection {
    pub fn posting_url(&self, city: &str) -> String {
        format!("https://{city}.{domain}/", domain = self.posting_domain)
    }
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            login_url: "https://accounts.craigslist.org/login".to_string(),
            posting_domain: "craigslist.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub email_field: String,
    pub password_field: String,
    pub login_button: String,
    pub login_error_markers: Vec<String>,
    pub account_markers: Vec<String>,
    pub post_link: String,
    pub category_option: String,
    pub location_field: String,
    pub title_field: String,
    pub body_field: String,
    pub price_field: String,
    pub image_url_field: String,
    pub add_image_button: String,
    pub submit_button: String,
    pub confirmation_markers: Vec<String>,
    pub posting_error_markers: Vec<String>,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            email_field: "#inputEmailHandle".to_string(),
            password_field: "#inputPassword".to_string(),
            login_button: "#login".to_string(),
            login_error_markers: vec![
                ".error".to_string(),
                ".alert-danger".to_string(),
                "[class*='error']".to_string(),
            ],
            account_markers: vec![
                "#account-homepage".to_string(),
                ".account-header".to_string(),
            ],
            post_link: "#post".to_string(),
            category_option: "input[name='id'][value='{category}']".to_string(),
            location_field: "#GeographicArea".to_string(),
            title_field: "#PostingTitle".to_string(),
            body_field: "#PostingBody".to_string(),
            price_field: "#Ask".to_string(),
            image_url_field: "input[name='image_url']".to_string(),
            add_image_button: "#add-image".to_string(),
            submit_button: "button[name='go']".to_string(),
            confirmation_markers: vec![
                ".posting-confirm".to_string(),
                "blockquote.thanks".to_string(),
            ],
            posting_error_markers: vec![".error".to_string(), ".alert-danger".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    pub css_markers: Vec<String>,
    pub url_fragments: Vec<String>,
    pub text_fragments: Vec<String>,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            css_markers: vec![
                "iframe[src*='recaptcha']".to_string(),
                "div.g-recaptcha".to_string(),
                "div[class*='captcha']".to_string(),
                "img[src*='captcha']".to_string(),
            ],
            url_fragments: vec!["/sorry/".to_string(), "captcha".to_string()],
            text_fragments: vec![
                "unusual traffic".to_string(),
                "verify you are human".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub login_wait_seconds: u64,
    pub posting_wait_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            login_wait_seconds: 15,
            posting_wait_seconds: 30,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub settle_delay_ms: [u64; 2],
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: [1500, 2500],
        }
    }
}

impl WorkerConfig {
    /// Applies the environment overrides the worker recognizes:
    /// `ADPOST_HEADLESS` (true/false) and `CHROME_BIN`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ADPOST_HEADLESS") {
            self.chromium.headless = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("CHROME_BIN") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.chromium.executable_path = Some(trimmed.to_string());
            }
        }
    }
}

pub fn load_worker_config<P: AsRef<Path>>(path: P) -> Result<WorkerConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_a_runnable_worker() {
        let config = WorkerConfig::default();
        assert!(config.chromium.headless);
        assert!(config.chromium.executable_path.is_none());
        assert_eq!(config.site.posting_url("newyork"), "https://newyork.craigslist.org/");
        assert!(!config.detector.css_markers.is_empty());
        assert!(config.timeouts.login_wait_seconds > 0);
    }

    #[test]
    fn partial_toml_overrides_only_named_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[chromium]\nheadless = false\nexecutable_path = \"/usr/bin/chromium\"\n\n[timeouts]\nlogin_wait_seconds = 5"
        )
        .unwrap();
        let config = load_worker_config(file.path()).unwrap();
        assert!(!config.chromium.headless);
        assert_eq!(
            config.chromium.executable_path.as_deref(),
            Some("/usr/bin/chromium")
        );
        assert_eq!(config.timeouts.login_wait_seconds, 5);
        // untouched sections keep defaults
        assert_eq!(config.selectors.email_field, "#inputEmailHandle");
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chromium\nheadless = maybe").unwrap();
        let err = load_worker_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = WorkerConfig::default();
        config.apply_env(|name| match name {
            "ADPOST_HEADLESS" => Some("false".to_string()),
            "CHROME_BIN" => Some("/opt/chrome/chrome".to_string()),
            _ => None,
        });
        assert!(!config.chromium.headless);
        assert_eq!(
            config.chromium.executable_path.as_deref(),
            Some("/opt/chrome/chrome")
        );
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = WorkerConfig::default();
        config.apply_env(|name| match name {
            "CHROME_BIN" => Some("  ".to_string()),
            _ => None,
        });
        assert!(config.chromium.executable_path.is_none());
    }
}
