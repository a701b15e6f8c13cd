#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;

use adpost_core::{
    Credentials, JobDescriptor, PageDriver, PostingDraft, SessionError, SessionProvider,
    SessionResult,
};

pub const LOGIN_BUTTON: &str = "#login";
pub const SUBMIT_BUTTON: &str = "button[name='go']";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginBehavior {
    Success,
    Rejected,
    Challenge,
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingBehavior {
    Success,
    SiteError,
    Challenge,
    Hang,
}

#[derive(Debug, Default)]
pub struct DriverLog {
    pub close_calls: usize,
    pub screenshot_calls: usize,
    pub gotos: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub clicked: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Login,
    Posting,
}

/// Scripted stand-in for a live browser page. Phase tracks the last
/// navigation; marker probes answer according to the configured behaviors,
/// keyed off the default selector lists.
pub struct MockDriver {
    login: LoginBehavior,
    posting: PostingBehavior,
    pub fail_screenshots: bool,
    pub fail_fill_selectors: Vec<String>,
    pub log: Rc<RefCell<DriverLog>>,
    phase: Phase,
    login_submitted: bool,
    posting_submitted: bool,
}

impl MockDriver {
    pub fn new(login: LoginBehavior, posting: PostingBehavior) -> Self {
        Self {
            login,
            posting,
            fail_screenshots: false,
            fail_fill_selectors: Vec::new(),
            log: Rc::new(RefCell::new(DriverLog::default())),
            phase: Phase::Login,
            login_submitted: false,
            posting_submitted: false,
        }
    }

    fn challenge_active(&self) -> bool {
        match self.phase {
            Phase::Login => self.login == LoginBehavior::Challenge,
            Phase::Posting => self.posting == PostingBehavior::Challenge,
        }
    }
}

#[async_trait(?Send)]
impl PageDriver for MockDriver {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        self.log.borrow_mut().gotos.push(url.to_string());
        self.phase = if url.contains("login") {
            Phase::Login
        } else {
            Phase::Posting
        };
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> SessionResult<()> {
        self.log
            .borrow_mut()
            .filled
            .push((selector.to_string(), value.to_string()));
        if self.fail_fill_selectors.iter().any(|s| s == selector) {
            return Err(SessionError::ElementMissing(selector.to_string()));
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> SessionResult<()> {
        self.log.borrow_mut().clicked.push(selector.to_string());
        if selector == LOGIN_BUTTON {
            self.login_submitted = true;
        }
        if selector == SUBMIT_BUTTON {
            self.posting_submitted = true;
        }
        Ok(())
    }

    async fn find_present(&mut self, selectors: &[String]) -> SessionResult<Option<String>> {
        if selectors.iter().any(|s| s.contains("recaptcha")) {
            if self.challenge_active() {
                return Ok(Some("iframe[src*='recaptcha']".to_string()));
            }
            return Ok(None);
        }
        if selectors.iter().any(|s| s.contains("account")) {
            if self.phase == Phase::Login
                && self.login_submitted
                && self.login == LoginBehavior::Success
            {
                return Ok(Some(selectors[0].clone()));
            }
            return Ok(None);
        }
        if selectors
            .iter()
            .any(|s| s.contains("confirm") || s.contains("thanks"))
        {
            if self.phase == Phase::Posting
                && self.posting_submitted
                && self.posting == PostingBehavior::Success
            {
                return Ok(Some(selectors[0].clone()));
            }
            return Ok(None);
        }
        Ok(None)
    }

    async fn visible_text(&mut self, selectors: &[String]) -> SessionResult<Option<String>> {
        if !selectors.iter().any(|s| s.contains("error")) {
            return Ok(None);
        }
        match self.phase {
            Phase::Login if self.login_submitted && self.login == LoginBehavior::Rejected => Ok(
                Some("the email or password you entered is incorrect".to_string()),
            ),
            Phase::Posting
                if self.posting_submitted && self.posting == PostingBehavior::SiteError =>
            {
                Ok(Some("posting blocked: too many attempts".to_string()))
            }
            _ => Ok(None),
        }
    }

    async fn body_contains(&mut self, _fragments: &[String]) -> SessionResult<Option<String>> {
        Ok(None)
    }

    async fn current_url(&mut self) -> SessionResult<String> {
        match self.phase {
            Phase::Login => {
                if self.login_submitted && self.login == LoginBehavior::Success {
                    Ok("https://accounts.craigslist.org/home".to_string())
                } else {
                    Ok("https://accounts.craigslist.org/login".to_string())
                }
            }
            Phase::Posting => Ok(self
                .log
                .borrow()
                .gotos
                .last()
                .cloned()
                .unwrap_or_default()),
        }
    }

    async fn screenshot_png(&mut self) -> SessionResult<Vec<u8>> {
        self.log.borrow_mut().screenshot_calls += 1;
        if self.fail_screenshots {
            return Err(SessionError::Script("render target gone".to_string()));
        }
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn idle(&mut self, _range_ms: [u64; 2]) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.log.borrow_mut().close_calls += 1;
    }
}

pub struct MockProvider {
    pub login: LoginBehavior,
    pub posting: PostingBehavior,
    pub acquire_error: Option<String>,
    pub fail_screenshots: bool,
    pub fail_fill_selectors: Vec<String>,
    pub log: Rc<RefCell<DriverLog>>,
    pub acquires: Rc<Cell<usize>>,
}

impl MockProvider {
    pub fn new(login: LoginBehavior, posting: PostingBehavior) -> Self {
        Self {
            login,
            posting,
            acquire_error: None,
            fail_screenshots: false,
            fail_fill_selectors: Vec::new(),
            log: Rc::new(RefCell::new(DriverLog::default())),
            acquires: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut provider = Self::new(LoginBehavior::Success, PostingBehavior::Success);
        provider.acquire_error = Some(message.to_string());
        provider
    }
}

#[async_trait(?Send)]
impl SessionProvider for MockProvider {
    async fn acquire(&self) -> SessionResult<Box<dyn PageDriver>> {
        self.acquires.set(self.acquires.get() + 1);
        if let Some(message) = &self.acquire_error {
            return Err(SessionError::Launch(message.clone()));
        }
        let mut driver = MockDriver::new(self.login, self.posting);
        driver.fail_screenshots = self.fail_screenshots;
        driver.fail_fill_selectors = self.fail_fill_selectors.clone();
        driver.log = Rc::clone(&self.log);
        Ok(Box::new(driver))
    }
}

pub fn sample_job() -> JobDescriptor {
    JobDescriptor {
        job_id: "job-42".to_string(),
        credentials: Credentials {
            email: "seller@example.org".to_string(),
            password: "hunter2".to_string(),
        },
        posting: PostingDraft {
            city: "newyork".to_string(),
            title: "Standing desk".to_string(),
            body: "Solid wood, pickup only".to_string(),
            category: "fuo".to_string(),
            price: 120,
            images: vec![
                "https://img.example.org/desk-1.jpg".to_string(),
                "https://img.example.org/desk-2.jpg".to_string(),
            ],
        },
    }
}
