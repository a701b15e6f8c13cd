mod challenge;
mod error;
mod session;

pub use challenge::{ChallengeDetector, ChallengeVerdict};
pub use error::{SessionError, SessionResult};
pub use session::{
    detect_browser_binary, ChromiumProvider, PageDriver, SessionConfig, SessionProvider,
};
