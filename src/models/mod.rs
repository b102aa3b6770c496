pub mod challenge;
pub mod frame;
pub mod session;

pub use challenge::{ChallengeTask, EnrollmentResult, VerificationOutcome, VerificationStats};
pub use frame::{CaptureFrame, ReferenceImage};
pub use session::{Session, SessionAction, SessionId, SessionStatus};
