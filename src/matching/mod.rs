//! Candidate selection and mutual-like detection.

pub mod detector;
pub mod selector;

pub use detector::{MatchDetector, MatchOutcome};
pub use selector::CandidateSelector;
