use super::domain::{normalize_text, CandidateProfile, CandidateSubmission, JobPosting};

/// Validation errors raised when a public submission is turned into a candidate profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeViolation {
    #[error("a full name is required")]
    MissingName,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("this position is not accepting applications")]
    JobNotOpen,
}

/// Guard responsible for producing `CandidateProfile` instances from public submissions.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard;

impl IntakeGuard {
    pub fn new() -> Self {
        Self
    }

    /// Refuse submissions for postings that are not open.
    pub fn ensure_open(&self, posting: &JobPosting) -> Result<(), IntakeViolation> {
        if posting.accepts_applications() {
            Ok(())
        } else {
            Err(IntakeViolation::JobNotOpen)
        }
    }

    pub fn candidate_from_submission(
        &self,
        submission: CandidateSubmission,
    ) -> Result<CandidateProfile, IntakeViolation> {
        let full_name = submission.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(IntakeViolation::MissingName);
        }

        let email = submission.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(IntakeViolation::InvalidEmail(email));
        }

        Ok(CandidateProfile {
            full_name,
            email,
            phone: normalize_text(submission.phone),
            resume_url: normalize_text(submission.resume_url),
            linkedin_url: normalize_text(submission.linkedin_url),
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
