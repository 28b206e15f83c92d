//! Payload contracts for request and response bodies.
//!
//! Both inbound payloads (after JSON parsing) and outbound DTOs (before
//! serialization) are checked against the same trait. An inbound failure is
//! a client error with field detail; an outbound failure is a handler bug
//! and is logged server-side while the client sees only a generic error.

use serde::Serialize;

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Dotted path to the offending field (e.g. `items.3.quantity`).
    pub path: String,
    /// Human-readable description of the constraint that failed.
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Structural validation for payloads crossing the process boundary.
///
/// Implementations collect every issue rather than stopping at the first,
/// so clients get complete field-level feedback in one round trip.
pub trait Validate {
    /// # Errors
    ///
    /// Returns all field-level issues found in the payload.
    fn validate(&self) -> Result<(), Vec<FieldIssue>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Enrollment {
        course_id: String,
        seats: u32,
    }

    impl Validate for Enrollment {
        fn validate(&self) -> Result<(), Vec<FieldIssue>> {
            let mut issues = Vec::new();
            if self.course_id.is_empty() {
                issues.push(FieldIssue::new("course_id", "must not be empty"));
            }
            if self.seats == 0 {
                issues.push(FieldIssue::new("seats", "must be at least 1"));
            }
            if issues.is_empty() {
                Ok(())
            } else {
                Err(issues)
            }
        }
    }

    #[test]
    fn test_valid_payload_passes() {
        let payload = Enrollment { course_id: "algebra-101".to_string(), seats: 2 };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let payload = Enrollment { course_id: String::new(), seats: 0 };
        let issues = payload.validate().unwrap_err();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].path, "course_id");
        assert_eq!(issues[1].path, "seats");
    }

    #[test]
    fn test_issue_serialization() {
        let issue = FieldIssue::new("seats", "must be at least 1");
        let json = serde_json::to_value(&issue).unwrap();

        assert_eq!(json["path"], "seats");
        assert_eq!(json["message"], "must be at least 1");
    }
}
