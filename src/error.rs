use serde_json::json;
use thiserror::Error;

pub type ErpResult<T> = Result<T, ErpError>;

#[derive(Debug, Error)]
pub enum ErpError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error(transparent)]
    State(#[from] StateViolation),

    #[error(transparent)]
    BusinessRule(#[from] RuleViolation),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum Conflict {
    #[error("already actively enrolled in {course_code}")]
    DuplicateEnrollment { course_code: String },
    #[error("attendance already marked for this session")]
    AlreadyMarked,
    #[error("student already holds a booking for this academic year")]
    DuplicateBooking,
    #[error("receipt number {0} already exists")]
    DuplicateReceipt(String),
    #[error("assignment already submitted")]
    AlreadySubmitted,
    #[error("an attendance session is already open for this slot: {session_id}")]
    SessionAlreadyOpen { session_id: String },
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
}

#[derive(Debug, Error)]
pub enum StateViolation {
    #[error("bed {bed_id} is not available")]
    BedUnavailable { bed_id: String },
    #[error("attendance session is closed")]
    SessionClosed,
    #[error("registration window is closed")]
    RegistrationWindowClosed,
    #[error("assignment deadline has passed")]
    AssignmentDeadlinePassed,
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum RuleViolation {
    #[error("{course_code} requires {}", .missing.join(", "))]
    PrerequisiteNotSatisfied {
        course_code: String,
        missing: Vec<String>,
    },
    #[error("{course_code} is not part of the student's curriculum")]
    CourseNotInCurriculum { course_code: String },
    #[error("not eligible for hostel: {reason}")]
    IneligibleForHostel { reason: String },
    #[error("student is not enrolled in this course for the semester")]
    NotEnrolled,
    #[error("no copies available")]
    NoCopiesAvailable,
    #[error("{0}")]
    Other(String),
}

impl ErpError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ErpError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ErpError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wire-level error family.
    pub fn code(&self) -> &'static str {
        match self {
            ErpError::Validation { .. } => "validation_error",
            ErpError::NotFound { .. } => "not_found",
            ErpError::PermissionDenied(_) => "permission_denied",
            ErpError::Conflict(_) => "conflict",
            ErpError::State(_) => "state_error",
            ErpError::BusinessRule(_) => "business_rule",
            ErpError::Internal(_) => "internal",
            ErpError::Db(_) => "db_error",
        }
    }

    /// Specific failure name, stable for callers that branch on it.
    pub fn kind(&self) -> &'static str {
        match self {
            ErpError::Validation { .. } => "ValidationError",
            ErpError::NotFound { .. } => "NotFound",
            ErpError::PermissionDenied(_) => "PermissionDenied",
            ErpError::Conflict(c) => match c {
                Conflict::DuplicateEnrollment { .. } => "DuplicateEnrollment",
                Conflict::AlreadyMarked => "AlreadyMarked",
                Conflict::DuplicateBooking => "DuplicateBooking",
                Conflict::DuplicateReceipt(_) => "DuplicateReceipt",
                Conflict::AlreadySubmitted => "AlreadySubmitted",
                Conflict::SessionAlreadyOpen { .. } => "SessionAlreadyOpen",
                Conflict::Duplicate { .. } => "Duplicate",
            },
            ErpError::State(s) => match s {
                StateViolation::BedUnavailable { .. } => "BedUnavailable",
                StateViolation::SessionClosed => "SessionClosed",
                StateViolation::RegistrationWindowClosed => "RegistrationWindowClosed",
                StateViolation::AssignmentDeadlinePassed => "AssignmentDeadlinePassed",
                StateViolation::InvalidTransition { .. } => "InvalidTransition",
                StateViolation::Other(_) => "StateError",
            },
            ErpError::BusinessRule(r) => match r {
                RuleViolation::PrerequisiteNotSatisfied { .. } => "PrerequisiteNotSatisfied",
                RuleViolation::CourseNotInCurriculum { .. } => "CourseNotInCurriculum",
                RuleViolation::IneligibleForHostel { .. } => "IneligibleForHostel",
                RuleViolation::NotEnrolled => "NotEnrolled",
                RuleViolation::NoCopiesAvailable => "NoCopiesAvailable",
                RuleViolation::Other(_) => "BusinessRuleError",
            },
            ErpError::Internal(_) | ErpError::Db(_) => "Internal",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        let mut details = json!({ "kind": self.kind() });
        match self {
            ErpError::Validation { field, .. } => details["field"] = json!(field),
            ErpError::NotFound { entity, id } => {
                details["entity"] = json!(entity);
                details["id"] = json!(id);
            }
            ErpError::Conflict(Conflict::DuplicateEnrollment { course_code }) => {
                details["courseCode"] = json!(course_code)
            }
            ErpError::Conflict(Conflict::DuplicateReceipt(receipt)) => {
                details["receiptNumber"] = json!(receipt)
            }
            ErpError::Conflict(Conflict::SessionAlreadyOpen { session_id }) => {
                details["sessionId"] = json!(session_id)
            }
            ErpError::State(StateViolation::BedUnavailable { bed_id }) => {
                details["bedId"] = json!(bed_id)
            }
            ErpError::State(StateViolation::InvalidTransition { from, to, .. }) => {
                details["from"] = json!(from);
                details["to"] = json!(to);
            }
            ErpError::BusinessRule(RuleViolation::PrerequisiteNotSatisfied {
                course_code,
                missing,
            }) => {
                details["courseCode"] = json!(course_code);
                details["missing"] = json!(missing);
            }
            ErpError::BusinessRule(RuleViolation::CourseNotInCurriculum { course_code }) => {
                details["courseCode"] = json!(course_code)
            }
            _ => {}
        }
        details
    }
}

/// True when SQLite rejected a write because of a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == rusqlite::ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Maps a unique-constraint failure to `on_conflict`, anything else to `ErpError::Db`.
pub fn map_unique(e: rusqlite::Error, on_conflict: impl FnOnce() -> Conflict) -> ErpError {
    if is_unique_violation(&e) {
        ErpError::Conflict(on_conflict())
    } else {
        ErpError::Db(e)
    }
}
