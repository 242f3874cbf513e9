use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    /// Gate failures: no session, or the session has the wrong role.
    pub fn is_gate(&self) -> bool {
        matches!(self.code, "unauthenticated" | "forbidden")
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> Self {
        HandlerErr::new("internal", format!("{e:#}"))
    }
}

/// Write-path precondition failures. The display text is shown to the user
/// as-is.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("Missing required field: {0}.")]
    MissingField(&'static str),
    #[error("Grade must be a whole number.")]
    GradeNotANumber,
    #[error("Invalid date, expected YYYY-MM-DD.")]
    BadDate,
    #[error("Invalid time, expected HH:MM.")]
    BadTime,
    #[error("Student not found.")]
    UnknownStudent,
    #[error("This student is not in the classroom.")]
    StudentNotInClassroom,
    #[error("Subject not found.")]
    UnknownSubject,
    #[error("You do not teach this subject.")]
    NotYourSubject,
    #[error("Invalid evaluation.")]
    InvalidEvaluation,
    #[error("Grade must be between 1 and 10.")]
    GradeOutOfRange,
    #[error("Absences cannot be recorded on weekends.")]
    WeekendAbsence,
    #[error("All fields are required except the file.")]
    ExamFieldsMissing,
    #[error("Unknown evaluation type.")]
    UnknownExamType,
    #[error("You cannot create an evaluation for a subject you do not teach.")]
    ExamNotYourSubject,
}

impl Rejection {
    pub fn reason(self) -> &'static str {
        match self {
            Rejection::MissingField(_) => "missing_field",
            Rejection::GradeNotANumber => "grade_not_a_number",
            Rejection::BadDate => "bad_date",
            Rejection::BadTime => "bad_time",
            Rejection::UnknownStudent => "unknown_student",
            Rejection::StudentNotInClassroom => "student_not_in_classroom",
            Rejection::UnknownSubject => "unknown_subject",
            Rejection::NotYourSubject => "not_your_subject",
            Rejection::InvalidEvaluation => "invalid_evaluation",
            Rejection::GradeOutOfRange => "grade_out_of_range",
            Rejection::WeekendAbsence => "weekend_absence",
            Rejection::ExamFieldsMissing => "exam_fields_missing",
            Rejection::UnknownExamType => "unknown_exam_type",
            Rejection::ExamNotYourSubject => "exam_not_your_subject",
        }
    }
}

impl From<Rejection> for HandlerErr {
    fn from(r: Rejection) -> Self {
        HandlerErr {
            code: "rejected",
            message: r.to_string(),
            details: Some(json!({ "reason": r.reason() })),
        }
    }
}
