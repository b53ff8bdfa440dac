//! Request validation schemas
//!
//! Request bodies are deserialized with unknown fields rejected, then checked
//! with `validator` rules plus the cross-field rules `validator` cannot
//! express. Failures come back as [`ValidationIssue`]s keyed by the JSON
//! (camelCase) field name, in declaration order, so callers can report the
//! first one.
//!
//! # Example
//!
//! ```
//! use calendar_agent_shared::validation::{UpdateProfileRequest, ValidateRequest};
//!
//! let req: UpdateProfileRequest =
//!     serde_json::from_str(r#"{"workHoursStart": 17, "workHoursEnd": 9}"#).unwrap();
//!
//! let issues = req.validated().unwrap_err();
//! assert_eq!(issues[0].field, "workHoursEnd");
//! assert_eq!(issues[0].message, "Work hours start must be before work hours end");
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::ProfileChanges;

/// One failed rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON field name
    pub field: String,
    pub message: String,
}

/// Request bodies with rules beyond their shape
pub trait ValidateRequest: Sized {
    /// Normalizes and checks the request
    ///
    /// Returns the normalized request, or every failed rule.
    fn validated(self) -> Result<Self, Vec<ValidationIssue>>;
}

/// Days accepted in `workDays`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}

/// Body of `PATCH /api/v1/user/profile`; every field optional
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Timezone must be between 1 and 50 characters"))]
    pub timezone: Option<String>,

    #[validate(range(min = 0, max = 23, message = "Work hours start must be between 0 and 23"))]
    pub work_hours_start: Option<i32>,

    #[validate(range(min = 0, max = 23, message = "Work hours end must be between 0 and 23"))]
    pub work_hours_end: Option<i32>,

    #[validate(length(min = 1, max = 7, message = "Work days must have between 1 and 7 entries"))]
    pub work_days: Option<Vec<Weekday>>,

    #[validate(range(min = 0, max = 120, message = "Break duration must be between 0 and 120 minutes"))]
    pub break_duration: Option<i32>,
}

impl ValidateRequest for UpdateProfileRequest {
    fn validated(mut self) -> Result<Self, Vec<ValidationIssue>> {
        self.name = self.name.map(|n| n.trim().to_string());

        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        if let (Some(start), Some(end)) = (self.work_hours_start, self.work_hours_end) {
            if start >= end {
                errors.add(
                    "work_hours_end",
                    rule("work_hours_order", "Work hours start must be before work hours end"),
                );
            }
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(collect_issues(&errors))
        }
    }
}

impl From<UpdateProfileRequest> for ProfileChanges {
    fn from(req: UpdateProfileRequest) -> Self {
        ProfileChanges {
            name: req.name,
            timezone: req.timezone,
            work_hours_start: req.work_hours_start,
            work_hours_end: req.work_hours_end,
            work_days: req
                .work_days
                .map(|days| days.iter().map(|d| d.as_str().to_string()).collect()),
            break_duration: req.break_duration,
        }
    }
}

/// Body of `DELETE /api/v1/user/delete`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteAccountRequest {
    #[validate(length(min = 1, message = "Confirmation token required"))]
    pub confirmation_token: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

impl ValidateRequest for DeleteAccountRequest {
    fn validated(mut self) -> Result<Self, Vec<ValidationIssue>> {
        self.email = self.email.trim().to_string();
        self.validate().map_err(|e| collect_issues(&e))?;
        self.email = self.email.to_lowercase();
        Ok(self)
    }
}

/// Field order used when reporting issues
const FIELD_ORDER: &[&str] = &[
    "name",
    "timezone",
    "workHoursStart",
    "workHoursEnd",
    "workDays",
    "breakDuration",
    "confirmationToken",
    "email",
];

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Flattens `validator` errors into ordered issues
pub fn collect_issues(errors: &ValidationErrors) -> Vec<ValidationIssue> {
    let mut issues: Vec<ValidationIssue> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            let field = camel_case(&field.to_string());
            errs.iter().map(move |e| ValidationIssue {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Validation failed".to_string()),
            })
        })
        .collect();

    issues.sort_by_key(|issue| {
        FIELD_ORDER
            .iter()
            .position(|f| *f == issue.field)
            .unwrap_or(FIELD_ORDER.len())
    });
    issues
}

fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
