use chrono::NaiveDate;
use thiserror::Error;

/// Fatal problems with the uploaded source; nothing is aggregated.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook has no sheets")]
    NoSheets,

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid capacity key '{0}': expected \"<geography>,<year>\"")]
    InvalidKey(String),

    #[error("Working hours for '{0}' must be greater than zero")]
    NonPositiveHours(String),

    #[error("Month '{month}' for '{key}' is outside 1..12")]
    InvalidMonth { key: String, month: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RangeError {
    #[error("range '{name}' needs a start and an end date, got {supplied}")]
    Incomplete { name: String, supplied: usize },

    #[error("range '{name}' starts on {start} after it ends on {end}")]
    StartAfterEnd {
        name: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("range '{name}' has an unreadable date '{value}'")]
    UnreadableDate { name: String, value: String },
}

/// Non-fatal findings that accompany a result instead of aborting it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Diagnostic {
    #[error("{count} rows skipped due to unreadable start timestamps")]
    SkippedRows { count: usize },

    #[error("{count} events end before they start; their end timestamp is ignored")]
    EndBeforeStart { count: usize },

    #[error("range '{name}' skipped: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("{range}: no staffing configured for {geography}{} month {month} but absences were recorded", year_suffix(.year))]
    MissingCapacity {
        range: String,
        geography: String,
        year: Option<i32>,
        month: u32,
    },

    #[error("{count} events have no usable end timestamp and add no hours in duration mode")]
    MissingEnd { count: usize },

    #[error("{range}: {geography}{} month {month} is at {percent:.2}%, above the alert threshold", year_suffix(.year))]
    AboveThreshold {
        range: String,
        geography: String,
        year: Option<i32>,
        month: u32,
        percent: f64,
    },
}

fn year_suffix(year: &Option<i32>) -> String {
    year.map(|y| format!(" {}", y)).unwrap_or_default()
}
