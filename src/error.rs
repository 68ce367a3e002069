use thiserror::Error;

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A `start-end` token that is not exactly two numeric parts.
    #[error("malformed range '{token}': expected START-END with non-negative integers")]
    MalformedRange { token: String },

    /// A literal token that is not an integer.
    #[error("malformed roll number '{token}'")]
    MalformedToken { token: String },

    #[error("specification denotes {count} roll numbers, more than the limit of {limit}")]
    TooManyRolls { count: u128, limit: usize },

    /// One page could not be fetched. Recoverable at batch level.
    #[error("fetch failed for roll {roll}: {reason}")]
    Transport { roll: u64, reason: String },

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("table has neither a 'roll_number' nor a 'Roll No' column")]
    MissingRollColumn,

    #[error("table has no 'Subjects' column")]
    MissingSubjectsColumn,

    #[error("row {row}: {reason}")]
    BadRow { row: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("template: {0}")]
    Template(#[from] askama::Error),
}

impl ScrapeError {
    pub fn transport(roll: u64, reason: impl ToString) -> Self {
        Self::Transport {
            roll,
            reason: reason.to_string(),
        }
    }
}
