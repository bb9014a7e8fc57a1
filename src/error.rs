//! Planner error type.
//!
//! Only structural failures surface as errors. Solver fallbacks, unresolved
//! overloads and uncovered customers are reported in the plan itself.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PlannerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("no team-days available for the target week")]
    NoTeamDays,
    #[error("customer {0} appears more than once in the input")]
    DuplicateCustomer(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;

impl PlannerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
