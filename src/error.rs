use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalculationError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template inheritance cycle detected: {chain}")]
    InheritanceCycle { chain: String },

    #[error("Template inheritance for '{id}' exceeds the maximum depth of {depth}")]
    InheritanceTooDeep { id: String, depth: usize },

    #[error("Template '{0}' has no formula, directly or through inheritance")]
    MissingFormula(String),

    #[error("Unknown custom calculator: {0}")]
    UnknownCalculator(String),

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Invalid template '{template}': {details}")]
    InvalidTemplate { template: String, details: String },

    #[error("Invalid financial year start month {0}: must be between 0 and 11")]
    InvalidStartMonth(u32),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Configuration store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CalculationError>;
