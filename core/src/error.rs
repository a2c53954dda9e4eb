use thiserror::Error;

/// Every failure the decision-support core can surface.
///
/// Variants carry the field, threshold or count that caused them so a
/// caller can render an actionable message. Nothing in the core retries.
#[derive(Error, Debug)]
pub enum TradeError {
    // ── Validation ─────────────────────────────────────────────
    #[error("Invalid product category '{value}'")]
    InvalidCategory { value: String },

    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("Malformed shipment: field '{field}' {reason}")]
    MalformedShipment { field: &'static str, reason: String },

    #[error("No duty rate entry for product category '{category}'")]
    UnknownDutyCategory { category: String },

    #[error("No route profile for route '{route}' by {mode}")]
    UnknownRouteProfile { route: String, mode: String },

    #[error("No historical {kind} aggregate for '{key}'")]
    MissingAggregate { kind: &'static str, key: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    // ── Data sufficiency ───────────────────────────────────────
    #[error("Insufficient training data for class '{class}': {available} samples, {required} required")]
    InsufficientTrainingData {
        class: String,
        available: usize,
        required: usize,
    },

    #[error("Insufficient history: {available} usable months, {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error("Insufficient trials: {available} requested, at least {required} required")]
    InsufficientTrials { available: usize, required: usize },

    #[error("Trial budget exceeded: {requested} requested, budget is {budget}")]
    TrialBudgetExceeded { requested: usize, budget: usize },

    #[error("Empty input: {what}")]
    EmptyInput { what: &'static str },

    // ── Model / series shape ───────────────────────────────────
    #[error("Feature vector has {actual} values, model expects {expected}")]
    FeatureDimension { expected: usize, actual: usize },

    #[error("Feature '{feature}' never occurred in training data")]
    OutOfDomainFeature { feature: String },

    #[error("Malformed series for {product}/{market}: {reason}")]
    MalformedSeries {
        product: String,
        market: String,
        reason: String,
    },

    #[error("Numerical failure in {context}: {reason}")]
    Numerical { context: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type TradeResult<T> = Result<T, TradeError>;
