use crate::registry::Scope;

pub type DiceResult<T> = Result<T, DiceError>;

/// Every user-input failure the evaluator can raise. Evaluation of the whole
/// root aborts on any of these; partial results are never returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DiceError {
    #[error("cannot roll a negative number of dice")]
    NegativeDice,
    #[error("exceeded the limit of {max} dice per roll")]
    TooManyDice { max: u32 },
    #[error("a die must have between 1 and {max} sides, got {sides}")]
    BadSides { sides: i64, max: u32 },
    #[error("{sides} is not a standard die size")]
    WrongSides { sides: u32 },
    #[error("expression nesting exceeded the depth limit of {max}")]
    RecursionDepthExceeded { max: u32 },
    #[error("no function named {name:?} in {scope} scope")]
    NoSuchFunction { name: String, scope: Scope },
    #[error("{name} takes {expected} argument(s), got {got}")]
    IncorrectArity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("{name}: argument {index} has the wrong type")]
    IncorrectArgType { name: String, index: usize },
    #[error("cannot mix different explosion kinds on one roll")]
    MixedExplodeType,
    #[error("cannot mix conditional and unconditional explosions on one roll")]
    MixedExplodeComp,
    #[error("cannot mix reroll and rerollOnce on one roll")]
    MixedReroll,
    #[error("reroll count must be between 1 and {max}")]
    BadRerollCount { max: u32 },
    #[error("at most one sort may be applied to a roll")]
    TooManySort,
    #[error("advantage or disadvantage may only be applied once")]
    AdvantageOnlyOnce,
    #[error("advantage cannot be combined with keep or drop")]
    NoAdvantageKeep,
    #[error("failure requires a success condition on the same roll")]
    InvalidSuccess,
    #[error("no macro named {name:?}")]
    InvalidMacro { name: String },
    #[error("cannot divide by zero")]
    DivideByZero,
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Bare error code, for callers that match on the failure class without
/// caring about the attached context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    NegativeDice,
    TooManyDice,
    BadSides,
    WrongSides,
    RecursionDepthExceeded,
    NoSuchFunction,
    IncorrectArity,
    IncorrectArgType,
    MixedExplodeType,
    MixedExplodeComp,
    MixedReroll,
    BadRerollCount,
    TooManySort,
    AdvantageOnlyOnce,
    NoAdvantageKeep,
    InvalidSuccess,
    InvalidMacro,
    DivideByZero,
    ParseError,
}

impl DiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NegativeDice => ErrorCode::NegativeDice,
            Self::TooManyDice { .. } => ErrorCode::TooManyDice,
            Self::BadSides { .. } => ErrorCode::BadSides,
            Self::WrongSides { .. } => ErrorCode::WrongSides,
            Self::RecursionDepthExceeded { .. } => ErrorCode::RecursionDepthExceeded,
            Self::NoSuchFunction { .. } => ErrorCode::NoSuchFunction,
            Self::IncorrectArity { .. } => ErrorCode::IncorrectArity,
            Self::IncorrectArgType { .. } => ErrorCode::IncorrectArgType,
            Self::MixedExplodeType => ErrorCode::MixedExplodeType,
            Self::MixedExplodeComp => ErrorCode::MixedExplodeComp,
            Self::MixedReroll => ErrorCode::MixedReroll,
            Self::BadRerollCount { .. } => ErrorCode::BadRerollCount,
            Self::TooManySort => ErrorCode::TooManySort,
            Self::AdvantageOnlyOnce => ErrorCode::AdvantageOnlyOnce,
            Self::NoAdvantageKeep => ErrorCode::NoAdvantageKeep,
            Self::InvalidSuccess => ErrorCode::InvalidSuccess,
            Self::InvalidMacro { .. } => ErrorCode::InvalidMacro,
            Self::DivideByZero => ErrorCode::DivideByZero,
            Self::ParseError(_) => ErrorCode::ParseError,
        }
    }
}
