pub mod builder;
pub(crate) mod builtins;
pub mod config;
pub mod entropy;
pub mod error;
pub mod eval;
pub mod node;
pub mod registry;
pub mod table;
pub mod trace;
pub mod value;

pub use builder::RollBuilder;
pub use config::EvalConfig;
pub use entropy::{Entropy, SequenceEntropy};
pub use error::{DiceError, DiceResult, ErrorCode};
pub use eval::{evaluate, EvalContext, Evaluated, Evaluator, Recipe};
pub use node::Node;
pub use registry::{
    CallBehavior, DiceFunction, MacroRegistry, PendingCall, Registry, Scope, Timing,
};
pub use value::{Float, Int, Value, ValueType};
