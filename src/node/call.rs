use crate::error::{DiceError, DiceResult};
use crate::eval::EvalContext;
use crate::node::{Evaluate, Node, Outcome};
use crate::trace::Entry;
use crate::value::{Value, ValueType};
use std::fmt;

pub use crate::registry::Scope;

/// What a function or macro body hands back. `entries` left as `None`
/// means the attached expression's trace passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    pub value: Value,
    pub value_type: ValueType,
    pub entries: Option<Vec<Entry>>,
}

/// The view a function or macro body gets of its call site. Arguments and
/// the attached expression are already evaluated; the body reads their
/// values and writes its outcome into `result`.
pub struct CallContext<'a> {
    pub scope: Scope,
    pub name: &'a str,
    pub args: &'a mut [Node],
    pub expr: Option<&'a mut Node>,
    pub result: CallResult,
}

impl<'a> CallContext<'a> {
    pub fn arity(&self, expected: usize) -> DiceResult<()> {
        if self.args.len() == expected {
            Ok(())
        } else {
            Err(DiceError::IncorrectArity {
                name: self.name.to_string(),
                expected,
                got: self.args.len(),
            })
        }
    }

    pub fn arity_between(&self, min: usize, max: usize) -> DiceResult<()> {
        if (min..=max).contains(&self.args.len()) {
            Ok(())
        } else {
            Err(DiceError::IncorrectArity {
                name: self.name.to_string(),
                expected: min,
                got: self.args.len(),
            })
        }
    }

    /// The numeric value of argument `index`; comparison arguments are not
    /// numbers and are rejected.
    pub fn number(&self, index: usize) -> DiceResult<Value> {
        let arg = self.args.get(index).ok_or(DiceError::IncorrectArity {
            name: self.name.to_string(),
            expected: index + 1,
            got: self.args.len(),
        })?;
        if arg.is_comparison() {
            return Err(DiceError::IncorrectArgType {
                name: self.name.to_string(),
                index,
            });
        }
        Ok(arg.value())
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// A resolved-at-evaluation call that stayed a call: registry entries
/// without a compose hook run their body here, against the evaluated
/// arguments and attached expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub scope: Scope,
    pub args: Vec<Node>,
    pub expr: Option<Box<Node>>,
    pub(crate) out: Outcome,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, scope: Scope, args: Vec<Node>, expr: Option<Node>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            scope,
            args,
            expr: expr.map(Box::new),
            out: Outcome::default(),
        }
    }

    fn invoke(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let function = ctx.resolve_function(&self.name, self.scope)?;

        let mut result = CallResult::default();
        if let Some(expr) = &self.expr {
            result.value = expr.value();
            result.value_type = expr.value_type();
        }

        let before = ctx.rolls();
        if let Some(body) = &function.call {
            let mut call = CallContext {
                scope: self.scope,
                name: &self.name,
                args: &mut self.args,
                expr: self.expr.as_deref_mut(),
                result,
            };
            body(&mut call, ctx)?;
            result = call.result;
        }
        let body_rolls = ctx.rolls() - before;

        self.out.value = result.value;
        self.out.value_type = result.value_type;
        self.out.entries = match (result.entries, &self.expr) {
            (Some(entries), _) => entries,
            (None, Some(expr)) => expr.entries().to_vec(),
            (None, None) => vec![Entry::Literal(result.value)],
        };
        Ok(body_rolls)
    }
}

impl Evaluate for FunctionCall {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        if let Some(expr) = &mut self.expr {
            rolls += expr.evaluate(ctx)?;
        }
        for arg in &mut self.args {
            rolls += arg.evaluate(ctx)?;
        }
        rolls += self.invoke(ctx)?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        if let Some(expr) = &mut self.expr {
            rolls += expr.reroll(ctx)?;
        }
        rolls += self.invoke(ctx)?;
        Ok(rolls)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        let mut children: Vec<&mut Node> = self.args.iter_mut().collect();
        if let Some(expr) = &mut self.expr {
            children.push(expr);
        }
        children
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(expr) = &self.expr {
            write!(f, "{}.", expr)?;
        }
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

/// A user macro invocation. The body produces one value per invocation;
/// every result lands in the macro history so a recipe can replay it.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub name: String,
    pub args: Vec<Node>,
    pub(crate) out: Outcome,
}

impl MacroCall {
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            args,
            out: Outcome::default(),
        }
    }

    fn invoke(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let body = ctx.resolve_macro(&self.name)?;

        let before = ctx.rolls();
        let mut call = CallContext {
            scope: Scope::Global,
            name: &self.name,
            args: &mut self.args,
            expr: None,
            result: CallResult::default(),
        };
        let value = body(&mut call, ctx)?;
        let body_rolls = ctx.rolls() - before;
        ctx.table.record_macro(value);

        self.out.value = value;
        self.out.value_type = ValueType::Total;
        self.out.entries = match call.result.entries {
            Some(mut entries) => {
                for entry in &mut entries {
                    if let Some(flags) = entry.flags_mut() {
                        flags.macro_ = true;
                    }
                }
                entries
            }
            None => vec![Entry::Literal(value)],
        };
        Ok(body_rolls)
    }
}

impl Evaluate for MacroCall {
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        let mut rolls = 0;
        for arg in &mut self.args {
            rolls += arg.evaluate(ctx)?;
        }
        rolls += self.invoke(ctx)?;
        Ok(rolls)
    }

    fn reroll(&mut self, ctx: &mut EvalContext<'_>) -> DiceResult<u32> {
        self.invoke(ctx)
    }

    fn outcome(&self) -> &Outcome {
        &self.out
    }

    fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.out
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        self.args.iter_mut().collect()
    }
}

impl fmt::Display for MacroCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::entropy::SequenceEntropy;
    use crate::error::ErrorCode;
    use crate::registry::{DiceFunction, Registry, Timing};
    use crate::trace::DieKind;
    use std::sync::Arc;

    fn eval_with(
        node: &mut Node,
        config: &EvalConfig,
        draws: &[u32],
    ) -> DiceResult<u32> {
        let mut entropy = SequenceEntropy::new(draws.to_vec());
        let mut ctx = EvalContext::new(config, &mut entropy, None);
        node.evaluate(&mut ctx)
    }

    #[test]
    fn test_call_body_overrides_value() {
        let mut config = EvalConfig::default();
        let mut registry = Registry::new();
        registry.register(
            DiceFunction::new("double", Scope::Global, Timing::Last).calling(Arc::new(
                |call, _ctx| {
                    call.arity(0)?;
                    let expr = call.expr.as_ref().unwrap();
                    call.result.value = expr.value() * Value::Int(2);
                    Ok(())
                },
            )),
        );
        config.functions = registry;

        let mut node = Node::from(FunctionCall::new(
            "double",
            Scope::Global,
            vec![],
            Some(Node::dice(2, 6)),
        ));
        // Faces 3 and 4.
        eval_with(&mut node, &config, &[2, 3]).unwrap();
        assert_eq!(node.value(), Value::Int(14));
        // The dice trace passes through unchanged.
        assert_eq!(node.entries().len(), 2);
    }

    #[test]
    fn test_call_body_dice_charge_the_budget() {
        let mut config = EvalConfig::default();
        let mut registry = Registry::new();
        registry.register(
            DiceFunction::new("bonus", Scope::Global, Timing::Last).calling(Arc::new(
                |call, ctx| {
                    let die = ctx.roll_die(4, DieKind::Normal)?;
                    call.result.value = Value::Int(die.value);
                    Ok(())
                },
            )),
        );
        config.functions = registry;

        let mut node = Node::from(FunctionCall::new("bonus", Scope::Global, vec![], None));
        let rolls = eval_with(&mut node, &config, &[1]).unwrap();
        assert_eq!(rolls, 1);
        assert_eq!(node.value(), Value::Int(2));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let config = EvalConfig::default();
        let mut node = Node::from(FunctionCall::new("nope", Scope::Global, vec![], None));
        let err = eval_with(&mut node, &config, &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuchFunction);
    }

    #[test]
    fn test_macro_records_history() {
        let mut config = EvalConfig::default();
        config.macros.register(
            "prof",
            Arc::new(
                |_call: &mut CallContext<'_>, _ctx: &mut EvalContext<'_>| {
                    Ok(Value::Int(3))
                },
            ) as crate::registry::MacroFn,
        );

        let mut node = Node::from(MacroCall::new("prof", vec![]));
        let mut entropy = SequenceEntropy::new([]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        node.evaluate(&mut ctx).unwrap();
        assert_eq!(node.value(), Value::Int(3));
        assert_eq!(ctx.table.macro_history, vec![Value::Int(3)]);
    }

    #[test]
    fn test_unknown_macro_is_an_error() {
        let config = EvalConfig::default();
        let mut node = Node::from(MacroCall::new("nope", vec![]));
        let err = eval_with(&mut node, &config, &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMacro);
    }
}
