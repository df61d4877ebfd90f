use crate::config::EvalConfig;
use crate::error::DiceResult;
use crate::node::{FunctionCall, Node};
use crate::registry::{
    self, CallBehavior, DiceFunction, PendingCall, Registry, Scope, ValidateFn,
};
use std::sync::Arc;

/// One named call waiting to be resolved against the registry layers.
#[derive(Debug, Clone)]
struct Call {
    name: String,
    args: Vec<Node>,
}

/// Accumulates a base expression plus named modifier calls, then resolves,
/// validates, combines, and orders them into one immutable [`Node`]. The
/// builder never becomes part of the tree; `build` consumes it and the
/// composed tree is all that survives.
#[derive(Debug)]
pub struct RollBuilder<'a> {
    config: &'a EvalConfig,
    roll_functions: Option<&'a Registry>,
    base: Node,
    calls: Vec<Call>,
}

impl<'a> RollBuilder<'a> {
    pub fn new(config: &'a EvalConfig, base: impl Into<Node>) -> Self {
        Self {
            config,
            roll_functions: None,
            base: base.into(),
            calls: Vec::new(),
        }
    }

    /// Layers a per-roll registry ahead of the configuration and built-in
    /// layers for this build only.
    pub fn with_functions(mut self, functions: &'a Registry) -> Self {
        self.roll_functions = Some(functions);
        self
    }

    /// Records a modifier call in written order. Resolution happens at
    /// `build`, so unknown names surface there, not here.
    pub fn call(mut self, name: impl Into<String>, args: Vec<Node>) -> Self {
        self.calls.push(Call {
            name: name.into().to_lowercase(),
            args,
        });
        self
    }

    fn scope(&self) -> Scope {
        match &self.base {
            Node::Group(_) => Scope::Group,
            _ => Scope::Basic,
        }
    }

    fn resolve(&self) -> DiceResult<Vec<(Arc<DiceFunction>, Call)>> {
        let scope = self.scope();
        let builtin = crate::builtins::table();
        let layers: Vec<&Registry> = self
            .roll_functions
            .into_iter()
            .chain([&self.config.functions, builtin])
            .collect();
        self.calls
            .iter()
            .map(|call| {
                let function = registry::resolve_layered(&call.name, scope, &layers)?;
                Ok((function, call.clone()))
            })
            .collect()
    }

    /// Resolves every call, orders by timing, fires each timing slot's
    /// validators against the pending list, merges combinable same-name
    /// calls, and folds the survivors over the base expression.
    pub fn build(self) -> DiceResult<Node> {
        let scope = self.scope();
        let mut resolved = self.resolve()?;
        // Stable, so written order survives within a timing slot.
        resolved.sort_by_key(|(function, _)| function.timing);

        let pending: Vec<PendingCall> = resolved
            .iter()
            .map(|(function, call)| PendingCall {
                name: call.name.clone(),
                timing: function.timing,
                args: call.args.len(),
                conditional: call.args.iter().any(Node::is_comparison),
            })
            .collect();

        let mut slot = 0;
        while slot < resolved.len() {
            let timing = resolved[slot].0.timing;
            let end = resolved[slot..]
                .iter()
                .position(|(f, _)| f.timing != timing)
                .map_or(resolved.len(), |i| slot + i);
            let group = &pending[slot..end];
            let mut fired: Vec<ValidateFn> = Vec::new();
            for (function, _) in &resolved[slot..end] {
                if let Some(validate) = function.validate {
                    if !fired.contains(&validate) {
                        validate(group)?;
                        fired.push(validate);
                    }
                }
            }
            slot = end;
        }

        let mut merged: Vec<(Arc<DiceFunction>, Call)> = Vec::new();
        for (function, call) in resolved {
            if function.behavior == CallBehavior::CombineArguments {
                if let Some((_, earlier)) = merged
                    .iter_mut()
                    .find(|(f, c)| c.name == call.name && f.timing == function.timing)
                {
                    earlier.args.extend(call.args);
                    continue;
                }
            }
            merged.push((function, call));
        }

        let mut node = self.base;
        for (function, call) in merged {
            node = match function.compose {
                Some(compose) => compose(Box::new(node), call.args)?,
                None => FunctionCall::new(call.name, scope, call.args, Some(node)).into(),
            };
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::SequenceEntropy;
    use crate::error::ErrorCode;
    use crate::eval::{evaluate, EvalContext};
    use crate::node::{CompareOp, Comparison, Group};
    use crate::registry::Timing;
    use crate::value::Value;

    fn eq(n: i64) -> Node {
        Node::from(Comparison::new(CompareOp::Equal, Node::literal(n)))
    }

    #[test]
    fn test_build_composes_mechanic_variants() {
        let config = EvalConfig::default();
        let node = RollBuilder::new(&config, Node::dice(4, 6))
            .call("dropLowest", vec![])
            .build()
            .unwrap();
        assert!(matches!(node, Node::Keep(_)));
    }

    #[test]
    fn test_timing_orders_calls_not_written_order() {
        let config = EvalConfig::default();
        // Written sort-then-explode; timing puts explode first, so the
        // composed tree is Sort(Explode(...)).
        let node = RollBuilder::new(&config, Node::dice(3, 6))
            .call("sort", vec![])
            .call("explode", vec![eq(6)])
            .build()
            .unwrap();
        match node {
            Node::Sort(sort) => assert!(matches!(*sort.expr, Node::Explode(_))),
            other => panic!("expected sort at the top, got {other}"),
        }
    }

    #[test]
    fn test_repeated_combinable_calls_merge_arguments() {
        let config = EvalConfig::default();
        let split = RollBuilder::new(&config, Node::dice(1, 20))
            .call("explode", vec![eq(6)])
            .call("explode", vec![eq(20)])
            .build()
            .unwrap();
        let joined = RollBuilder::new(&config, Node::dice(1, 20))
            .call("explode", vec![eq(6), eq(20)])
            .build()
            .unwrap();

        // Identical draws must produce identical results either way.
        let mut split = split;
        let mut joined = joined;
        let draws = [19, 3, 19, 5];
        let a = evaluate(&mut split, &config, &mut SequenceEntropy::new(draws)).unwrap();
        let b = evaluate(&mut joined, &config, &mut SequenceEntropy::new(draws)).unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(a.rolls, b.rolls);
        assert_eq!(a.recipe.roll_history, b.recipe.roll_history);
    }

    #[test]
    fn test_validators_fire_per_timing_slot() {
        let config = EvalConfig::default();
        let err = RollBuilder::new(&config, Node::dice(3, 6))
            .call("explode", vec![eq(6)])
            .call("compound", vec![eq(6)])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MixedExplodeType);

        let err = RollBuilder::new(&config, Node::dice(2, 20))
            .call("advantage", vec![])
            .call("keepHighest", vec![])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoAdvantageKeep);
    }

    #[test]
    fn test_unknown_name_resolves_to_an_error() {
        let config = EvalConfig::default();
        let err = RollBuilder::new(&config, Node::dice(1, 6))
            .call("frobnicate", vec![])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuchFunction);
    }

    #[test]
    fn test_group_bases_resolve_in_group_scope() {
        let config = EvalConfig::default();
        let base = Node::from(Group::new(None, vec![Node::dice(2, 6)]));
        let node = RollBuilder::new(&config, base)
            .call("keepHighest", vec![])
            .build()
            .unwrap();
        assert!(matches!(node, Node::Keep(_)));
    }

    #[test]
    fn test_uncomposed_entries_wrap_as_function_calls() {
        let mut config = EvalConfig::default();
        let mut registry = Registry::new();
        registry.register(
            DiceFunction::new("tag", Scope::Roll, Timing::Last).calling(Arc::new(
                |call, _ctx| {
                    let expr = call.expr.as_ref().unwrap();
                    call.result.value = expr.value();
                    Ok(())
                },
            )),
        );
        config.functions = registry;

        let mut node = RollBuilder::new(&config, Node::dice(2, 6))
            .call("tag", vec![])
            .build()
            .unwrap();
        assert!(matches!(node, Node::FunctionCall(_)));

        let mut entropy = SequenceEntropy::new([2, 3]);
        let mut ctx = EvalContext::new(&config, &mut entropy, None);
        node.evaluate(&mut ctx).unwrap();
        assert_eq!(node.value(), Value::Int(7));
    }
}
