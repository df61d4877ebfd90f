//! The built-in function library. Every mechanic here registers through the
//! same [`Registry`] shape user extensions use; the only privilege built-ins
//! have is sitting in the lowest resolution layer.

use crate::error::{DiceError, DiceResult};
use crate::node::{
    Advantage, ComparisonSet, Critical, Explode, ExplodeMode, Keep, KeepAction, KeepDir, Node,
    Reroll, RerollBand, Sort, SortOrder, Success,
};
use crate::registry::{DiceFunction, PendingCall, Registry, Scope, Timing};
use crate::trace::{Entry, Marker};
use crate::value::Value;
use once_cell::sync::Lazy;
use std::sync::Arc;

static BUILTINS: Lazy<Registry> = Lazy::new(build);

pub(crate) fn table() -> &'static Registry {
    &BUILTINS
}

/// Collects comparison arguments into one merged predicate set. `first`
/// offsets the reported index when the call has leading non-comparison
/// arguments.
fn comparison_args(
    name: &str,
    args: Vec<Node>,
    first: usize,
) -> DiceResult<Option<ComparisonSet>> {
    let mut merged: Option<ComparisonSet> = None;
    for (i, arg) in args.into_iter().enumerate() {
        let set = match arg {
            Node::Comparison(c) => ComparisonSet::new(vec1::Vec1::new(c)),
            Node::ComparisonSet(s) => s,
            _ => {
                return Err(DiceError::IncorrectArgType {
                    name: name.to_string(),
                    index: first + i,
                })
            }
        };
        match &mut merged {
            Some(existing) => existing.merge(set),
            None => merged = Some(set),
        }
    }
    Ok(merged)
}

fn required(name: &str, set: Option<ComparisonSet>) -> DiceResult<ComparisonSet> {
    set.ok_or_else(|| DiceError::IncorrectArity {
        name: name.to_string(),
        expected: 1,
        got: 0,
    })
}

// ---- explode family ----------------------------------------------------

fn compose_explode(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = comparison_args("explode", args, 0)?;
    Ok(Explode::new(*expr, ExplodeMode::Explode, cond).into())
}

fn compose_compound(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = comparison_args("compound", args, 0)?;
    Ok(Explode::new(*expr, ExplodeMode::Compound, cond).into())
}

fn compose_penetrate(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = comparison_args("penetrate", args, 0)?;
    Ok(Explode::new(*expr, ExplodeMode::Penetrate, cond).into())
}

const EXPLODE_NAMES: [&str; 3] = ["explode", "compound", "penetrate"];

fn validate_explode(calls: &[PendingCall]) -> DiceResult<()> {
    let mut seen: Option<&str> = None;
    for name in EXPLODE_NAMES {
        let mine: Vec<_> = calls.iter().filter(|c| c.name == name).collect();
        if mine.is_empty() {
            continue;
        }
        if seen.is_some() {
            return Err(DiceError::MixedExplodeType);
        }
        seen = Some(name);
        let conditional = mine.iter().filter(|c| c.conditional).count();
        if conditional != 0 && conditional != mine.len() {
            return Err(DiceError::MixedExplodeComp);
        }
    }
    Ok(())
}

// ---- reroll family -----------------------------------------------------

fn with_band(expr: Box<Node>, band: RerollBand) -> Node {
    match *expr {
        Node::Reroll(mut node) => {
            node.bands.push(band);
            Node::Reroll(node)
        }
        other => Reroll::new(other, vec![band]).into(),
    }
}

fn compose_reroll(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("reroll", comparison_args("reroll", args, 0)?)?;
    Ok(with_band(expr, RerollBand::new(cond, None)))
}

fn compose_reroll_once(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("rerollonce", comparison_args("rerollonce", args, 0)?)?;
    Ok(with_band(expr, RerollBand::new(cond, Some(1))))
}

fn compose_reroll_n(expr: Box<Node>, mut args: Vec<Node>) -> DiceResult<Node> {
    if args.is_empty() {
        return Err(DiceError::IncorrectArity {
            name: "rerolln".to_string(),
            expected: 2,
            got: 0,
        });
    }
    let max = match args.remove(0) {
        // Negative counts fall to zero here and fail the range check at
        // evaluation, where the configured cap is known.
        Node::Literal(lit) => lit.value.truncated().max(0) as u32,
        _ => {
            return Err(DiceError::IncorrectArgType {
                name: "rerolln".to_string(),
                index: 0,
            })
        }
    };
    let cond = required("rerolln", comparison_args("rerolln", args, 1)?)?;
    Ok(with_band(expr, RerollBand::new(cond, Some(max))))
}

fn validate_reroll(calls: &[PendingCall]) -> DiceResult<()> {
    let distinct = ["reroll", "rerollonce", "rerolln"]
        .iter()
        .filter(|name| calls.iter().any(|c| c.name == **name))
        .count();
    if distinct > 1 {
        Err(DiceError::MixedReroll)
    } else {
        Ok(())
    }
}

// ---- keep family -------------------------------------------------------

fn keep_amount(name: &str, mut args: Vec<Node>) -> DiceResult<Node> {
    match args.len() {
        0 => Ok(Node::literal(1)),
        1 => {
            let amount = args.pop().unwrap_or_else(|| Node::literal(1));
            if amount.is_comparison() {
                Err(DiceError::IncorrectArgType {
                    name: name.to_string(),
                    index: 0,
                })
            } else {
                Ok(amount)
            }
        }
        got => Err(DiceError::IncorrectArity {
            name: name.to_string(),
            expected: 1,
            got,
        }),
    }
}

fn compose_keep_highest(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let amount = keep_amount("keephighest", args)?;
    Ok(Keep::new(*expr, amount, KeepAction::Keep, KeepDir::Highest).into())
}

fn compose_keep_lowest(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let amount = keep_amount("keeplowest", args)?;
    Ok(Keep::new(*expr, amount, KeepAction::Keep, KeepDir::Lowest).into())
}

fn compose_drop_highest(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let amount = keep_amount("drophighest", args)?;
    Ok(Keep::new(*expr, amount, KeepAction::Drop, KeepDir::Highest).into())
}

fn compose_drop_lowest(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let amount = keep_amount("droplowest", args)?;
    Ok(Keep::new(*expr, amount, KeepAction::Drop, KeepDir::Lowest).into())
}

fn no_args(name: &str, args: &[Node]) -> DiceResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(DiceError::IncorrectArity {
            name: name.to_string(),
            expected: 0,
            got: args.len(),
        })
    }
}

fn compose_advantage(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    no_args("advantage", &args)?;
    Ok(Advantage::new(*expr, false).into())
}

fn compose_disadvantage(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    no_args("disadvantage", &args)?;
    Ok(Advantage::new(*expr, true).into())
}

const KEEP_NAMES: [&str; 4] = ["keephighest", "keeplowest", "drophighest", "droplowest"];

fn validate_advantage(calls: &[PendingCall]) -> DiceResult<()> {
    let advantages = calls
        .iter()
        .filter(|c| c.name == "advantage" || c.name == "disadvantage")
        .count();
    if advantages > 1 {
        return Err(DiceError::AdvantageOnlyOnce);
    }
    if advantages == 1 && calls.iter().any(|c| KEEP_NAMES.contains(&c.name.as_str())) {
        return Err(DiceError::NoAdvantageKeep);
    }
    Ok(())
}

// ---- success / critical ------------------------------------------------

fn compose_success(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("success", comparison_args("success", args, 0)?)?;
    Ok(Success::new(*expr, cond, None).into())
}

fn compose_failure(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("failure", comparison_args("failure", args, 0)?)?;
    match *expr {
        Node::Success(mut node) if node.failure.is_none() => {
            node.failure = Some(cond);
            Ok(Node::Success(node))
        }
        _ => Err(DiceError::InvalidSuccess),
    }
}

fn validate_success(calls: &[PendingCall]) -> DiceResult<()> {
    let failures = calls.iter().filter(|c| c.name == "failure").count();
    let successes = calls.iter().filter(|c| c.name == "success").count();
    if failures > 0 && successes == 0 {
        Err(DiceError::InvalidSuccess)
    } else {
        Ok(())
    }
}

fn compose_critical(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("critical", comparison_args("critical", args, 0)?)?;
    match *expr {
        Node::Critical(mut node) if node.crit.is_none() => {
            node.crit = Some(cond);
            Ok(Node::Critical(node))
        }
        other => Ok(Critical::new(other, Some(cond), None).into()),
    }
}

fn compose_fumble(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    let cond = required("fumble", comparison_args("fumble", args, 0)?)?;
    match *expr {
        Node::Critical(mut node) if node.fumble.is_none() => {
            node.fumble = Some(cond);
            Ok(Node::Critical(node))
        }
        other => Ok(Critical::new(other, None, Some(cond)).into()),
    }
}

// ---- sort --------------------------------------------------------------

fn compose_sort(expr: Box<Node>, args: Vec<Node>) -> DiceResult<Node> {
    no_args("sort", &args)?;
    Ok(Sort::new(*expr, SortOrder::Ascending).into())
}

fn validate_sort(calls: &[PendingCall]) -> DiceResult<()> {
    if calls.iter().filter(|c| c.name == "sort").count() > 1 {
        Err(DiceError::TooManySort)
    } else {
        Ok(())
    }
}

// ---- global numeric functions ------------------------------------------

fn rounding(name: &'static str, round: fn(Value) -> Value) -> DiceFunction {
    DiceFunction::new(name, Scope::Global, Timing::Last).calling(Arc::new(
        move |call, _ctx| {
            call.arity(1)?;
            call.result.value = round(call.number(0)?);
            call.result.entries = Some(call.args[0].entries().to_vec());
            Ok(())
        },
    ))
}

fn extremum(name: &'static str, prefer_greater: bool) -> DiceFunction {
    DiceFunction::new(name, Scope::Global, Timing::Last).calling(Arc::new(
        move |call, _ctx| {
            if call.args.len() < 2 {
                return Err(DiceError::IncorrectArity {
                    name: call.name.to_string(),
                    expected: 2,
                    got: call.args.len(),
                });
            }
            let mut best = call.number(0)?;
            for i in 1..call.args.len() {
                let candidate = call.number(i)?;
                if (candidate > best) == prefer_greater {
                    best = candidate;
                }
            }
            call.result.value = best;
            Ok(())
        },
    ))
}

fn conditional() -> DiceFunction {
    DiceFunction::new("if", Scope::Global, Timing::Last).calling(Arc::new(|call, _ctx| {
        call.arity_between(3, 4)?;
        let probe = call.number(0)?;
        let matched = match &call.args[1] {
            Node::Comparison(c) => c.test(probe),
            Node::ComparisonSet(s) => s.test(probe),
            _ => {
                return Err(DiceError::IncorrectArgType {
                    name: call.name.to_string(),
                    index: 1,
                })
            }
        };
        call.result.value = if matched {
            call.number(2)?
        } else if call.args.len() == 4 {
            call.number(3)?
        } else {
            Value::ZERO
        };
        Ok(())
    }))
}

fn expand() -> DiceFunction {
    DiceFunction::new("expand", Scope::Group, Timing::Last).calling(Arc::new(|call, ctx| {
        let Some(expr) = call.expr.as_ref() else {
            return Ok(());
        };
        let mut expanded = Vec::new();
        for entry in expr.entries() {
            match entry {
                Entry::Group { id, flags, .. } if !flags.dropped => {
                    let snapshot = ctx.table.group(*id);
                    expanded.push(Entry::Marker(Marker::OpenParen));
                    expanded.extend(snapshot.entries.iter().cloned());
                    expanded.push(Entry::Marker(Marker::CloseParen));
                }
                other => expanded.push(other.clone()),
            }
        }
        call.result.entries = Some(expanded);
        Ok(())
    }))
}

fn build() -> Registry {
    let mut reg = Registry::new();

    reg.register(
        DiceFunction::new("explode", Scope::Roll, Timing::Explode)
            .combining()
            .composing(compose_explode)
            .validating(validate_explode),
    );
    reg.register(
        DiceFunction::new("compound", Scope::Roll, Timing::Explode)
            .combining()
            .composing(compose_compound)
            .validating(validate_explode),
    );
    reg.register(
        DiceFunction::new("penetrate", Scope::Roll, Timing::Explode)
            .combining()
            .composing(compose_penetrate)
            .validating(validate_explode),
    );

    reg.register(
        DiceFunction::new("reroll", Scope::Roll, Timing::Reroll)
            .combining()
            .composing(compose_reroll)
            .validating(validate_reroll),
    );
    reg.register(
        DiceFunction::new("rerollOnce", Scope::Roll, Timing::Reroll)
            .composing(compose_reroll_once)
            .validating(validate_reroll),
    );
    reg.register(
        DiceFunction::new("rerollN", Scope::Roll, Timing::Reroll)
            .composing(compose_reroll_n)
            .validating(validate_reroll),
    );

    reg.register(
        DiceFunction::new("keepHighest", Scope::Roll, Timing::Keep)
            .composing(compose_keep_highest),
    );
    reg.register(
        DiceFunction::new("keepLowest", Scope::Roll, Timing::Keep).composing(compose_keep_lowest),
    );
    reg.register(
        DiceFunction::new("dropHighest", Scope::Roll, Timing::Keep)
            .composing(compose_drop_highest),
    );
    reg.register(
        DiceFunction::new("dropLowest", Scope::Roll, Timing::Keep).composing(compose_drop_lowest),
    );
    reg.register(
        DiceFunction::new("advantage", Scope::Roll, Timing::Keep)
            .composing(compose_advantage)
            .validating(validate_advantage),
    );
    reg.register(
        DiceFunction::new("disadvantage", Scope::Roll, Timing::Keep)
            .composing(compose_disadvantage)
            .validating(validate_advantage),
    );

    reg.register(
        DiceFunction::new("success", Scope::Roll, Timing::Success)
            .combining()
            .composing(compose_success)
            .validating(validate_success),
    );
    reg.register(
        DiceFunction::new("failure", Scope::Roll, Timing::Success)
            .combining()
            .composing(compose_failure)
            .validating(validate_success),
    );

    reg.register(
        DiceFunction::new("critical", Scope::Roll, Timing::Crit)
            .combining()
            .composing(compose_critical),
    );
    reg.register(
        DiceFunction::new("fumble", Scope::Roll, Timing::Crit)
            .combining()
            .composing(compose_fumble),
    );

    reg.register(
        DiceFunction::new("sort", Scope::Roll, Timing::Sort)
            .composing(compose_sort)
            .validating(validate_sort),
    );

    reg.register(rounding("floor", Value::floor));
    reg.register(rounding("ceil", Value::ceil));
    reg.register(rounding("round", Value::round));
    reg.register(rounding("abs", Value::abs));
    reg.register(extremum("min", false));
    reg.register(extremum("max", true));
    reg.register(conditional());
    reg.register(expand());

    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CompareOp, Comparison};

    fn pending(name: &str, conditional: bool) -> PendingCall {
        PendingCall {
            name: name.to_string(),
            timing: Timing::Explode,
            args: conditional as usize,
            conditional,
        }
    }

    #[test]
    fn test_every_builtin_resolves() {
        let reg = table();
        for name in [
            "explode",
            "compound",
            "penetrate",
            "reroll",
            "rerollonce",
            "rerolln",
            "keephighest",
            "keeplowest",
            "drophighest",
            "droplowest",
            "advantage",
            "disadvantage",
            "success",
            "failure",
            "critical",
            "fumble",
            "sort",
        ] {
            assert!(reg.resolve(name, Scope::Basic).is_some(), "{name}");
        }
        for name in ["floor", "ceil", "round", "abs", "min", "max", "if"] {
            assert!(reg.resolve(name, Scope::Global).is_some(), "{name}");
        }
        assert!(reg.resolve("expand", Scope::Group).is_some());
        assert!(reg.resolve("expand", Scope::Basic).is_none());
    }

    #[test]
    fn test_mixed_explode_kinds_rejected() {
        let calls = [pending("explode", false), pending("compound", false)];
        assert!(matches!(
            validate_explode(&calls),
            Err(DiceError::MixedExplodeType)
        ));
    }

    #[test]
    fn test_mixed_conditional_explosions_rejected() {
        let calls = [pending("explode", true), pending("explode", false)];
        assert!(matches!(
            validate_explode(&calls),
            Err(DiceError::MixedExplodeComp)
        ));
        let calls = [pending("explode", true), pending("explode", true)];
        assert!(validate_explode(&calls).is_ok());
    }

    #[test]
    fn test_mixed_reroll_styles_rejected() {
        let calls = [pending("reroll", true), pending("rerollonce", true)];
        assert!(matches!(validate_reroll(&calls), Err(DiceError::MixedReroll)));
    }

    #[test]
    fn test_advantage_rules() {
        let calls = [pending("advantage", false), pending("disadvantage", false)];
        assert!(matches!(
            validate_advantage(&calls),
            Err(DiceError::AdvantageOnlyOnce)
        ));
        let calls = [pending("advantage", false), pending("keephighest", false)];
        assert!(matches!(
            validate_advantage(&calls),
            Err(DiceError::NoAdvantageKeep)
        ));
    }

    #[test]
    fn test_failure_requires_success() {
        let calls = [pending("failure", true)];
        assert!(matches!(
            validate_success(&calls),
            Err(DiceError::InvalidSuccess)
        ));
        let calls = [pending("success", true), pending("failure", true)];
        assert!(validate_success(&calls).is_ok());
    }

    #[test]
    fn test_compose_builds_mechanic_variants() {
        let cond = Node::from(Comparison::new(CompareOp::Equal, Node::literal(6)));
        let node = compose_explode(Box::new(Node::dice(3, 6)), vec![cond]).unwrap();
        assert!(matches!(node, Node::Explode(_)));

        let node = compose_keep_highest(Box::new(Node::dice(4, 6)), vec![]).unwrap();
        assert!(matches!(node, Node::Keep(_)));
    }

    #[test]
    fn test_sequential_reroll_calls_stack_bands() {
        let low = Node::from(Comparison::new(CompareOp::Equal, Node::literal(1)));
        let mid = Node::from(Comparison::new(CompareOp::Equal, Node::literal(2)));
        let node = compose_reroll_once(Box::new(Node::dice(2, 6)), vec![low]).unwrap();
        let node = compose_reroll_once(Box::new(node), vec![mid]).unwrap();
        match node {
            Node::Reroll(inner) => assert_eq!(inner.bands.len(), 2),
            other => panic!("expected reroll node, got {other}"),
        }
    }
}
