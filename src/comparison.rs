//! Coercions, comparison and arithmetic over result items.

use std::cmp::Ordering;

use crate::context::EvalContext;
use crate::errors::EvalError;
use crate::node::Item;
use crate::term::BinaryOp;

/// Null, `false`, zero, `""` and `"false"` are false. Containers are true.
pub fn boolean_value<'a>(ctx: &EvalContext<'a>, item: &Item<'a>) -> bool {
    truthy(&ctx.scalar(item))
}

fn truthy(scalar: &Item<'_>) -> bool {
    match scalar {
        Item::Null => false,
        Item::Bool(b) => *b,
        Item::Int(i) => *i != 0,
        Item::Real(r) => *r != 0.0 && !r.is_nan(),
        Item::Str(s) => !(s.is_empty() || s == "false"),
        Item::Node(_) => true,
    }
}

pub fn number_value<'a>(ctx: &EvalContext<'a>, item: &Item<'a>) -> Option<f64> {
    numeric(&ctx.scalar(item))
}

fn numeric(scalar: &Item<'_>) -> Option<f64> {
    match scalar {
        Item::Int(i) => Some(*i as f64),
        Item::Real(r) => Some(*r),
        Item::Str(s) => s.trim().parse::<f64>().ok().filter(|r| r.is_finite()),
        _ => None,
    }
}

fn integer(scalar: &Item<'_>) -> Option<i64> {
    match scalar {
        Item::Int(i) => Some(*i),
        Item::Str(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn string_value<'a>(ctx: &EvalContext<'a>, item: &Item<'a>) -> Option<String> {
    match ctx.scalar(item) {
        Item::Null => None,
        Item::Bool(b) => Some(b.to_string()),
        Item::Int(i) => Some(i.to_string()),
        Item::Real(r) => Some(r.to_string()),
        Item::Str(s) => Some(s),
        Item::Node(node) => ctx.adapter().string_value(node),
    }
}

/// Loose ordering. Numbers (and numeric strings) compare numerically with
/// `min_double` tolerance, then booleans, then text. Containers only equal
/// themselves. `None` means the operands are unequal and unordered.
pub fn compare<'a>(ctx: &EvalContext<'a>, a: &Item<'a>, b: &Item<'a>) -> Option<Ordering> {
    let (a, b) = (ctx.scalar(a), ctx.scalar(b));
    match (&a, &b) {
        (Item::Node(x), Item::Node(y)) => return ctx.same(*x, *y).then_some(Ordering::Equal),
        (Item::Node(_), _) | (_, Item::Node(_)) => return None,
        (Item::Null, Item::Null) => return Some(Ordering::Equal),
        (Item::Null, _) | (_, Item::Null) => return None,
        (Item::Int(x), Item::Int(y)) => return Some(x.cmp(y)),
        _ => {}
    }
    if let (Some(x), Some(y)) = (numeric(&a), numeric(&b)) {
        if (x - y).abs() <= ctx.min_double() {
            return Some(Ordering::Equal);
        }
        return x.partial_cmp(&y);
    }
    if matches!(a, Item::Bool(_)) || matches!(b, Item::Bool(_)) {
        return Some(truthy(&a).cmp(&truthy(&b)));
    }
    let text = |s: &Item<'_>| match s {
        Item::Str(s) => s.clone(),
        Item::Bool(b) => b.to_string(),
        Item::Int(i) => i.to_string(),
        Item::Real(r) => r.to_string(),
        _ => String::new(),
    };
    Some(text(&a).cmp(&text(&b)))
}

/// `===`: same type and exactly the same value, no coercion or tolerance.
pub fn strict_equals<'a>(ctx: &EvalContext<'a>, a: &Item<'a>, b: &Item<'a>) -> bool {
    match (ctx.scalar(a), ctx.scalar(b)) {
        (Item::Null, Item::Null) => true,
        (Item::Bool(x), Item::Bool(y)) => x == y,
        (Item::Int(x), Item::Int(y)) => x == y,
        (Item::Int(x), Item::Real(y)) | (Item::Real(y), Item::Int(x)) => x as f64 == y,
        (Item::Real(x), Item::Real(y)) => x == y,
        (Item::Str(x), Item::Str(y)) => x == y,
        (Item::Node(x), Item::Node(y)) => ctx.same(x, y),
        _ => false,
    }
}

/// Applies a comparison operator to two present operands.
pub fn cmp_items<'a>(ctx: &EvalContext<'a>, op: BinaryOp, a: &Item<'a>, b: &Item<'a>) -> bool {
    let ord = || compare(ctx, a, b);
    match op {
        BinaryOp::EEq => strict_equals(ctx, a, b),
        BinaryOp::NEe => !strict_equals(ctx, a, b),
        BinaryOp::Eq => ord() == Some(Ordering::Equal),
        BinaryOp::Ne => ord() != Some(Ordering::Equal),
        BinaryOp::Lt => ord() == Some(Ordering::Less),
        BinaryOp::Le => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ord() == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}

/// Arithmetic and bitwise operators. Integers stay integers while the result
/// fits. Failures yield `None`, or an error under strict arithmetic.
pub fn arithmetic<'a>(
    ctx: &EvalContext<'a>,
    op: BinaryOp,
    a: &Item<'a>,
    b: &Item<'a>,
) -> Result<Option<Item<'a>>, EvalError> {
    let (a, b) = (ctx.scalar(a), ctx.scalar(b));
    let outcome = match (integer(&a), integer(&b)) {
        (Some(x), Some(y)) => integer_op(op, x, y),
        _ => match (numeric(&a), numeric(&b)) {
            (Some(x), Some(y)) => real_op(op, x, y),
            _ => Err("non-numeric operand"),
        },
    };
    settle(ctx, outcome, || format!("{a:?} {} {b:?}", op.symbol()))
}

pub fn negate<'a>(ctx: &EvalContext<'a>, a: &Item<'a>) -> Result<Option<Item<'a>>, EvalError> {
    let a = ctx.scalar(a);
    let outcome = match (integer(&a), numeric(&a)) {
        (Some(i), _) => Ok(i.checked_neg().map_or(Item::Real(-(i as f64)), Item::Int)),
        (None, Some(r)) => Ok(Item::Real(-r)),
        _ => Err("non-numeric operand"),
    };
    settle(ctx, outcome, || format!("-{a:?}"))
}

fn settle<'a>(
    ctx: &EvalContext<'a>,
    outcome: Result<Item<'a>, &'static str>,
    describe: impl FnOnce() -> String,
) -> Result<Option<Item<'a>>, EvalError> {
    match outcome {
        Ok(item) => Ok(Some(item)),
        Err(reason) if ctx.config().strict_arithmetic() => {
            Err(EvalError::Arithmetic(format!("{}: {reason}", describe())))
        }
        Err(reason) => {
            tracing::trace!("{}: {reason}, no result", describe());
            Ok(None)
        }
    }
}

fn integer_op<'a>(op: BinaryOp, x: i64, y: i64) -> Result<Item<'a>, &'static str> {
    let checked = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div if y == 0 => return Err("division by zero"),
        BinaryOp::Div if x.checked_rem(y) != Some(0) => None,
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Mod if y == 0 => return Err("modulo by zero"),
        BinaryOp::Mod => Some(x.checked_rem(y).unwrap_or(0)),
        BinaryOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
        BinaryOp::BitAnd => Some(x & y),
        BinaryOp::BitOr => Some(x | y),
        BinaryOp::BitXor => Some(x ^ y),
        _ => return Err("not an arithmetic operator"),
    };
    match checked {
        Some(i) => Ok(Item::Int(i)),
        None => real_op(op, x as f64, y as f64),
    }
}

fn real_op<'a>(op: BinaryOp, x: f64, y: f64) -> Result<Item<'a>, &'static str> {
    let r = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div if y == 0.0 => return Err("division by zero"),
        BinaryOp::Div => x / y,
        BinaryOp::Mod if y == 0.0 => return Err("modulo by zero"),
        BinaryOp::Mod => x % y,
        BinaryOp::Pow => x.powf(y),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            return Err("bitwise operators need integers")
        }
        _ => return Err("not an arithmetic operator"),
    };
    if r.is_finite() {
        Ok(Item::Real(r))
    } else {
        Err("result is not finite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn with_ctx(config: Configuration, f: impl for<'a> FnOnce(&mut EvalContext<'a>)) {
        let doc: Value = json!({"three": "3", "flag": false, "obj": {"k": 1}});
        let mut ctx = EvalContext::new(&doc, Arc::new(config)).unwrap();
        f(&mut ctx);
    }

    #[test]
    fn loose_equality_coerces_numeric_strings() {
        with_ctx(Configuration::default(), |ctx| {
            let three = Item::Str("3".into());
            assert!(cmp_items(ctx, BinaryOp::Eq, &three, &Item::Int(3)));
            assert!(!cmp_items(ctx, BinaryOp::EEq, &three, &Item::Int(3)));
            assert!(cmp_items(ctx, BinaryOp::NEe, &three, &Item::Int(3)));
            assert!(!cmp_items(ctx, BinaryOp::Lt, &Item::Str("10".into()), &Item::Str("9.5".into())));
        });
    }

    #[test]
    fn epsilon_applies_to_ordering_but_not_strict_equality() {
        with_ctx(Configuration::default().with_min_double(1e-9), |ctx| {
            let a = Item::Real(1.0000000001);
            let b = Item::Real(1.0);
            assert!(!cmp_items(ctx, BinaryOp::Lt, &b, &a));
            assert!(!cmp_items(ctx, BinaryOp::Gt, &a, &b));
            assert!(cmp_items(ctx, BinaryOp::Le, &a, &b));
            assert!(cmp_items(ctx, BinaryOp::Ge, &b, &a));
            assert!(cmp_items(ctx, BinaryOp::Eq, &a, &b));
            assert!(!cmp_items(ctx, BinaryOp::EEq, &a, &b));
        });
    }

    #[test]
    fn boolean_coercion() {
        with_ctx(Configuration::default(), |ctx| {
            let falsy = [
                Item::Null,
                Item::Bool(false),
                Item::Int(0),
                Item::Real(0.0),
                Item::Str(String::new()),
                Item::Str("false".into()),
            ];
            for item in &falsy {
                assert!(!ctx.boolean_value(item), "{item:?} should be false");
            }
            let truthy = [Item::Int(-1), Item::Str("no".into()), Item::Node(ctx.root())];
            for item in &truthy {
                assert!(ctx.boolean_value(item), "{item:?} should be true");
            }
        });
    }

    #[test]
    fn containers_compare_by_identity() {
        with_ctx(Configuration::default(), |ctx| {
            let root = Item::Node(ctx.root());
            assert!(cmp_items(ctx, BinaryOp::Eq, &root, &root));
            assert!(cmp_items(ctx, BinaryOp::Ne, &root, &Item::Str("x".into())));
            assert!(!cmp_items(ctx, BinaryOp::Lt, &root, &Item::Int(1)));
        });
    }

    #[test]
    fn arithmetic_keeps_integers() {
        with_ctx(Configuration::default(), |ctx| {
            let run = |op, a: i64, b: i64| arithmetic(ctx, op, &Item::Int(a), &Item::Int(b)).unwrap();
            assert_eq!(run(BinaryOp::Add, 2, 3), Some(Item::Int(5)));
            assert_eq!(run(BinaryOp::Div, 6, 3), Some(Item::Int(2)));
            assert_eq!(run(BinaryOp::Div, 7, 2), Some(Item::Real(3.5)));
            assert_eq!(run(BinaryOp::Mod, 7, 4), Some(Item::Int(3)));
            assert_eq!(run(BinaryOp::Pow, 2, 10), Some(Item::Int(1024)));
            assert_eq!(run(BinaryOp::Pow, 2, -1), Some(Item::Real(0.5)));
            assert_eq!(run(BinaryOp::BitXor, 6, 3), Some(Item::Int(5)));
            assert_eq!(run(BinaryOp::Add, i64::MAX, 1), Some(Item::Real(i64::MAX as f64 + 1.0)));
        });
    }

    #[test]
    fn failed_arithmetic_is_empty_unless_strict() {
        with_ctx(Configuration::default(), |ctx| {
            assert_eq!(arithmetic(ctx, BinaryOp::Div, &Item::Int(1), &Item::Int(0)).unwrap(), None);
            assert_eq!(
                arithmetic(ctx, BinaryOp::Add, &Item::Str("a".into()), &Item::Int(1)).unwrap(),
                None
            );
            assert_eq!(
                arithmetic(ctx, BinaryOp::BitAnd, &Item::Real(1.5), &Item::Int(1)).unwrap(),
                None
            );
        });
        with_ctx(Configuration::default().with_strict_arithmetic(true), |ctx| {
            let err = arithmetic(ctx, BinaryOp::Mod, &Item::Int(1), &Item::Int(0)).unwrap_err();
            assert!(err.to_string().contains("modulo by zero"));
        });
    }

    #[test]
    fn string_values() {
        with_ctx(Configuration::default(), |ctx| {
            assert_eq!(ctx.string_value(&Item::Real(2.5)).as_deref(), Some("2.5"));
            assert_eq!(ctx.string_value(&Item::Bool(true)).as_deref(), Some("true"));
            assert_eq!(ctx.string_value(&Item::Null), None);
            assert_eq!(
                ctx.string_value(&Item::Node(ctx.root())).as_deref(),
                Some(r#"{"flag":false,"obj":{"k":1},"three":"3"}"#)
            );
        });
    }
}
