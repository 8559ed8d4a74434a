use itertools::Itertools;

use super::{check_arity, Function, Registry};
use crate::comparison::{cmp_items, strict_equals};
use crate::context::EvalContext;
use crate::engine;
use crate::errors::EvalError;
use crate::escape::encode_xml;
use crate::node::{Item, Key};
use crate::term::{BinaryOp, Term};

const MANY: usize = usize::MAX;

pub(crate) fn register_all(registry: &mut Registry) {
    registry.register(Count);
    registry.register(Sum);
    registry.register(Min);
    registry.register(Max);
    registry.register(Round);
    registry.register(Number);
    registry.register(StringFn);
    registry.register(Encode);
    registry.register(Union);
    registry.register(Intersection);
    registry.register(KeyFn);
    registry.register(IndexFn);
    registry.register(TypeFn);
    registry.register(Parent);
    registry.register(Position);
    registry.register(Locale);
    registry.register(Lower);
    registry.register(Upper);
    registry.register(Length);
    registry.register(Concat);
    registry.register(Contains);
    registry.register(First);
    registry.register(Unique);
    registry.register(OrDefault);
}

/// All arguments' results concatenated, or the input when called without arguments.
fn gather<'a>(
    args: &[Term],
    context: &[Item<'a>],
    input: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    if args.is_empty() {
        return Ok(input.to_vec());
    }
    let mut out = Vec::new();
    for arg in args {
        out.extend(engine::eval(arg, context, ctx)?);
    }
    Ok(out)
}

fn first_string<'a>(
    arg: &Term,
    context: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Option<String>, EvalError> {
    let items = engine::eval(arg, context, ctx)?;
    Ok(items.first().and_then(|item| ctx.string_value(item)))
}

/// Map each gathered item to at most one output item.
fn map_items<'a>(
    args: &[Term],
    context: &[Item<'a>],
    input: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
    f: impl Fn(&EvalContext<'a>, &Item<'a>) -> Option<Item<'a>>,
) -> Result<Vec<Item<'a>>, EvalError> {
    let items = gather(args, context, input, ctx)?;
    let ctx: &EvalContext<'a> = ctx;
    Ok(items.iter().filter_map(|item| f(ctx, item)).collect())
}

pub struct Count;
impl Function for Count {
    fn name(&self) -> &'static str { "count" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        Ok(vec![Item::Int(items.len() as i64)])
    }
}

pub struct Sum;
impl Function for Sum {
    fn name(&self) -> &'static str { "sum" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        let mut exact = Some(0i64);
        let mut total = 0.0;
        for item in &items {
            match ctx.scalar(item) {
                Item::Int(i) => {
                    exact = exact.and_then(|t| t.checked_add(i));
                    total += i as f64;
                }
                other => {
                    if let Some(r) = ctx.number_value(&other) {
                        exact = None;
                        total += r;
                    }
                }
            }
        }
        Ok(vec![exact.map_or(Item::Real(total), Item::Int)])
    }
}

fn extreme<'a>(ctx: &EvalContext<'a>, items: &[Item<'a>], better: fn(f64, f64) -> bool) -> Option<Item<'a>> {
    let mut best: Option<(f64, Item<'a>)> = None;
    for item in items {
        let Some(value) = ctx.number_value(item) else {
            continue;
        };
        if best.as_ref().map_or(true, |(b, _)| better(value, *b)) {
            let kept = match ctx.scalar(item) {
                Item::Int(i) => Item::Int(i),
                _ => Item::Real(value),
            };
            best = Some((value, kept));
        }
    }
    best.map(|(_, item)| item)
}

pub struct Min;
impl Function for Min {
    fn name(&self) -> &'static str { "min" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        Ok(extreme(ctx, &items, |a, b| a < b).into_iter().collect())
    }
}

pub struct Max;
impl Function for Max {
    fn name(&self) -> &'static str { "max" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        Ok(extreme(ctx, &items, |a, b| a > b).into_iter().collect())
    }
}

/// `floor`, `ceil` and `round`. Whole results come back as integers.
pub struct Round;
impl Function for Round {
    fn name(&self) -> &'static str { "round" }
    fn matches(&self, name: &str) -> bool {
        matches!(name, "round" | "floor" | "ceil")
    }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let op: fn(f64) -> f64 = match name {
            "floor" => f64::floor,
            "ceil" => f64::ceil,
            _ => f64::round,
        };
        map_items(args, context, input, ctx, |ctx, item| match ctx.scalar(item) {
            Item::Int(i) => Some(Item::Int(i)),
            other => {
                let r = op(ctx.number_value(&other)?);
                if r.abs() < i64::MAX as f64 {
                    Some(Item::Int(r as i64))
                } else {
                    Some(Item::Real(r))
                }
            }
        })
    }
}

pub struct Number;
impl Function for Number {
    fn name(&self) -> &'static str { "number" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| match ctx.scalar(item) {
            Item::Int(i) => Some(Item::Int(i)),
            Item::Bool(b) => Some(Item::Int(i64::from(b))),
            Item::Str(s) if s.trim().parse::<i64>().is_ok() => s.trim().parse().ok().map(Item::Int),
            other => ctx.number_value(&other).map(Item::Real),
        })
    }
}

pub struct StringFn;
impl Function for StringFn {
    fn name(&self) -> &'static str { "string" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| ctx.string_value(item).map(Item::Str))
    }
}

pub struct Encode;
impl Function for Encode {
    fn name(&self) -> &'static str { "encode" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| {
            ctx.string_value(item).map(|s| Item::Str(encode_xml(&s, true)))
        })
    }
}

fn contains_item<'a>(ctx: &EvalContext<'a>, haystack: &[Item<'a>], needle: &Item<'a>) -> bool {
    haystack.iter().any(|other| strict_equals(ctx, other, needle))
}

/// Concatenation of every argument, without repeats.
pub struct Union;
impl Function for Union {
    fn name(&self) -> &'static str { "union" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 1..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        let mut out: Vec<Item<'a>> = Vec::with_capacity(items.len());
        for item in items {
            if !contains_item(ctx, &out, &item) {
                out.push(item);
            }
        }
        Ok(out)
    }
}

/// Items of the first argument present in every other argument.
pub struct Intersection;
impl Function for Intersection {
    fn name(&self) -> &'static str { "intersection" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 2..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let mut sets = Vec::with_capacity(args.len());
        for arg in args {
            sets.push(engine::eval(arg, context, ctx)?);
        }
        let Some((first, rest)) = sets.split_first() else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Item<'a>> = Vec::new();
        for item in first {
            if rest.iter().all(|set| contains_item(ctx, set, item)) && !contains_item(ctx, &out, item) {
                out.push(item.clone());
            }
        }
        Ok(out)
    }
}

pub struct KeyFn;
impl Function for KeyFn {
    fn name(&self) -> &'static str { "key" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| {
            item.as_node().and_then(|node| ctx.key(node)).map(Item::Str)
        })
    }
}

pub struct IndexFn;
impl Function for IndexFn {
    fn name(&self) -> &'static str { "index" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| {
            item.as_node()
                .and_then(|node| ctx.index(node))
                .map(|i| Item::Int(i as i64))
        })
    }
}

pub struct TypeFn;
impl Function for TypeFn {
    fn name(&self) -> &'static str { "type" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| Some(Item::from(ctx.kind(item).name())))
    }
}

pub struct Parent;
impl Function for Parent {
    fn name(&self) -> &'static str { "parent" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let parents = map_items(args, context, input, ctx, |ctx, item| {
            item.as_node().and_then(|node| ctx.parent(node)).map(Item::Node)
        })?;
        ctx.push_scope();
        let out = parents.into_iter().filter(|p| ctx.is_unique(p)).collect();
        ctx.pop_scope();
        Ok(out)
    }
}

/// 0-based position of the node under test within a filter or loop.
pub struct Position;
impl Function for Position {
    fn name(&self) -> &'static str { "position" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=0)
    }
    fn eval<'a>(&self, _name: &str, _args: &[Term], _context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        Ok(ctx.context_index().map(|i| Item::Int(i as i64)).into_iter().collect())
    }
}

pub struct Locale;
impl Function for Locale {
    fn name(&self) -> &'static str { "locale" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=0)
    }
    fn eval<'a>(&self, _name: &str, _args: &[Term], _context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        Ok(vec![Item::from(ctx.config().locale())])
    }
}

pub struct Lower;
impl Function for Lower {
    fn name(&self) -> &'static str { "lower" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| {
            ctx.string_value(item).map(|s| Item::Str(s.to_lowercase()))
        })
    }
}

pub struct Upper;
impl Function for Upper {
    fn name(&self) -> &'static str { "upper" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| {
            ctx.string_value(item).map(|s| Item::Str(s.to_uppercase()))
        })
    }
}

/// Characters of a string, or children of a container.
pub struct Length;
impl Function for Length {
    fn name(&self) -> &'static str { "length" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        map_items(args, context, input, ctx, |ctx, item| match ctx.scalar(item) {
            Item::Str(s) => Some(Item::Int(s.chars().count() as i64)),
            Item::Node(node) => Some(Item::Int(ctx.get(node, Key::Wildcard).len() as i64)),
            _ => None,
        })
    }
}

pub struct Concat;
impl Function for Concat {
    fn name(&self) -> &'static str { "concat" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 1..=MANY)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let mut out = String::new();
        for arg in args {
            if let Some(s) = first_string(arg, context, ctx)? {
                out.push_str(&s);
            }
        }
        Ok(vec![Item::Str(out)])
    }
}

/// Substring test on strings; membership test (loose equality) on lists.
pub struct Contains;
impl Function for Contains {
    fn name(&self) -> &'static str { "contains" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 2..=2)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let [haystack, needle] = args else {
            return Ok(vec![Item::Bool(false)]);
        };
        let haystack = engine::eval(haystack, context, ctx)?;
        let needle = engine::eval(needle, context, ctx)?;
        let (Some(haystack), Some(needle)) = (haystack.first(), needle.first()) else {
            return Ok(vec![Item::Bool(false)]);
        };
        let found = match ctx.scalar(haystack) {
            Item::Node(node) => ctx
                .get(node, Key::Wildcard)
                .into_iter()
                .any(|child| cmp_items(ctx, BinaryOp::Eq, &Item::Node(child), needle)),
            _ => match (ctx.string_value(haystack), ctx.string_value(needle)) {
                (Some(h), Some(n)) => h.contains(&n),
                _ => false,
            },
        };
        Ok(vec![Item::Bool(found)])
    }
}

pub struct First;
impl Function for First {
    fn name(&self) -> &'static str { "first" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        Ok(items.into_iter().take(1).collect())
    }
}

fn value_key<'a>(ctx: &EvalContext<'a>, item: &Item<'a>) -> String {
    match ctx.scalar(item) {
        Item::Null => "null".to_string(),
        Item::Bool(b) => format!("b:{b}"),
        Item::Int(i) => format!("n:{i}"),
        Item::Real(r) if r.fract() == 0.0 && r.abs() < i64::MAX as f64 => format!("n:{}", r as i64),
        Item::Real(r) => format!("n:{r}"),
        Item::Str(s) => format!("s:{s}"),
        Item::Node(node) => format!("node:{:?}", node.id()),
    }
}

/// Drops repeated values, keeping first occurrences. Scalars compare by value.
pub struct Unique;
impl Function for Unique {
    fn name(&self) -> &'static str { "unique" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 0..=1)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let items = gather(args, context, input, ctx)?;
        Ok(items.into_iter().unique_by(|item| value_key(ctx, item)).collect())
    }
}

/// The first argument, or the second when the first is empty or all null.
pub struct OrDefault;
impl Function for OrDefault {
    fn name(&self) -> &'static str { "or_default" }
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String> {
        check_arity(name, args, 2..=2)
    }
    fn eval<'a>(&self, _name: &str, args: &[Term], context: &[Item<'a>], _input: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<Vec<Item<'a>>, EvalError> {
        let [value, fallback] = args else {
            return Ok(Vec::new());
        };
        let items = engine::eval(value, context, ctx)?;
        if items.iter().all(|item| ctx.scalar(item).is_null()) {
            return engine::eval(fallback, context, ctx);
        }
        Ok(items)
    }
}
