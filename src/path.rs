//! Path segment steps. Each step maps the current node set to the next one.

use std::collections::HashSet;

use crate::context::EvalContext;
use crate::engine;
use crate::errors::EvalError;
use crate::functions;
use crate::node::{Item, Key, NodeKind, NodeRef};
use crate::term::{Segment, Term};

/// Applies one segment to every item of `input`. Nodes reached more than
/// once within the step are kept only the first time.
pub(crate) fn step<'a>(
    segment: &Segment,
    input: Vec<Item<'a>>,
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    let raw = match segment {
        Segment::Call(call) => functions::call(call, &input, &input, ctx)?,
        Segment::Filter(term) => {
            let mut out = Vec::new();
            for item in &input {
                out.extend(filter(term, candidates(item, ctx), false, ctx)?);
            }
            out
        }
        Segment::Predicate(term) => {
            let mut out = Vec::new();
            for item in &input {
                out.extend(filter(term, candidates(item, ctx), true, ctx)?);
            }
            out
        }
        Segment::Recursive(inner) => {
            let nodes = self_or_descendants(&input, ctx, true);
            step(inner, nodes, ctx)?
        }
        Segment::RecursiveWildcard => self_or_descendants(&input, ctx, false),
        _ => {
            let mut out = Vec::new();
            for node in input.iter().filter_map(Item::as_node) {
                out.extend(select(segment, node, ctx).into_iter().map(Item::Node));
            }
            out
        }
    };
    // One scope per step: a later step may reach the same node again.
    ctx.push_scope();
    let out = raw.into_iter().filter(|item| ctx.is_unique(item)).collect();
    ctx.pop_scope();
    Ok(out)
}

/// Single-node selectors that need no evaluation.
fn select<'a>(segment: &Segment, node: NodeRef<'a>, ctx: &EvalContext<'a>) -> Vec<NodeRef<'a>> {
    match segment {
        Segment::Child(name) => ctx.get(node, Key::Name(name)),
        Segment::Index(i) => ctx.get(node, Key::Index(*i)),
        Segment::Wildcard => ctx.get(node, Key::Wildcard),
        Segment::AnyIndex if ctx.adapter().kind(node) == NodeKind::List => {
            ctx.get(node, Key::Wildcard)
        }
        Segment::Slice { start, end, step } if ctx.adapter().kind(node) == NodeKind::List => {
            slice_items(&ctx.get(node, Key::Wildcard), *start, *end, *step)
        }
        _ => Vec::new(),
    }
}

/// Filter candidates: the elements of a list, otherwise the item itself.
fn candidates<'a>(item: &Item<'a>, ctx: &EvalContext<'a>) -> Vec<Item<'a>> {
    match item {
        Item::Node(node) if ctx.adapter().kind(*node) == NodeKind::List => ctx
            .get(*node, Key::Wildcard)
            .into_iter()
            .map(Item::Node)
            .collect(),
        other => vec![other.clone()],
    }
}

/// With `positional` set, an integer result selects the candidate at that
/// position. Otherwise every result is tested for truth.
fn filter<'a>(
    term: &Term,
    candidates: Vec<Item<'a>>,
    positional: bool,
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    let saved = ctx.enter_context(candidates.clone());
    let kept = keep(term, &candidates, positional, ctx);
    ctx.leave_context(saved);
    let kept = kept?;
    Ok(candidates
        .into_iter()
        .zip(kept)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect())
}

fn keep<'a>(
    term: &Term,
    candidates: &[Item<'a>],
    positional: bool,
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<bool>, EvalError> {
    let len = candidates.len() as i64;
    let mut kept = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        ctx.set_context_index(Some(i));
        let result = engine::eval(term, std::slice::from_ref(candidate), ctx)?;
        let keep = match result.first() {
            None => false,
            // Negative positions count from the end.
            Some(Item::Int(n)) if positional => {
                let n = if *n < 0 { len + n } else { *n };
                n == i as i64
            }
            Some(item) => ctx.boolean_value(item),
        };
        kept.push(keep);
    }
    Ok(kept)
}

/// Depth-first pre-order walk over every node reachable from `input`.
fn self_or_descendants<'a>(
    input: &[Item<'a>],
    ctx: &EvalContext<'a>,
    include_self: bool,
) -> Vec<Item<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for root in input.iter().filter_map(Item::as_node) {
        let mut stack = vec![(root, true)];
        while let Some((node, is_root)) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if include_self || !is_root {
                out.push(Item::Node(node));
            }
            let children = ctx.get(node, Key::Wildcard);
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }
    }
    out
}

/// Python-style slicing: negative bounds count from the end, out-of-range
/// bounds are clamped, a negative step walks backwards.
fn slice_items<T: Clone>(
    items: &[T],
    start: Option<i64>,
    end: Option<i64>,
    step: Option<i64>,
) -> Vec<T> {
    let n = items.len() as i64;
    let step = step.unwrap_or(1);
    if step == 0 || n == 0 {
        return Vec::new();
    }
    // Negative bounds are offsets from the end. Forward walks clamp into
    // [0, n], backward walks into [-1, n - 1].
    let norm = |i: i64, lo: i64, hi: i64| if i < 0 { (n + i).clamp(lo, hi) } else { i.clamp(lo, hi) };
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| norm(s, 0, n));
        let hi = end.map_or(n, |e| norm(e, 0, n));
        while i < hi {
            out.push(items[i as usize].clone());
            // Stepping past i64::MAX ends the walk.
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    } else {
        let mut i = start.map_or(n - 1, |s| norm(s, -1, n - 1));
        let lo = end.map_or(-1, |e| norm(e, -1, n - 1));
        while i > lo {
            out.push(items[i as usize].clone());
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    }
    out
}
