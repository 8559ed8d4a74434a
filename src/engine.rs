use crate::comparison::{arithmetic, cmp_items, negate};
use crate::context::EvalContext;
use crate::errors::EvalError;
use crate::functions;
use crate::node::Item;
use crate::path;
use crate::term::{BinaryOp, Literal, PathStart, Term, UnaryOp};

/// Evaluates `term` relative to the `context` node set.
///
/// Paths run over the whole set. Operators run once per context node and
/// read the first item of each operand.
pub fn eval<'a>(
    term: &Term,
    context: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    let logger = ctx.logger();
    if let Some(logger) = &logger {
        logger.log(&format!("eval {term} on {} node(s)", context.len()));
        logger.enter();
    }
    let out = eval_term(term, context, ctx);
    if let Some(logger) = &logger {
        logger.exit();
        if let Ok(items) = &out {
            logger.log(&format!("{term} -> {} item(s)", items.len()));
        }
    }
    out
}

fn eval_term<'a>(
    term: &Term,
    context: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    match term {
        Term::Literal(lit) => Ok(vec![literal(lit)]),
        Term::Path { start, segments } => {
            let mut current = match start {
                PathStart::Root => vec![Item::Node(ctx.root())],
                PathStart::Current | PathStart::Context => context.to_vec(),
                PathStart::Term(inner) => eval(inner, context, ctx)?,
            };
            for segment in segments {
                if current.is_empty() {
                    break;
                }
                current = path::step(segment, current, ctx)?;
            }
            Ok(current)
        }
        Term::Call(call) => functions::call(call, context, context, ctx),
        Term::List(terms) => {
            let mut out = Vec::new();
            for term in terms {
                out.extend(eval(term, context, ctx)?);
            }
            Ok(out)
        }
        Term::Unary { .. } | Term::Binary { .. } | Term::Ternary { .. } => {
            let mut out = Vec::with_capacity(context.len());
            for node in context {
                operator(term, std::slice::from_ref(node), ctx, &mut out)?;
            }
            Ok(out)
        }
    }
}

fn literal<'a>(lit: &Literal) -> Item<'a> {
    match lit {
        Literal::Str(s) => Item::Str(s.clone()),
        Literal::Integer(i) => Item::Int(*i),
        Literal::Real(r) => Item::Real(*r),
        Literal::Bool(b) => Item::Bool(*b),
        Literal::Null => Item::Null,
    }
}

fn first<'a>(
    term: &Term,
    single: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Option<Item<'a>>, EvalError> {
    Ok(eval(term, single, ctx)?.into_iter().next())
}

/// Missing operands count as false.
fn test<'a>(term: &Term, single: &[Item<'a>], ctx: &mut EvalContext<'a>) -> Result<bool, EvalError> {
    Ok(first(term, single, ctx)?.is_some_and(|item| ctx.boolean_value(&item)))
}

fn operator<'a>(
    term: &Term,
    single: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
    out: &mut Vec<Item<'a>>,
) -> Result<(), EvalError> {
    match term {
        Term::Unary { op: UnaryOp::Not, operand } => {
            out.push(Item::Bool(!test(operand, single, ctx)?));
        }
        Term::Unary { op: UnaryOp::Neg, operand } => {
            if let Some(item) = first(operand, single, ctx)? {
                out.extend(negate(ctx, &item)?);
            }
        }
        Term::Ternary { test: cond, then, otherwise } => {
            let branch = if test(cond, single, ctx)? { then } else { otherwise };
            out.extend(eval(branch, single, ctx)?);
        }
        Term::Binary { op: BinaryOp::And, lhs, rhs } => {
            let value = test(lhs, single, ctx)? && test(rhs, single, ctx)?;
            out.push(Item::Bool(value));
        }
        Term::Binary { op: BinaryOp::Or, lhs, rhs } => {
            let value = test(lhs, single, ctx)? || test(rhs, single, ctx)?;
            out.push(Item::Bool(value));
        }
        Term::Binary { op, lhs, rhs } => {
            let l = first(lhs, single, ctx)?;
            let r = first(rhs, single, ctx)?;
            if op.is_comparison() {
                let value = match (&l, &r) {
                    (Some(l), Some(r)) => cmp_items(ctx, *op, l, r),
                    _ => false,
                };
                out.push(Item::Bool(value));
            } else if let (Some(l), Some(r)) = (&l, &r) {
                out.extend(arithmetic(ctx, *op, l, r)?);
            }
        }
        _ => out.extend(eval(term, single, ctx)?),
    }
    Ok(())
}
