use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::context::EvalContext;
use crate::errors::EvalError;
use crate::node::Item;
use crate::term::{Call, Term};

pub mod builtins;

/// A named callable usable from expressions.
pub trait Function: Send + Sync {
    /// Registration key.
    fn name(&self) -> &'static str;

    fn matches(&self, name: &str) -> bool {
        name == self.name()
    }

    /// Checks argument shape at parse time. The message becomes a syntax error.
    fn verify(&self, name: &str, args: &[Term]) -> Result<(), String>;

    /// `context` is the node set arguments are evaluated against; `input` is
    /// the node set the call was chained onto (`a.b.count()`), or the context
    /// for a free-standing call.
    fn eval<'a>(
        &self,
        name: &str,
        args: &[Term],
        context: &[Item<'a>],
        input: &[Item<'a>],
        ctx: &mut EvalContext<'a>,
    ) -> Result<Vec<Item<'a>>, EvalError>;
}

/// Rejects argument lists outside `arity`.
pub fn check_arity(name: &str, args: &[Term], arity: RangeInclusive<usize>) -> Result<(), String> {
    if arity.contains(&args.len()) {
        return Ok(());
    }
    let expected = if arity.start() == arity.end() {
        format!("{}", arity.start())
    } else if *arity.end() == usize::MAX {
        format!("at least {}", arity.start())
    } else {
        format!("{} to {}", arity.start(), arity.end())
    };
    Err(format!(
        "{name}() takes {expected} argument(s), got {}",
        args.len()
    ))
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_all(&mut registry);
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let map = Arc::make_mut(&mut self.inner);
        map.insert(f.name(), Arc::new(f));
    }

    /// Exact key first, then any function whose `matches` accepts the name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner
            .get(name)
            .or_else(|| self.inner.values().find(|f| f.matches(name)))
            .cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.inner.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Dispatches a parsed call through the context's registry.
pub(crate) fn call<'a>(
    call: &Call,
    context: &[Item<'a>],
    input: &[Item<'a>],
    ctx: &mut EvalContext<'a>,
) -> Result<Vec<Item<'a>>, EvalError> {
    let function = ctx
        .config()
        .functions()
        .get(&call.name)
        .ok_or_else(|| EvalError::Function {
            name: call.name.clone(),
            message: "not registered".to_string(),
        })?;
    function.eval(&call.name, &call.args, context, input, ctx)
}
