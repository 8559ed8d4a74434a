use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;

use crate::config::Configuration;
use crate::context::EvalContext;
use crate::engine;
use crate::errors::{EvalError, SyntaxError};
use crate::node::Item;
use crate::parser::parse;
use crate::result::Matches;
use crate::term::Term;

/// A compiled expression. Immutable, cheap to clone and safe to share
/// between threads; every evaluation gets its own [`EvalContext`].
///
/// Two expressions are equal when they parse to the same tree under
/// configurations that compare values the same way.
#[derive(Clone)]
pub struct ZPath {
    source: Arc<str>,
    canonical: Arc<str>,
    terms: Arc<Vec<Term>>,
    config: Arc<Configuration>,
}

impl ZPath {
    /// Compiles with the default configuration.
    pub fn compile(source: &str) -> Result<Self, SyntaxError> {
        Self::compile_with(source, Configuration::default())
    }

    pub fn compile_with(
        source: &str,
        config: impl Into<Arc<Configuration>>,
    ) -> Result<Self, SyntaxError> {
        let config = config.into();
        let terms = parse(source, &config)?;
        let canonical = terms.iter().join(", ");
        tracing::debug!(source, %canonical, "compiled expression");
        Ok(Self {
            source: source.into(),
            canonical: canonical.into(),
            terms: Arc::new(terms),
            config,
        })
    }

    /// The text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Evaluates against `root`, picking the first configured adapter
    /// factory that accepts it.
    pub fn eval<'a, T: Any>(&self, root: &'a T) -> Result<Matches<'a>, EvalError> {
        self.eval_any(root)
    }

    pub fn eval_any<'a>(&self, root: &'a (dyn Any + 'static)) -> Result<Matches<'a>, EvalError> {
        let ctx = EvalContext::new(root, Arc::clone(&self.config))?;
        self.eval_with(ctx)
    }

    /// Evaluates with a caller-built context, e.g. one wrapping a custom adapter.
    pub fn eval_with<'a>(&self, mut ctx: EvalContext<'a>) -> Result<Matches<'a>, EvalError> {
        let root = [Item::Node(ctx.root())];
        let items = self.select(&root, &mut ctx)?;
        Ok(Matches::new(items, self.clone(), ctx))
    }

    /// Every term evaluated against `context`, concatenated, with repeated
    /// nodes dropped.
    pub(crate) fn select<'a>(
        &self,
        context: &[Item<'a>],
        ctx: &mut EvalContext<'a>,
    ) -> Result<Vec<Item<'a>>, EvalError> {
        let mut raw = Vec::new();
        for term in self.terms.iter() {
            raw.extend(engine::eval(term, context, ctx)?);
        }
        ctx.push_scope();
        let items = raw.into_iter().filter(|item| ctx.is_unique(item)).collect();
        ctx.pop_scope();
        Ok(items)
    }

    fn comparison_key(&self) -> (&str, u64, bool) {
        (
            &self.canonical,
            self.config.min_double().to_bits(),
            self.config.strict_arithmetic(),
        )
    }
}

impl fmt::Display for ZPath {
    /// The canonical rendering, not the source text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for ZPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZPath")
            .field("source", &self.source)
            .field("canonical", &self.canonical)
            .finish()
    }
}

impl PartialEq for ZPath {
    fn eq(&self, other: &Self) -> bool {
        self.comparison_key() == other.comparison_key()
    }
}

impl Eq for ZPath {}

impl Hash for ZPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparison_key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn equal_when_canonical_forms_match() {
        let a = ZPath::compile("$.a[?(@.x>1)]").unwrap();
        let b = ZPath::compile("$['a'][?( @.x > 1 )]").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.source(), b.source());
        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        let lenient = ZPath::compile_with("$.a[?(@.x>1)]", Configuration::default().with_min_double(0.5)).unwrap();
        assert_ne!(a, lenient);
    }

    #[test]
    fn shared_across_threads() {
        let path = Arc::new(ZPath::compile("$.items[*].n.sum()").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = Arc::clone(&path);
                std::thread::spawn(move || {
                    let doc = json!({"items": [{"n": i}, {"n": 10}]});
                    let matches = path.eval(&doc).unwrap();
                    crate::ext::json::to_json(&matches.first())
                })
            })
            .collect();
        let mut sums: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        sums.sort_by_key(|v| v.as_i64());
        assert_eq!(sums, vec![json!(10), json!(11), json!(12), json!(13)]);
    }

    #[test]
    fn union_results_are_deduplicated() {
        let doc = json!({"a": {"b": 1}});
        let path = ZPath::compile("$.a, $.a, $.a.b, 2, 2").unwrap();
        let matches = path.eval(&doc).unwrap();
        assert_eq!(matches.len(), 4);
    }
}
