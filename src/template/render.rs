use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{compile_nodes, Node};
use crate::config::Configuration;
use crate::context::EvalContext;
use crate::errors::{LimitKind, TemplateError};
use crate::escape::escape_html;
use crate::node::Item;

/// State for one render: output accounting, the shared iteration budget and
/// the includes compiled so far.
pub(super) struct Renderer<'r> {
    config: &'r Arc<Configuration>,
    out: &'r mut dyn fmt::Write,
    written: usize,
    iterations: usize,
    includes: HashMap<String, Arc<Vec<Node>>>,
}

impl<'r> Renderer<'r> {
    pub(super) fn new(config: &'r Arc<Configuration>, out: &'r mut dyn fmt::Write) -> Self {
        Self {
            config,
            out,
            written: 0,
            iterations: 0,
            includes: HashMap::new(),
        }
    }

    pub(super) fn run(
        mut self,
        nodes: &[Node],
        location: Option<&str>,
        root: &(dyn Any + 'static),
    ) -> Result<(), TemplateError> {
        tracing::debug!(location, "rendering template");
        let mut ctx = EvalContext::new(root, Arc::clone(self.config))?;
        let current = [Item::Node(ctx.root())];
        let result = self.render(nodes, location, 0, &current, &mut ctx);
        tracing::debug!(
            written = self.written,
            iterations = self.iterations,
            ok = result.is_ok(),
            "template rendered"
        );
        result
    }

    fn render<'a>(
        &mut self,
        nodes: &[Node],
        location: Option<&str>,
        depth: usize,
        current: &[Item<'a>],
        ctx: &mut EvalContext<'a>,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.write(text)?,
                Node::Expr(path) => {
                    let items = path.select(current, ctx)?;
                    if let Some(text) = items.first().and_then(|item| ctx.string_value(item)) {
                        if self.config.template_html_escape() {
                            self.write(&escape_html(&text))?;
                        } else {
                            self.write(&text)?;
                        }
                    }
                }
                Node::Section { path, body } => {
                    let items = path.select(current, ctx)?;
                    let saved = ctx.enter_context(items.clone());
                    let looped = self.each(&items, body, location, depth, current, ctx);
                    ctx.leave_context(saved);
                    looped?;
                }
                Node::Cond {
                    guard,
                    then,
                    otherwise,
                } => {
                    let truth = is_true(&guard.select(current, ctx)?, ctx);
                    let branch = if truth { then } else { otherwise };
                    self.render(branch, location, depth, current, ctx)?;
                }
                Node::Include(name) => self.include(name, location, depth, current, ctx)?,
            }
        }
        Ok(())
    }

    fn each<'a>(
        &mut self,
        items: &[Item<'a>],
        body: &[Node],
        location: Option<&str>,
        depth: usize,
        current: &[Item<'a>],
        ctx: &mut EvalContext<'a>,
    ) -> Result<(), TemplateError> {
        for (i, item) in items.iter().enumerate() {
            self.tick()?;
            if matches!(ctx.scalar(item), Item::Null | Item::Bool(false)) {
                continue;
            }
            ctx.set_context_index(Some(i));
            match item {
                Item::Node(_) => self.render(body, location, depth, std::slice::from_ref(item), ctx)?,
                _ => self.render(body, location, depth, current, ctx)?,
            }
        }
        Ok(())
    }

    fn include<'a>(
        &mut self,
        name: &str,
        location: Option<&str>,
        depth: usize,
        current: &[Item<'a>],
        ctx: &mut EvalContext<'a>,
    ) -> Result<(), TemplateError> {
        // The top-level template is depth 0, so a limit of n allows n nested includes.
        let limit = self.config.template_max_include_depth();
        if depth + 1 > limit {
            return Err(TemplateError::LimitExceeded {
                kind: LimitKind::IncludeDepth,
                limit,
            });
        }
        let includer = self
            .config
            .template_includer()
            .ok_or_else(|| TemplateError::NoIncluder(name.to_string()))?;
        let included = includer
            .include(name, location)
            .map_err(|source| TemplateError::Include {
                name: name.to_string(),
                source,
            })?;
        let nodes = match self.includes.get(&included.location) {
            Some(nodes) => Arc::clone(nodes),
            None => {
                tracing::debug!(name, location = %included.location, "compiling include");
                let nodes = compile_nodes(&included.content, self.config).map_err(|source| {
                    TemplateError::Included {
                        name: name.to_string(),
                        source: Box::new(source),
                    }
                })?;
                let nodes = Arc::new(nodes);
                self.includes
                    .insert(included.location.clone(), Arc::clone(&nodes));
                nodes
            }
        };
        self.render(&nodes, Some(&included.location), depth + 1, current, ctx)
    }

    fn tick(&mut self) -> Result<(), TemplateError> {
        // One budget for the whole render, shared by every loop and include.
        self.iterations += 1;
        let limit = self.config.template_max_iterations();
        if self.iterations > limit {
            return Err(TemplateError::LimitExceeded {
                kind: LimitKind::Iterations,
                limit,
            });
        }
        Ok(())
    }

    /// Checked before writing, so output never exceeds the limit.
    fn write(&mut self, text: &str) -> Result<(), TemplateError> {
        let limit = self.config.template_max_output_size();
        // Bytes, counted across includes.
        if self.written.saturating_add(text.len()) > limit {
            return Err(TemplateError::LimitExceeded {
                kind: LimitKind::OutputSize,
                limit,
            });
        }
        self.out.write_str(text)?;
        self.written += text.len();
        Ok(())
    }
}

fn is_true<'a>(items: &[Item<'a>], ctx: &EvalContext<'a>) -> bool {
    items.first().is_some_and(|item| ctx.boolean_value(item))
}
