//! Mustache-style templates whose tags hold path expressions.
//!
//! | tag | meaning |
//! |---|---|
//! | `{{ e }}` | string value of the first result of `e` |
//! | `{{# e }}...{{/ e }}` | body once per result of `e` |
//! | `{{? e }}...{{:}}...{{/ e }}` | conditional on the first result of `e` |
//! | `{{> name }}` | include through the configured [`Includer`](crate::config::Includer) |
//! | `{{! text }}` | comment |
//!
//! `{{/}}` closes the innermost open block.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::config::Configuration;
use crate::errors::TemplateError;
use crate::expression::ZPath;

mod render;

use render::Renderer;

#[derive(Debug)]
pub(crate) enum Node {
    Text(String),
    Expr(ZPath),
    Section {
        path: ZPath,
        body: Vec<Node>,
    },
    Cond {
        guard: ZPath,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Include(String),
}

/// A compiled template. Like [`ZPath`], it is immutable and can be applied
/// to many roots, from many threads.
#[derive(Debug, Clone)]
pub struct ZTemplate {
    location: Option<Arc<str>>,
    nodes: Arc<Vec<Node>>,
    config: Arc<Configuration>,
}

impl ZTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Self::compile_with(source, Configuration::default())
    }

    pub fn compile_with(
        source: &str,
        config: impl Into<Arc<Configuration>>,
    ) -> Result<Self, TemplateError> {
        Self::build(source, None, config.into())
    }

    /// Compiles a template read from `location`; its includes resolve
    /// relative to that location.
    pub fn compile_at(
        source: &str,
        location: impl Into<String>,
        config: impl Into<Arc<Configuration>>,
    ) -> Result<Self, TemplateError> {
        Self::build(source, Some(location.into()), config.into())
    }

    fn build(
        source: &str,
        location: Option<String>,
        config: Arc<Configuration>,
    ) -> Result<Self, TemplateError> {
        tracing::debug!(location = location.as_deref(), "compiling template");
        let nodes = compile_nodes(source, &config)?;
        Ok(Self {
            location: location.map(Into::into),
            nodes: Arc::new(nodes),
            config,
        })
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// The same template rendering under another locale.
    pub fn with_locale(&self, locale: impl Into<String>) -> Self {
        let config = (*self.config).clone().with_locale(locale);
        Self {
            location: self.location.clone(),
            nodes: Arc::clone(&self.nodes),
            config: Arc::new(config),
        }
    }

    pub fn apply<T: Any>(&self, root: &T) -> Result<String, TemplateError> {
        self.apply_any(root)
    }

    pub fn apply_any(&self, root: &(dyn Any + 'static)) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.apply_to(root, &mut out)?;
        Ok(out)
    }

    /// Renders into `out`. On error, `out` holds whatever was written
    /// before the failure.
    pub fn apply_to(
        &self,
        root: &(dyn Any + 'static),
        out: &mut dyn fmt::Write,
    ) -> Result<(), TemplateError> {
        Renderer::new(&self.config, out).run(&self.nodes, self.location.as_deref(), root)
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;
    (line, column)
}

fn syntax_error(source: &str, offset: usize, message: impl Into<String>) -> TemplateError {
    let (line, column) = line_col(source, offset);
    TemplateError::Syntax {
        line,
        column,
        message: message.into(),
    }
}

/// Finds the `}}` closing a tag whose body starts at `from`, skipping
/// quoted strings. Comments are not quote-aware.
fn tag_end(source: &str, from: usize, comment: bool) -> Option<usize> {
    if comment {
        return source[from..].find("}}").map(|i| from + i);
    }
    let bytes = source.as_bytes();
    let mut quote = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[i..].starts_with(b"}}") => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

enum Opener {
    Section(ZPath),
    Cond(ZPath),
}

impl Opener {
    fn path(&self) -> &ZPath {
        match self {
            Opener::Section(path) | Opener::Cond(path) => path,
        }
    }
}

struct Frame {
    opener: Opener,
    offset: usize,
    body: Vec<Node>,
    /// Set once `{{:}}` has been seen.
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn target(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(otherwise) => otherwise,
            None => &mut self.body,
        }
    }

    fn close(self) -> Node {
        match self.opener {
            Opener::Section(path) => Node::Section {
                path,
                body: self.body,
            },
            Opener::Cond(guard) => Node::Cond {
                guard,
                then: self.body,
                otherwise: self.otherwise.unwrap_or_default(),
            },
        }
    }
}

pub(crate) fn compile_nodes(
    source: &str,
    config: &Arc<Configuration>,
) -> Result<Vec<Node>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find("{{") {
        let open = pos + found;
        let text = &source[pos..open];
        if !text.is_empty() {
            target(&mut root, &mut stack).push(Node::Text(text.to_string()));
        }
        let body_start = open + 2;
        let comment = source[body_start..].starts_with('!');
        let end = tag_end(source, body_start, comment)
            .ok_or_else(|| syntax_error(source, open, "unclosed tag"))?;
        pos = end + 2;
        if comment {
            continue;
        }

        let raw = &source[body_start..end];
        let sigil = raw.trim_start().chars().next();
        let (sigil, expr_start) = match sigil {
            Some(c @ ('#' | '?' | ':' | '/' | '>')) => {
                let at = body_start + (raw.len() - raw.trim_start().len());
                (Some(c), at + 1)
            }
            _ => (None, body_start),
        };
        let expr = &source[expr_start..end];
        let compile = || {
            ZPath::compile_with(expr, Arc::clone(config))
                .map_err(|e| syntax_error(source, expr_start + e.offset, e.message))
        };

        match sigil {
            Some('#') => stack.push(Frame {
                opener: Opener::Section(compile()?),
                offset: open,
                body: Vec::new(),
                otherwise: None,
            }),
            Some('?') => stack.push(Frame {
                opener: Opener::Cond(compile()?),
                offset: open,
                body: Vec::new(),
                otherwise: None,
            }),
            Some(':') => {
                if !expr.trim().is_empty() {
                    return Err(syntax_error(source, open, "`{{:}}` takes no expression"));
                }
                match stack.last_mut() {
                    Some(frame)
                        if matches!(frame.opener, Opener::Cond(_)) && frame.otherwise.is_none() =>
                    {
                        frame.otherwise = Some(Vec::new());
                    }
                    _ => return Err(syntax_error(source, open, "`{{:}}` outside of a `{{? }}` block")),
                }
            }
            Some('/') => {
                let Some(frame) = stack.pop() else {
                    return Err(syntax_error(source, open, "close tag without an open block"));
                };
                if !expr.trim().is_empty() {
                    let closing = compile()?;
                    if &closing != frame.opener.path() {
                        return Err(syntax_error(
                            source,
                            open,
                            format!("`{{{{/ {closing} }}}}` does not close `{}`", frame.opener.path()),
                        ));
                    }
                }
                let node = frame.close();
                target(&mut root, &mut stack).push(node);
            }
            Some('>') => {
                let name = expr.trim();
                if name.is_empty() {
                    return Err(syntax_error(source, open, "include needs a template name"));
                }
                target(&mut root, &mut stack).push(Node::Include(name.to_string()));
            }
            _ => {
                if expr.trim().is_empty() {
                    return Err(syntax_error(source, open, "empty tag"));
                }
                let path = compile()?;
                target(&mut root, &mut stack).push(Node::Expr(path));
            }
        }
    }

    let tail = &source[pos..];
    if !tail.is_empty() {
        target(&mut root, &mut stack).push(Node::Text(tail.to_string()));
    }
    if let Some(frame) = stack.last() {
        return Err(syntax_error(
            source,
            frame.offset,
            format!("block `{}` is never closed", frame.opener.path()),
        ));
    }
    Ok(root)
}

fn target<'n>(root: &'n mut Vec<Node>, stack: &'n mut [Frame]) -> &'n mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => frame.target(),
        None => root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn syntax(source: &str) -> (usize, usize, String) {
        match ZTemplate::compile(source) {
            Err(TemplateError::Syntax {
                line,
                column,
                message,
            }) => (line, column, message),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn substitutions_and_text() {
        let t = ZTemplate::compile("Hello {{ $.name }}! {{! ignored }}{{ $.missing }}.").unwrap();
        assert_eq!(t.apply(&json!({"name": "Ada"})).unwrap(), "Hello Ada! .");
    }

    #[test]
    fn braces_inside_strings_do_not_close_tags() {
        let t = ZTemplate::compile("{{ concat('}}', $.a) }}").unwrap();
        assert_eq!(t.apply(&json!({"a": "x"})).unwrap(), "}}x");
    }

    #[test]
    fn sections_iterate_results() {
        let t = ZTemplate::compile("{{# $.xs[*] }}<{{ name }}:{{ position() }}>{{/ $.xs[*] }}").unwrap();
        let doc = json!({"xs": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(t.apply(&doc).unwrap(), "<a:0><b:1>");
    }

    #[test]
    fn sections_skip_false_and_null() {
        let t = ZTemplate::compile("{{# $.on }}on{{/}}{{# $.off }}off{{/}}{{# $.nil }}nil{{/}}").unwrap();
        let doc = json!({"on": true, "off": false, "nil": null});
        assert_eq!(t.apply(&doc).unwrap(), "on");
    }

    #[test]
    fn conditionals() {
        let t = ZTemplate::compile("{{? $.n > 1 }}many{{:}}one{{/ $.n > 1 }}{{ !$.n }}").unwrap();
        assert_eq!(t.apply(&json!({"n": 3})).unwrap(), "manyfalse");
        assert_eq!(t.apply(&json!({"n": 1})).unwrap(), "onefalse");
        assert_eq!(t.apply(&json!({})).unwrap(), "onetrue");
    }

    #[test]
    fn locale_override() {
        let t = ZTemplate::compile("{{ locale() }}").unwrap();
        assert_eq!(t.apply(&json!({})).unwrap(), "en");
        assert_eq!(t.with_locale("fr").apply(&json!({})).unwrap(), "fr");
    }

    #[test]
    fn syntax_errors_have_positions() {
        assert_eq!(syntax("ab\n  {{ $.a"), (2, 3, "unclosed tag".to_string()));
        assert_eq!(syntax("{{/}}").2, "close tag without an open block");
        assert_eq!(
            syntax("{{# $.a }}{{/ $.b }}").2,
            "`{{/ $.b }}` does not close `$.a`"
        );
        assert_eq!(syntax("x\n{{# $.a }}").0, 2);
        assert_eq!(syntax("{{:}}").2, "`{{:}}` outside of a `{{? }}` block");
        assert_eq!(syntax("{{? 1 }}{{:}}{{:}}{{/}}").2, "`{{:}}` outside of a `{{? }}` block");
        let (line, column, message) = syntax("line\n{{ $.a[ }}");
        assert_eq!((line, column), (2, 9));
        assert!(message.starts_with("expected an expression"), "{message}");
    }
}
