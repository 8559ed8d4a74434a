use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use crate::ext::json::JsonFactory;
use crate::functions::{Function, Registry};
use crate::node::AdapterFactory;

/// Trace hooks the evaluator calls around every term.
pub trait Logger: Send + Sync {
    fn enter(&self) {}
    fn exit(&self) {}
    fn log(&self, message: &str);
}

/// Forwards evaluation traces to `tracing` at TRACE level, indented by depth.
#[derive(Debug, Default)]
pub struct TracingLogger {
    depth: AtomicUsize,
}

impl Logger for TracingLogger {
    fn enter(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn exit(&self) {
        // Saturates at zero; an unmatched exit is ignored.
        self.depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1))
            .ok();
    }

    fn log(&self, message: &str) {
        let depth = self.depth.load(Ordering::Relaxed);
        tracing::trace!(target: "zpath::eval", "{:indent$}{message}", "", indent = depth * 2);
    }
}

/// Content returned by an [`Includer`], with the location nested includes resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Included {
    pub location: String,
    pub content: String,
}

/// Resolves `{{> name }}` directives for templates.
pub trait Includer: Send + Sync {
    fn include(&self, name: &str, base: Option<&str>) -> io::Result<Included>;
}

/// Reads includes from disk, relative to the including template or to `root`.
#[derive(Debug, Clone)]
pub struct FileIncluder {
    root: PathBuf,
}

impl FileIncluder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Includer for FileIncluder {
    fn include(&self, name: &str, base: Option<&str>) -> io::Result<Included> {
        let dir = base
            .and_then(|b| Path::new(b).parent())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(self.root.as_path());
        let path = dir.join(name);
        let content = std::fs::read_to_string(&path)?;
        Ok(Included {
            location: path.to_string_lossy().into_owned(),
            content,
        })
    }
}

impl Includer for HashMap<String, String> {
    fn include(&self, name: &str, _base: Option<&str>) -> io::Result<Included> {
        self.get(name)
            .map(|content| Included {
                location: name.to_string(),
                content: content.clone(),
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no template named `{name}`")))
    }
}

/// Plain settings that can be loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    pub locale: String,
    pub min_double: f64,
    pub strict_arithmetic: bool,
    pub html_escape: bool,
    pub max_include_depth: usize,
    pub max_iterations: usize,
    pub max_output_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            min_double: 1e-9,
            strict_arithmetic: false,
            html_escape: false,
            max_include_depth: 16,
            max_iterations: 100_000,
            max_output_size: 16 * 1024 * 1024,
        }
    }
}

/// Everything compilation and evaluation consult. Builder methods consume and
/// return a copy, so deriving a configuration never touches its source.
#[derive(Clone)]
pub struct Configuration {
    factories: Vec<Arc<dyn AdapterFactory>>,
    functions: Registry,
    logger: Option<Arc<dyn Logger>>,
    includer: Option<Arc<dyn Includer>>,
    settings: Settings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            factories: vec![Arc::new(JsonFactory)],
            functions: Registry::with_builtins(),
            logger: None,
            includer: None,
            settings: Settings::default(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("factories", &self.factories.len())
            .field("functions", &self.functions.names())
            .field("logger", &self.logger.is_some())
            .field("includer", &self.includer.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factories(&self) -> &[Arc<dyn AdapterFactory>] {
        &self.factories
    }

    pub fn functions(&self) -> &Registry {
        &self.functions
    }

    pub fn locale(&self) -> &str {
        &self.settings.locale
    }

    pub fn min_double(&self) -> f64 {
        self.settings.min_double
    }

    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    pub fn strict_arithmetic(&self) -> bool {
        self.settings.strict_arithmetic
    }

    pub fn template_html_escape(&self) -> bool {
        self.settings.html_escape
    }

    pub fn template_includer(&self) -> Option<&Arc<dyn Includer>> {
        self.includer.as_ref()
    }

    pub fn template_max_include_depth(&self) -> usize {
        self.settings.max_include_depth
    }

    pub fn template_max_iterations(&self) -> usize {
        self.settings.max_iterations
    }

    pub fn template_max_output_size(&self) -> usize {
        self.settings.max_output_size
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Adds a factory after the existing ones; earlier factories win.
    pub fn with_factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    /// Adds a factory ahead of the existing ones.
    pub fn with_preferred_factory(mut self, factory: impl AdapterFactory + 'static) -> Self {
        self.factories.insert(0, Arc::new(factory));
        self
    }

    pub fn with_function(mut self, function: impl Function + 'static) -> Self {
        self.functions.register(function);
        self
    }

    pub fn with_functions(mut self, functions: Registry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.settings.locale = locale.into();
        self
    }

    pub fn with_min_double(mut self, min_double: f64) -> Self {
        self.settings.min_double = min_double.abs();
        self
    }

    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn with_strict_arithmetic(mut self, strict: bool) -> Self {
        self.settings.strict_arithmetic = strict;
        self
    }

    pub fn with_template_html_escape(mut self, escape: bool) -> Self {
        self.settings.html_escape = escape;
        self
    }

    pub fn with_template_includer(mut self, includer: impl Includer + 'static) -> Self {
        self.includer = Some(Arc::new(includer));
        self
    }

    pub fn with_template_max_include_depth(mut self, depth: usize) -> Self {
        self.settings.max_include_depth = depth;
        self
    }

    pub fn with_template_max_iterations(mut self, iterations: usize) -> Self {
        self.settings.max_iterations = iterations;
        self
    }

    pub fn with_template_max_output_size(mut self, bytes: usize) -> Self {
        self.settings.max_output_size = bytes;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}
