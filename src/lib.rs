//! Path expressions and templates over any hierarchical data.
//!
//! Expressions compile once into a [`ZPath`] and run against any root a
//! registered [`AdapterFactory`] understands; `serde_json::Value` works out
//! of the box.
//!
//! ```
//! use serde_json::json;
//! use zpath::ZPath;
//!
//! let doc = json!({"books": [{"price": 8}, {"price": 22}]});
//! let cheap = ZPath::compile("$.books[?(@.price < 10)].price").unwrap();
//! let matches = cheap.eval(&doc).unwrap();
//! assert_eq!(matches.first_string().as_deref(), Some("8"));
//! ```

pub mod comparison;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod escape;
pub mod expression;
pub mod ext;
pub mod functions;
pub mod node;
pub mod parser;
mod path;
pub mod result;
pub mod template;
pub mod term;
pub mod tokenizer;

use serde_json::Value;

pub use config::{Configuration, FileIncluder, Included, Includer, Logger, Settings, TracingLogger};
pub use context::EvalContext;
pub use errors::{Error, EvalError, LimitKind, Result, SyntaxError, TemplateError};
pub use expression::ZPath;
pub use ext::json::{to_json, JsonFactory};
pub use functions::{Function, Registry};
pub use node::{Adapter, AdapterFactory, Item, Key, NodeKind, NodeRef};
pub use result::Matches;
pub use template::ZTemplate;

/// Evaluates `expr` against a JSON document and returns owned copies of the results.
pub fn query(expr: &str, doc: &Value) -> Result<Vec<Value>> {
    let matches = ZPath::compile(expr)?.eval(doc)?;
    Ok(matches.all().iter().map(to_json).collect())
}

/// Like [`query`] but yields only the first result, with errors and misses as `null`.
pub fn query_first_or_null(expr: &str, doc: &Value) -> Value {
    query(expr, doc)
        .ok()
        .and_then(|values| values.into_iter().next())
        .unwrap_or(Value::Null)
}
