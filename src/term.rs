//! The parsed form of an expression. Trees are immutable once built and
//! render back to a canonical string used for structural equality.

use std::fmt;

use crate::tokenizer::{is_name_char, is_name_start};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    EEq,
    NEe,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::EEq => "===",
            BinaryOp::NEe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }

    /// Binding strength; larger binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::EEq | BinaryOp::NEe => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::BitOr => 5,
            BinaryOp::BitXor => 6,
            BinaryOp::BitAnd => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 9,
            BinaryOp::Pow => 11,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::EEq
                | BinaryOp::NEe
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
}

/// Where a path begins.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// `$`
    Root,
    /// `@`
    Current,
    /// A bare relative path such as `name` or `*`.
    Context,
    /// Any other primary, e.g. `count(a).b` or `(a, b)[0]`.
    Term(Box<Term>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or `['name']`
    Child(String),
    /// `[n]`; negative counts from the end of a list.
    Index(i64),
    /// `[*]`: every element of a list.
    AnyIndex,
    /// `.*`: every immediate child.
    Wildcard,
    /// `..name`, `..[sel]`: the selector applied to a node and all its descendants.
    Recursive(Box<Segment>),
    /// `..*`: every descendant.
    RecursiveWildcard,
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
    /// `[?(expr)]`: keeps candidates whose predicate is true.
    Filter(Box<Term>),
    /// `[expr]` with a computed expression: an integer result selects by
    /// position, anything else is tested for truth.
    Predicate(Box<Term>),
    /// `.name(args)`
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(Literal),
    Path {
        start: PathStart,
        segments: Vec<Segment>,
    },
    Call(Call),
    Unary {
        op: UnaryOp,
        operand: Box<Term>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Term>,
        rhs: Box<Term>,
    },
    Ternary {
        test: Box<Term>,
        then: Box<Term>,
        otherwise: Box<Term>,
    },
    /// A parenthesised comma list: results are concatenated.
    List(Vec<Term>),
}

impl Term {
    fn is_signed(&self) -> bool {
        match self {
            Term::Unary { .. } => true,
            Term::Literal(Literal::Integer(i)) => *i < 0,
            Term::Literal(Literal::Real(r)) => r.is_sign_negative(),
            _ => false,
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c != '\\' && is_name_start(c))
        && chars.all(|c| c != '\\' && is_name_char(c))
        && !matches!(name, "true" | "false" | "null")
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn write_list(f: &mut fmt::Formatter<'_>, terms: &[Term]) -> fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{term}")?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write_quoted(f, s),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Real(r) => write!(f, "{r:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.args)?;
        f.write_str(")")
    }
}

impl Segment {
    fn fmt_in(&self, f: &mut fmt::Formatter<'_>, leading: bool) -> fmt::Result {
        let dot = if leading { "" } else { "." };
        match self {
            Segment::Child(name) if is_plain_name(name) => write!(f, "{dot}{name}"),
            Segment::Child(name) => {
                f.write_str("[")?;
                write_quoted(f, name)?;
                f.write_str("]")
            }
            Segment::Index(i) => write!(f, "[{i}]"),
            Segment::AnyIndex => f.write_str("[*]"),
            Segment::Wildcard => write!(f, "{dot}*"),
            Segment::Recursive(inner) => {
                f.write_str("..")?;
                inner.fmt_in(f, true)
            }
            Segment::RecursiveWildcard => f.write_str("..*"),
            Segment::Slice { start, end, step } => {
                f.write_str("[")?;
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                f.write_str(":")?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                if let Some(step) = step {
                    write!(f, ":{step}")?;
                }
                f.write_str("]")
            }
            Segment::Filter(term) => write!(f, "[?({term})]"),
            Segment::Predicate(term) => write!(f, "[{term}]"),
            Segment::Call(call) => write!(f, "{dot}{call}"),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_in(f, false)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(lit) => write!(f, "{lit}"),
            Term::Path { start, segments } => {
                let leading = match start {
                    PathStart::Root => {
                        f.write_str("$")?;
                        false
                    }
                    PathStart::Current => {
                        f.write_str("@")?;
                        false
                    }
                    PathStart::Context => true,
                    PathStart::Term(term) => {
                        write!(f, "({term})")?;
                        false
                    }
                };
                for (i, segment) in segments.iter().enumerate() {
                    segment.fmt_in(f, leading && i == 0)?;
                }
                Ok(())
            }
            Term::Call(call) => write!(f, "{call}"),
            Term::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{symbol}{operand}")
            }
            // `-2 ** 2` reads back as a negated power.
            Term::Binary {
                op: BinaryOp::Pow,
                lhs,
                rhs,
            } if lhs.is_signed() => write!(f, "(({lhs}) ** {rhs})"),
            Term::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Term::Ternary {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
            Term::List(terms) => {
                f.write_str("(")?;
                write_list(f, terms)?;
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(name: &str) -> Segment {
        Segment::Child(name.to_string())
    }

    #[test]
    fn canonical_path_rendering() {
        let term = Term::Path {
            start: PathStart::Root,
            segments: vec![
                child("store"),
                child("first name"),
                Segment::AnyIndex,
                Segment::Recursive(Box::new(child("price"))),
                Segment::Slice {
                    start: Some(1),
                    end: None,
                    step: Some(2),
                },
            ],
        };
        assert_eq!(term.to_string(), r#"$.store["first name"][*]..price[1::2]"#);
    }

    #[test]
    fn relative_path_omits_leading_dot() {
        let term = Term::Path {
            start: PathStart::Context,
            segments: vec![child("a"), Segment::Wildcard],
        };
        assert_eq!(term.to_string(), "a.*");
    }

    #[test]
    fn binary_terms_are_parenthesised() {
        let term = Term::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Term::Literal(Literal::Integer(1))),
            rhs: Box::new(Term::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Term::Literal(Literal::Real(2.0))),
                rhs: Box::new(Term::Literal(Literal::Str("x\"y".into()))),
            }),
        };
        assert_eq!(term.to_string(), r#"(1 + (2.0 * "x\"y"))"#);
    }

    #[test]
    fn signed_power_base_keeps_its_parentheses() {
        let term = Term::Binary {
            op: BinaryOp::Pow,
            lhs: Box::new(Term::Literal(Literal::Integer(-2))),
            rhs: Box::new(Term::Literal(Literal::Integer(2))),
        };
        assert_eq!(term.to_string(), "((-2) ** 2)");
    }

    #[test]
    fn keyword_keys_are_quoted() {
        assert!(!is_plain_name("true"));
        assert!(is_plain_name("first-name"));
        assert!(!is_plain_name("9lives"));
    }
}
