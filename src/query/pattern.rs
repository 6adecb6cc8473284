//! Query representation: patterns, predicates and input bindings

use crate::core::fact::EntityId;
use crate::core::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A query variable, written with a leading `?`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(String);

impl Var {
    /// Create a variable; a missing `?` prefix is added
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        if name.starts_with('?') {
            Self(name.to_string())
        } else {
            Self(format!("?{}", name))
        }
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Placeholder variables (`_` in query text) are never projected
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with("?_")
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity or value position of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(Var),
    Const(Value),
}

impl Term {
    pub fn var(name: impl AsRef<str>) -> Self {
        Self::Var(Var::new(name))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }
}

/// `"?x"` is a variable, any other string a string constant
impl From<&str> for Term {
    fn from(s: &str) -> Self {
        if s.starts_with('?') {
            Self::var(s)
        } else {
            Self::Const(Value::from(s))
        }
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Self::Const(Value::Long(n))
    }
}

impl From<EntityId> for Term {
    fn from(e: EntityId) -> Self {
        Self::Const(Value::Ref(e))
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Self::Var(v)
    }
}

/// Attribute position of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrTerm {
    Var(Var),
    Ident(String),
}

/// `"?a"` is a variable, any other string an attribute identifier
impl From<&str> for AttrTerm {
    fn from(s: &str) -> Self {
        if s.starts_with('?') {
            Self::Var(Var::new(s))
        } else {
            Self::Ident(s.trim_start_matches(':').to_string())
        }
    }
}

/// A `[entity attribute value]` data pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub entity: Term,
    pub attribute: AttrTerm,
    pub value: Term,
}

impl Pattern {
    pub fn new(
        entity: impl Into<Term>,
        attribute: impl Into<AttrTerm>,
        value: impl Into<Term>,
    ) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Variables in position order, repeats included
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        let e = match &self.entity {
            Term::Var(v) => Some(v),
            Term::Const(_) => None,
        };
        let a = match &self.attribute {
            AttrTerm::Var(v) => Some(v),
            AttrTerm::Ident(_) => None,
        };
        let v = match &self.value {
            Term::Var(v) => Some(v),
            Term::Const(_) => None,
        };
        e.into_iter().chain(a).chain(v)
    }
}

/// Comparison operator of a predicate clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Apply to two values; values of different variants are only `Ne`
    pub fn test(&self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::*;
        match (self, left.partial_compare(right)) {
            (Self::Ne, None) => true,
            (_, None) => false,
            (Self::Eq, Some(o)) => o == Equal,
            (Self::Ne, Some(o)) => o != Equal,
            (Self::Lt, Some(o)) => o == Less,
            (Self::Le, Some(o)) => o != Greater,
            (Self::Gt, Some(o)) => o == Greater,
            (Self::Ge, Some(o)) => o != Less,
        }
    }
}

/// `(op ?var constant)` filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub op: CompareOp,
    pub var: Var,
    pub constant: Value,
}

/// A conjunctive query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Projected variables; empty projects every named variable
    pub find: Vec<Var>,
    /// Declared parameters that must be supplied as inputs
    pub inputs: Vec<Var>,
    pub patterns: Vec<Pattern>,
    pub predicates: Vec<Predicate>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse query text, see [`crate::query::parser`]
    pub fn parse(text: &str) -> Result<Self, crate::error::QueryError> {
        crate::query::parser::parse_query(text)
    }

    pub fn find(mut self, var: impl AsRef<str>) -> Self {
        self.find.push(Var::new(var));
        self
    }

    pub fn input(mut self, var: impl AsRef<str>) -> Self {
        self.inputs.push(Var::new(var));
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Add `[entity attribute value]`
    pub fn with(
        self,
        entity: impl Into<Term>,
        attribute: impl Into<AttrTerm>,
        value: impl Into<Term>,
    ) -> Self {
        self.pattern(Pattern::new(entity, attribute, value))
    }

    /// Add `(op var constant)`
    pub fn filter(mut self, op: CompareOp, var: impl AsRef<str>, constant: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            op,
            var: Var::new(var),
            constant: constant.into(),
        });
        self
    }
}

/// External parameter values keyed by variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    values: BTreeMap<Var, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, var: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.values.insert(Var::new(var), value.into());
        self
    }

    /// Bind positional arguments to the query's declared inputs
    pub fn positional(query: &Query, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            values: query.inputs.iter().cloned().zip(args).collect(),
        }
    }

    pub fn get(&self, var: &Var) -> Option<&Value> {
        self.values.get(var)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &Value)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
