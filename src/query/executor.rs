//! Query executor: left-to-right conjunctive join over a view

use crate::core::fact::{EntityId, TxId};
use crate::core::value::{Value, ValueType};
use crate::db::View;
use crate::error::QueryError;
use crate::index::FactIndex;
use crate::query::pattern::{AttrTerm, Inputs, Predicate, Query, Term, Var};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Row = Vec<Option<Value>>;

#[derive(Debug, Clone)]
enum Slot {
    Const(Value),
    Var(usize),
}

#[derive(Debug)]
struct Step {
    entity: Slot,
    attribute: Slot,
    /// Declared type when the attribute is a constant
    value_type: Option<ValueType>,
    value: Slot,
}

#[derive(Debug)]
struct Filter {
    predicate: Predicate,
    slot: usize,
}

/// A query compiled against a view's schema
#[derive(Debug)]
struct Plan {
    vars: Vec<Var>,
    steps: Vec<Step>,
    /// Filters to run once `steps[..depth]` have matched, indexed by depth
    filters: Vec<Vec<Filter>>,
    find: Vec<usize>,
    initial: Row,
}

struct Compiler<'a> {
    view: &'a View,
    vars: Vec<Var>,
    slots: HashMap<Var, usize>,
    bound_at: HashMap<usize, usize>,
}

impl<'a> Compiler<'a> {
    fn slot(&mut self, var: &Var) -> usize {
        if let Some(&slot) = self.slots.get(var) {
            return slot;
        }
        let slot = self.vars.len();
        self.vars.push(var.clone());
        self.slots.insert(var.clone(), slot);
        slot
    }

    fn bind(&mut self, var: &Var, depth: usize) -> usize {
        let slot = self.slot(var);
        self.bound_at.entry(slot).or_insert(depth);
        slot
    }

    fn compile(mut self, query: &Query, inputs: &Inputs) -> Result<Plan, QueryError> {
        for declared in &query.inputs {
            if inputs.get(declared).is_none() {
                return Err(QueryError::UnboundVariable(declared.to_string()));
            }
        }

        let mut initial: Vec<(usize, Value)> = Vec::new();
        for (var, value) in inputs.iter() {
            let slot = self.bind(var, 0);
            initial.push((slot, value.clone()));
        }

        let mut steps = Vec::with_capacity(query.patterns.len());
        for (i, pattern) in query.patterns.iter().enumerate() {
            let depth = i + 1;
            let entity = match &pattern.entity {
                Term::Var(v) => Slot::Var(self.bind(v, depth)),
                Term::Const(c) => match entity_of(c) {
                    Some(e) => Slot::Const(Value::Ref(e)),
                    None => {
                        return Err(QueryError::InvalidConstant {
                            value: c.clone(),
                            position: "entity".to_string(),
                        })
                    }
                },
            };
            let (attribute, value_type) = match &pattern.attribute {
                AttrTerm::Var(v) => (Slot::Var(self.bind(v, depth)), None),
                AttrTerm::Ident(ident) => {
                    let attr = self
                        .view
                        .attribute(ident)
                        .ok_or_else(|| QueryError::UnknownAttribute(ident.clone()))?;
                    (Slot::Const(Value::Ref(attr.id)), Some(attr.value_type))
                }
            };
            let value = match &pattern.value {
                Term::Var(v) => Slot::Var(self.bind(v, depth)),
                Term::Const(c) => match value_type {
                    Some(t) => match c.clone().coerce(t) {
                        Some(c) => Slot::Const(c),
                        None => {
                            return Err(QueryError::InvalidConstant {
                                value: c.clone(),
                                position: "value".to_string(),
                            })
                        }
                    },
                    None => Slot::Const(c.clone()),
                },
            };
            steps.push(Step {
                entity,
                attribute,
                value_type,
                value,
            });
        }

        let mut filters: Vec<Vec<Filter>> = (0..=steps.len()).map(|_| Vec::new()).collect();
        for predicate in &query.predicates {
            let slot = self
                .slots
                .get(&predicate.var)
                .copied()
                .ok_or_else(|| QueryError::UnboundVariable(predicate.var.to_string()))?;
            let depth = self.bound_at.get(&slot).copied().unwrap_or(0);
            filters[depth].push(Filter {
                predicate: predicate.clone(),
                slot,
            });
        }

        let find = if query.find.is_empty() {
            (0..self.vars.len())
                .filter(|&slot| {
                    let var = &self.vars[slot];
                    !var.is_placeholder() && inputs.get(var).is_none()
                })
                .collect()
        } else {
            query
                .find
                .iter()
                .map(|var| {
                    self.slots
                        .get(var)
                        .copied()
                        .ok_or_else(|| QueryError::UnboundVariable(var.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut row: Row = vec![None; self.vars.len()];
        for (slot, value) in initial {
            row[slot] = Some(value);
        }

        Ok(Plan {
            vars: self.vars,
            steps,
            filters,
            find,
            initial: row,
        })
    }
}

/// Entity id named by a value: a reference or a positive long
fn entity_of(value: &Value) -> Option<EntityId> {
    match value {
        Value::Ref(e) => Some(*e),
        Value::Long(n) if *n > 0 => Some(EntityId(*n as u64)),
        _ => None,
    }
}

impl Plan {
    fn passes(&self, depth: usize, row: &Row) -> bool {
        self.filters[depth].iter().all(|f| match &row[f.slot] {
            Some(v) => f.predicate.op.test(v, &f.predicate.constant),
            None => false,
        })
    }

    /// Extend `row` with every match of `steps[depth]` live at `bound`
    fn expand(&self, depth: usize, row: &Row, index: &FactIndex, bound: TxId) -> Vec<Row> {
        let step = &self.steps[depth];
        // A bound position that cannot name an entity matches nothing
        let entity = match known(&step.entity, row) {
            Some(v) => match entity_of(v) {
                Some(e) => Some(e),
                None => return Vec::new(),
            },
            None => None,
        };
        let attribute = match known(&step.attribute, row) {
            Some(v) => match entity_of(v) {
                Some(a) => Some(a),
                None => return Vec::new(),
            },
            None => None,
        };
        let value = match (known(&step.value, row), step.value_type) {
            (Some(v), Some(t)) => match v.clone().coerce(t) {
                Some(v) => Some(v),
                None => return Vec::new(),
            },
            (Some(v), None) => Some(v.clone()),
            (None, _) => None,
        };

        let mut out = Vec::new();
        for fact in index.datoms(entity, attribute, value.as_ref(), bound) {
            let mut next = row.clone();
            let unified = unify(&mut next, row, &step.entity, Value::Ref(fact.entity))
                && unify(&mut next, row, &step.attribute, Value::Ref(fact.attribute))
                && unify(&mut next, row, &step.value, fact.value);
            if unified && self.passes(depth + 1, &next) {
                out.push(next);
            }
        }
        out
    }
}

/// Value at a slot, if already bound in `row`
fn known<'r>(slot: &'r Slot, row: &'r Row) -> Option<&'r Value> {
    match slot {
        Slot::Const(v) => Some(v),
        Slot::Var(i) => row[*i].as_ref(),
    }
}

/// Bind `value` into `next`; slots bound before this step were already
/// constrained by the index lookup.
fn unify(next: &mut Row, before: &Row, slot: &Slot, value: Value) -> bool {
    match slot {
        Slot::Const(_) => true,
        Slot::Var(i) if before[*i].is_some() => true,
        Slot::Var(i) => match &next[*i] {
            Some(existing) => *existing == value,
            None => {
                next[*i] = Some(value);
                true
            }
        },
    }
}

struct Frame {
    depth: usize,
    rows: std::vec::IntoIter<Row>,
}

/// Lazy, finite result sequence of a query.
///
/// Rows are projected onto the query's `find` variables and de-duplicated.
/// Each pattern step takes a short read lock on the index; no lock is held
/// between calls to `next`.
pub struct QueryResults {
    view: View,
    plan: Arc<Plan>,
    stack: Vec<Frame>,
    seen: HashSet<Vec<Value>>,
    cancel: Option<CancellationToken>,
}

impl QueryResults {
    /// Stop evaluation with [`QueryError::Cancelled`] once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Names of the projected columns
    pub fn columns(&self) -> Vec<&Var> {
        self.plan.find.iter().map(|&i| &self.plan.vars[i]).collect()
    }
}

impl Iterator for QueryResults {
    type Item = Result<Vec<Value>, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let depth = frame.depth;
            let Some(row) = frame.rows.next() else {
                self.stack.pop();
                continue;
            };

            if depth == self.plan.steps.len() {
                let tuple: Option<Vec<Value>> =
                    self.plan.find.iter().map(|&i| row[i].clone()).collect();
                match tuple {
                    Some(tuple) if self.seen.insert(tuple.clone()) => return Some(Ok(tuple)),
                    _ => continue,
                }
            }

            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                self.stack.clear();
                return Some(Err(QueryError::Cancelled));
            }

            let plan = &self.plan;
            let bound = self.view.basis_tx();
            let rows = self
                .view
                .with_index(|index| plan.expand(depth, &row, index, bound));
            self.stack.push(Frame {
                depth: depth + 1,
                rows: rows.into_iter(),
            });
        }
    }
}

/// Evaluate `query` against `view` with external parameter bindings
pub fn evaluate(
    query: &Query,
    view: &View,
    inputs: &Inputs,
) -> Result<QueryResults, QueryError> {
    let plan = Compiler {
        view,
        vars: Vec::new(),
        slots: HashMap::new(),
        bound_at: HashMap::new(),
    }
    .compile(query, inputs)?;

    debug!(
        patterns = plan.steps.len(),
        vars = plan.vars.len(),
        basis = %view.basis_tx(),
        "compiled query"
    );

    let stack = if plan.passes(0, &plan.initial) {
        vec![Frame {
            depth: 0,
            rows: vec![plan.initial.clone()].into_iter(),
        }]
    } else {
        Vec::new()
    };

    Ok(QueryResults {
        view: view.clone(),
        plan: Arc::new(plan),
        stack,
        seen: HashSet::new(),
        cancel: None,
    })
}
