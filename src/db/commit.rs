//! Transaction preparation: temp-id resolution and constraint checks
//!
//! Everything here reads the index at the latest basis and produces the
//! facts to append; nothing is mutated until the caller commits them.

use crate::core::fact::{EntityId, Fact, TxId};
use crate::core::transaction::{AttrValue, EntityRef, TxOp, ValueSpec};
use crate::core::value::Value;
use crate::error::{RejectedFact, Result, SchemaError, TxError};
use crate::index::FactIndex;
use crate::schema::{system, Cardinality, RegisteredAttribute, SchemaRegistry};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Facts ready to be appended, plus the ids allocated for them
#[derive(Debug)]
pub(crate) struct Prepared {
    pub facts: Vec<Fact>,
    pub tempids: BTreeMap<String, EntityId>,
    pub next_id: u64,
}

struct Op<'a> {
    entity: EntityId,
    attribute: &'a RegisteredAttribute,
    value: Value,
    added: bool,
}

impl Op<'_> {
    fn rejected(&self) -> RejectedFact {
        RejectedFact {
            entity: self.entity,
            attribute: self.attribute.ident.clone(),
            value: self.value.clone(),
            added: self.added,
        }
    }

    fn fact(&self, tx: TxId) -> Fact {
        Fact {
            entity: self.entity,
            attribute: self.attribute.id,
            value: self.value.clone(),
            tx,
            added: self.added,
        }
    }
}

fn invalid(entity: EntityId, attribute: &str, value: Value, added: bool, reason: &str) -> TxError {
    TxError::ValidationFailed {
        fact: RejectedFact {
            entity,
            attribute: attribute.to_string(),
            value,
            added,
        },
        reason: reason.to_string(),
    }
}

struct Resolver<'a> {
    tx: TxId,
    schema: &'a SchemaRegistry,
    tempids: BTreeMap<String, EntityId>,
    fresh: HashSet<EntityId>,
}

impl<'a> Resolver<'a> {
    fn attribute(&self, ident: &str) -> Result<&'a RegisteredAttribute> {
        let schema: &'a SchemaRegistry = self.schema;
        schema
            .resolve(ident)
            .ok_or_else(|| SchemaError::Unknown(ident.to_string()).into())
    }

    fn entity(&self, entity: &EntityRef, attribute: &str, added: bool) -> Result<EntityId> {
        match entity {
            EntityRef::Temp(name) if added => self.tempids.get(name).copied().ok_or_else(|| {
                invalid(EntityId(0), attribute, Value::from(name.as_str()), added, "unresolved temp-id").into()
            }),
            EntityRef::Temp(name) => Err(invalid(
                EntityId(0),
                attribute,
                Value::from(name.as_str()),
                added,
                "cannot retract from an entity created in the same transaction",
            )
            .into()),
            EntityRef::Id(id) if id.0 == 0 || id.0 >= self.tx.0 => Err(invalid(
                *id,
                attribute,
                Value::Ref(*id),
                added,
                "entity does not exist",
            )
            .into()),
            EntityRef::Id(id) => Ok(*id),
        }
    }

    fn value(
        &self,
        entity: EntityId,
        attribute: &RegisteredAttribute,
        spec: &ValueSpec,
        added: bool,
    ) -> Result<Value> {
        let raw = match spec {
            ValueSpec::Temp(name) => match self.tempids.get(name) {
                Some(id) => Value::Ref(*id),
                None => {
                    return Err(invalid(
                        entity,
                        &attribute.ident,
                        Value::from(name.as_str()),
                        added,
                        "temp-id is referenced but never asserted",
                    )
                    .into())
                }
            },
            ValueSpec::Value(v) => v.clone(),
        };

        let value = raw.clone().coerce(attribute.value_type).ok_or_else(|| {
            let reason = format!("expected a {} value", attribute.value_type);
            invalid(entity, &attribute.ident, raw.clone(), added, &reason)
        })?;

        if let Value::Ref(target) = &value {
            if target.0 >= self.tx.0 && !self.fresh.contains(target) {
                return Err(invalid(
                    entity,
                    &attribute.ident,
                    value.clone(),
                    added,
                    "reference to an entity that does not exist",
                )
                .into());
            }
        }
        Ok(value)
    }

    fn check_writable(&self, op: &Op<'_>) -> Result<()> {
        if system::is_reserved(op.attribute.id) {
            return Err(TxError::ValidationFailed {
                fact: op.rejected(),
                reason: "attribute is reserved for the store".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Resolve, validate and expand `ops` into the facts of transaction `tx`.
///
/// `basis` is the latest committed transaction; constraints are checked
/// against the state live at that bound.
pub(crate) fn prepare(
    ops: &[TxOp],
    tx: TxId,
    schema: &SchemaRegistry,
    index: &FactIndex,
    basis: TxId,
) -> Result<Prepared> {
    let mut next_id = tx.0 + 1;
    let mut resolver = Resolver {
        tx,
        schema,
        tempids: BTreeMap::new(),
        fresh: HashSet::new(),
    };

    for op in ops {
        if let TxOp::Assert {
            entity: EntityRef::Temp(name),
            ..
        } = op
        {
            if !resolver.tempids.contains_key(name) {
                let id = EntityId(next_id);
                next_id += 1;
                resolver.tempids.insert(name.clone(), id);
                resolver.fresh.insert(id);
            }
        }
    }

    let mut expanded: Vec<Op<'_>> = Vec::new();
    for op in ops {
        match op {
            TxOp::Assert { entity, attributes } => {
                for (ident, values) in attributes {
                    let attribute = resolver.attribute(ident)?;
                    let e = resolver.entity(entity, ident, true)?;
                    let specs: &[ValueSpec] = match values {
                        AttrValue::One(spec) => std::slice::from_ref(spec),
                        AttrValue::Many(specs) => specs,
                    };
                    if attribute.cardinality == Cardinality::One && specs.len() > 1 {
                        let value = resolver.value(e, attribute, &specs[1], true)?;
                        return Err(invalid(
                            e,
                            ident,
                            value,
                            true,
                            "several values for a cardinality-one attribute",
                        )
                        .into());
                    }
                    for spec in specs {
                        let value = resolver.value(e, attribute, spec, true)?;
                        let op = Op {
                            entity: e,
                            attribute,
                            value,
                            added: true,
                        };
                        resolver.check_writable(&op)?;
                        expanded.push(op);
                    }
                }
            }
            TxOp::Retract {
                entity,
                attribute: ident,
                value,
            } => {
                let attribute = resolver.attribute(ident)?;
                let e = resolver.entity(entity, ident, false)?;
                let value = resolver.value(e, attribute, value, false)?;
                let op = Op {
                    entity: e,
                    attribute,
                    value,
                    added: false,
                };
                resolver.check_writable(&op)?;
                expanded.push(op);
            }
        }
    }

    // Conflicts inside the transaction
    let mut seen: HashMap<(EntityId, EntityId, Value), bool> = HashMap::new();
    let mut single: HashMap<(EntityId, EntityId), usize> = HashMap::new();
    let mut ops: Vec<Op<'_>> = Vec::with_capacity(expanded.len());
    for op in expanded {
        let key = (op.entity, op.attribute.id, op.value.clone());
        match seen.get(&key) {
            Some(&added) if added == op.added => continue,
            Some(_) => {
                return Err(TxError::ValidationFailed {
                    fact: op.rejected(),
                    reason: "asserted and retracted in the same transaction".to_string(),
                }
                .into())
            }
            None => {
                seen.insert(key, op.added);
            }
        }
        if op.added && op.attribute.cardinality == Cardinality::One {
            if let Some(&first) = single.get(&(op.entity, op.attribute.id)) {
                return Err(TxError::CardinalityViolation {
                    first: ops[first].rejected(),
                    second: op.rejected(),
                }
                .into());
            }
            single.insert((op.entity, op.attribute.id), ops.len());
        }
        ops.push(op);
    }

    // Retractions, explicit and implied by cardinality-one
    let mut retracted: HashSet<(EntityId, EntityId, Value)> = HashSet::new();
    let mut facts = Vec::with_capacity(ops.len());
    let mut asserted = Vec::new();
    for op in &ops {
        let live = index.is_live(op.entity, op.attribute.id, &op.value, basis);
        if !op.added {
            if live && retracted.insert((op.entity, op.attribute.id, op.value.clone())) {
                facts.push(op.fact(tx));
            }
            continue;
        }
        if live {
            continue;
        }
        if op.attribute.cardinality == Cardinality::One {
            for old in index.values(op.entity, op.attribute.id, basis) {
                if old != op.value && retracted.insert((op.entity, op.attribute.id, old.clone())) {
                    facts.push(Fact::retract(op.entity, op.attribute.id, old, tx));
                }
            }
        }
        asserted.push(op);
        facts.push(op.fact(tx));
    }

    // Unique identities, against current state and within the transaction
    let mut claimed: HashMap<(EntityId, &Value), EntityId> = HashMap::new();
    for op in asserted.iter().filter(|op| op.attribute.is_unique()) {
        if let Some(&holder) = claimed.get(&(op.attribute.id, &op.value)) {
            return Err(TxError::UniquenessViolation {
                fact: op.rejected(),
                holder,
            }
            .into());
        }
        claimed.insert((op.attribute.id, &op.value), op.entity);

        let holder = index
            .holders(op.attribute.id, &op.value, basis)
            .into_iter()
            .find(|h| {
                *h != op.entity && !retracted.contains(&(*h, op.attribute.id, op.value.clone()))
            });
        if let Some(holder) = holder {
            return Err(TxError::UniquenessViolation {
                fact: op.rejected(),
                holder,
            }
            .into());
        }
    }

    Ok(Prepared {
        facts,
        tempids: resolver.tempids,
        next_id,
    })
}
