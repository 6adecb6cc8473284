//! Property tests for history isolation and cardinality-one semantics

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use temporal_datalog::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    SetAge(usize, i64),
    AddTag(usize, u8),
    RemoveTag(usize, u8),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..3usize, 0..100i64).prop_map(|(p, age)| Step::SetAge(p, age)),
        (0..3usize, 0..5u8).prop_map(|(p, tag)| Step::AddTag(p, tag)),
        (0..3usize, 0..5u8).prop_map(|(p, tag)| Step::RemoveTag(p, tag)),
    ]
}

/// Expected state per person: age and tag set
type Model = BTreeMap<usize, (Option<i64>, BTreeSet<String>)>;

fn op(entity: EntityId, step: &Step) -> TxOp {
    match step {
        Step::SetAge(_, age) => TxOp::assert(entity).with("person/age", *age).build(),
        Step::AddTag(_, tag) => TxOp::assert(entity)
            .with("person/tag", format!("t{}", tag))
            .build(),
        Step::RemoveTag(_, tag) => TxOp::retract(entity, "person/tag", format!("t{}", tag)),
    }
}

fn apply(model: &mut Model, step: &Step) {
    match step {
        Step::SetAge(p, age) => model.entry(*p).or_default().0 = Some(*age),
        Step::AddTag(p, tag) => {
            model.entry(*p).or_default().1.insert(format!("t{}", tag));
        }
        Step::RemoveTag(p, tag) => {
            model.entry(*p).or_default().1.remove(&format!("t{}", tag));
        }
    }
}

fn observe(view: &View, people: &[EntityId]) -> Model {
    let mut model = Model::new();
    for (i, &person) in people.iter().enumerate() {
        let entity = view.entity(person);
        let age = entity
            .get("person/age")
            .and_then(|values| values.first())
            .and_then(Value::as_long);
        let tags = entity
            .get("person/tag")
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        model.insert(i, (age, tags));
    }
    model
}

fn normalize(mut model: Model, people: usize) -> Model {
    for i in 0..people {
        model.entry(i).or_default();
    }
    model
}

async fn run(steps: Vec<Step>) -> std::result::Result<(), TestCaseError> {
    let db = Database::in_memory().unwrap();
    db.define_all(vec![
        Attribute::new("person/name", ValueType::String),
        Attribute::new("person/age", ValueType::Long),
        Attribute::new("person/tag", ValueType::String).many(),
    ])
    .await
    .unwrap();

    let report = db
        .transact(
            (0..3)
                .map(|i| {
                    TxOp::assert(EntityRef::temp(format!("p{}", i)))
                        .with("person/name", format!("P{}", i))
                        .build()
                })
                .collect(),
        )
        .await
        .unwrap();
    let people: Vec<EntityId> = (0..3)
        .map(|i| report.tempid(&format!("p{}", i)).unwrap())
        .collect();

    let mut model = Model::new();
    let mut snapshots = vec![(report.tx_id, normalize(model.clone(), 3))];
    for step in &steps {
        let person = match step {
            Step::SetAge(p, _) | Step::AddTag(p, _) | Step::RemoveTag(p, _) => people[*p],
        };
        let report = db.transact(vec![op(person, step)]).await.unwrap();
        apply(&mut model, step);
        snapshots.push((report.tx_id, normalize(model.clone(), 3)));
    }

    for (tx, expected) in &snapshots {
        let view = db.as_of(*tx).unwrap();
        prop_assert_eq!(&observe(&view, &people), expected);

        for &person in &people {
            let ages = view.datoms(Some(person), Some("person/age"), None).unwrap();
            prop_assert!(ages.len() <= 1);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every past view reflects exactly the transactions up to its bound
    #[test]
    fn views_match_sequential_model(steps in prop::collection::vec(arb_step(), 0..25)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(steps))?;
    }

    /// Sequential assertions on a cardinality-one attribute keep only the last
    #[test]
    fn cardinality_one_keeps_last(ages in prop::collection::vec(0..1000i64, 1..10)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let last = *ages.last().unwrap();
        let values = runtime.block_on(async {
            let db = Database::in_memory().unwrap();
            db.define(Attribute::new("person/age", ValueType::Long)).await.unwrap();
            let report = db
                .transact(vec![TxOp::assert(EntityRef::temp("p")).with("person/age", ages[0]).build()])
                .await
                .unwrap();
            let person = report.tempid("p").unwrap();
            for &age in &ages[1..] {
                db.transact(vec![TxOp::assert(person).with("person/age", age).build()])
                    .await
                    .unwrap();
            }
            db.current().entity(person).remove("person/age").unwrap_or_default()
        });
        prop_assert_eq!(values, vec![Value::Long(last)]);
    }
}
