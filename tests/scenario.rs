//! End-to-end scenarios over the people/friends schema

use std::collections::BTreeSet;
use temporal_datalog::error::{Error, TxError, ViewError};
use temporal_datalog::prelude::*;

struct People {
    db: Database,
    alice: EntityId,
    bob: EntityId,
    charlie: EntityId,
    t1: TxId,
    t2: TxId,
    t3: TxId,
}

async fn people() -> People {
    let db = Database::in_memory().unwrap();
    db.define_all(vec![
        Attribute::new("person/name", ValueType::String),
        Attribute::new("person/email", ValueType::String).unique_identity(),
        Attribute::new("person/age", ValueType::Long),
        Attribute::new("person/friends", ValueType::Ref).many(),
    ])
    .await
    .unwrap();

    let r1 = db
        .transact(vec![
            TxOp::assert(EntityRef::temp("alice"))
                .with("person/name", "Alice")
                .with("person/email", "alice@example.com")
                .with("person/age", 30i64)
                .build(),
            TxOp::assert(EntityRef::temp("bob"))
                .with("person/name", "Bob")
                .with("person/email", "bob@example.com")
                .with("person/age", 35i64)
                .build(),
        ])
        .await
        .unwrap();
    let alice = r1.tempid("alice").unwrap();
    let bob = r1.tempid("bob").unwrap();

    let r2 = db
        .transact(vec![TxOp::assert(EntityRef::temp("charlie"))
            .with("person/name", "Charlie")
            .with("person/email", "charlie@example.com")
            .with("person/age", 28i64)
            .with_many("person/friends", vec![bob, alice])
            .build()])
        .await
        .unwrap();

    let r3 = db
        .transact(vec![TxOp::assert(alice).with("person/age", 31i64).build()])
        .await
        .unwrap();

    People {
        db,
        alice,
        bob,
        charlie: r2.tempid("charlie").unwrap(),
        t1: r1.tx_id,
        t2: r2.tx_id,
        t3: r3.tx_id,
    }
}

fn rows(view: &View, text: &str) -> BTreeSet<Vec<Value>> {
    view.q(text, &Inputs::new()).unwrap().into_iter().collect()
}

const OVER_30: &str =
    "[:find ?name ?age :where [?e :person/name ?name] [?e :person/age ?age] [(> ?age 30)]]";

#[tokio::test]
async fn people_over_30_now_and_as_of() {
    let p = people().await;

    let now = rows(&p.db.current(), OVER_30);
    let expected: BTreeSet<_> = [
        vec![Value::from("Alice"), Value::Long(31)],
        vec![Value::from("Bob"), Value::Long(35)],
    ]
    .into_iter()
    .collect();
    assert_eq!(now, expected);

    let then = rows(&p.db.as_of(p.t2).unwrap(), OVER_30);
    let expected: BTreeSet<_> = [vec![Value::from("Bob"), Value::Long(35)]].into_iter().collect();
    assert_eq!(then, expected);
}

#[tokio::test]
async fn charlies_friends() {
    let p = people().await;
    let friends = rows(
        &p.db.current(),
        r#"[:find ?friendName :where [?e :person/name "Charlie"]
                                      [?e :person/friends ?friend]
                                      [?friend :person/name ?friendName]]"#,
    );
    let expected: BTreeSet<_> = [vec![Value::from("Alice")], vec![Value::from("Bob")]]
        .into_iter()
        .collect();
    assert_eq!(friends, expected);

    let entity = p.db.current().entity(p.charlie);
    let mut refs = entity["person/friends"].clone();
    refs.sort();
    assert_eq!(refs, vec![Value::Ref(p.alice), Value::Ref(p.bob)]);
}

#[tokio::test]
async fn as_of_beyond_latest_is_out_of_range() {
    let p = people().await;
    let err = p.db.as_of(TxId(p.t3.0 + 1_000)).unwrap_err();
    assert_eq!(
        err,
        ViewError::OutOfRange {
            requested: TxId(p.t3.0 + 1_000),
            latest: p.t3,
        }
    );
}

#[tokio::test]
async fn history_is_isolated() {
    let p = people().await;
    let v1 = p.db.as_of(p.t1).unwrap();

    assert_eq!(v1.entity(p.alice)["person/age"], vec![Value::Long(30)]);
    assert!(v1.entity(p.charlie).is_empty());
    assert_eq!(
        p.db.current().entity(p.alice)["person/age"],
        vec![Value::Long(31)]
    );

    let txs: Vec<TxId> = p.db.current().transactions().iter().map(|m| m.id).collect();
    assert!(txs.ends_with(&[p.t1, p.t2, p.t3]));
    assert!(txs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn cardinality_one_keeps_latest() {
    let p = people().await;
    p.db.transact(vec![TxOp::assert(p.bob).with("person/age", 36i64).build()])
        .await
        .unwrap();

    let ages = p
        .db
        .current()
        .datoms(Some(p.bob), Some("person/age"), None)
        .unwrap();
    assert_eq!(ages.len(), 1);
    assert_eq!(ages[0].value, Value::Long(36));
}

#[tokio::test]
async fn uniqueness_violation_leaves_state_unchanged() {
    let p = people().await;
    let before = p.db.current().basis_tx();

    let err = p
        .db
        .transact(vec![TxOp::assert(EntityRef::temp("eve"))
            .with("person/name", "Eve")
            .with("person/email", "alice@example.com")
            .build()])
        .await
        .unwrap_err();
    match err {
        Error::Transaction(TxError::UniquenessViolation { holder, .. }) => {
            assert_eq!(holder, p.alice)
        }
        other => panic!("unexpected error {}", other),
    }

    // Two claimants inside one transaction
    let err = p
        .db
        .transact(vec![
            TxOp::assert(EntityRef::temp("x"))
                .with("person/email", "same@example.com")
                .build(),
            TxOp::assert(EntityRef::temp("y"))
                .with("person/email", "same@example.com")
                .build(),
        ])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TxError::UniquenessViolation { .. })
    ));

    assert_eq!(p.db.current().basis_tx(), before);
    assert!(rows(&p.db.current(), r#"[:find ?e :where [?e :person/name "Eve"]]"#).is_empty());
}

#[tokio::test]
async fn unique_value_is_reusable_after_retraction() {
    let p = people().await;
    p.db.transact(vec![
        TxOp::retract(p.alice, "person/email", "alice@example.com"),
        TxOp::assert(EntityRef::temp("alice2"))
            .with("person/email", "alice@example.com")
            .build(),
    ])
    .await
    .unwrap();

    let holder = p
        .db
        .current()
        .lookup("person/email", "alice@example.com")
        .unwrap();
    assert!(holder.is_some());
    assert_ne!(holder, Some(p.alice));
}

#[tokio::test]
async fn retraction_round_trip() {
    let p = people().await;
    let report = p
        .db
        .transact(vec![TxOp::retract(p.charlie, "person/friends", p.bob)])
        .await
        .unwrap();

    let friends_of = |view: &View| -> BTreeSet<Vec<Value>> {
        rows(view, r#"[:find ?f :where [?c :person/name "Charlie"] [?c :person/friends ?f]]"#)
    };
    assert_eq!(
        friends_of(&p.db.current()),
        [vec![Value::Ref(p.alice)]].into_iter().collect()
    );
    assert_eq!(
        friends_of(&report.db_before),
        [vec![Value::Ref(p.alice)], vec![Value::Ref(p.bob)]]
            .into_iter()
            .collect()
    );

    let since = p.db.since(p.t3).await.unwrap();
    assert!(since
        .iter()
        .any(|f| !f.added && f.entity == p.charlie && f.value == Value::Ref(p.bob)));
}

#[tokio::test]
async fn concurrent_readers_see_stable_views() {
    let p = people().await;
    let view = p.db.current();
    let basis = view.basis_tx();

    let writer = {
        let db = p.db.clone();
        let alice = p.alice;
        tokio::spawn(async move {
            for age in 40..60i64 {
                db.transact(vec![TxOp::assert(alice).with("person/age", age).build()])
                    .await
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let view = view.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let ages = rows(&view, OVER_30);
                    assert_eq!(ages.len(), 2);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(view.basis_tx(), basis);
    assert_eq!(
        p.db.current().entity(p.alice)["person/age"],
        vec![Value::Long(59)]
    );
}

#[tokio::test]
async fn concurrent_writers_serialize() {
    let p = people().await;
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = p.db.clone();
            tokio::spawn(async move {
                db.transact(vec![TxOp::assert(EntityRef::temp("n"))
                    .with("person/name", format!("N{}", i))
                    .build()])
                    .await
                    .unwrap()
                    .tx_id
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let names = rows(&p.db.current(), "[:find ?n :where [_ :person/name ?n]]");
    assert_eq!(names.len(), 3 + 8);
}
