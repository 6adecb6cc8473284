//! CLI commands

use crate::cli::input;
use crate::config::LogFormat;
use crate::core::fact::{EntityId, TxId};
use crate::core::transaction::{EntityRef, TxOp};
use crate::core::value::{Value, ValueType};
use crate::db::{Database, View};
use crate::error::{Error, Result};
use crate::query::Inputs;
use crate::schema::Attribute;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Temporal-Datalog CLI
#[derive(Parser, Debug)]
#[command(name = "temporal-datalog")]
#[command(about = "Append-only, time-indexed datalog fact store")]
pub struct Cli {
    /// Log output format: text or json
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log filter directives, e.g. `temporal_datalog=debug`
    #[arg(long, global = true, default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the people/friends walkthrough on an in-memory database
    Demo,
    /// Load schema and transactions from JSON files, then run a query
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON array of attribute definitions
    #[arg(long)]
    pub schema: PathBuf,

    /// JSON array of transaction operations; repeat for several transactions
    #[arg(long = "tx")]
    pub txs: Vec<PathBuf>,

    /// Datalog query text
    #[arg(short, long)]
    pub query: String,

    /// Evaluate against the view as of this transaction id
    #[arg(long)]
    pub as_of: Option<u64>,

    /// Query input as `name=value`; integers are longs, anything else a string
    #[arg(long = "arg", value_parser = parse_arg)]
    pub args: Vec<(String, Value)>,
}

fn parse_arg(s: &str) -> std::result::Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", s))?;
    let value = match raw.parse::<i64>() {
        Ok(n) => Value::Long(n),
        Err(_) => Value::from(raw),
    };
    Ok((name.trim().to_string(), value))
}

/// Execute `run`: build a database from files and print result rows as JSON lines
pub async fn run(args: &RunArgs, out: &mut impl Write) -> Result<()> {
    let db = Database::in_memory()?;

    let schema = input::load_schema(&args.schema)?;
    db.define_all(schema).await?;

    for path in &args.txs {
        let ops = input::load_transaction(path)?;
        let report = db.transact(ops).await?;
        info!(file = %path.display(), tx = %report.tx_id, "loaded transaction");
        let tempids: serde_json::Map<String, serde_json::Value> = report
            .tempids
            .iter()
            .map(|(name, id)| (name.clone(), serde_json::Value::from(id.0)))
            .collect();
        writeln!(
            out,
            "{}",
            serde_json::json!({ "tx": report.tx_id.0, "tempids": tempids })
        )?;
    }

    let view = match args.as_of {
        Some(tx) => db.as_of(TxId(tx))?,
        None => db.current(),
    };

    let inputs = args
        .args
        .iter()
        .fold(Inputs::new(), |inputs, (name, value)| inputs.bind(name, value.clone()));

    let mut rows = view.q(&args.query, &inputs)?;
    rows.sort();
    for row in rows {
        let row: Vec<serde_json::Value> = row.iter().map(input::value_to_json).collect();
        writeln!(out, "{}", serde_json::Value::Array(row))?;
    }
    Ok(())
}

const PEOPLE_OVER_30: &str = r#"[:find ?name ?age
    :where [?e :person/name ?name]
           [?e :person/age ?age]
           [(> ?age 30)]]"#;

const ALICE_AGE: &str = r#"[:find ?age
    :where [?e :person/name "Alice Smith"]
           [?e :person/age ?age]]"#;

fn demo_schema() -> Vec<Attribute> {
    vec![
        Attribute::new("person/name", ValueType::String).doc("A person's name"),
        Attribute::new("person/email", ValueType::String)
            .unique_identity()
            .doc("A person's email address"),
        Attribute::new("person/age", ValueType::Long).doc("A person's age"),
        Attribute::new("person/friends", ValueType::Ref)
            .many()
            .doc("A person's friends"),
    ]
}

fn sorted(view: &View, text: &str, inputs: &Inputs) -> Result<Vec<Vec<Value>>> {
    let mut rows = view.q(text, inputs)?;
    rows.sort();
    Ok(rows)
}

fn email_owner(view: &View, email: &str) -> Result<EntityId> {
    let rows = view.q(
        "[:find ?e :in $ ?email :where [?e :person/email ?email]]",
        &Inputs::new().bind("?email", email),
    )?;
    rows.first()
        .and_then(|row| row.first())
        .and_then(Value::as_entity)
        .ok_or_else(|| Error::NotFound(format!("no person with email {}", email)))
}

/// Execute `demo`: schema, three transactions, queries and an as-of read
pub async fn demo(out: &mut impl Write) -> Result<()> {
    let db = Database::in_memory()?;

    writeln!(out, "Setting up schema...")?;
    db.define_all(demo_schema()).await?;

    writeln!(out, "Adding sample data...")?;
    let first = db
        .transact(vec![
            TxOp::assert(EntityRef::temp("alice"))
                .with("person/name", "Alice Smith")
                .with("person/email", "alice@example.com")
                .with("person/age", 30i64)
                .build(),
            TxOp::assert(EntityRef::temp("bob"))
                .with("person/name", "Bob Johnson")
                .with("person/email", "bob@example.com")
                .with("person/age", 35i64)
                .build(),
        ])
        .await?;

    let alice = email_owner(&db.current(), "alice@example.com")?;
    let bob = email_owner(&db.current(), "bob@example.com")?;

    let second = db
        .transact(vec![TxOp::assert(EntityRef::temp("charlie"))
            .with("person/name", "Charlie Davis")
            .with("person/email", "charlie@example.com")
            .with("person/age", 28i64)
            .with_many("person/friends", vec![alice, bob])
            .build()])
        .await?;

    db.transact(vec![TxOp::assert(alice).with("person/age", 31i64).build()])
        .await?;

    let now = db.current();
    let none = Inputs::new();

    writeln!(out, "\nAll people:")?;
    for row in sorted(
        &now,
        "[:find ?e ?name ?email ?age :where [?e :person/name ?name] [?e :person/email ?email] [?e :person/age ?age]]",
        &none,
    )? {
        writeln!(
            out,
            "Entity ID: {}, Name: {}, Email: {}, Age: {}",
            row[0], row[1], row[2], row[3]
        )?;
    }

    writeln!(out, "\nPeople over 30:")?;
    for row in sorted(&now, PEOPLE_OVER_30, &none)? {
        writeln!(out, "Name: {}, Age: {}", row[0], row[1])?;
    }

    writeln!(out, "\nCharlie's friends:")?;
    for row in sorted(
        &now,
        r#"[:find ?friendName :where [?e :person/name "Charlie Davis"] [?e :person/friends ?friend] [?friend :person/name ?friendName]]"#,
        &none,
    )? {
        writeln!(out, "Friend: {}", row[0])?;
    }

    writeln!(out, "\n--- Time Travel Query ---")?;
    writeln!(out, "Transactions:")?;
    for tx in now.transactions() {
        writeln!(out, "Tx: {}, Instant: {}", tx.id, tx.timestamp)?;
    }

    let age_now = sorted(&now, ALICE_AGE, &none)?;
    let past = db.as_of(first.tx_id)?;
    let age_then = sorted(&past, ALICE_AGE, &none)?;
    match (age_then.first(), age_now.first()) {
        (Some(then), Some(current)) => writeln!(
            out,
            "Alice's age changed from {} (as of tx {}) to {} (tx {})",
            then[0],
            first.tx_id,
            current[0],
            now.basis_tx()
        )?,
        _ => writeln!(out, "Alice's age is missing from one of the views")?,
    }

    writeln!(out, "\nPeople over 30 as of tx {}:", second.tx_id)?;
    for row in sorted(&db.as_of(second.tx_id)?, PEOPLE_OVER_30, &none)? {
        writeln!(out, "Name: {}, Age: {}", row[0], row[1])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_arg() {
        assert_eq!(
            parse_arg("?email=a@b.c").unwrap(),
            ("?email".to_string(), Value::from("a@b.c"))
        );
        assert_eq!(parse_arg("?n=42").unwrap(), ("?n".to_string(), Value::Long(42)));
        assert!(parse_arg("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "temporal-datalog",
            "--log-format",
            "json",
            "run",
            "--schema",
            "s.json",
            "--tx",
            "a.json",
            "--tx",
            "b.json",
            "--query",
            "[:find ?e :where [?e :person/name _]]",
            "--as-of",
            "13",
            "--arg",
            "?x=1",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.txs.len(), 2);
                assert_eq!(args.as_of, Some(13));
                assert_eq!(args.args, vec![("?x".to_string(), Value::Long(1))]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_demo_output() {
        let mut out = Vec::new();
        demo(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Name: \"Alice Smith\", Age: 31"));
        assert!(text.contains("Friend: \"Alice Smith\""));
        assert!(text.contains("Friend: \"Bob Johnson\""));
        assert!(text.contains("Alice's age changed from 30"));
        // genesis, schema and three data transactions
        assert_eq!(text.lines().filter(|l| l.starts_with("Tx: ")).count(), 5);
    }

    #[tokio::test]
    async fn test_missing_person_is_not_found() {
        let db = Database::in_memory().unwrap();
        db.define_all(demo_schema()).await.unwrap();
        assert!(matches!(
            email_owner(&db.current(), "nobody@example.com"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        let tx = dir.path().join("tx.json");
        fs::write(
            &schema,
            r#"[{"ident": "person/name", "valueType": "string"},
                {"ident": "person/age", "valueType": "long"}]"#,
        )
        .unwrap();
        fs::write(
            &tx,
            r#"[{"db/id": "a", "person/name": "Ann", "person/age": 41},
                {"db/id": "b", "person/name": "Ben", "person/age": 20}]"#,
        )
        .unwrap();

        let args = RunArgs {
            schema,
            txs: vec![tx],
            query: "[:find ?name :where [?e :person/age ?a] [?e :person/name ?name] [(> ?a 30)]]"
                .to_string(),
            as_of: None,
            args: vec![],
        };
        let mut out = Vec::new();
        run(&args, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"tempids\""));
        assert_eq!(lines[1], r#"["Ann"]"#);
    }
}
