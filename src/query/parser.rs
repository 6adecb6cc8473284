//! Parser for datalog query text
//!
//! Accepts the subset of the datalog query syntax the evaluator supports:
//!
//! ```text
//! [:find ?name ?age
//!  :in $ ?min
//!  :where [?e :person/name ?name]
//!         [?e :person/age ?age]
//!         [(> ?age 30)]]
//! ```
//!
//! `$` in `:in` names the database and is skipped. `_` is a placeholder that
//! matches anything. Constants are strings, integers and `#inst "..."`.

use crate::core::temporal::Timestamp;
use crate::core::value::Value;
use crate::error::QueryError;
use crate::query::pattern::{AttrTerm, CompareOp, Pattern, Predicate, Query, Term, Var};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

enum Clause {
    Pattern(Pattern),
    Predicate(Predicate),
}

const PLACEHOLDER: &str = "?_";

/// Whitespace; commas count as whitespace
fn sp(i: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_whitespace() || c == ',')(i)
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || "-_.*+!?<>=/".contains(c)
}

fn variable(i: &str) -> IResult<&str, Var> {
    alt((
        map(recognize(pair(char('?'), take_while1(is_symbol_char))), Var::new),
        value(Var::new(PLACEHOLDER), char('_')),
    ))(i)
}

fn keyword(i: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(is_symbol_char))(i)
}

fn string_lit(i: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                )),
            )),
            char('"'),
        ),
        Option::unwrap_or_default,
    )(i)
}

fn integer(i: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(i)
}

fn instant(i: &str) -> IResult<&str, Timestamp> {
    map_res(preceded(pair(tag("#inst"), sp), string_lit), |s| {
        Timestamp::parse_rfc3339(&s).ok_or("invalid instant")
    })(i)
}

fn constant(i: &str) -> IResult<&str, Value> {
    alt((
        map(instant, Value::Instant),
        map(string_lit, Value::String),
        map(integer, Value::Long),
    ))(i)
}

fn term(i: &str) -> IResult<&str, Term> {
    alt((map(variable, Term::Var), map(constant, Term::Const)))(i)
}

fn attr_term(i: &str) -> IResult<&str, AttrTerm> {
    alt((
        map(variable, AttrTerm::Var),
        map(keyword, |k| AttrTerm::Ident(k.to_string())),
    ))(i)
}

fn pattern(i: &str) -> IResult<&str, Pattern> {
    map(
        tuple((term, sp, attr_term, sp, term)),
        |(entity, _, attribute, _, value)| Pattern {
            entity,
            attribute,
            value,
        },
    )(i)
}

fn compare_op(i: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Ne, tag("not=")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Eq, tag("=")),
    ))(i)
}

fn predicate(i: &str) -> IResult<&str, Predicate> {
    map(
        delimited(
            pair(char('('), sp),
            tuple((compare_op, sp, variable, sp, constant)),
            pair(sp, char(')')),
        ),
        |(op, _, var, _, constant)| Predicate { op, var, constant },
    )(i)
}

fn clause(i: &str) -> IResult<&str, Clause> {
    delimited(
        pair(char('['), sp),
        alt((
            map(predicate, Clause::Predicate),
            map(pattern, Clause::Pattern),
        )),
        pair(sp, char(']')),
    )(i)
}

fn find_spec(i: &str) -> IResult<&str, Vec<Var>> {
    preceded(pair(tag(":find"), sp), many1(terminated(variable, sp)))(i)
}

fn in_spec(i: &str) -> IResult<&str, Vec<Option<Var>>> {
    preceded(
        pair(tag(":in"), sp),
        many1(terminated(
            alt((value(None, char('$')), map(variable, Some))),
            sp,
        )),
    )(i)
}

fn where_spec(i: &str) -> IResult<&str, Vec<Clause>> {
    preceded(pair(tag(":where"), sp), many1(terminated(clause, sp)))(i)
}

fn query(i: &str) -> IResult<&str, (Vec<Var>, Option<Vec<Option<Var>>>, Vec<Clause>)> {
    delimited(
        pair(char('['), sp),
        tuple((find_spec, opt(in_spec), where_spec)),
        char(']'),
    )(i)
}

/// Give every `_` placeholder its own variable
fn number_placeholder(var: &mut Var, counter: &mut usize) {
    if var.name() == PLACEHOLDER {
        *var = Var::new(format!("{}{}", PLACEHOLDER, counter));
        *counter += 1;
    }
}

/// Parse datalog query text into a [`Query`]
pub fn parse_query(text: &str) -> Result<Query, QueryError> {
    let (_, (find, inputs, clauses)) = all_consuming(delimited(sp, query, sp))(text)
        .map_err(|e| QueryError::Parse(e.to_string()))?;

    let mut query = Query {
        find,
        inputs: inputs.unwrap_or_default().into_iter().flatten().collect(),
        ..Query::default()
    };

    if let Some(bad) = query
        .find
        .iter()
        .chain(&query.inputs)
        .find(|v| v.name() == PLACEHOLDER)
    {
        return Err(QueryError::Parse(format!(
            "placeholder {} cannot appear in :find or :in",
            bad
        )));
    }

    let mut counter = 0;
    for clause in clauses {
        match clause {
            Clause::Pattern(mut p) => {
                if let Term::Var(v) = &mut p.entity {
                    number_placeholder(v, &mut counter);
                }
                if let AttrTerm::Var(v) = &mut p.attribute {
                    number_placeholder(v, &mut counter);
                }
                if let Term::Var(v) = &mut p.value {
                    number_placeholder(v, &mut counter);
                }
                query.patterns.push(p);
            }
            Clause::Predicate(p) => query.predicates.push(p),
        }
    }

    Ok(query)
}
