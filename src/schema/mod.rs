//! Schema: attribute definitions and the registry that enforces them

pub mod attribute;
pub mod registry;

pub use attribute::*;
pub use registry::*;

/// System attributes and the genesis transaction.
///
/// Ids below [`FIRST_USER_ID`] are reserved; the genesis transaction records
/// the six system attributes as ordinary facts.
pub mod system {
    use crate::core::fact::{EntityId, TxId};
    use crate::core::value::ValueType;
    use crate::schema::attribute::Attribute;

    pub const IDENT: EntityId = EntityId(1);
    pub const VALUE_TYPE: EntityId = EntityId(2);
    pub const CARDINALITY: EntityId = EntityId(3);
    pub const UNIQUE: EntityId = EntityId(4);
    pub const DOC: EntityId = EntityId(5);
    pub const TX_INSTANT: EntityId = EntityId(6);

    pub const GENESIS_TX: TxId = TxId(7);
    pub const FIRST_USER_ID: u64 = 8;

    /// Whether `attribute` is one of the `db/*` attributes describing schema
    pub fn is_schema_attribute(attribute: EntityId) -> bool {
        (IDENT.0..=DOC.0).contains(&attribute.0)
    }

    /// Whether `attribute` may only be written by the store itself
    pub fn is_reserved(attribute: EntityId) -> bool {
        attribute.0 < GENESIS_TX.0
    }

    pub fn attributes() -> Vec<(EntityId, Attribute)> {
        vec![
            (
                IDENT,
                Attribute::new("db/ident", ValueType::String)
                    .unique_identity()
                    .doc("Unique identifier of an attribute"),
            ),
            (
                VALUE_TYPE,
                Attribute::new("db/valueType", ValueType::String)
                    .doc("Value type keyword of an attribute"),
            ),
            (
                CARDINALITY,
                Attribute::new("db/cardinality", ValueType::String)
                    .doc("Cardinality keyword of an attribute"),
            ),
            (
                UNIQUE,
                Attribute::new("db/unique", ValueType::String)
                    .doc("Uniqueness keyword of an attribute"),
            ),
            (
                DOC,
                Attribute::new("db/doc", ValueType::String).doc("Documentation string"),
            ),
            (
                TX_INSTANT,
                Attribute::new("tx/instant", ValueType::Instant)
                    .doc("Wall-clock time a transaction was committed"),
            ),
        ]
    }
}
