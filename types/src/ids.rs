use std::fmt;

/// Declares a ledger row identifier.
///
/// Identifiers are SQLite rowids on the ledger side; the newtype keeps a
/// recipient id from being passed where a farm id is expected.
macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ledger_id!(
    /// A recipient cow.
    RecipientId
);
ledger_id!(FarmId);
ledger_id!(ClientId);
ledger_id!(ProtocolId);
ledger_id!(
    /// A row of the protocol × recipient junction.
    ProtocolRecipientId
);
ledger_id!(EmbryoId);
ledger_id!(
    /// A fertilization batch (one donor × sire mating run).
    BatchId
);
ledger_id!(TransferId);
ledger_id!(DiagnosisId);
ledger_id!(SessionId);

#[cfg(test)]
mod tests {
    use super::{BatchId, RecipientId};

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&RecipientId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: BatchId = serde_json::from_str("7").unwrap();
        assert_eq!(back.value(), 7);
    }

    #[test]
    fn ids_order_by_value() {
        let mut ids = vec![RecipientId::new(3), RecipientId::new(1), RecipientId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![RecipientId::new(1), RecipientId::new(2), RecipientId::new(3)]);
    }
}
