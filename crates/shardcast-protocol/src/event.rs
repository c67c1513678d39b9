//! Update-stream events

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Column descriptor attached to primary-key values
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// MySQL type code
    pub r#type: i64,
    /// MySQL column flags
    pub flags: i64,
}

/// One event of the update stream: a DML with its primary keys, or a
/// DDL / POS / ERR marker
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    /// "DML", "DDL", "ERR" or "POS"
    pub category: String,
    pub table_name: String,
    pub primary_key_fields: Vec<Field>,
    #[serde(with = "crate::serde_utils::bytes_rows_serde")]
    pub primary_key_values: Vec<Vec<Bytes>>,
    pub sql: String,
    pub timestamp: i64,
    pub transaction_id: String,
}

impl StreamEvent {
    pub fn is_dml(&self) -> bool {
        self.category == "DML"
    }
}
