//! Serde helpers for `bytes::Bytes` fields
//!
//! postcard encodes `Bytes` as a sequence of u8 by default; these modules
//! keep it as a single length-prefixed byte string.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde module for `Bytes` fields
pub mod bytes_serde {
    use super::*;

    pub fn serialize<S>(val: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(&val[..], serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Ok(Bytes::from(v))
    }
}

/// Serde module for `Vec<Bytes>` lists (keyspace ids)
pub mod bytes_list_serde {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(list: &[Bytes], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(list.len()))?;
        for v in list {
            seq.serialize_element(serde_bytes::Bytes::new(&v[..]))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list: Vec<serde_bytes::ByteBuf> = Deserialize::deserialize(deserializer)?;
        Ok(list.into_iter().map(|v| Bytes::from(v.into_vec())).collect())
    }
}

/// Serde module for `Vec<Bytes>` rows (primary-key values)
pub mod bytes_rows_serde {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(rows: &[Vec<Bytes>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for row in rows {
            let row: Vec<serde_bytes::ByteBuf> = row
                .iter()
                .map(|v| serde_bytes::ByteBuf::from(v.to_vec()))
                .collect();
            seq.serialize_element(&row)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<Bytes>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows: Vec<Vec<serde_bytes::ByteBuf>> = Deserialize::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| Bytes::from(v.into_vec())).collect())
            .collect())
    }
}
