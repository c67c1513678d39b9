//! SQL column types
//!
//! [`Type`] values embed their properties as flag bits, so every predicate is
//! a mask test. [`mysql_to_type`] and [`type_to_mysql`] bridge to the MySQL
//! protocol's (type code, column flags) pair.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Property bits embedded in every [`Type`] value
pub mod flag {
    pub const IS_INTEGRAL: i32 = 256;
    pub const IS_UNSIGNED: i32 = 512;
    pub const IS_FLOAT: i32 = 1024;
    pub const IS_QUOTED: i32 = 2048;
    pub const IS_TEXT: i32 = 4096;
    pub const IS_BINARY: i32 = 8192;
}

/// Flag-encoded column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type(i32);

impl Type {
    pub const NULL: Type = Type(0);
    pub const INT8: Type = Type(257);
    pub const UINT8: Type = Type(770);
    pub const INT16: Type = Type(259);
    pub const UINT16: Type = Type(772);
    pub const INT24: Type = Type(261);
    pub const UINT24: Type = Type(774);
    pub const INT32: Type = Type(263);
    pub const UINT32: Type = Type(776);
    pub const INT64: Type = Type(265);
    pub const UINT64: Type = Type(778);
    pub const FLOAT32: Type = Type(1035);
    pub const FLOAT64: Type = Type(1036);
    pub const TIMESTAMP: Type = Type(2061);
    pub const DATE: Type = Type(2062);
    pub const TIME: Type = Type(2063);
    pub const DATETIME: Type = Type(2064);
    pub const YEAR: Type = Type(785);
    pub const DECIMAL: Type = Type(18);
    pub const TEXT: Type = Type(6163);
    pub const BLOB: Type = Type(10260);
    pub const VARCHAR: Type = Type(6165);
    pub const VARBINARY: Type = Type(10262);
    pub const CHAR: Type = Type(6167);
    pub const BINARY: Type = Type(10264);
    pub const BIT: Type = Type(2073);
    pub const ENUM: Type = Type(2074);
    pub const SET: Type = Type(2075);
    pub const TUPLE: Type = Type(28);

    pub const fn from_raw(v: i32) -> Self {
        Type(v)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    fn has(self, mask: i32) -> bool {
        self.0 & mask == mask
    }

    /// Signed or unsigned integral representable in 64 bits
    pub fn is_integral(self) -> bool {
        self.has(flag::IS_INTEGRAL)
    }

    pub fn is_signed(self) -> bool {
        self.0 & (flag::IS_INTEGRAL | flag::IS_UNSIGNED) == flag::IS_INTEGRAL
    }

    /// Unsigned integral. Not the same as `!is_signed()`: floats are neither.
    pub fn is_unsigned(self) -> bool {
        self.has(flag::IS_INTEGRAL | flag::IS_UNSIGNED)
    }

    pub fn is_float(self) -> bool {
        self.has(flag::IS_FLOAT)
    }

    /// Quoted text or binary
    pub fn is_quoted(self) -> bool {
        self.has(flag::IS_QUOTED)
    }

    pub fn is_text(self) -> bool {
        self.has(flag::IS_TEXT)
    }

    pub fn is_binary(self) -> bool {
        self.has(flag::IS_BINARY)
    }

    pub fn classify(self) -> Classification {
        Classification {
            integral: self.is_integral(),
            signed: self.is_signed(),
            unsigned: self.is_unsigned(),
            float: self.is_float(),
            quoted: self.is_quoted(),
            text: self.is_text(),
            binary: self.is_binary(),
        }
    }
}

/// All predicates of a [`Type`] at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub integral: bool,
    pub signed: bool,
    pub unsigned: bool,
    pub float: bool,
    pub quoted: bool,
    pub text: bool,
    pub binary: bool,
}

/// MySQL column definition flags relevant to type mapping
pub mod mysql_flag {
    pub const UNSIGNED: i64 = 32;
    pub const BINARY: i64 = 128;
    pub const ENUM: i64 = 256;
    pub const SET: i64 = 2048;
}

// Shifted past the type bits so they can be OR-ed with a Type value as a
// modifier key.
const MYSQL_UNSIGNED: i64 = mysql_flag::UNSIGNED << 16;
const MYSQL_BINARY: i64 = mysql_flag::BINARY << 16;
const MYSQL_ENUM: i64 = mysql_flag::ENUM << 16;
const MYSQL_SET: i64 = mysql_flag::SET << 16;
const RELEVANT_FLAGS: i64 = MYSQL_UNSIGNED | MYSQL_BINARY | MYSQL_ENUM | MYSQL_SET;

fn base_type(mysql_type: i64) -> Option<Type> {
    let t = match mysql_type {
        1 => Type::INT8,
        2 => Type::INT16,
        3 => Type::INT32,
        4 => Type::FLOAT32,
        5 => Type::FLOAT64,
        6 => Type::NULL,
        7 => Type::TIMESTAMP,
        8 => Type::INT64,
        9 => Type::INT24,
        10 => Type::DATE,
        11 => Type::TIME,
        12 => Type::DATETIME,
        13 => Type::YEAR,
        16 => Type::BIT,
        246 => Type::DECIMAL,
        252 => Type::TEXT,
        253 => Type::VARCHAR,
        254 => Type::CHAR,
        _ => return None,
    };
    Some(t)
}

fn modified_type(key: i64) -> Option<Type> {
    const TABLE: [(Type, i64, Type); 10] = [
        (Type::INT8, MYSQL_UNSIGNED, Type::UINT8),
        (Type::INT16, MYSQL_UNSIGNED, Type::UINT16),
        (Type::INT32, MYSQL_UNSIGNED, Type::UINT32),
        (Type::INT64, MYSQL_UNSIGNED, Type::UINT64),
        (Type::INT24, MYSQL_UNSIGNED, Type::UINT24),
        (Type::TEXT, MYSQL_BINARY, Type::BLOB),
        (Type::VARCHAR, MYSQL_BINARY, Type::VARBINARY),
        (Type::CHAR, MYSQL_BINARY, Type::BINARY),
        (Type::CHAR, MYSQL_ENUM, Type::ENUM),
        (Type::CHAR, MYSQL_SET, Type::SET),
    ];
    TABLE
        .iter()
        .find(|(base, flags, _)| i64::from(base.raw()) | flags == key)
        .map(|(_, _, modified)| *modified)
}

/// Map a MySQL (type code, column flags) pair to a [`Type`], or fail if the
/// type code is not in the compatibility table.
pub fn try_mysql_to_type(mysql_type: i64, flags: i64) -> Result<Type> {
    let result = base_type(mysql_type).ok_or(ProtocolError::UnknownMysqlType(mysql_type))?;
    let converted = (flags << 16) & RELEVANT_FLAGS;
    Ok(modified_type(i64::from(result.raw()) | converted).unwrap_or(result))
}

/// Map a MySQL (type code, column flags) pair to a [`Type`].
///
/// # Panics
///
/// Panics if the type code is unknown. The table is static, so a miss means
/// the peer speaks a protocol version this build cannot decode.
pub fn mysql_to_type(mysql_type: i64, flags: i64) -> Type {
    match try_mysql_to_type(mysql_type, flags) {
        Ok(t) => t,
        Err(e) => panic!("{}", e),
    }
}

/// MySQL (type code, column flags) for a [`Type`]; `(0, 0)` if unknown.
pub fn type_to_mysql(typ: Type) -> (i64, i64) {
    let (code, flags) = match typ {
        Type::INT8 => (1, 0),
        Type::UINT8 => (1, MYSQL_UNSIGNED),
        Type::INT16 => (2, 0),
        Type::UINT16 => (2, MYSQL_UNSIGNED),
        Type::INT32 => (3, 0),
        Type::UINT32 => (3, MYSQL_UNSIGNED),
        Type::FLOAT32 => (4, 0),
        Type::FLOAT64 => (5, 0),
        Type::NULL => (6, MYSQL_BINARY),
        Type::TIMESTAMP => (7, 0),
        Type::INT64 => (8, 0),
        Type::UINT64 => (8, MYSQL_UNSIGNED),
        Type::INT24 => (9, 0),
        Type::UINT24 => (9, MYSQL_UNSIGNED),
        Type::DATE => (10, MYSQL_BINARY),
        Type::TIME => (11, MYSQL_BINARY),
        Type::DATETIME => (12, MYSQL_BINARY),
        Type::YEAR => (13, MYSQL_UNSIGNED),
        Type::BIT => (16, MYSQL_UNSIGNED),
        Type::DECIMAL => (246, 0),
        Type::TEXT => (252, 0),
        Type::BLOB => (252, MYSQL_BINARY),
        Type::VARCHAR => (253, 0),
        Type::VARBINARY => (253, MYSQL_BINARY),
        Type::CHAR => (254, 0),
        Type::BINARY => (254, MYSQL_BINARY),
        Type::ENUM => (254, MYSQL_ENUM),
        Type::SET => (254, MYSQL_SET),
        _ => (0, 0),
    };
    (code, flags >> 16)
}
