//! Database-agnostic type mappings.
//!
//! This module converts backend rows into ordered column-name to JSON value
//! records.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! This design centralizes type classification logic while allowing
//! backend-specific handling where needed.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::models::{ColumnMetadata, DatabaseType, Row as JsonRow};
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Network,
    Array,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Arrays first: "int4[]" and "_int4" must not land in Integer
    if lower.ends_with("[]") || (db == DatabaseType::PostgreSQL && lower.starts_with('_')) {
        return TypeCategory::Array;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Temporal - before integers, "interval" would match "int"
    if lower.starts_with("timestamp")
        || lower == "date"
        || lower == "datetime"
        || lower == "time"
        || lower == "timetz"
        || lower == "interval"
    {
        return TypeCategory::Temporal;
    }
    if lower == "inet" || lower == "cidr" {
        return TypeCategory::Network;
    }
    if lower == "point" {
        return TypeCategory::Unknown;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower == "oid" {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower == "text"
        || lower.contains("char")
        || lower == "clob"
        || lower == "name"
        || lower == "citext"
        || lower == "xml"
    {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => format_numeric(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary NUMERIC (base-10000 digit groups) as its decimal text.
fn format_numeric(bytes: &[u8]) -> Result<String, BoxDynError> {
    let mut buf = WireReader(bytes);
    let ndigits = buf.i16()?;
    let weight = i32::from(buf.i16()?);
    let sign = buf.u16()?;
    let dscale = usize::from(buf.u16()?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|_| buf.i16())
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |pos: i32| -> i16 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for pos in 1..=weight {
            out.push_str(&format!("{:04}", digit(pos)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Big-endian reader over a binary wire value.
struct WireReader<'a>(&'a [u8]);

impl<'a> WireReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BoxDynError> {
        if self.0.len() < n {
            return Err(format!("value truncated: wanted {n} more bytes").into());
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, BoxDynError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, BoxDynError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, BoxDynError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }
}

// =============================================================================
// Network and Interval Formatting
// =============================================================================

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Render a binary INET/CIDR value the way PostgreSQL prints it.
fn format_inet(bytes: &[u8]) -> Result<String, BoxDynError> {
    let mut buf = WireReader(bytes);
    let family = buf.u8()?;
    let bits = buf.u8()?;
    let is_cidr = buf.u8()? != 0;
    let len = usize::from(buf.u8()?);
    let addr = buf.take(len)?;

    let v4 = <[u8; 4]>::try_from(addr);
    let v6 = <[u8; 16]>::try_from(addr);
    let (text, max_bits) = match (family, v4, v6) {
        (PGSQL_AF_INET, Ok(v4), _) => (Ipv4Addr::from(v4).to_string(), 32),
        (PGSQL_AF_INET6, _, Ok(v6)) => (Ipv6Addr::from(v6).to_string(), 128),
        _ => {
            return Err(format!("invalid inet value: family {family}, {len} address bytes").into());
        }
    };
    if is_cidr || bits != max_bits {
        Ok(format!("{text}/{bits}"))
    } else {
        Ok(text)
    }
}

/// Render an interval as an ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`.
fn format_interval(interval: &PgInterval) -> String {
    const MICROS_PER_SECOND: i64 = 1_000_000;

    let years = interval.months / 12;
    let months = interval.months % 12;
    let hours = interval.microseconds / (3600 * MICROS_PER_SECOND);
    let minutes = (interval.microseconds / (60 * MICROS_PER_SECOND)) % 60;
    let micros = interval.microseconds % (60 * MICROS_PER_SECOND);

    let mut out = String::from("P");
    for (value, unit) in [(years, 'Y'), (months, 'M'), (interval.days, 'D')] {
        if value != 0 {
            out.push_str(&format!("{value}{unit}"));
        }
    }
    if hours != 0 || minutes != 0 || micros != 0 {
        out.push('T');
        if hours != 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes != 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if micros != 0 {
            let sign = if micros < 0 { "-" } else { "" };
            let whole = (micros / MICROS_PER_SECOND).abs();
            let fraction = (micros % MICROS_PER_SECOND).abs();
            if fraction == 0 {
                out.push_str(&format!("{sign}{whole}S"));
            } else {
                let fraction = format!("{fraction:06}");
                out.push_str(&format!("{sign}{whole}.{}S", fraction.trim_end_matches('0')));
            }
        }
    }
    if out == "P" {
        out.push_str("T0S");
    }
    out
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
///
/// A column value that cannot be represented is an error, never a silent null.
pub trait RowToJson {
    fn to_json_map(&self) -> Result<JsonRow, sqlx::Error>;
    fn get_column_metadata(&self) -> Vec<ColumnMetadata>;
}

fn column_error(name: &str, source: BoxDynError) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: format!("{name:?}"),
        source,
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Result<JsonRow, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| -> Result<(String, JsonValue), sqlx::Error> {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                let value = postgres::decode_column(self, idx, type_name, category)
                    .map_err(|e| column_error(col.name(), e))?;
                Ok((col.name().to_string(), value))
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Result<JsonRow, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| -> Result<(String, JsonValue), sqlx::Error> {
                let type_name = col.type_info().name();
                // Storage is dynamically typed: decode by the stored value's class,
                // keeping booleans declared as such
                let category = match (
                    categorize_type(type_name, DatabaseType::SQLite),
                    sqlite::value_category(self, idx)?,
                ) {
                    (TypeCategory::Boolean, TypeCategory::Integer) => TypeCategory::Boolean,
                    (_, stored) => stored,
                };
                let value = sqlite::decode_column(self, idx, type_name, category)?;
                Ok((col.name().to_string(), value))
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }
}

// =============================================================================
// Backend-Specific Decoders
// =============================================================================

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

mod postgres {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::postgres::types::{Oid, PgTimeTz};
    use sqlx::postgres::{PgTypeKind, Postgres};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<JsonValue, BoxDynError> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(JsonValue::Null);
        }
        let name = type_name.to_lowercase();

        let decoded = match category {
            TypeCategory::Decimal => decode::<RawDecimal>(&raw).map(|v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(&raw, &name),
            TypeCategory::Boolean => decode::<bool>(&raw).map(JsonValue::Bool),
            TypeCategory::Float => decode_float(&raw, &name),
            TypeCategory::Binary => decode::<Vec<u8>>(&raw).map(|v| encode_binary_value(&v)),
            TypeCategory::Json => decode::<JsonValue>(&raw),
            TypeCategory::Uuid => {
                decode::<uuid::Uuid>(&raw).map(|v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Temporal => decode_temporal(&raw, &name).map(JsonValue::String),
            TypeCategory::Network => decode_network(&raw).map(JsonValue::String),
            TypeCategory::Array => decode_array(&raw, &name),
            TypeCategory::Text => decode::<&str>(&raw).map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Unknown => Err(format!("no decoder for type {type_name}").into()),
        };

        decoded.or_else(|e| match textual(&raw) {
            Some(text) => {
                tracing::debug!(type_name, error = %e, "Falling back to textual column value");
                Ok(JsonValue::String(text.to_string()))
            }
            None => Err(e),
        })
    }

    fn decode<'r, T: Decode<'r, Postgres>>(raw: &PgValueRef<'r>) -> Result<T, BoxDynError> {
        T::decode(raw.clone())
    }

    /// The value's own text, when the server sent it as text or it is an enum label.
    fn textual<'r>(raw: &PgValueRef<'r>) -> Option<&'r str> {
        // Only text-format values can carry an unresolved type, so check the format first
        let is_text = raw.format() == PgValueFormat::Text
            || matches!(raw.type_info().kind(), PgTypeKind::Enum(_));
        if is_text { raw.as_str().ok() } else { None }
    }

    fn decode_integer(raw: &PgValueRef<'_>, name: &str) -> Result<JsonValue, BoxDynError> {
        Ok(match name {
            "int2" | "smallint" | "smallserial" => decode::<i16>(raw)?.into(),
            "int4" | "int" | "integer" | "serial" => decode::<i32>(raw)?.into(),
            "oid" => decode::<Oid>(raw)?.0.into(),
            _ => decode::<i64>(raw)?.into(),
        })
    }

    fn decode_float(raw: &PgValueRef<'_>, name: &str) -> Result<JsonValue, BoxDynError> {
        Ok(match name {
            "float4" | "real" => float_value(f64::from(decode::<f32>(raw)?)),
            _ => float_value(decode::<f64>(raw)?),
        })
    }

    fn decode_temporal(raw: &PgValueRef<'_>, name: &str) -> Result<String, BoxDynError> {
        Ok(match name {
            "timestamptz" => decode::<DateTime<Utc>>(raw)?.to_rfc3339(),
            "timestamp" => decode::<NaiveDateTime>(raw)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
            "date" => decode::<NaiveDate>(raw)?.to_string(),
            "time" => decode::<NaiveTime>(raw)?.to_string(),
            "timetz" => {
                let v = decode::<PgTimeTz<NaiveTime, FixedOffset>>(raw)?;
                format!("{}{}", v.time, v.offset)
            }
            "interval" => format_interval(&decode::<PgInterval>(raw)?),
            _ => return Err(format!("no decoder for temporal type {name}").into()),
        })
    }

    fn decode_network(raw: &PgValueRef<'_>) -> Result<String, BoxDynError> {
        match raw.format() {
            PgValueFormat::Text => Ok(raw.as_str()?.to_string()),
            PgValueFormat::Binary => format_inet(raw.as_bytes()?),
        }
    }

    fn decode_array(raw: &PgValueRef<'_>, name: &str) -> Result<JsonValue, BoxDynError> {
        fn items<T: Into<JsonValue>>(values: Vec<Option<T>>) -> JsonValue {
            JsonValue::Array(
                values
                    .into_iter()
                    .map(|v| v.map_or(JsonValue::Null, Into::into))
                    .collect(),
            )
        }

        let element = name
            .strip_suffix("[]")
            .or_else(|| name.strip_prefix('_'))
            .unwrap_or(name);
        Ok(match element {
            "int2" => items(decode::<Vec<Option<i16>>>(raw)?),
            "int4" => items(decode::<Vec<Option<i32>>>(raw)?),
            "int8" => items(decode::<Vec<Option<i64>>>(raw)?),
            "float4" => items(
                decode::<Vec<Option<f32>>>(raw)?
                    .into_iter()
                    .map(|v| v.map(|v| float_value(f64::from(v))))
                    .collect(),
            ),
            "float8" => items(
                decode::<Vec<Option<f64>>>(raw)?
                    .into_iter()
                    .map(|v| v.map(float_value))
                    .collect(),
            ),
            "bool" => items(decode::<Vec<Option<bool>>>(raw)?),
            "text" | "varchar" | "bpchar" | "name" => items(decode::<Vec<Option<String>>>(raw)?),
            "uuid" => items(
                decode::<Vec<Option<uuid::Uuid>>>(raw)?
                    .into_iter()
                    .map(|v| v.map(|v| v.to_string()))
                    .collect(),
            ),
            _ => return Err(format!("no decoder for array type {name}").into()),
        })
    }
}

mod sqlite {
    use super::*;

    /// Category of the value actually stored in this cell.
    pub fn value_category(row: &SqliteRow, idx: usize) -> Result<TypeCategory, sqlx::Error> {
        let value = row.try_get_raw(idx)?;
        if value.is_null() {
            return Ok(TypeCategory::Unknown);
        }
        Ok(categorize_type(value.type_info().name(), DatabaseType::SQLite))
    }

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<JsonValue, sqlx::Error> {
        match category {
            TypeCategory::Integer => Ok(row
                .try_get::<Option<i64>, _>(idx)?
                .map_or(JsonValue::Null, Into::into)),
            TypeCategory::Boolean => Ok(row
                .try_get::<Option<bool>, _>(idx)?
                .map_or(JsonValue::Null, JsonValue::Bool)),
            TypeCategory::Float | TypeCategory::Decimal => Ok(row
                .try_get::<Option<f64>, _>(idx)?
                .map_or(JsonValue::Null, float_value)),
            TypeCategory::Binary => Ok(row
                .try_get::<Option<Vec<u8>>, _>(idx)?
                .map_or(JsonValue::Null, |v| encode_binary_value(&v))),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, type_name: &str) -> Result<JsonValue, sqlx::Error> {
        let Some(v) = row.try_get::<Option<String>, _>(idx)? else {
            return Ok(JsonValue::Null);
        };
        if type_name.to_lowercase().contains("json") {
            if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                return Ok(json);
            }
        }
        Ok(JsonValue::String(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT4", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("SERIAL", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        for name in ["TIMESTAMPTZ", "TIMESTAMP", "DATE", "TIME", "DATETIME"] {
            assert_eq!(
                categorize_type(name, DatabaseType::PostgreSQL),
                TypeCategory::Temporal,
                "{name}"
            );
        }
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("TIMETZ", DatabaseType::PostgreSQL),
            TypeCategory::Temporal
        );
    }

    #[test]
    fn test_categorize_type_arrays_before_element() {
        for name in ["INT4[]", "_int4", "TEXT[]", "INTERVAL[]", "NUMERIC[]"] {
            assert_eq!(
                categorize_type(name, DatabaseType::PostgreSQL),
                TypeCategory::Array,
                "{name}"
            );
        }
        assert_eq!(
            categorize_type("INET", DatabaseType::PostgreSQL),
            TypeCategory::Network
        );
        assert_eq!(
            categorize_type("CIDR", DatabaseType::PostgreSQL),
            TypeCategory::Network
        );
        assert_eq!(
            categorize_type("POINT", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        out.extend_from_slice(&weight.to_be_bytes());
        out.extend_from_slice(&sign.to_be_bytes());
        out.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            out.extend_from_slice(&d.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_format_numeric_binary() {
        assert_eq!(format_numeric(&numeric_bytes(0, 0, 2, &[12, 5000])).unwrap(), "12.50");
        assert_eq!(format_numeric(&numeric_bytes(-1, 0, 3, &[10])).unwrap(), "0.001");
        assert_eq!(format_numeric(&numeric_bytes(1, 0, 0, &[1])).unwrap(), "10000");
        assert_eq!(
            format_numeric(&numeric_bytes(1, NUMERIC_NEG, 4, &[12, 3456, 7800])).unwrap(),
            "-123456.7800"
        );
        assert_eq!(format_numeric(&numeric_bytes(0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(format_numeric(&numeric_bytes(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert!(format_numeric(&[0, 2, 0]).is_err());
    }

    #[test]
    fn test_format_inet() {
        assert_eq!(format_inet(&[2, 32, 0, 4, 10, 0, 0, 1]).unwrap(), "10.0.0.1");
        assert_eq!(format_inet(&[2, 24, 0, 4, 192, 168, 1, 7]).unwrap(), "192.168.1.7/24");
        assert_eq!(format_inet(&[2, 8, 1, 4, 10, 0, 0, 0]).unwrap(), "10.0.0.0/8");

        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(format_inet(&v6).unwrap(), "::1");

        assert!(format_inet(&[2, 32, 0, 16, 10, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_format_interval() {
        let interval = |months, days, microseconds| PgInterval {
            months,
            days,
            microseconds,
        };
        assert_eq!(format_interval(&interval(0, 1, 0)), "P1D");
        assert_eq!(
            format_interval(&interval(14, 3, ((4 * 60 + 5) * 60 + 6) * 1_000_000 + 500_000)),
            "P1Y2M3DT4H5M6.5S"
        );
        assert_eq!(format_interval(&interval(0, 0, 90 * 1_000_000)), "PT1M30S");
        assert_eq!(format_interval(&interval(0, -2, 0)), "P-2D");
        assert_eq!(format_interval(&interval(0, 0, 0)), "PT0S");
    }

    #[test]
    fn test_categorize_type_json_and_text() {
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::PostgreSQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("TEXT", DatabaseType::SQLite),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("BYTEA", DatabaseType::PostgreSQL),
            TypeCategory::Binary
        );
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_handles_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
