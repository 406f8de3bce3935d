// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Value Coercion and Decoding
//!
//! Bridges caller JSON and PostgreSQL's binary protocol in both directions:
//!
//! - **Parameters:** each JSON value is coerced to the type the server
//!   inferred for its placeholder (`$n`) when the statement was prepared.
//!   Binding the exact type avoids binary format mismatches such as sending
//!   an `int8` into an `int4` slot.
//! - **Results:** each cell is decoded by its column type into a
//!   [`SqlValue`]. `numeric` stays text to keep its precision; unknown
//!   types are read from their raw text when it is printable, else `null`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgRow, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Encode, Row as _, Type, TypeInfo, ValueRef};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::error::ServiceError;
use crate::domain::query::{Row, SqlValue};

/// A parameter value in the exact Rust type its placeholder expects.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Numeric(Option<Decimal>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
    Json(Option<Value>),
    BoolArray(Option<Vec<bool>>),
    Int2Array(Option<Vec<i16>>),
    Int4Array(Option<Vec<i32>>),
    Int8Array(Option<Vec<i64>>),
    Float4Array(Option<Vec<f32>>),
    Float8Array(Option<Vec<f64>>),
    NumericArray(Option<Vec<Decimal>>),
    UuidArray(Option<Vec<Uuid>>),
    TextArray(TextArray),
}

/// Coerces caller values to the inferred placeholder types.
///
/// `types` is `None` when the server reported no parameter types; values are
/// then bound by their JSON shape.
pub fn coerce_params(
    values: &[Value],
    types: Option<&[PgTypeInfo]>,
) -> Result<Vec<BindValue>, ServiceError> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| match types.and_then(|t| t.get(idx)) {
            Some(ty) => coerce(value, ty.name(), idx + 1),
            None => Ok(natural(value)),
        })
        .collect()
}

/// Attaches coerced values to a query in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: Vec<BindValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            BindValue::Bool(v) => query.bind(v),
            BindValue::Int2(v) => query.bind(v),
            BindValue::Int4(v) => query.bind(v),
            BindValue::Int8(v) => query.bind(v),
            BindValue::Float4(v) => query.bind(v),
            BindValue::Float8(v) => query.bind(v),
            BindValue::Numeric(v) => query.bind(v),
            BindValue::Text(v) => query.bind(v),
            BindValue::Uuid(v) => query.bind(v),
            BindValue::Date(v) => query.bind(v),
            BindValue::Time(v) => query.bind(v),
            BindValue::Timestamp(v) => query.bind(v),
            BindValue::TimestampTz(v) => query.bind(v),
            BindValue::Json(v) => query.bind(v.map(Json)),
            BindValue::BoolArray(v) => query.bind(v),
            BindValue::Int2Array(v) => query.bind(v),
            BindValue::Int4Array(v) => query.bind(v),
            BindValue::Int8Array(v) => query.bind(v),
            BindValue::Float4Array(v) => query.bind(v),
            BindValue::Float8Array(v) => query.bind(v),
            BindValue::NumericArray(v) => query.bind(v),
            BindValue::UuidArray(v) => query.bind(v),
            BindValue::TextArray(v) => query.bind(v),
        };
    }
    query
}

fn natural(value: &Value) -> BindValue {
    match value {
        Value::Null => BindValue::Text(None),
        Value::Bool(b) => BindValue::Bool(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BindValue::Int8(Some(i)),
            None => BindValue::Float8(n.as_f64()),
        },
        Value::String(s) => BindValue::Text(Some(s.clone())),
        other => BindValue::Json(Some(other.clone())),
    }
}

fn coerce(value: &Value, type_name: &str, position: usize) -> Result<BindValue, ServiceError> {
    let mismatch = || {
        ServiceError::Binding(format!(
            "parameter ${} expects {}, got {}",
            position,
            type_name.to_lowercase(),
            describe(value)
        ))
    };
    let null = value.is_null();

    let bound = match type_name {
        "BOOL" => BindValue::Bool(nullable(null, || as_bool(value)).ok_or_else(mismatch)?),
        "INT2" => BindValue::Int2(
            nullable(null, || as_i64(value).and_then(|i| i16::try_from(i).ok()))
                .ok_or_else(mismatch)?,
        ),
        "INT4" => BindValue::Int4(
            nullable(null, || as_i64(value).and_then(|i| i32::try_from(i).ok()))
                .ok_or_else(mismatch)?,
        ),
        "INT8" => BindValue::Int8(nullable(null, || as_i64(value)).ok_or_else(mismatch)?),
        "FLOAT4" => {
            BindValue::Float4(nullable(null, || as_f64(value).map(|f| f as f32)).ok_or_else(mismatch)?)
        }
        "FLOAT8" => BindValue::Float8(nullable(null, || as_f64(value)).ok_or_else(mismatch)?),
        "NUMERIC" => BindValue::Numeric(nullable(null, || as_decimal(value)).ok_or_else(mismatch)?),
        "UUID" => BindValue::Uuid(
            nullable(null, || value.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok()))
                .ok_or_else(mismatch)?,
        ),
        "DATE" => BindValue::Date(nullable(null, || as_date(value)).ok_or_else(mismatch)?),
        "TIME" => BindValue::Time(nullable(null, || as_time(value)).ok_or_else(mismatch)?),
        "TIMESTAMP" => {
            BindValue::Timestamp(nullable(null, || as_timestamp(value)).ok_or_else(mismatch)?)
        }
        "TIMESTAMPTZ" => BindValue::TimestampTz(
            nullable(null, || as_timestamp_tz(value)).ok_or_else(mismatch)?,
        ),
        "JSON" | "JSONB" => BindValue::Json((!null).then(|| value.clone())),
        "BOOL[]" => BindValue::BoolArray(
            nullable(null, || as_array(value, as_bool)).ok_or_else(mismatch)?,
        ),
        "INT2[]" => BindValue::Int2Array(
            nullable(null, || {
                as_array(value, |v| as_i64(v).and_then(|i| i16::try_from(i).ok()))
            })
            .ok_or_else(mismatch)?,
        ),
        "INT4[]" => BindValue::Int4Array(
            nullable(null, || {
                as_array(value, |v| as_i64(v).and_then(|i| i32::try_from(i).ok()))
            })
            .ok_or_else(mismatch)?,
        ),
        "INT8[]" => BindValue::Int8Array(
            nullable(null, || as_array(value, as_i64)).ok_or_else(mismatch)?,
        ),
        "FLOAT4[]" => BindValue::Float4Array(
            nullable(null, || as_array(value, |v| as_f64(v).map(|f| f as f32)))
                .ok_or_else(mismatch)?,
        ),
        "FLOAT8[]" => BindValue::Float8Array(
            nullable(null, || as_array(value, as_f64)).ok_or_else(mismatch)?,
        ),
        "NUMERIC[]" => BindValue::NumericArray(
            nullable(null, || as_array(value, as_decimal)).ok_or_else(mismatch)?,
        ),
        "UUID[]" => BindValue::UuidArray(
            nullable(null, || {
                as_array(value, |v| v.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok()))
            })
            .ok_or_else(mismatch)?,
        ),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            let values = nullable(null, || as_array(value, |v| Some(as_text(v))))
                .ok_or_else(mismatch)?;
            BindValue::TextArray(TextArray::new(type_name, values))
        }
        // text-like and anything user-defined (enums, domains, citext)
        _ => BindValue::Text((!null).then(|| as_text(value))),
    };
    Ok(bound)
}

/// `Some(None)` for JSON null, `Some(Some(v))` when `f` converts, `None` on mismatch.
fn nullable<T>(null: bool, f: impl FnOnce() -> Option<T>) -> Option<Option<T>> {
    if null {
        Some(None)
    } else {
        f().map(Some)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) if s.chars().count() > 40 => "a long string".to_string(),
        other => other.to_string(),
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
        .or_else(|| parse_naive_datetime(s).map(|d| d.date()))
}

fn as_time(value: &Value) -> Option<NaiveTime> {
    let s = value.as_str()?.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let s = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.naive_utc())
        .or_else(|| parse_naive_datetime(s))
}

fn as_timestamp_tz(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| parse_naive_datetime(s).map(|d| d.and_utc()))
}

fn as_array<T>(value: &Value, item: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    value.as_array()?.iter().map(item).collect()
}

/// Text array bound with the element type the server expects.
///
/// `Vec<String>` always encodes as `text[]`, which the server rejects for
/// `varchar[]` or `bpchar[]` placeholders ("wrong element type").
#[derive(Debug, Clone, PartialEq)]
pub struct TextArray {
    array_oid: u32,
    element_oid: u32,
    values: Option<Vec<String>>,
}

impl TextArray {
    fn new(type_name: &str, values: Option<Vec<String>>) -> Self {
        let (array_oid, element_oid) = match type_name {
            "VARCHAR[]" => (1015, 1043),
            "BPCHAR[]" => (1014, 1042),
            "NAME[]" => (1003, 19),
            _ => (1009, 25),
        };
        Self {
            array_oid,
            element_oid,
            values,
        }
    }
}

impl Type<Postgres> for TextArray {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(1009))
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        matches!(ty.name(), "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]")
    }
}

impl Encode<'_, Postgres> for TextArray {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        let Some(values) = &self.values else {
            return Ok(IsNull::Yes);
        };

        let dimensions: i32 = if values.is_empty() { 0 } else { 1 };
        buf.extend_from_slice(&dimensions.to_be_bytes());
        buf.extend_from_slice(&0_i32.to_be_bytes());
        buf.extend_from_slice(&self.element_oid.to_be_bytes());
        if !values.is_empty() {
            buf.extend_from_slice(&i32::try_from(values.len())?.to_be_bytes());
            buf.extend_from_slice(&1_i32.to_be_bytes());
        }
        for value in values {
            buf.extend_from_slice(&i32::try_from(value.len())?.to_be_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
        Ok(IsNull::No)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_oid(Oid(self.array_oid)))
    }
}

/// Decodes one result row, preserving column order.
pub fn decode_row(row: &PgRow) -> Row {
    let mut out = Row::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_cell(row, idx, column.type_info().name()));
    }
    out
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
    match row.try_get_raw(idx) {
        Ok(raw) if !raw.is_null() => {}
        _ => return SqlValue::Null,
    }

    let decoded: Result<SqlValue, sqlx::Error> = match type_name {
        "BOOL" => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| SqlValue::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(idx).map(SqlValue::Int),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| SqlValue::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(SqlValue::Float),
        "NUMERIC" => row
            .try_get::<Decimal, _>(idx)
            .map(|d| SqlValue::Text(d.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<String, _>(idx).map(SqlValue::Text),
        "UUID" => row
            .try_get::<Uuid, _>(idx)
            .map(|u| SqlValue::Text(u.to_string())),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|d| SqlValue::Timestamp(d.format("%Y-%m-%d").to_string())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|d| SqlValue::Timestamp(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|d| SqlValue::Timestamp(d.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(|t| SqlValue::Text(t.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).map(SqlValue::Json),
        "BOOL[]" => row
            .try_get::<Vec<Option<bool>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "INT2[]" => row
            .try_get::<Vec<Option<i16>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "INT4[]" => row
            .try_get::<Vec<Option<i32>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "INT8[]" => row
            .try_get::<Vec<Option<i64>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "FLOAT4[]" => row
            .try_get::<Vec<Option<f32>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "FLOAT8[]" => row
            .try_get::<Vec<Option<f64>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        "NUMERIC[]" => row.try_get::<Vec<Option<Decimal>>, _>(idx).map(|v| {
            SqlValue::Json(Value::Array(
                v.into_iter()
                    .map(|d| d.map_or(Value::Null, |d| Value::String(d.to_string())))
                    .collect(),
            ))
        }),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => row
            .try_get::<Vec<Option<String>>, _>(idx)
            .map(|v| SqlValue::Json(serde_json::json!(v))),
        _ => return decode_as_text(row, idx),
    };

    match decoded {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(column = idx, type_name, error = %e, "Falling back to text decoding");
            decode_as_text(row, idx)
        }
    }
}

fn decode_as_text(row: &PgRow, idx: usize) -> SqlValue {
    match row.try_get_unchecked::<String, _>(idx) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => SqlValue::Text(text),
        _ => SqlValue::Null,
    }
}
