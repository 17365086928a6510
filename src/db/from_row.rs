//! Row mapping for the query helpers.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum, reporting bad values as a column type error.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const USER_COLS: &str = "id, username, email, password_hash, role, created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, provider_payment_id, external_reference, user_id, course_id, status, amount, payment_method, merchant_order_id, raw_payload, created_at, updated_at";

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: parse_enum(row, 4, "role")?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let user_id: Option<i64> = row.get(3)?;
        let course_id: Option<i64> = row.get(4)?;
        let linkage = match (user_id, course_id) {
            (Some(user_id), Some(course_id)) => Some(PaymentLinkage { user_id, course_id }),
            _ => None,
        };

        Ok(Payment {
            id: row.get(0)?,
            provider_payment_id: row.get(1)?,
            external_reference: row.get(2)?,
            linkage,
            status: parse_enum(row, 5, "status")?,
            amount: row.get(6)?,
            payment_method: row.get(7)?,
            merchant_order_id: row.get(8)?,
            raw_payload: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
