use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, types::Value};

use crate::error::{AppError, Result, msg};
use crate::models::*;

use super::from_row::{FromRow, PAYMENT_COLS, USER_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Builder for dynamic UPDATE statements over integer-keyed tables.
struct UpdateBuilder {
    table: &'static str,
    id: i64,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: i64) -> Self {
        Self {
            table,
            id,
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    /// Execute the update and return the row through `RETURNING`.
    /// `None` when no row has this id.
    fn execute_returning<T: FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

/// Map a UNIQUE violation to `Conflict(message)`, pass everything else through.
fn conflict_on_unique(err: rusqlite::Error, message: &str) -> AppError {
    let err = AppError::from(err);
    if err.is_unique_violation() {
        AppError::Conflict(message.to_string())
    } else {
        err
    }
}

// ============ Users ============

pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<User> {
    let now = now();
    let email = email.trim().to_lowercase();
    let username = username.trim();

    conn.query_row(
        &format!(
            "INSERT INTO users (username, email, password_hash, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING {}",
            USER_COLS
        ),
        params![username, &email, password_hash, role.as_ref(), now],
        User::from_row,
    )
    .map_err(|e| conflict_on_unique(e, msg::USER_EXISTS))
}

pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

/// True when another user (other than `except_id`) already holds this username or email.
pub fn user_identity_taken(
    conn: &Connection,
    username: &str,
    email: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    let email = email.trim().to_lowercase();
    let taken: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM users
            WHERE (username = ?1 OR email = ?2) AND (?3 IS NULL OR id != ?3)
         )",
        params![username.trim(), &email, except_id],
        |row| row.get(0),
    )?;
    Ok(taken)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    query_all(
        conn,
        &format!("SELECT {} FROM users ORDER BY id", USER_COLS),
        &[],
    )
}

pub fn count_users_with_role(conn: &Connection, role: UserRole) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![role.as_ref()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Replace username, email and password hash. `None` when the user does not exist.
pub fn update_user_profile(
    conn: &Connection,
    id: i64,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<Option<User>> {
    UpdateBuilder::new("users", id)
        .set("username", username.trim().to_string())
        .set("email", email.trim().to_lowercase())
        .set("password_hash", password_hash.to_string())
        .with_updated_at()
        .execute_returning(conn, USER_COLS)
        .map_err(|e| match e {
            AppError::Database(inner) => conflict_on_unique(inner, msg::USER_EXISTS),
            other => other,
        })
}

pub fn update_user_password(conn: &Connection, id: i64, password_hash: &str) -> Result<Option<User>> {
    UpdateBuilder::new("users", id)
        .set("password_hash", password_hash.to_string())
        .with_updated_at()
        .execute_returning(conn, USER_COLS)
}

pub fn update_user_role(conn: &Connection, id: i64, role: UserRole) -> Result<Option<User>> {
    UpdateBuilder::new("users", id)
        .set("role", role.as_ref().to_string())
        .with_updated_at()
        .execute_returning(conn, USER_COLS)
}

/// Delete a user. Their payments stay and lose their linkage.
/// Returns false when no such user exists.
pub fn delete_user(conn: &mut Connection, id: i64) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Linkage is an atomic pair, so course_id goes together with user_id
    tx.execute(
        "UPDATE user_payments SET user_id = NULL, course_id = NULL, updated_at = ?1
         WHERE user_id = ?2",
        params![now(), id],
    )?;
    let deleted = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;

    tx.commit()?;
    Ok(deleted > 0)
}

// ============ Payments ============

pub fn get_payment_by_id(conn: &Connection, id: i64) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM user_payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn get_payment_by_provider_id(
    conn: &Connection,
    provider_payment_id: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM user_payments WHERE provider_payment_id = ?1",
            PAYMENT_COLS
        ),
        &[&provider_payment_id],
    )
}

pub fn count_payments_by_provider_id(conn: &Connection, provider_payment_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM user_payments WHERE provider_payment_id = ?1",
        params![provider_payment_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// List payments matching every provided filter, newest first.
pub fn list_payments(
    conn: &Connection,
    user_id: Option<i64>,
    status: Option<PaymentStatus>,
    course_id: Option<i64>,
) -> Result<Vec<Payment>> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(user_id) = user_id {
        conditions.push("user_id = ?");
        values.push(user_id.into());
    }
    if let Some(status) = status {
        conditions.push("status = ?");
        values.push(status.as_ref().to_string().into());
    }
    if let Some(course_id) = course_id {
        conditions.push("course_id = ?");
        values.push(course_id.into());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM user_payments {} ORDER BY created_at DESC, id DESC",
        PAYMENT_COLS, where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), Payment::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a payment with caller-supplied details. A second insert for the same
/// provider id is a `Conflict`.
pub fn create_payment(conn: &Connection, input: &NewPayment) -> Result<Payment> {
    let now = now();
    conn.query_row(
        &format!(
            "INSERT INTO user_payments (provider_payment_id, external_reference, user_id, course_id,
                status, amount, payment_method, merchant_order_id, raw_payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             RETURNING {}",
            PAYMENT_COLS
        ),
        params![
            &input.provider_payment_id,
            &input.external_reference,
            input.linkage.map(|l| l.user_id),
            input.linkage.map(|l| l.course_id),
            input.status.as_ref(),
            input.amount,
            &input.payment_method,
            &input.merchant_order_id,
            &input.raw_payload,
            now,
        ],
        Payment::from_row,
    )
    .map_err(|e| conflict_on_unique(e, msg::PAYMENT_EXISTS))
}

/// Create-or-update keyed by provider payment id, atomically.
///
/// An absent record is created from `input`. An existing record gets its
/// status and `updated_at` overwritten, except that an `unknown` status never
/// replaces a known one. Reference, linkage, payment method and merchant order
/// are only filled in where still NULL. The user/course pair moves as one and
/// only while no reference is stored, so an unlinked record keeps its state.
/// Returns the stored record and whether it was created.
pub fn upsert_payment_notification(
    conn: &mut Connection,
    input: &NewPayment,
) -> Result<(Payment, bool)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existed: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_payments WHERE provider_payment_id = ?1)",
        params![&input.provider_payment_id],
        |row| row.get(0),
    )?;

    let now = now();
    let payment = tx.query_row(
        &format!(
            "INSERT INTO user_payments (provider_payment_id, external_reference, user_id, course_id,
                status, amount, payment_method, merchant_order_id, raw_payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(provider_payment_id) DO UPDATE SET
                status = CASE WHEN excluded.status = 'unknown'
                              THEN user_payments.status
                              ELSE excluded.status END,
                external_reference = COALESCE(user_payments.external_reference, excluded.external_reference),
                user_id = CASE WHEN user_payments.external_reference IS NULL
                                    AND user_payments.user_id IS NULL AND user_payments.course_id IS NULL
                               THEN excluded.user_id ELSE user_payments.user_id END,
                course_id = CASE WHEN user_payments.external_reference IS NULL
                                      AND user_payments.user_id IS NULL AND user_payments.course_id IS NULL
                                 THEN excluded.course_id ELSE user_payments.course_id END,
                payment_method = COALESCE(user_payments.payment_method, excluded.payment_method),
                merchant_order_id = COALESCE(user_payments.merchant_order_id, excluded.merchant_order_id),
                updated_at = excluded.updated_at
             RETURNING {}",
            PAYMENT_COLS
        ),
        params![
            &input.provider_payment_id,
            &input.external_reference,
            input.linkage.map(|l| l.user_id),
            input.linkage.map(|l| l.course_id),
            input.status.as_ref(),
            input.amount,
            &input.payment_method,
            &input.merchant_order_id,
            &input.raw_payload,
            now,
        ],
        Payment::from_row,
    )?;

    tx.commit()?;
    Ok((payment, !existed))
}

pub fn update_payment_status(
    conn: &Connection,
    id: i64,
    status: PaymentStatus,
) -> Result<Option<Payment>> {
    UpdateBuilder::new("user_payments", id)
        .set("status", status.as_ref().to_string())
        .with_updated_at()
        .execute_returning(conn, PAYMENT_COLS)
}
