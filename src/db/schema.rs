use rusqlite::Connection;

/// Create the tables and indexes for a fresh database.
pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Identities
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin', 'superadmin')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Payments (one row per provider payment id, never deleted)
        -- user_id and course_id are either both set or both NULL. No foreign
        -- key on user_id: a notification may reference a user we do not have.
        CREATE TABLE IF NOT EXISTS user_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_payment_id TEXT NOT NULL UNIQUE,
            external_reference TEXT,
            user_id INTEGER,
            course_id INTEGER,
            status TEXT NOT NULL DEFAULT 'unknown'
                CHECK (status IN ('approved', 'pending', 'rejected', 'unknown')),
            amount REAL NOT NULL DEFAULT 0,
            payment_method TEXT,
            merchant_order_id TEXT,
            raw_payload TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_payments_user ON user_payments(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_payments_course ON user_payments(course_id);
        CREATE INDEX IF NOT EXISTS idx_user_payments_status ON user_payments(status);
        "#,
    )
}
