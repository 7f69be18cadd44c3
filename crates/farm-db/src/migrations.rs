use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'customer',
            avatar      TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            price       REAL NOT NULL,
            category    TEXT NOT NULL,
            quantity    INTEGER NOT NULL DEFAULT 0,
            discount    INTEGER NOT NULL DEFAULT 0,
            image       TEXT,
            seller_id   TEXT NOT NULL REFERENCES users(id),
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_seller
            ON products(seller_id);

        -- product_id carries no foreign key: orders outlive deleted products
        CREATE TABLE IF NOT EXISTS orders (
            id              TEXT PRIMARY KEY,
            customer_id     TEXT NOT NULL REFERENCES users(id),
            seller_id       TEXT NOT NULL REFERENCES users(id),
            product_id      TEXT NOT NULL,
            quantity        INTEGER NOT NULL,
            total_price     REAL NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            discount_code   TEXT,
            discount_amount REAL NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            product_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            quantity    INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            UNIQUE(user_id, product_id)
        );

        -- Chat identities are opaque: no foreign keys, every accepted frame is kept
        CREATE TABLE IF NOT EXISTS chat_messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            message     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_pair
            ON chat_messages(sender_id, receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS discount_codes (
            id          TEXT PRIMARY KEY,
            code        TEXT NOT NULL UNIQUE,
            discount    INTEGER NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            expires_at  TEXT,
            created_at  TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
