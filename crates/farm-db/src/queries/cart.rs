use anyhow::Result;
use farm_types::api::AddToCartRequest;
use farm_types::models::{CartItem, CartItemWithProduct};
use rusqlite::{Connection, Row};

use super::products::product_with_seller_at;
use super::{OptionalExt, get_ts, new_id, now, ts_to_sql};
use crate::Database;

const CART_ITEM_COLUMNS: &str = "id, user_id, product_id, quantity, created_at";

impl Database {
    // -- Cart --

    pub fn get_cart_items(&self, user_id: &str) -> Result<Vec<CartItemWithProduct>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ci.id, ci.user_id, ci.product_id, ci.quantity, ci.created_at,
                        p.id, p.name, p.description, p.price, p.category, p.quantity, p.discount,
                        p.image, p.seller_id, p.is_active, p.created_at, u.name, u.avatar
                 FROM cart_items ci
                 JOIN products p ON p.id = ci.product_id
                 LEFT JOIN users u ON u.id = p.seller_id
                 WHERE ci.user_id = ?1
                 ORDER BY ci.created_at, ci.rowid",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(CartItemWithProduct {
                        item: cart_item_from_row(row)?,
                        product: product_with_seller_at(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Adding a product already in the user's cart raises that line's quantity
    /// instead of creating a second line.
    pub fn add_to_cart(&self, req: &AddToCartRequest) -> Result<CartItem> {
        self.with_conn(|conn| {
            if let Some(mut existing) = query_cart_line(conn, &req.user_id, &req.product_id)? {
                existing.quantity += req.quantity;
                conn.execute(
                    "UPDATE cart_items SET quantity = ?2 WHERE id = ?1",
                    rusqlite::params![existing.id, existing.quantity],
                )?;
                return Ok(existing);
            }

            let item = CartItem {
                id: new_id(),
                user_id: req.user_id.clone(),
                product_id: req.product_id.clone(),
                quantity: req.quantity,
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO cart_items (id, user_id, product_id, quantity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    item.id,
                    item.user_id,
                    item.product_id,
                    item.quantity,
                    ts_to_sql(&item.created_at)
                ],
            )?;
            Ok(item)
        })
    }

    /// Returns `None` for an unknown id.
    pub fn update_cart_item(&self, id: &str, quantity: i64) -> Result<Option<CartItem>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE cart_items SET quantity = ?2 WHERE id = ?1",
                rusqlite::params![id, quantity],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {} FROM cart_items WHERE id = ?1", CART_ITEM_COLUMNS),
                [id],
                cart_item_from_row,
            )
            .optional()
        })
    }

    pub fn remove_from_cart(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM cart_items WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// Returns the number of lines removed.
    pub fn clear_cart(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM cart_items WHERE user_id = ?1", [user_id])?;
            Ok(deleted)
        })
    }
}

fn query_cart_line(conn: &Connection, user_id: &str, product_id: &str) -> Result<Option<CartItem>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM cart_items WHERE user_id = ?1 AND product_id = ?2",
            CART_ITEM_COLUMNS
        ),
        [user_id, product_id],
        cart_item_from_row,
    )
    .optional()
}

fn cart_item_from_row(row: &Row<'_>) -> rusqlite::Result<CartItem> {
    Ok(CartItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: row.get(2)?,
        quantity: row.get(3)?,
        created_at: get_ts(row, 4)?,
    })
}
