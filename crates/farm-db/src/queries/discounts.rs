use anyhow::Result;
use farm_types::api::CreateDiscountCodeRequest;
use farm_types::models::DiscountCode;
use rusqlite::{Connection, Row};

use super::{OptionalExt, get_opt_ts, get_ts, new_id, now, ts_to_sql};
use crate::Database;

impl Database {
    // -- Discount codes --

    /// Looks up an active code. Expiry is left to the caller, which decides
    /// how to report it.
    pub fn get_discount_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, code, discount, is_active, expires_at, created_at
                 FROM discount_codes WHERE code = ?1 AND is_active = 1",
                [code],
                discount_from_row,
            )
            .optional()
        })
    }

    pub fn create_discount_code(&self, req: &CreateDiscountCodeRequest) -> Result<DiscountCode> {
        let discount = DiscountCode {
            id: new_id(),
            code: req.code.clone(),
            discount: req.discount,
            is_active: req.is_active,
            expires_at: req.expires_at,
            created_at: now(),
        };
        self.with_conn(|conn| insert_discount_code(conn, &discount))?;
        Ok(discount)
    }
}

pub(crate) fn insert_discount_code(conn: &Connection, discount: &DiscountCode) -> Result<()> {
    conn.execute(
        "INSERT INTO discount_codes (id, code, discount, is_active, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            discount.id,
            discount.code,
            discount.discount,
            discount.is_active,
            discount.expires_at.as_ref().map(ts_to_sql),
            ts_to_sql(&discount.created_at)
        ],
    )?;
    Ok(())
}

fn discount_from_row(row: &Row<'_>) -> rusqlite::Result<DiscountCode> {
    Ok(DiscountCode {
        id: row.get(0)?,
        code: row.get(1)?,
        discount: row.get(2)?,
        is_active: row.get(3)?,
        expires_at: get_opt_ts(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}
