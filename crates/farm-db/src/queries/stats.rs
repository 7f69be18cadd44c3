use anyhow::Result;
use farm_types::models::AdminStats;

use crate::Database;

impl Database {
    // -- Admin --

    pub fn get_stats(&self) -> Result<AdminStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM users),
                        (SELECT COUNT(*) FROM users WHERE role = 'seller'),
                        (SELECT COUNT(*) FROM products),
                        (SELECT COUNT(*) FROM orders),
                        (SELECT COALESCE(SUM(total_price), 0.0) FROM orders)",
                [],
                |row| {
                    Ok(AdminStats {
                        total_users: row.get(0)?,
                        total_sellers: row.get(1)?,
                        total_products: row.get(2)?,
                        total_orders: row.get(3)?,
                        total_revenue: row.get(4)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}
