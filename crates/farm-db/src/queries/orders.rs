use anyhow::Result;
use farm_types::api::CreateOrderRequest;
use farm_types::models::{CustomerSummary, Order, OrderStatus, OrderWithDetails, SellerRef};
use rusqlite::Row;

use super::products::product_from_row;
use super::{OptionalExt, get_enum, get_ts, new_id, now, ts_to_sql};
use crate::Database;

/// Order columns, then customer name/email, seller name, then the product
/// columns (all NULL when the product is gone).
const ORDER_WITH_DETAILS: &str =
    "SELECT o.id, o.customer_id, o.seller_id, o.product_id, o.quantity, o.total_price,
            o.status, o.discount_code, o.discount_amount, o.created_at,
            c.name, c.email, s.name,
            p.id, p.name, p.description, p.price, p.category, p.quantity, p.discount,
            p.image, p.seller_id, p.is_active, p.created_at
     FROM orders o
     LEFT JOIN users c ON c.id = o.customer_id
     LEFT JOIN users s ON s.id = o.seller_id
     LEFT JOIN products p ON p.id = o.product_id";

enum OrderFilter<'a> {
    All,
    Customer(&'a str),
    Seller(&'a str),
}

impl Database {
    // -- Orders --

    pub fn get_orders(&self) -> Result<Vec<OrderWithDetails>> {
        self.query_orders(OrderFilter::All)
    }

    pub fn get_orders_by_customer(&self, customer_id: &str) -> Result<Vec<OrderWithDetails>> {
        self.query_orders(OrderFilter::Customer(customer_id))
    }

    pub fn get_orders_by_seller(&self, seller_id: &str) -> Result<Vec<OrderWithDetails>> {
        self.query_orders(OrderFilter::Seller(seller_id))
    }

    pub fn create_order(&self, req: &CreateOrderRequest) -> Result<Order> {
        let order = Order {
            id: new_id(),
            customer_id: req.customer_id.clone(),
            seller_id: req.seller_id.clone(),
            product_id: req.product_id.clone(),
            quantity: req.quantity,
            total_price: req.total_price,
            status: req.status,
            discount_code: req.discount_code.clone(),
            discount_amount: req.discount_amount,
            created_at: now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO orders
                     (id, customer_id, seller_id, product_id, quantity, total_price,
                      status, discount_code, discount_amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    order.id,
                    order.customer_id,
                    order.seller_id,
                    order.product_id,
                    order.quantity,
                    order.total_price,
                    order.status.as_str(),
                    order.discount_code,
                    order.discount_amount,
                    ts_to_sql(&order.created_at)
                ],
            )?;
            Ok(())
        })?;

        Ok(order)
    }

    /// Returns `None` for an unknown id.
    pub fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Option<Order>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE orders SET status = ?2 WHERE id = ?1",
                rusqlite::params![id, status.as_str()],
            )?;
            if updated == 0 {
                return Ok(None);
            }

            conn.query_row(
                "SELECT id, customer_id, seller_id, product_id, quantity, total_price,
                        status, discount_code, discount_amount, created_at
                 FROM orders WHERE id = ?1",
                [id],
                order_from_row,
            )
            .optional()
        })
    }

    fn query_orders(&self, filter: OrderFilter<'_>) -> Result<Vec<OrderWithDetails>> {
        let (clause, param) = match filter {
            OrderFilter::All => ("", None),
            OrderFilter::Customer(id) => ("WHERE o.customer_id = ?1", Some(id)),
            OrderFilter::Seller(id) => ("WHERE o.seller_id = ?1", Some(id)),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} {} ORDER BY o.created_at, o.rowid",
                ORDER_WITH_DETAILS, clause
            ))?;
            let rows = match param {
                Some(id) => stmt.query_map([id], order_with_details_from_row)?,
                None => stmt.query_map([], order_with_details_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        seller_id: row.get(2)?,
        product_id: row.get(3)?,
        quantity: row.get(4)?,
        total_price: row.get(5)?,
        status: get_enum(row, 6)?,
        discount_code: row.get(7)?,
        discount_amount: row.get(8)?,
        created_at: get_ts(row, 9)?,
    })
}

fn order_with_details_from_row(row: &Row<'_>) -> rusqlite::Result<OrderWithDetails> {
    let order = order_from_row(row)?;
    let customer_name: Option<String> = row.get(10)?;
    let customer_email: Option<String> = row.get(11)?;
    let seller_name: Option<String> = row.get(12)?;
    let product_id: Option<String> = row.get(13)?;
    let product = match product_id {
        Some(_) => Some(product_from_row(row, 13)?),
        None => None,
    };

    Ok(OrderWithDetails {
        customer: CustomerSummary {
            id: order.customer_id.clone(),
            name: customer_name.unwrap_or_else(|| "Unknown Customer".to_string()),
            email: customer_email.unwrap_or_default(),
        },
        seller: SellerRef {
            id: order.seller_id.clone(),
            name: seller_name.unwrap_or_else(|| "Unknown Seller".to_string()),
        },
        product,
        order,
    })
}
