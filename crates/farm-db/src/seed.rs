//! Demo marketplace: one admin, one farm, one customer, a handful of listings
//! and a welcome discount code. Seeding an already-seeded store is a no-op.

use anyhow::Result;
use chrono::Duration;
use farm_types::models::{DiscountCode, Product, Role, User};
use tracing::{debug, info};

use crate::Database;
use crate::queries::discounts::insert_discount_code;
use crate::queries::now;
use crate::queries::products::insert_product;
use crate::queries::users::insert_user;

pub const ADMIN_ID: &str = "admin-1";
pub const SELLER_ID: &str = "seller-1";
pub const CUSTOMER_ID: &str = "customer-1";

const ADMIN_AVATAR: &str =
    "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?ixlib=rb-4.0.3&auto=format&fit=crop&w=32&h=32";
const SELLER_AVATAR: &str =
    "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?ixlib=rb-4.0.3&auto=format&fit=crop&w=32&h=32";

/// (id, name, description, price, category, quantity, discount, image)
const PRODUCTS: &[(&str, &str, &str, f64, &str, i64, i64, &str)] = &[
    (
        "prod-1",
        "Fresh Matooke (Green Bananas)",
        "Organic matooke from Buganda region, perfect for steaming",
        15000.0,
        "vegetables",
        50,
        0,
        "https://images.unsplash.com/photo-1571771894821-ce9b6c11b08e?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=300",
    ),
    (
        "prod-2",
        "Sweet Yellow Bananas",
        "Ripe sweet bananas from Mbale district",
        8000.0,
        "fruits",
        30,
        10,
        "https://images.unsplash.com/photo-1571771894821-ce9b6c11b08e?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=300",
    ),
    (
        "prod-3",
        "Fresh Tomatoes",
        "Juicy red tomatoes from Kasese valley",
        5000.0,
        "vegetables",
        100,
        0,
        "https://images.unsplash.com/photo-1592924357228-91a4daadcfea?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=300",
    ),
    (
        "prod-4",
        "Posho (Maize Flour)",
        "Fine white maize flour from Teso region",
        3500.0,
        "grains",
        200,
        5,
        "https://images.unsplash.com/photo-1574323347407-f5e1ad6d020b?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=300",
    ),
    (
        "prod-5",
        "Fresh Milk",
        "Pure cow milk from Ankole cattle",
        2500.0,
        "dairy",
        25,
        0,
        "https://images.unsplash.com/photo-1550583724-b2692b85b150?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=300",
    ),
];

/// Insert the demo data unless it is already there. Returns whether anything
/// was written.
pub fn seed_demo_data(db: &Database) -> Result<bool> {
    if db.get_user(ADMIN_ID)?.is_some() {
        debug!("Demo data already present, skipping seed");
        return Ok(false);
    }

    let created_at = now();
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let users = [
            (ADMIN_ID, "admin@farmmarket.com", "Admin User", Role::Admin, ADMIN_AVATAR),
            (SELLER_ID, "farmer@greenvalley.com", "Green Valley Farm", Role::Seller, SELLER_AVATAR),
            (CUSTOMER_ID, "john@example.com", "John Doe", Role::Customer, ADMIN_AVATAR),
        ];
        for (id, email, name, role, avatar) in users {
            insert_user(
                &tx,
                &User {
                    id: id.to_string(),
                    email: email.to_string(),
                    name: name.to_string(),
                    role,
                    avatar: Some(avatar.to_string()),
                    created_at,
                },
            )?;
        }

        insert_discount_code(
            &tx,
            &DiscountCode {
                id: "disc-1".to_string(),
                code: "FRESH15".to_string(),
                discount: 15,
                is_active: true,
                expires_at: Some(created_at + Duration::days(30)),
                created_at,
            },
        )?;

        for &(id, name, description, price, category, quantity, discount, image) in PRODUCTS {
            insert_product(
                &tx,
                &Product {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    price,
                    category: category.to_string(),
                    quantity,
                    discount,
                    image: Some(image.to_string()),
                    seller_id: SELLER_ID.to_string(),
                    is_active: true,
                    created_at,
                },
            )?;
        }

        tx.commit()?;
        Ok(())
    })?;

    info!("Seeded demo data: 3 users, {} products, 1 discount code", PRODUCTS.len());
    Ok(true)
}
