use anyhow::Result;
use farm_types::api::{CreateProductRequest, UpdateProductRequest};
use farm_types::models::{Product, ProductWithSeller, SellerSummary};
use rusqlite::{Connection, Row};

use super::{OptionalExt, get_ts, new_id, now, ts_to_sql};
use crate::Database;

const UNKNOWN_SELLER: &str = "Unknown Seller";

/// Product columns followed by the seller's name and avatar.
const PRODUCT_WITH_SELLER: &str =
    "SELECT p.id, p.name, p.description, p.price, p.category, p.quantity, p.discount,
            p.image, p.seller_id, p.is_active, p.created_at, u.name, u.avatar
     FROM products p
     LEFT JOIN users u ON u.id = p.seller_id";

impl Database {
    // -- Products --

    /// Active products, oldest listing first.
    pub fn get_products(&self, limit: Option<u32>) -> Result<Vec<ProductWithSeller>> {
        let limit = limit.map_or(-1, i64::from);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE p.is_active = 1 ORDER BY p.created_at, p.rowid LIMIT ?1",
                PRODUCT_WITH_SELLER
            ))?;
            let rows = stmt
                .query_map([limit], product_with_seller_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_product(&self, id: &str) -> Result<Option<ProductWithSeller>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE p.id = ?1", PRODUCT_WITH_SELLER))?;
            stmt.query_row([id], product_with_seller_from_row).optional()
        })
    }

    /// Every product of a seller, including inactive ones.
    pub fn get_products_by_seller(&self, seller_id: &str) -> Result<Vec<Product>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, price, category, quantity, discount,
                        image, seller_id, is_active, created_at
                 FROM products WHERE seller_id = ?1 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([seller_id], |row| product_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive match on name or description among active products,
    /// optionally restricted to one category.
    pub fn search_products(&self, query: &str, category: Option<&str>) -> Result<Vec<ProductWithSeller>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE p.is_active = 1
                   AND (lower(p.name) LIKE ?1 ESCAPE '\\'
                        OR lower(coalesce(p.description, '')) LIKE ?1 ESCAPE '\\')
                   AND (?2 IS NULL OR p.category = ?2)
                 ORDER BY p.created_at, p.rowid",
                PRODUCT_WITH_SELLER
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, category], product_with_seller_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_product(&self, req: &CreateProductRequest) -> Result<Product> {
        let product = Product {
            id: new_id(),
            name: req.name.clone(),
            description: req.description.clone(),
            price: req.price,
            category: req.category.clone(),
            quantity: req.quantity,
            discount: req.discount,
            image: req.image.clone(),
            seller_id: req.seller_id.clone(),
            is_active: req.is_active,
            created_at: now(),
        };
        self.with_conn(|conn| insert_product(conn, &product))?;
        Ok(product)
    }

    /// Apply the fields present in `req`. Returns `None` for an unknown id.
    pub fn update_product(&self, id: &str, req: &UpdateProductRequest) -> Result<Option<Product>> {
        self.with_conn(|conn| {
            let Some(mut product) = query_product(conn, id)? else {
                return Ok(None);
            };

            if let Some(name) = &req.name {
                product.name = name.clone();
            }
            if let Some(description) = &req.description {
                product.description = Some(description.clone());
            }
            if let Some(price) = req.price {
                product.price = price;
            }
            if let Some(category) = &req.category {
                product.category = category.clone();
            }
            if let Some(quantity) = req.quantity {
                product.quantity = quantity;
            }
            if let Some(discount) = req.discount {
                product.discount = discount;
            }
            if let Some(image) = &req.image {
                product.image = Some(image.clone());
            }
            if let Some(is_active) = req.is_active {
                product.is_active = is_active;
            }

            conn.execute(
                "UPDATE products
                 SET name = ?2, description = ?3, price = ?4, category = ?5, quantity = ?6,
                     discount = ?7, image = ?8, is_active = ?9
                 WHERE id = ?1",
                rusqlite::params![
                    product.id,
                    product.name,
                    product.description,
                    product.price,
                    product.category,
                    product.quantity,
                    product.discount,
                    product.image,
                    product.is_active
                ],
            )?;
            Ok(Some(product))
        })
    }

    /// Returns false when no product had this id.
    pub fn delete_product(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

pub(crate) fn insert_product(conn: &Connection, product: &Product) -> Result<()> {
    conn.execute(
        "INSERT INTO products
             (id, name, description, price, category, quantity, discount, image, seller_id, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            product.id,
            product.name,
            product.description,
            product.price,
            product.category,
            product.quantity,
            product.discount,
            product.image,
            product.seller_id,
            product.is_active,
            ts_to_sql(&product.created_at)
        ],
    )?;
    Ok(())
}

pub(crate) fn query_product(conn: &Connection, id: &str) -> Result<Option<Product>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, price, category, quantity, discount,
                image, seller_id, is_active, created_at
         FROM products WHERE id = ?1",
    )?;
    stmt.query_row([id], |row| product_from_row(row, 0)).optional()
}

/// Reads the eleven product columns starting at `offset`.
pub(crate) fn product_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        price: row.get(offset + 3)?,
        category: row.get(offset + 4)?,
        quantity: row.get(offset + 5)?,
        discount: row.get(offset + 6)?,
        image: row.get(offset + 7)?,
        seller_id: row.get(offset + 8)?,
        is_active: row.get(offset + 9)?,
        created_at: get_ts(row, offset + 10)?,
    })
}

/// Reads a [`PRODUCT_WITH_SELLER`] row starting at `offset`.
pub(crate) fn product_with_seller_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<ProductWithSeller> {
    let product = product_from_row(row, offset)?;
    let seller_name: Option<String> = row.get(offset + 11)?;
    let seller_avatar: Option<String> = row.get(offset + 12)?;

    Ok(ProductWithSeller {
        seller: SellerSummary {
            id: product.seller_id.clone(),
            name: seller_name.unwrap_or_else(|| UNKNOWN_SELLER.to_string()),
            avatar: seller_avatar,
        },
        product,
    })
}

fn product_with_seller_from_row(row: &Row<'_>) -> rusqlite::Result<ProductWithSeller> {
    product_with_seller_at(row, 0)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use farm_types::api::UpdateProductRequest;
    use farm_types::models::Role;

    use crate::queries::test_support::{db, product, user};

    #[test]
    fn test_listing_joins_seller() {
        let db = db();
        let seller = user(&db, "farmer@greenvalley.com", Role::Seller);
        let created = product(&db, &seller.id, "Fresh Matooke");

        let listed = db.get_products(None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].product, created);
        assert_eq!(listed[0].seller.name, "farmer");
    }

    #[test]
    fn test_inactive_products_hidden_from_listing() {
        let db = db();
        let seller = user(&db, "farmer@greenvalley.com", Role::Seller);
        let hidden = product(&db, &seller.id, "Old Stock");
        product(&db, &seller.id, "Fresh Milk");
        db.update_product(
            &hidden.id,
            &UpdateProductRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        let names: Vec<_> = db
            .get_products(None)
            .unwrap()
            .into_iter()
            .map(|p| p.product.name)
            .collect();
        assert_eq!(names, vec!["Fresh Milk"]);
        // Sellers still see their own inactive listings
        assert_eq!(db.get_products_by_seller(&seller.id).unwrap().len(), 2);
    }

    #[test]
    fn test_listing_limit() {
        let db = db();
        let seller = user(&db, "farmer@greenvalley.com", Role::Seller);
        for name in ["A", "B", "C"] {
            product(&db, &seller.id, name);
        }
        assert_eq!(db.get_products(Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_search_matches_name_and_description_case_insensitively() {
        let db = db();
        let seller = user(&db, "farmer@greenvalley.com", Role::Seller);
        product(&db, &seller.id, "Sweet Bananas");
        product(&db, &seller.id, "Tomatoes");

        let by_name = db.search_products("BANANA", None).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].product.name, "Sweet Bananas");

        // Every test product's description mentions the valley
        assert_eq!(db.search_products("valley", None).unwrap().len(), 2);
        assert!(db.search_products("valley", Some("dairy")).unwrap().is_empty());
        assert!(db.search_products("100%", None).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let db = db();
        let seller = user(&db, "farmer@greenvalley.com", Role::Seller);
        let created = product(&db, &seller.id, "Posho");

        let updated = db
            .update_product(
                &created.id,
                &UpdateProductRequest {
                    price: Some(3500.0),
                    discount: Some(5),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, 3500.0);
        assert_eq!(updated.discount, 5);
        assert_eq!(updated.name, "Posho");

        assert!(db.delete_product(&created.id).unwrap());
        assert!(!db.delete_product(&created.id).unwrap());
        assert!(db.get_product(&created.id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_seller_is_rejected() {
        let db = db();
        let result = db.create_product(&farm_types::api::CreateProductRequest {
            name: "Ghost produce".into(),
            description: None,
            price: 1.0,
            category: "fruits".into(),
            quantity: 1,
            discount: 0,
            image: None,
            seller_id: "nobody".into(),
            is_active: true,
        });
        assert!(result.is_err());
    }
}
