//! REST surface of the marketplace: catalogue, orders, carts, chat history,
//! discount codes, users and admin stats.

pub mod admin;
pub mod cart;
pub mod chat;
pub mod discounts;
pub mod error;
pub mod orders;
pub mod products;
pub mod state;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(admin::health))
        // Products
        .route("/api/products", get(products::list_products).post(products::create_product))
        .route(
            "/api/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/api/sellers/{seller_id}/products", get(products::seller_products))
        // Orders
        .route("/api/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/orders/{id}/status", put(orders::update_order_status))
        // Cart
        .route("/api/cart", post(cart::add_to_cart))
        .route("/api/cart/user/{user_id}", delete(cart::clear_cart))
        .route(
            "/api/cart/{id}",
            get(cart::get_cart)
                .put(cart::update_cart_item)
                .delete(cart::remove_from_cart),
        )
        // Chat
        .route("/api/chat/{sender_id}/{receiver_id}", get(chat::get_history))
        // Discount codes
        .route("/api/discount", post(discounts::create_code))
        .route("/api/discount/{code}", get(discounts::validate_code))
        // Users
        .route("/api/users", post(users::create_user))
        .route("/api/users/{id}", get(users::get_user).put(users::update_user))
        // Admin
        .route("/api/admin/stats", get(admin::stats))
        .with_state(state)
}
