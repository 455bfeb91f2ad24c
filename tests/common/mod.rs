#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use toko_pos_api::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    entities::{category, product, user, Role},
    AppState,
};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@majujaya.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const CASHIER_EMAIL: &str = "kasir@majujaya.com";
pub const CASHIER_PASSWORD: &str = "kasir123";
pub const TEST_SECRET: &str = "a_reasonably_long_and_varied_secret_for_pos_tests_42";

/// Decoded response: status, headers and JSON body (Null when empty)
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

/// Decimal fields serialize as strings; accept numbers too
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected decimal, got {other}"),
    }
}

/// Application over a throwaway SQLite file with two accounts and one product
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: user::Model,
    pub cashier: user::Model,
    pub admin_token: String,
    pub cashier_token: String,
    pub category: category::Model,
    /// Stock 10, min stock 5, sells at 15000
    pub product: product::Model,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// Same fixture over a pool of `connections`, for checkouts that really overlap
    pub async fn with_pool_size(connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("toko_pos_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.sweep_interval_hours = 0;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let conn = &*state.db;

        let admin = insert_user(conn, ADMIN_EMAIL, ADMIN_PASSWORD, "Administrator", Role::Admin).await;
        let cashier = insert_user(conn, CASHIER_EMAIL, CASHIER_PASSWORD, "Kasir 1", Role::Cashier).await;

        let category = category::ActiveModel {
            name: Set("Cat".to_string()),
            description: Set(Some("Cat tembok dan kayu".to_string())),
            ..Default::default()
        }
        .insert(conn)
        .await
        .expect("seed category");

        let product = product::ActiveModel {
            sku: Set("CAT-RED".to_string()),
            name: Set("Cat Avian Merah 1L".to_string()),
            category_id: Set(category.id),
            unit: Set("klg".to_string()),
            buy_price: Set(Decimal::from(12000)),
            sell_price: Set(Decimal::from(15000)),
            stock: Set(10),
            min_stock: Set(5),
            ..Default::default()
        }
        .insert(conn)
        .await
        .expect("seed product");

        let admin_token = state.auth.generate_token(&admin).expect("admin token");
        let cashier_token = state.auth.generate_token(&cashier).expect("cashier token");

        let router = toko_pos_api::build_router(state.clone()).expect("router");

        Self {
            router,
            state,
            admin,
            cashier,
            admin_token,
            cashier_token,
            category,
            product,
            _dir: dir,
        }
    }

    /// Adds another product in the seeded category
    pub async fn add_product(&self, sku: &str, stock: i32, sell_price: i64) -> product::Model {
        product::ActiveModel {
            sku: Set(sku.to_string()),
            name: Set(format!("Produk {sku}")),
            category_id: Set(self.category.id),
            unit: Set("pcs".to_string()),
            buy_price: Set(Decimal::from(sell_price / 2)),
            sell_price: Set(Decimal::from(sell_price)),
            stock: Set(stock),
            min_stock: Set(5),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed extra product")
    }

    pub async fn reload_product(&self, id: i32) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn request_raw(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Send a request with an optional bearer token
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
            }
            None => Body::empty(),
        };

        self.request_raw(builder.body(body).expect("build request"))
            .await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }

    pub async fn as_cashier(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.request(method, uri, body, Some(&self.cashier_token))
            .await
    }
}

async fn insert_user(
    conn: &db::DbPool,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
) -> user::Model {
    user::ActiveModel {
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password).expect("hash password")),
        name: Set(name.to_string()),
        role: Set(role),
        ..Default::default()
    }
    .insert(conn)
    .await
    .expect("seed user")
}
