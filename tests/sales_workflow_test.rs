mod common;

use axum::http::{Method, StatusCode};
use chrono::Local;
use common::{decimal, TestApp};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use toko_pos_api::entities::{sale, sale_item, stock_movement, MovementType};

fn today_prefix() -> String {
    format!("INV-{}-", Local::now().format("%Y%m%d"))
}

#[tokio::test]
async fn sale_decrements_stock_and_writes_ledger() {
    let app = TestApp::new().await;

    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 3 }],
                "paymentMethod": "CASH"
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
    assert_eq!(res.message(), "Transaction completed successfully");

    let data = res.data();
    assert_eq!(data["invoiceNo"], format!("{}0001", today_prefix()));
    assert_eq!(data["paymentMethod"], "CASH");
    assert_eq!(data["cashierId"], app.cashier.id);
    assert_eq!(decimal(&data["totalAmount"]), Decimal::from(45000));
    assert_eq!(data["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(decimal(&data["items"][0]["price"]), Decimal::from(15000));
    assert_eq!(data["items"][0]["product"]["name"], "Cat Avian Merah 1L");

    assert_eq!(app.reload_product(app.product.id).await.stock, 7);

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(app.product.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Out);
    assert_eq!(movements[0].qty, 3);
    assert_eq!(movements[0].user_id, app.cashier.id);
    assert_eq!(
        movements[0].notes.as_deref(),
        Some(format!("Sale - {}0001", today_prefix()).as_str())
    );
}

#[tokio::test]
async fn insufficient_stock_rejects_and_leaves_state_untouched() {
    let app = TestApp::new().await;

    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 11 }],
                "paymentMethod": "CASH"
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["success"], false);
    assert_eq!(
        res.message(),
        "Insufficient stock for Cat Avian Merah 1L. Available: 10, Requested: 11"
    );

    assert_eq!(app.reload_product(app.product.id).await.stock, 10);
    assert_eq!(sale::Entity::find().count(&*app.state.db).await.unwrap(), 0);
    assert_eq!(
        stock_movement::Entity::find().count(&*app.state.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn failing_line_rolls_back_the_whole_cart() {
    let app = TestApp::new().await;
    let nails = app.add_product("PKU-5CM", 4, 25000).await;

    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [
                    { "productId": app.product.id, "qty": 2 },
                    { "productId": nails.id, "qty": 8 }
                ],
                "paymentMethod": "TRANSFER"
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.message().contains("Available: 4, Requested: 8"));

    assert_eq!(app.reload_product(app.product.id).await.stock, 10);
    assert_eq!(app.reload_product(nails.id).await.stock, 4);
    assert_eq!(sale_item::Entity::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn total_is_sum_of_line_subtotals() {
    let app = TestApp::new().await;
    let nails = app.add_product("PKU-10CM", 40, 28000).await;

    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [
                    { "productId": app.product.id, "qty": 2 },
                    { "productId": nails.id, "qty": 3 }
                ],
                "paymentMethod": "transfer"
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
    let data = res.data();
    assert_eq!(data["paymentMethod"], "TRANSFER");

    let subtotal_sum: Decimal = data["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|line| decimal(&line["subtotal"]))
        .sum();
    assert_eq!(subtotal_sum, Decimal::from(30000 + 84000));
    assert_eq!(decimal(&data["totalAmount"]), subtotal_sum);
}

#[tokio::test]
async fn invoice_numbers_increase_within_the_day() {
    let app = TestApp::new().await;

    for expected in ["0001", "0002", "0003"] {
        let res = app
            .as_cashier(
                Method::POST,
                "/api/transactions",
                Some(json!({
                    "items": [{ "productId": app.product.id, "qty": 1 }],
                    "paymentMethod": "CASH"
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.data()["invoiceNo"], format!("{}{expected}", today_prefix()));
    }

    assert_eq!(app.reload_product(app.product.id).await.stock, 7);
}

#[tokio::test]
async fn recorded_sale_can_be_fetched_and_listed() {
    let app = TestApp::new().await;

    let created = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 2 }],
                "paymentMethod": "CASH"
            })),
        )
        .await;
    let id = created.data()["id"].as_i64().unwrap();

    let fetched = app
        .as_admin(Method::GET, &format!("/api/transactions/{id}"), None)
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.data()["invoiceNo"], created.data()["invoiceNo"]);
    assert_eq!(fetched.data()["cashier"]["name"], "Kasir 1");

    let listed = app.as_admin(Method::GET, "/api/transactions", None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.data().as_array().map(Vec::len), Some(1));
    assert_eq!(listed.data()[0]["itemCount"], 1);
    assert_eq!(listed.body["pagination"]["total"], 1);
    assert_eq!(listed.body["pagination"]["page"], 1);

    let missing = app
        .as_admin(Method::GET, "/api/transactions/9999", None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_payment_method() {
    let app = TestApp::new().await;

    for method in ["CASH", "TRANSFER", "CASH"] {
        app.as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 1 }],
                "paymentMethod": method
            })),
        )
        .await;
    }

    let res = app
        .as_cashier(Method::GET, "/api/transactions?paymentMethod=TRANSFER", None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["pagination"]["total"], 1);

    let paged = app
        .as_cashier(Method::GET, "/api/transactions?page=2&limit=2", None)
        .await;
    assert_eq!(paged.data().as_array().map(Vec::len), Some(1));
    assert_eq!(paged.body["pagination"]["totalPages"], 2);
}

#[tokio::test]
async fn malformed_carts_are_rejected_before_storage() {
    let app = TestApp::new().await;

    let empty = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({ "items": [], "paymentMethod": "CASH" })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.message(), "Transaction items are required");

    let no_payment = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({ "items": [{ "productId": app.product.id, "qty": 1 }] })),
        )
        .await;
    assert_eq!(no_payment.status, StatusCode::BAD_REQUEST);

    let bad_payment = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 1 }],
                "paymentMethod": "QRIS"
            })),
        )
        .await;
    assert_eq!(bad_payment.status, StatusCode::BAD_REQUEST);

    let zero_qty = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 0 }],
                "paymentMethod": "CASH"
            })),
        )
        .await;
    assert_eq!(zero_qty.status, StatusCode::BAD_REQUEST);

    let unknown_product = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": 4242, "qty": 1 }],
                "paymentMethod": "CASH"
            })),
        )
        .await;
    assert_eq!(unknown_product.status, StatusCode::NOT_FOUND);

    assert_eq!(app.reload_product(app.product.id).await.stock, 10);
    assert_eq!(sale::Entity::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_sales_never_oversell() {
    let app = TestApp::new().await;
    let cart = json!({
        "items": [{ "productId": app.product.id, "qty": 8 }],
        "paymentMethod": "CASH"
    });

    let (first, second) = tokio::join!(
        app.as_cashier(Method::POST, "/api/transactions", Some(cart.clone())),
        app.as_cashier(Method::POST, "/api/transactions", Some(cart.clone())),
    );

    let statuses = [first.status, second.status];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1,
        "statuses: {statuses:?}"
    );
    assert!(statuses.contains(&StatusCode::BAD_REQUEST));

    assert_eq!(app.reload_product(app.product.id).await.stock, 2);
    assert_eq!(sale::Entity::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn checkout_requires_a_session() {
    let app = TestApp::new().await;

    let res = app
        .request(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": app.product.id, "qty": 1 }],
                "paymentMethod": "CASH"
            })),
            None,
        )
        .await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.reload_product(app.product.id).await.stock, 10);
}

#[tokio::test]
async fn second_sale_beyond_remaining_stock_fails_then_adjust_resets() {
    let app = TestApp::new().await;
    let sale = |qty: i32| {
        json!({
            "items": [{ "productId": app.product.id, "qty": qty }],
            "paymentMethod": "CASH"
        })
    };

    let first = app
        .as_cashier(Method::POST, "/api/transactions", Some(sale(3)))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = app
        .as_cashier(Method::POST, "/api/transactions", Some(sale(8)))
        .await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        second.message(),
        "Insufficient stock for Cat Avian Merah 1L. Available: 7, Requested: 8"
    );
    assert_eq!(app.reload_product(app.product.id).await.stock, 7);

    let adjust = app
        .as_admin(
            Method::POST,
            "/api/inventory/adjust",
            Some(json!({ "productId": app.product.id, "type": "ADJUST", "qty": 20 })),
        )
        .await;
    assert_eq!(adjust.status, StatusCode::CREATED);
    assert_eq!(app.reload_product(app.product.id).await.stock, 20);

    let adjustments = stock_movement::Entity::find()
        .filter(stock_movement::Column::MovementType.eq(MovementType::Adjust))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].qty, 20);
}

#[tokio::test]
async fn repeated_product_lines_share_one_stock_check() {
    let app = TestApp::new().await;

    // Each line fits on its own; together they need 12 of 10
    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [
                    { "productId": app.product.id, "qty": 6 },
                    { "productId": app.product.id, "qty": 6 }
                ],
                "paymentMethod": "CASH"
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST, "body: {}", res.body);
    assert_eq!(
        res.message(),
        "Insufficient stock for Cat Avian Merah 1L. Available: 4, Requested: 6"
    );

    let db = &*app.state.db;
    assert_eq!(app.reload_product(app.product.id).await.stock, 10);
    assert_eq!(stock_movement::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(sale::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(sale_item::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_checkouts_on_a_shared_pool_all_succeed() {
    let app = Arc::new(TestApp::with_pool_size(8).await);
    let product_id = app.product.id;

    let mut checkouts = JoinSet::new();
    for _ in 0..6 {
        let app = Arc::clone(&app);
        checkouts.spawn(async move {
            app.as_cashier(
                Method::POST,
                "/api/transactions",
                Some(json!({
                    "items": [{ "productId": product_id, "qty": 1 }],
                    "paymentMethod": "CASH"
                })),
            )
            .await
        });
    }

    let mut invoices = HashSet::new();
    while let Some(joined) = checkouts.join_next().await {
        let res = joined.unwrap();
        assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
        invoices.insert(res.data()["invoiceNo"].as_str().unwrap().to_string());
    }

    assert_eq!(invoices.len(), 6);
    assert!(invoices.iter().all(|inv| inv.starts_with(&today_prefix())));
    assert_eq!(app.reload_product(product_id).await.stock, 4);
    assert_eq!(
        stock_movement::Entity::find()
            .filter(stock_movement::Column::MovementType.eq(MovementType::Out))
            .count(&*app.state.db)
            .await
            .unwrap(),
        6
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_checkouts_never_oversell_or_fail_with_server_errors() {
    let app = Arc::new(TestApp::with_pool_size(8).await);
    let product_id = app.product.id;

    let mut checkouts = JoinSet::new();
    for _ in 0..5 {
        let app = Arc::clone(&app);
        checkouts.spawn(async move {
            app.as_cashier(
                Method::POST,
                "/api/transactions",
                Some(json!({
                    "items": [{ "productId": product_id, "qty": 4 }],
                    "paymentMethod": "TRANSFER"
                })),
            )
            .await
        });
    }

    let mut created = 0;
    while let Some(joined) = checkouts.join_next().await {
        let res = joined.unwrap();
        match res.status {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => assert!(
                res.message().starts_with("Insufficient stock"),
                "body: {}",
                res.body
            ),
            other => panic!("unexpected status {other}: {}", res.body),
        }
    }

    assert_eq!(created, 2);
    assert_eq!(app.reload_product(product_id).await.stock, 2);
    assert_eq!(sale::Entity::find().count(&*app.state.db).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crossed_carts_do_not_block_each_other() {
    let app = Arc::new(TestApp::with_pool_size(8).await);
    let first = app.product.id;
    let second = app.add_product("KRM-40", 10, 65000).await.id;

    let mut checkouts = JoinSet::new();
    for round in 0..6 {
        let app = Arc::clone(&app);
        let (a, b) = if round % 2 == 0 { (first, second) } else { (second, first) };
        checkouts.spawn(async move {
            app.as_cashier(
                Method::POST,
                "/api/transactions",
                Some(json!({
                    "items": [{ "productId": a, "qty": 1 }, { "productId": b, "qty": 1 }],
                    "paymentMethod": "CASH"
                })),
            )
            .await
        });
    }

    while let Some(joined) = checkouts.join_next().await {
        let res = joined.unwrap();
        assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
    }

    assert_eq!(app.reload_product(first).await.stock, 4);
    assert_eq!(app.reload_product(second).await.stock, 4);
}
