mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Local};
use common::{decimal, TestApp};
use rust_decimal::Decimal;
use serde_json::json;

async fn sell(app: &TestApp, product_id: i32, qty: i32, method: &str) {
    let res = app
        .as_cashier(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "items": [{ "productId": product_id, "qty": qty }],
                "paymentMethod": method
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "body: {}", res.body);
}

#[tokio::test]
async fn sales_report_summarizes_today() {
    let app = TestApp::new().await;
    let nails = app.add_product("PKU-10CM", 40, 28000).await;

    sell(&app, app.product.id, 2, "CASH").await; // 30000
    sell(&app, nails.id, 1, "TRANSFER").await; // 28000
    sell(&app, app.product.id, 1, "CASH").await; // 15000

    let today = Local::now().date_naive();
    let res = app
        .as_cashier(
            Method::GET,
            &format!("/api/reports/sales?startDate={today}&endDate={today}"),
            None,
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "body: {}", res.body);
    let data = res.data();
    assert_eq!(data["summary"]["totalTransactions"], 3);
    assert_eq!(decimal(&data["summary"]["totalRevenue"]), Decimal::from(73000));
    assert_eq!(
        decimal(&data["summary"]["averageTransaction"]),
        Decimal::new(2433333, 2)
    );
    assert_eq!(data["byPaymentMethod"]["CASH"]["count"], 2);
    assert_eq!(decimal(&data["byPaymentMethod"]["CASH"]["total"]), Decimal::from(45000));
    assert_eq!(data["byPaymentMethod"]["TRANSFER"]["count"], 1);

    let top = data["topProducts"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["productId"], app.product.id);
    assert_eq!(top[0]["totalQty"], 3);
    assert_eq!(top[0]["category"], "Cat");
}

#[tokio::test]
async fn sales_report_outside_window_is_empty() {
    let app = TestApp::new().await;
    sell(&app, app.product.id, 1, "CASH").await;

    let last_week = Local::now().date_naive() - Duration::days(7);
    let yesterday = Local::now().date_naive() - Duration::days(1);
    let res = app
        .as_admin(
            Method::GET,
            &format!("/api/reports/sales?startDate={last_week}&endDate={yesterday}"),
            None,
        )
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["summary"]["totalTransactions"], 0);
    assert_eq!(decimal(&res.data()["summary"]["averageTransaction"]), Decimal::ZERO);
    assert_eq!(res.data()["topProducts"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn sales_report_requires_a_valid_range() {
    let app = TestApp::new().await;

    let missing = app
        .as_admin(Method::GET, "/api/reports/sales?startDate=2024-06-01", None)
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.message(), "startDate and endDate are required");

    let inverted = app
        .as_admin(
            Method::GET,
            "/api/reports/sales?startDate=2024-06-10&endDate=2024-06-01",
            None,
        )
        .await;
    assert_eq!(inverted.status, StatusCode::BAD_REQUEST);

    let garbage = app
        .as_admin(
            Method::GET,
            "/api/reports/sales?startDate=kemarin&endDate=2024-06-01",
            None,
        )
        .await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_report_values_stock_at_cost_and_price() {
    let app = TestApp::new().await;
    // 40 units bought at 14000, sold at 28000
    app.add_product("PKU-10CM", 40, 28000).await;

    let res = app
        .as_admin(Method::GET, "/api/reports/inventory", None)
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let summary = &res.data()["summary"];
    assert_eq!(summary["totalItems"], 2);
    assert_eq!(summary["totalUnits"], 50);
    // 10 * 12000 + 40 * 14000
    assert_eq!(decimal(&summary["totalStockValue"]), Decimal::from(680_000));
    // 10 * 15000 + 40 * 28000
    assert_eq!(
        decimal(&summary["totalPotentialRevenue"]),
        Decimal::from(1_270_000)
    );
    assert_eq!(decimal(&summary["estimatedProfit"]), Decimal::from(590_000));

    let items = res.data()["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "Cat Avian Merah 1L");
    assert_eq!(decimal(&items[0]["stockValue"]), Decimal::from(120_000));
}
