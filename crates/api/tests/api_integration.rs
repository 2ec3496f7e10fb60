//! Integration tests for the API server.

use std::sync::OnceLock;
use std::time::Duration;

use api::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use domain::{Money, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

#[derive(Clone, Copy)]
enum Caller {
    Anonymous,
    Customer(UserId),
    Admin(UserId),
}

struct TestApp {
    router: Router,
    store: InMemoryStore,
}

impl TestApp {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let state = api::create_state(store.clone(), Some(Duration::from_secs(5)));
        let router = api::create_app(state, get_metrics_handle());
        Self { router, store }
    }

    async fn product(&self, name: &str, cents: i64, stock: u32) -> Product {
        let product = Product::new(name, Money::from_cents(cents), stock).unwrap();
        self.store.insert_product(product.clone()).await;
        product
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        caller: Caller,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        match caller {
            Caller::Anonymous => {}
            Caller::Customer(user_id) => {
                builder = builder.header(USER_ID_HEADER, user_id.to_string());
            }
            Caller::Admin(user_id) => {
                builder = builder
                    .header(USER_ID_HEADER, user_id.to_string())
                    .header(USER_ROLE_HEADER, "admin");
            }
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn add_to_cart(&self, user_id: UserId, product: &Product, quantity: i64) -> Value {
        let (status, json) = self
            .send(
                "POST",
                "/cart",
                Caller::Customer(user_id),
                Some(json!({ "product_id": product.id.to_string(), "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, json) = app.send("GET", "/health", Caller::Anonymous, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/cart", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains(USER_ID_HEADER));

    let request = Request::builder()
        .uri("/cart")
        .header(USER_ID_HEADER, "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_item_and_view_cart() {
    let app = TestApp::new();
    let widget = app.product("Widget", 1250, 10).await;
    let user_id = UserId::new();

    app.add_to_cart(user_id, &widget, 2).await;
    let merged = app.add_to_cart(user_id, &widget, 1).await;
    assert_eq!(merged["quantity"], 3);

    let (status, cart) = app
        .send("GET", "/cart", Caller::Customer(user_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["product_name"], "Widget");
    assert_eq!(cart["items"][0]["subtotal_cents"], 3750);
    assert_eq!(cart["estimated_total_cents"], 3750);
}

#[tokio::test]
async fn test_add_item_validation() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 10).await;
    let user_id = UserId::new();

    let (status, _) = app
        .send(
            "POST",
            "/cart",
            Caller::Customer(user_id),
            Some(json!({ "product_id": widget.id.to_string(), "quantity": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/cart",
            Caller::Customer(user_id),
            Some(json!({ "product_id": UserId::new().to_string(), "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            "/cart",
            Caller::Customer(user_id),
            Some(json!({ "product_id": "nope", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_remove_cart_item() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 10).await;
    let owner = UserId::new();
    let item = app.add_to_cart(owner, &widget, 1).await;
    let uri = format!("/cart/items/{}", item["id"].as_str().unwrap());

    let (status, updated) = app
        .send(
            "PUT",
            &uri,
            Caller::Customer(owner),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quantity"], 4);

    let (status, _) = app
        .send("DELETE", &uri, Caller::Customer(UserId::new()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &uri, Caller::Customer(owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("DELETE", &uri, Caller::Customer(owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_flow() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 5).await;
    let user_id = UserId::new();
    app.add_to_cart(user_id, &widget, 3).await;

    let (status, order) = app
        .send("POST", "/orders/checkout", Caller::Customer(user_id), None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_cents"], 300);
    assert_eq!(order["items"][0]["price_cents"], 100);

    let (_, cart) = app
        .send("GET", "/cart", Caller::Customer(user_id), None)
        .await;
    assert!(cart["items"].as_array().unwrap().is_empty());

    let (status, json) = app
        .send("POST", "/orders/checkout", Caller::Customer(user_id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));

    let (status, orders) = app
        .send("GET", "/orders", Caller::Customer(user_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["id"], order["id"]);
}

#[tokio::test]
async fn test_checkout_insufficient_stock_is_conflict() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 4).await;
    let user_id = UserId::new();
    app.add_to_cart(user_id, &widget, 10).await;

    let (status, json) = app
        .send("POST", "/orders/checkout", Caller::Customer(user_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("Widget"));

    let (_, cart) = app
        .send("GET", "/cart", Caller::Customer(user_id), None)
        .await;
    assert_eq!(cart["items"][0]["quantity"], 10);
    assert_eq!(cart["items"][0]["available_stock"], 4);
}

#[tokio::test]
async fn test_order_visibility() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 5).await;
    let owner = UserId::new();
    app.add_to_cart(owner, &widget, 1).await;
    let (_, order) = app
        .send("POST", "/orders/checkout", Caller::Customer(owner), None)
        .await;
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = app.send("GET", &uri, Caller::Customer(owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send("GET", &uri, Caller::Customer(UserId::new()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("GET", &uri, Caller::Admin(UserId::new()), None).await;
    assert_eq!(status, StatusCode::OK);

    let missing = format!("/orders/{}", UserId::new());
    let (status, _) = app
        .send("GET", &missing, Caller::Customer(owner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 5).await;
    let buyer = UserId::new();
    app.add_to_cart(buyer, &widget, 1).await;
    let (_, order) = app
        .send("POST", "/orders/checkout", Caller::Customer(buyer), None)
        .await;
    let admin = Caller::Admin(UserId::new());

    let (status, _) = app
        .send("GET", "/admin/orders", Caller::Customer(buyer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, all) = app.send("GET", "/admin/orders", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let uri = format!("/admin/orders/{}/status", order["id"].as_str().unwrap());
    let (status, updated) = app
        .send("PATCH", &uri, admin, Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "paid");

    let (status, _) = app
        .send("PATCH", &uri, admin, Some(json!({ "status": "refunded" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let widget = app.product("Widget", 100, 5).await;
    let user_id = UserId::new();
    app.add_to_cart(user_id, &widget, 1).await;
    app.send("POST", "/orders/checkout", Caller::Customer(user_id), None)
        .await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_total"));
    assert!(text.contains("cart_items_added_total"));
}
