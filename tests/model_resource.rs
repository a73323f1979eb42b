use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use resource_sdk::{
    Attribute, FactoryOptions, FieldRule, FieldType, MemoryStore, ModelDescriptor, ModelResourceOptions,
    ResourceServer, Schema, Settings,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const REPORT_PATH: &str = "/1.0/organizations/{organizationId}/reports/{reportId}";

fn report_model() -> Arc<ModelDescriptor> {
    Arc::new(
        ModelDescriptor::new("Report")
            .attribute("id", Attribute::new("id").primary().typed(FieldType::Integer))
            .attribute("createdAt", Attribute::new("createdAt"))
            .with_validation(
                Schema::new()
                    .field("organizationId", FieldRule::integer().required())
                    .field("frequency", FieldRule::integer().required()),
            )
            .with_unique(&["organizationId", "name"]),
    )
}

fn seeded_store(model: Arc<ModelDescriptor>) -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::with_records(
            model,
            vec![
                json!({ "id": 13, "organizationId": 2, "frequency": 86400, "createdAt": "2024-01-01T00:00:00Z" }),
                json!({ "id": 125152, "organizationId": 510553, "frequency": 86400, "createdAt": "2024-01-02T00:00:00Z" }),
            ],
        )
        .unwrap(),
    )
}

fn app(store: Arc<MemoryStore>, partial: bool) -> axum::Router {
    let mut server = ResourceServer::new(Arc::new(Settings::default()));
    server
        .add_model_resource(
            REPORT_PATH,
            report_model(),
            store,
            ModelResourceOptions {
                partial,
                ..ModelResourceOptions::new(FactoryOptions::new().parent_resource("organization"))
            },
        )
        .unwrap();
    server.into_router()
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|v| Body::from(v.to_string())).unwrap_or_else(Body::empty);
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn generated_routes() {
    let mut server = ResourceServer::new(Arc::new(Settings::default()));
    server
        .add_model_resource(
            REPORT_PATH,
            report_model(),
            seeded_store(report_model()),
            ModelResourceOptions::new(FactoryOptions::new().parent_resource("organization")),
        )
        .unwrap();
    let routes: Vec<(String, String)> = server.inspect().into_iter().map(|r| (r.method, r.path)).collect();
    let collection = "/1.0/organizations/{organizationId}/reports".to_string();
    assert_eq!(
        routes,
        vec![
            ("POST".to_string(), collection.clone()),
            ("GET".to_string(), REPORT_PATH.to_string()),
            ("PUT".to_string(), REPORT_PATH.to_string()),
            ("DELETE".to_string(), REPORT_PATH.to_string()),
            ("GET".to_string(), collection),
        ]
    );
}

#[tokio::test]
async fn read_scoped_by_parent_and_identity() {
    let app = app(seeded_store(report_model()), false);
    let (status, body) = send(app.clone(), "GET", "/1.0/organizations/2/reports/13", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frequency"], json!(86400));

    let (status, _) = send(app, "GET", "/1.0/organizations/3/reports/13", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collection_is_scoped_to_parent() {
    let app = app(seeded_store(report_model()), false);
    let (status, body) = send(app, "GET", "/1.0/organizations/2/reports", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["data"][0]["id"], json!(13));
    assert_eq!(body["limit"], json!(200));
}

#[tokio::test]
async fn collection_filters_and_pages() {
    let records: Vec<Value> = (1..=7)
        .map(|i| json!({ "id": i, "organizationId": 2, "frequency": i * 10, "createdAt": format!("2024-01-0{}T00:00:00Z", i) }))
        .collect();
    let store = Arc::new(MemoryStore::with_records(report_model(), records).unwrap());
    let app = app(store, false);

    let uri = "/1.0/organizations/2/reports?where[frequency][gt]=20&where[frequency][lte]=60&limit=2&page=2";
    let (status, body) = send(app.clone(), "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<Value> = body["data"].as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(5), json!(6)]);
    assert_eq!(body["count"], json!(2));

    let (status, body) = send(app.clone(), "GET", "/1.0/organizations/2/reports?where[note]=null", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(7));

    let (status, _) = send(app, "GET", "/1.0/organizations/2/reports?where[frequency][like]=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_lifts_parent_and_maps_conflicts() {
    let store = seeded_store(report_model());
    let app = app(store.clone(), false);

    let (status, body) = send(
        app.clone(),
        "POST",
        "/1.0/organizations/2/reports",
        Some(json!({ "frequency": 60, "name": "hourly" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organizationId"], json!(2));
    assert_eq!(body["id"], json!(125153));
    assert!(body["createdAt"].is_string());

    let (status, body) = send(
        app.clone(),
        "POST",
        "/1.0/organizations/2/reports",
        Some(json!({ "frequency": 30, "name": "hourly" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], json!("A report already exists with the supplied information"));

    let (status, _) = send(app, "POST", "/1.0/organizations/2/reports", Some(json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn update_requires_matching_identity() {
    let store = seeded_store(report_model());
    let app = app(store.clone(), false);

    let (status, body) = send(
        app.clone(),
        "PUT",
        "/1.0/organizations/2/reports/13",
        Some(json!({ "id": 13, "organizationId": 2, "frequency": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frequency"], json!(500));

    let (status, body) = send(
        app.clone(),
        "PUT",
        "/1.0/organizations/2/reports/13",
        Some(json!({ "id": 99, "organizationId": 2, "frequency": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        json!("One or more payload values do not match the requested resource")
    );

    let records = store.records().await;
    let report = records.iter().find(|r| r["id"] == json!(13)).unwrap();
    assert_eq!(report["frequency"], json!(500));

    let (status, _) = send(
        app,
        "PUT",
        "/1.0/organizations/2/reports/14",
        Some(json!({ "id": 14, "organizationId": 2, "frequency": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn partial_update_unwraps_operations() {
    let store = seeded_store(report_model());
    let app = app(store, true);

    let (status, body) = send(
        app.clone(),
        "PATCH",
        "/1.0/organizations/2/reports/13",
        Some(json!({ "operations": { "frequency": 3600 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["frequency"], json!(3600));
    assert_eq!(body["organizationId"], json!(2));

    let (status, _) = send(
        app,
        "PATCH",
        "/1.0/organizations/2/reports/13",
        Some(json!({ "operations": { "id": 12 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_missing_entity_is_not_found() {
    let store = seeded_store(report_model());
    let app = app(store.clone(), false);

    let (status, _) = send(app.clone(), "DELETE", "/1.0/organizations/2/reports/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(store.len().await, 2);

    let (status, body) = send(app, "DELETE", "/1.0/organizations/2/reports/13", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert_eq!(store.len().await, 1);
}

fn three_reports() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::with_records(
            report_model(),
            vec![
                json!({ "id": 13, "organizationId": 2, "frequency": 10 }),
                json!({ "id": 14, "organizationId": 2, "frequency": 20 }),
                json!({ "id": 500, "organizationId": 999, "frequency": 10 }),
            ],
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn undecodable_path_params_never_widen_the_lookup() {
    let store = three_reports();
    let app = app(store.clone(), false);

    let (status, body) = send(app.clone(), "GET", "/1.0/organizations/2/reports/%FF", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("id").is_none());

    let (status, _) = send(app.clone(), "DELETE", "/1.0/organizations/77/reports/%FF", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        "PUT",
        "/1.0/organizations/%FF/reports/13",
        Some(json!({ "id": 13, "organizationId": 2, "frequency": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ids: Vec<Value> = store.records().await.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(13), json!(14), json!(500)]);
    let records = store.records().await;
    assert_eq!(records[0]["frequency"], json!(10));
}

#[tokio::test]
async fn bare_filter_value_combines_with_operators() {
    let app = app(three_reports(), false);
    for uri in [
        "/1.0/organizations/2/reports?where[frequency]=10&where[frequency][gt]=5",
        "/1.0/organizations/2/reports?where[frequency][gt]=5&where[frequency]=10",
    ] {
        let (status, body) = send(app.clone(), "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<Value> = body["data"].as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(13)]);
    }
}

#[tokio::test]
async fn primary_key_at_the_top_of_the_range_is_rejected() {
    let store = seeded_store(report_model());
    let app = app(store.clone(), false);

    let (status, _) = send(
        app.clone(),
        "POST",
        "/1.0/organizations/2/reports",
        Some(json!({ "frequency": 1, "id": i64::MAX })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.len().await, 2);

    let (status, body) = send(app, "POST", "/1.0/organizations/2/reports", Some(json!({ "frequency": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(125153));
}
