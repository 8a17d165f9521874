mod common;

use chrono::{Duration, Utc};
use common::{json_body, TestApp};
use serde_json::json;
use usage_billing_service::models::ActivateEnrollment;
use usage_billing_service::services::BillingStore;
use uuid::Uuid;

async fn seed_students(app: &TestApp, org_id: Uuid, count: usize) {
    for _ in 0..count {
        app.store
            .activate_enrollment(&ActivateEnrollment {
                org_id,
                course_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                payment_reference: None,
            })
            .await
            .expect("Failed to seed enrollment");
    }
}

#[tokio::test]
async fn invoice_moves_from_draft_to_open_to_paid() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();
    seed_students(&app, org.id, 15).await;

    let response = app
        .admin_post(
            "/admin/invoices/generate",
            &json!({ "orgId": org.id, "periodStart": "2026-09-01" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);

    let invoice = &body["data"];
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["periodStart"], "2026-09-01");
    assert_eq!(invoice["periodEnd"], "2026-10-01");
    assert_eq!(invoice["total"], 1000);
    assert_eq!(invoice["amountDue"], 1000);
    assert_eq!(invoice["lineItems"][0]["metric"], "active_students");
    assert_eq!(invoice["lineItems"][0]["amount"], 1000);
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let body = json_body(
        app.admin_post("/admin/invoices/send", &json!({ "invoiceId": invoice_id }))
            .await,
    )
    .await;
    assert_eq!(body["data"]["status"], "open");
    let expected_due = (Utc::now().date_naive() + Duration::days(30)).to_string();
    assert_eq!(body["data"]["dueDate"], expected_due.as_str());
    assert!(body["data"]["sentAt"].is_string());

    let body = json_body(
        app.admin_post(
            "/admin/invoices/mark-paid",
            &json!({ "invoiceId": invoice_id }),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["amountPaid"], 1000);
    assert!(body["data"]["paidAt"].is_string());
}

#[tokio::test]
async fn paid_invoice_cannot_be_reopened() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();

    let body = json_body(
        app.admin_post("/admin/invoices/generate", &json!({ "orgId": org.id }))
            .await,
    )
    .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .admin_post(
            "/admin/invoices/mark-paid",
            &json!({ "invoiceId": invoice_id, "amountPaid": 0 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .admin_post("/admin/invoices/send", &json!({ "invoiceId": invoice_id }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);

    let body = json_body(app.admin_get(&format!("/admin/invoices/{}", invoice_id)).await).await;
    assert_eq!(body["data"]["status"], "paid");
}

#[tokio::test]
async fn duplicate_period_is_rejected() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();
    let request = json!({ "orgId": org.id, "periodStart": "2026-08-01", "periodEnd": "2026-09-01" });

    let first = app.admin_post("/admin/invoices/generate", &request).await;
    assert_eq!(first.status().as_u16(), 200);

    let second = app.admin_post("/admin/invoices/generate", &request).await;
    assert_eq!(second.status().as_u16(), 400);

    let body = json_body(app.admin_get(&format!("/admin/invoices?orgId={}", org.id)).await).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_organization_returns_404() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_post(
            "/admin/invoices/generate",
            &json!({ "orgId": Uuid::new_v4() }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn inverted_period_returns_400() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();

    let response = app
        .admin_post(
            "/admin/invoices/generate",
            &json!({ "orgId": org.id, "periodStart": "2026-09-01", "periodEnd": "2026-09-01" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn negative_payment_returns_400() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();
    let body = json_body(
        app.admin_post("/admin/invoices/generate", &json!({ "orgId": org.id }))
            .await,
    )
    .await;

    let response = app
        .admin_post(
            "/admin/invoices/mark-paid",
            &json!({ "invoiceId": body["data"]["id"], "amountPaid": -100 }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_invoice_returns_404() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_post("/admin/invoices/send", &json!({ "invoiceId": Uuid::new_v4() }))
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .admin_get(&format!("/admin/invoices/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();

    let body = json_body(
        app.admin_post(
            "/admin/invoices/generate",
            &json!({ "orgId": org.id, "periodStart": "2026-07-01" }),
        )
        .await,
    )
    .await;
    app.admin_post(
        "/admin/invoices/send",
        &json!({ "invoiceId": body["data"]["id"] }),
    )
    .await;
    app.admin_post(
        "/admin/invoices/generate",
        &json!({ "orgId": org.id, "periodStart": "2026-08-01" }),
    )
    .await;

    let body = json_body(app.admin_get("/admin/invoices?status=open").await).await;
    let open = body["data"].as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["periodStart"], "2026-07-01");

    let body = json_body(app.admin_get(&format!("/admin/invoices?orgId={}", org.id)).await).await;
    let all = body["data"].as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["periodStart"], "2026-08-01");
}

#[tokio::test]
async fn admin_routes_require_admin_key() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/admin/invoices/generate", app.http_address))
        .json(&json!({ "orgId": Uuid::new_v4() }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .get(format!("{}/admin/invoices", app.http_address))
        .header("X-Admin-Api-Key", "wrong-key")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_identifiers_return_envelope() {
    let app = TestApp::spawn().await;

    let response = app.admin_get("/admin/invoices/not-a-uuid").await;
    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let response = app.admin_get("/admin/invoices?status=overdue").await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(json_body(response).await["success"], false);

    let response = app.admin_get("/admin/orgs/not-a-uuid/usage").await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(json_body(response).await["success"], false);
}

#[tokio::test]
async fn period_bound_at_calendar_limit_returns_400() {
    let app = TestApp::spawn().await;
    let org = app.store.insert_organization("Acme Academy").unwrap();

    let response = app
        .admin_post(
            "/admin/invoices/generate",
            &json!({ "orgId": org.id, "periodStart": "+262142-12-15" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(json_body(response).await["success"], false);

    let response = app
        .admin_get(&format!(
            "/admin/orgs/{}/usage?periodStart=%2B262142-12-15",
            org.id
        ))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}
