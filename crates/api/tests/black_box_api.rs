use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str, dunning_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app =
            facturier_api::app::build_app(jwt_secret.to_string(), dunning_secret.to_string())
                .await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(serde::Serialize)]
struct WireClaims {
    sub: Uuid,
    account_id: Uuid,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

fn mint_jwt(jwt_secret: &str, account_id: Uuid, roles: Vec<&str>) -> String {
    let now = Utc::now().timestamp();
    let claims = WireClaims {
        sub: Uuid::now_v7(),
        account_id,
        roles: roles.into_iter().map(String::from).collect(),
        iat: now - 10,
        exp: now + 600,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> serde_json::Value {
    // The API is intentionally eventual-consistent (command path vs
    // projection update). Poll briefly until the projection catches up.
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();
        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("resource did not become visible in projection within timeout");
}

async fn create_client(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> String {
    let res = client
        .post(format!("{}/clients", base_url))
        .bearer_auth(token)
        .json(&json!({
            "kind": "company",
            "name": "Client SARL",
            "email": "compta@client.example",
            "payment_terms_days": 30,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_string();

    // Wait for the projection before referencing the client in documents.
    get_eventually(client, &format!("{}/clients/{}", base_url, id), token).await;
    id
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn("test-secret", "cron-secret").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let account_id = Uuid::now_v7();
    let token = mint_jwt(jwt_secret, account_id, vec!["admin"]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["account_id"].as_str().unwrap(), account_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn billing_lifecycle_quote_to_paid_invoice() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let account_id = Uuid::now_v7();
    let token = mint_jwt(jwt_secret, account_id, vec!["admin"]);
    let client = reqwest::Client::new();

    let client_id = create_client(&client, &srv.base_url, &token).await;

    // Create a quote: 2 × 100.00 @ 20% → 240.00 TTC.
    let res = client
        .post(format!("{}/quotes", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "client_id": client_id,
            "validity_date": "2099-12-31",
            "lines": [
                { "description": "Audit", "quantity": "2", "unit_price": "100.00", "tax_rate": "20" }
            ],
            "deposit_percent": "30",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let quote_id = created["id"].as_str().unwrap().to_string();
    assert!(created["number"].as_str().unwrap().starts_with("DEV-"));

    let quote =
        get_eventually(&client, &format!("{}/quotes/{}", srv.base_url, quote_id), &token).await;
    assert_eq!(quote["status"], "draft");
    assert_eq!(quote["total_ttc"], "240.00");
    assert_eq!(quote["deposit"]["amount"], "72.00");

    // Send → accept.
    for action in ["send", "accept"] {
        let res = client
            .post(format!("{}/quotes/{}/{}", srv.base_url, quote_id, action))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "action {action} failed");
    }

    // Convert to invoice.
    let res = client
        .post(format!("{}/quotes/{}/convert", srv.base_url, quote_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let converted: serde_json::Value = res.json().await.unwrap();
    let invoice_id = converted["invoice_id"].as_str().unwrap().to_string();

    // A second conversion is rejected.
    let res = client
        .post(format!("{}/quotes/{}/convert", srv.base_url, quote_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let invoice = get_eventually(
        &client,
        &format!("{}/invoices/{}", srv.base_url, invoice_id),
        &token,
    )
    .await;
    assert_eq!(invoice["total_ttc"], "240.00");
    assert_eq!(invoice["amount_due"], "240.00");
    assert!(invoice["number"].as_str().unwrap().starts_with("FAC-"));

    // Send the invoice, then pay it in two installments.
    let res = client
        .post(format!("{}/invoices/{}/send", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/invoices/{}/payments", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .json(&json!({ "amount": "100.00", "method": "bank_transfer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/invoices/{}/payments", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .json(&json!({ "amount": "140.00", "method": "card" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Overpayment after full settlement is rejected.
    let res = client
        .post(format!("{}/invoices/{}/payments", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .json(&json!({ "amount": "0.01", "method": "cash" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Projection eventually shows the paid invoice.
    for _ in 0..50 {
        let invoice = get_eventually(
            &client,
            &format!("{}/invoices/{}", srv.base_url, invoice_id),
            &token,
        )
        .await;
        if invoice["status"] == "paid" {
            assert_eq!(invoice["amount_paid"], "240.00");
            assert_eq!(invoice["amount_due"], "0.00");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("invoice never became paid in projection");
}

#[tokio::test]
async fn overpayment_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let account_id = Uuid::now_v7();
    let token = mint_jwt(jwt_secret, account_id, vec!["admin"]);
    let client = reqwest::Client::new();

    let client_id = create_client(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/invoices", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "client_id": client_id,
            "lines": [
                { "description": "Conseil", "quantity": "1", "unit_price": "100.00", "tax_rate": "0" }
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let invoice_id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/invoices/{}/send", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/invoices/{}/payments", srv.base_url, invoice_id))
        .bearer_auth(&token)
        .json(&json!({ "amount": "100.01", "method": "card" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unauthorized_access_blocked_for_commands() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let account_id = Uuid::now_v7();
    // Not admin => permission mapping returns empty => forbidden for commands.
    let token = mint_jwt(jwt_secret, account_id, vec!["viewer"]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/clients", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "kind": "company", "name": "Client SARL" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn account_isolation_blocks_cross_account_reads() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let token1 = mint_jwt(jwt_secret, Uuid::now_v7(), vec!["admin"]);
    let token2 = mint_jwt(jwt_secret, Uuid::now_v7(), vec!["admin"]);

    let client = reqwest::Client::new();
    let client_id = create_client(&client, &srv.base_url, &token1).await;

    // The other account cannot read it (projection lookup is account-scoped).
    let res = client
        .get(format!("{}/clients/{}", srv.base_url, client_id))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dunning_endpoint_requires_shared_secret() {
    let srv = TestServer::spawn("test-secret", "cron-secret").await;
    let client = reqwest::Client::new();

    // No secret.
    let res = client
        .post(format!("{}/dunning/run", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Wrong secret.
    let res = client
        .post(format!("{}/dunning/run", srv.base_url))
        .header("x-dunning-secret", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Correct secret: returns aggregate counts only.
    let res = client
        .post(format!("{}/dunning/run", srv.base_url))
        .header("x-dunning-secret", "cron-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["sent"], 0);
    assert_eq!(body["errored"], 0);
}

#[tokio::test]
async fn draft_quote_can_be_deleted_but_sent_quote_cannot() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret, "cron-secret").await;

    let account_id = Uuid::now_v7();
    let token = mint_jwt(jwt_secret, account_id, vec!["admin"]);
    let client = reqwest::Client::new();

    let client_id = create_client(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/quotes", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "client_id": client_id,
            "validity_date": "2099-12-31",
            "lines": [
                { "description": "Conseil", "quantity": "1", "unit_price": "50.00", "tax_rate": "20" }
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let quote_id = body["id"].as_str().unwrap().to_string();

    // Deletable while draft.
    let res = client
        .delete(format!("{}/quotes/{}", srv.base_url, quote_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // A second quote, sent, is no longer deletable.
    let res = client
        .post(format!("{}/quotes", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "client_id": client_id,
            "validity_date": "2099-12-31",
            "lines": [
                { "description": "Conseil", "quantity": "1", "unit_price": "50.00", "tax_rate": "20" }
            ],
        }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let quote_id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/quotes/{}/send", srv.base_url, quote_id))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(format!("{}/quotes/{}", srv.base_url, quote_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
