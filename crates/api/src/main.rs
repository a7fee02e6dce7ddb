#[tokio::main]
async fn main() {
    facturier_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let dunning_secret = std::env::var("DUNNING_SECRET").unwrap_or_else(|_| {
        tracing::warn!("DUNNING_SECRET not set; using insecure dev default");
        "dev-dunning-secret".to_string()
    });

    let app = facturier_api::app::build_app(jwt_secret, dunning_secret).await;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
