use axum::routing::get;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;

pub mod handlers;

/// 构建订阅路由
pub fn build_router(app_state: AppState) -> Router {
    let sub_route = route_path(&app_state.config.sub_path);
    let json_route = route_path(&app_state.config.sub_json_path);

    Router::new()
        .route(&sub_route, get(handlers::subs))
        .route(&json_route, get(handlers::sub_jsons))
        .layer(Extension(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// 启动订阅 HTTP 服务
pub fn start_web_server(app_state: AppState) -> tokio::task::JoinHandle<()> {
    let bind_addr = app_state.config.get_bind_addr();
    let app = build_router(app_state);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(bind_addr.clone()).await {
            Ok(listener) => {
                info!("🌐 订阅服务: http://{}", bind_addr);
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!("订阅服务错误：{}", err);
                }
            }
            Err(err) => {
                tracing::error!("订阅服务启动失败：{}", err);
            }
        }
    })
}

/// `/sub/` -> `/sub/{subid}`，前后斜杠可省略
pub fn route_path(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/{subid}".to_string()
    } else {
        format!("/{}/{{subid}}", trimmed)
    }
}
