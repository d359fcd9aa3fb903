use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use crate::host;
use crate::sub::link::rewrite_host;
use crate::AppState;

const SUBS_ERROR: &str = "Error retrieving subscriptions!";
const JSON_ERROR: &str = "Error retrieving JSON data!";

/// GET {sub_path}{subid} - 链接订阅
pub async fn subs(
    Extension(state): Extension<AppState>,
    Path(sub_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let host = host::from_headers(&headers);

    let settings = state.sub_service.settings();

    match state.sub_service.get_subs(&sub_id, &host).await {
        Ok((subs, header)) => {
            let Some(headers) = profile_headers(header, &settings.update_interval, &sub_id) else {
                warn!("订阅 {:?} 的响应头包含非法字符", sub_id);
                return (StatusCode::BAD_REQUEST, SUBS_ERROR).into_response();
            };
            let body = build_subs_response(&subs, &host, &settings.alternate_host);
            let body = if settings.encrypt { STANDARD.encode(body) } else { body };
            (StatusCode::OK, headers, body).into_response()
        }
        Err(e) => {
            warn!("订阅 {} 生成失败: {}", sub_id, e);
            (StatusCode::BAD_REQUEST, SUBS_ERROR).into_response()
        }
    }
}

/// GET {sub_json_path}{subid} - JSON 订阅
pub async fn sub_jsons(
    Extension(state): Extension<AppState>,
    Path(sub_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let host = host::from_headers(&headers);

    let settings = state.sub_service.settings();

    match state.sub_json_service.get_json(&sub_id, &host).await {
        Ok((body, header)) => match profile_headers(header, &settings.update_interval, &sub_id) {
            Some(headers) => (StatusCode::OK, headers, body).into_response(),
            None => {
                warn!("JSON 订阅 {:?} 的响应头包含非法字符", sub_id);
                (StatusCode::BAD_REQUEST, JSON_ERROR).into_response()
            }
        },
        Err(e) => {
            warn!("JSON 订阅 {} 生成失败: {}", sub_id, e);
            (StatusCode::BAD_REQUEST, JSON_ERROR).into_response()
        }
    }
}

/// 订阅相关响应头，取值无法作为 header 时返回 None
fn profile_headers(userinfo: String, update_interval: &str, sub_id: &str) -> Option<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("subscription-userinfo", HeaderValue::try_from(userinfo).ok()?);
    headers.insert("profile-update-interval", HeaderValue::try_from(update_interval).ok()?);
    headers.insert("profile-title", HeaderValue::try_from(sub_id).ok()?);
    Some(headers)
}

/// 每条链接后追加一条主机替换后的副本，均以换行结尾
pub fn build_subs_response(subs: &[String], host: &str, alternate: &str) -> String {
    subs.iter()
        .map(|sub| format!("{}\n{}\n", sub, rewrite_host(sub, host, alternate)))
        .collect()
}
