//! 对外可见主机解析
//!
//! 订阅链接中的地址取自请求上下文，优先级：
//! X-Forwarded-Host > X-Real-IP > Host（去端口）> Host 原值。

use axum::http::{header, HeaderMap};

pub const FORWARDED_HOST: &str = "x-forwarded-host";
pub const REAL_IP: &str = "x-real-ip";

/// 从请求头中解析对外可见的主机
pub fn from_headers(headers: &HeaderMap) -> String {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let request_host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    resolve_host(get(FORWARDED_HOST), get(REAL_IP), request_host)
}

/// 按优先级解析主机，永不失败
pub fn resolve_host(forwarded_host: Option<&str>, real_ip: Option<&str>, request_host: &str) -> String {
    if let Some(host) = forwarded_host.and_then(host_from_forwarded) {
        return host.to_string();
    }
    if let Some(ip) = real_ip.filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }
    if let Some((host, _)) = split_host_port(request_host) {
        return host.to_string();
    }
    request_host.to_string()
}

fn host_from_forwarded(value: &str) -> Option<&str> {
    if value.is_empty() {
        return None;
    }
    if value.contains(':') {
        return split_host_port(value).map(|(host, _)| host);
    }
    Some(value)
}

/// 拆分 `host:port`，支持 `[ipv6]:port`，格式错误返回 None
pub fn split_host_port(hostport: &str) -> Option<(&str, &str)> {
    let colon = hostport.rfind(':')?;

    let (host, inner_start, after_bracket) = if hostport.starts_with('[') {
        let end = hostport.find(']')?;
        // `]` 之后必须紧跟最后一个冒号
        if end + 1 != colon {
            return None;
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return None;
        }
        (host, 0, 0)
    };

    if hostport[inner_start..].contains('[') || hostport[after_bracket..].contains(']') {
        return None;
    }

    Some((host, &hostport[colon + 1..]))
}
