//! 分享链接渲染
//!
//! 地址始终使用请求解析出的主机，端口取入站端口（回落入站已替换为主入站端口）。

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};

use super::inbound::{Client, InboundSettings, Protocol, StreamSettings};
use super::remark::RemarkStyle;
use super::LinkError;
use crate::store::InboundRecord;

type Params = Vec<(&'static str, String)>;

/// 渲染指定客户端的分享链接
pub fn render_link(record: &InboundRecord, email: &str, host: &str, remark: &RemarkStyle) -> Result<String, LinkError> {
    let protocol: Protocol = record.inbound.protocol.parse()?;
    let settings = InboundSettings::parse(&record.inbound.settings)?;
    let client = settings.client(email)?;
    let stream = StreamSettings::parse(&record.inbound.stream_settings)?;
    let remark = remark.build(&record.inbound, &record.client_stats, email);

    let target = LinkTarget {
        host,
        port: record.inbound.port,
        remark: &remark,
    };

    Ok(match protocol {
        Protocol::Vmess => vmess_link(&target, client, &stream)?,
        Protocol::Vless => vless_link(&target, client, &stream),
        Protocol::Trojan => trojan_link(&target, client, &stream),
        Protocol::Shadowsocks => shadowsocks_link(&target, &settings, client, &stream),
    })
}

/// 把链接中第一次出现的主机替换为备用主机
pub fn rewrite_host(link: &str, host: &str, alternate: &str) -> String {
    if host.is_empty() {
        return link.to_string();
    }
    link.replacen(host, alternate, 1)
}

struct LinkTarget<'a> {
    host: &'a str,
    port: i32,
    remark: &'a str,
}

impl LinkTarget<'_> {
    fn uri(&self, scheme: &str, user: &str, params: &Params) -> String {
        format!(
            "{}://{}@{}:{}?{}#{}",
            scheme,
            user,
            self.host,
            self.port,
            encode_params(params),
            urlencoding::encode(self.remark)
        )
    }
}

fn encode_params(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn vmess_link(target: &LinkTarget<'_>, client: &Client, stream: &StreamSettings) -> Result<String, LinkError> {
    let network = stream.network();
    let mut obj = Map::new();
    obj.insert("v".into(), json!("2"));
    obj.insert("ps".into(), json!(target.remark));
    obj.insert("add".into(), json!(target.host));
    obj.insert("port".into(), json!(target.port));
    obj.insert("id".into(), json!(client.id));
    let scy = if client.security.is_empty() { "auto" } else { client.security.as_str() };
    obj.insert("scy".into(), json!(scy));
    obj.insert("net".into(), json!(network));
    obj.insert("type".into(), json!("none"));

    // vmess 的 JSON 字段名与查询参数不同
    for (key, value) in transport_params(stream) {
        let key = match key {
            "headerType" => "type",
            "serviceName" | "seed" => "path",
            other => other,
        };
        obj.insert(key.into(), json!(value));
    }

    if stream.security() == "tls" {
        obj.insert("tls".into(), json!("tls"));
        for (key, value) in tls_params(stream) {
            obj.insert(key.into(), json!(value));
        }
    } else {
        obj.insert("tls".into(), json!("none"));
    }

    let body = serde_json::to_string_pretty(&Value::Object(obj))?;
    Ok(format!("vmess://{}", STANDARD.encode(body)))
}

fn vless_link(target: &LinkTarget<'_>, client: &Client, stream: &StreamSettings) -> String {
    let mut params: Params = vec![("type", stream.network().to_string()), ("encryption", "none".to_string())];
    params.extend(transport_params(stream));
    params.extend(security_params(stream, Some(client)));
    target.uri("vless", &client.id, &params)
}

fn trojan_link(target: &LinkTarget<'_>, client: &Client, stream: &StreamSettings) -> String {
    let mut params: Params = vec![("type", stream.network().to_string())];
    params.extend(transport_params(stream));
    params.extend(security_params(stream, None));
    target.uri("trojan", &client.password, &params)
}

fn shadowsocks_link(
    target: &LinkTarget<'_>,
    settings: &InboundSettings,
    client: &Client,
    stream: &StreamSettings,
) -> String {
    let user_info = if settings.method.starts_with("2022") {
        format!("{}:{}:{}", settings.method, settings.password, client.password)
    } else {
        format!("{}:{}", client_method(settings, client), client.password)
    };

    let mut params: Params = vec![("type", stream.network().to_string())];
    params.extend(transport_params(stream));
    if stream.security() == "tls" {
        params.extend(security_params(stream, None));
    }
    target.uri("ss", &STANDARD.encode(user_info), &params)
}

/// 客户端未单独指定时使用入站的加密方式
pub(crate) fn client_method<'a>(settings: &'a InboundSettings, client: &'a Client) -> &'a str {
    if client.method.is_empty() {
        &settings.method
    } else {
        &client.method
    }
}

/// 传输层参数
fn transport_params(stream: &StreamSettings) -> Params {
    let mut params = Params::new();
    let mut push = |key: &'static str, value: Option<&str>| {
        if let Some(v) = value {
            params.push((key, v.to_string()));
        }
    };

    match stream.network() {
        "tcp" => {
            let header_type = stream.str_at("/tcpSettings/header/type").unwrap_or("none");
            push("headerType", Some(header_type));
            if header_type == "http" {
                push("path", stream.first_at("/tcpSettings/header/request/path"));
                push("host", stream.header_host("/tcpSettings/header/request/headers"));
            }
        }
        "ws" => {
            push("path", stream.str_at("/wsSettings/path"));
            push(
                "host",
                stream
                    .str_at("/wsSettings/host")
                    .or_else(|| stream.header_host("/wsSettings/headers")),
            );
        }
        "grpc" => {
            push("serviceName", stream.str_at("/grpcSettings/serviceName"));
            push("authority", stream.str_at("/grpcSettings/authority"));
            if stream.bool_at("/grpcSettings/multiMode") {
                push("mode", Some("multi"));
            }
        }
        "kcp" => {
            push("headerType", Some(stream.str_at("/kcpSettings/header/type").unwrap_or("none")));
            push("seed", stream.str_at("/kcpSettings/seed"));
        }
        "httpupgrade" => {
            push("path", stream.str_at("/httpupgradeSettings/path"));
            push(
                "host",
                stream
                    .str_at("/httpupgradeSettings/host")
                    .or_else(|| stream.header_host("/httpupgradeSettings/headers")),
            );
        }
        "xhttp" => {
            push("path", stream.str_at("/xhttpSettings/path"));
            push(
                "host",
                stream
                    .str_at("/xhttpSettings/host")
                    .or_else(|| stream.header_host("/xhttpSettings/headers")),
            );
            push("mode", stream.str_at("/xhttpSettings/mode"));
        }
        _ => {}
    }

    params
}

fn tls_params(stream: &StreamSettings) -> Params {
    let mut params = Params::new();
    if let Some(fp) = stream.str_at("/tlsSettings/settings/fingerprint") {
        params.push(("fp", fp.to_string()));
    }
    if let Some(alpn) = stream.joined_at("/tlsSettings/alpn") {
        params.push(("alpn", alpn));
    }
    if let Some(sni) = stream.str_at("/tlsSettings/serverName") {
        params.push(("sni", sni.to_string()));
    }
    params
}

/// 安全层参数，`flow` 仅对 tcp 传输的 vless 客户端输出
fn security_params(stream: &StreamSettings, vless_client: Option<&Client>) -> Params {
    let flow = vless_client
        .map(|c| c.flow.as_str())
        .filter(|f| !f.is_empty() && stream.network() == "tcp");

    let mut params = Params::new();
    match stream.security() {
        "tls" => {
            params.push(("security", "tls".to_string()));
            params.extend(tls_params(stream));
            if let Some(flow) = flow {
                params.push(("flow", flow.to_string()));
            }
        }
        "reality" => {
            params.push(("security", "reality".to_string()));
            let fields = [
                ("pbk", stream.str_at("/realitySettings/settings/publicKey")),
                ("fp", stream.str_at("/realitySettings/settings/fingerprint")),
                ("sni", stream.first_at("/realitySettings/serverNames")),
                ("sid", stream.first_at("/realitySettings/shortIds")),
                ("spx", stream.str_at("/realitySettings/settings/spiderX")),
            ];
            for (key, value) in fields {
                if let Some(v) = value {
                    params.push((key, v.to_string()));
                }
            }
            if let Some(flow) = flow {
                params.push(("flow", flow.to_string()));
            }
        }
        _ => params.push(("security", "none".to_string())),
    }
    params
}
