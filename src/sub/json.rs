//! JSON 订阅：为每个客户端生成一份完整的 Xray 客户端配置

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::inbound::{Client, InboundSettings, Protocol, StreamSettings};
use super::link::client_method;
use super::service::{client_summary, subscribed_emails, SubService};
use super::{LinkError, SubError};
use crate::store::InboundRecord;
use crate::traffic::TrafficSummary;

const SOCKS_PORT: u16 = 10808;
const HTTP_PORT: u16 = 10809;

/// JSON 订阅服务，复用链接订阅的入站解析流程
#[derive(Clone)]
pub struct SubJsonService {
    sub: SubService,
    fragment: Option<Value>,
    noise: Option<Value>,
    mux: Option<Value>,
    rules: Vec<Value>,
}

impl SubJsonService {
    pub fn new(sub: SubService) -> Self {
        let settings = sub.settings();
        let fragment = parse_addon("fragment", &settings.json_fragment);
        let noise = parse_addon("noise", &settings.json_noise);
        let mux = parse_addon("mux", &settings.json_mux);
        let rules = match parse_addon("rules", &settings.json_rules) {
            Some(Value::Array(rules)) => rules,
            Some(other) => vec![other],
            None => Vec::new(),
        };

        Self {
            sub,
            fragment,
            noise,
            mux,
            rules,
        }
    }

    /// 生成 JSON 配置数组和 `Subscription-Userinfo` 头
    pub async fn get_json(&self, sub_id: &str, host: &str) -> Result<(String, String), SubError> {
        self.get_json_at(sub_id, host, Utc::now()).await
    }

    pub(crate) async fn get_json_at(
        &self,
        sub_id: &str,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, String), SubError> {
        let records = self.sub.resolve_inbounds(sub_id).await?;
        let remark = self.sub.remark_style(now).await;

        let mut configs = Vec::new();
        let mut traffics = Vec::new();

        for record in &records {
            for email in subscribed_emails(record, sub_id) {
                match self.proxy_outbound(record, &email, host) {
                    Ok(proxy) => {
                        let remarks = remark.build(&record.inbound, &record.client_stats, &email);
                        configs.push(self.client_config(&remarks, proxy));
                        traffics.push(client_summary(record, &email));
                    }
                    Err(e) => {
                        warn!("⚠️ 客户端 {} JSON 配置生成失败，已跳过: {}", email, e);
                    }
                }
            }
        }

        if configs.is_empty() {
            return Err(SubError::NotFound(sub_id.to_string()));
        }

        debug!("订阅 {} 生成 {} 份 JSON 配置", sub_id, configs.len());
        let body = serde_json::to_string_pretty(&configs).map_err(anyhow::Error::from)?;
        Ok((body, TrafficSummary::fold(traffics).header()))
    }

    fn client_config(&self, remarks: &str, mut proxy: Value) -> Value {
        let mut outbounds = Vec::new();

        if let Some(mux) = &self.mux {
            proxy["mux"] = mux.clone();
        }
        if let Some(fragment) = &self.fragment {
            proxy["streamSettings"]["sockopt"]["dialerProxy"] = json!("fragment");
            outbounds.push(proxy);
            outbounds.push(json!({
                "tag": "fragment",
                "protocol": "freedom",
                "settings": {"domainStrategy": "AsIs", "fragment": fragment}
            }));
        } else {
            outbounds.push(proxy);
        }
        if let Some(noise) = &self.noise {
            outbounds.push(json!({
                "tag": "noise",
                "protocol": "freedom",
                "settings": {"domainStrategy": "AsIs", "noises": noise}
            }));
        }
        outbounds.push(json!({"tag": "direct", "protocol": "freedom", "settings": {}}));
        outbounds.push(json!({"tag": "block", "protocol": "blackhole", "settings": {}}));

        let mut rules = self.rules.clone();
        rules.push(json!({"type": "field", "network": "tcp,udp", "outboundTag": "proxy"}));

        json!({
            "remarks": remarks,
            "log": {"access": "", "error": "", "loglevel": "warning"},
            "dns": {"servers": ["1.1.1.1", "8.8.8.8"], "queryStrategy": "UseIPv4"},
            "inbounds": [
                {
                    "tag": "socks",
                    "listen": "127.0.0.1",
                    "port": SOCKS_PORT,
                    "protocol": "socks",
                    "settings": {"auth": "noauth", "udp": true},
                    "sniffing": {"enabled": true, "destOverride": ["http", "tls"]}
                },
                {
                    "tag": "http",
                    "listen": "127.0.0.1",
                    "port": HTTP_PORT,
                    "protocol": "http",
                    "settings": {}
                }
            ],
            "outbounds": outbounds,
            "routing": {"domainStrategy": "AsIs", "rules": rules}
        })
    }

    /// 由入站生成客户端侧的 proxy 出站
    fn proxy_outbound(&self, record: &InboundRecord, email: &str, host: &str) -> Result<Value, LinkError> {
        let protocol: Protocol = record.inbound.protocol.parse()?;
        let settings = InboundSettings::parse(&record.inbound.settings)?;
        let client = settings.client(email)?;
        let stream = StreamSettings::parse(&record.inbound.stream_settings)?;
        let port = record.inbound.port;

        let outbound_settings = match protocol {
            Protocol::Vmess | Protocol::Vless => json!({
                "vnext": [{
                    "address": host,
                    "port": port,
                    "users": [user(protocol, client)]
                }]
            }),
            Protocol::Trojan => json!({
                "servers": [{"address": host, "port": port, "password": client.password, "level": 8}]
            }),
            Protocol::Shadowsocks => {
                let (method, password) = if settings.method.starts_with("2022") {
                    (settings.method.as_str(), format!("{}:{}", settings.password, client.password))
                } else {
                    (client_method(&settings, client), client.password.clone())
                };
                json!({
                    "servers": [{
                        "address": host,
                        "port": port,
                        "method": method,
                        "password": password,
                        "level": 8
                    }]
                })
            }
        };

        Ok(json!({
            "tag": "proxy",
            "protocol": protocol.as_str(),
            "settings": outbound_settings,
            "streamSettings": client_stream(&stream)
        }))
    }
}

fn user(protocol: Protocol, client: &Client) -> Value {
    let mut user = Map::new();
    user.insert("id".into(), json!(client.id));
    if protocol == Protocol::Vmess {
        let security = if client.security.is_empty() { "auto" } else { client.security.as_str() };
        user.insert("security".into(), json!(security));
    } else {
        user.insert("encryption".into(), json!("none"));
        if !client.flow.is_empty() {
            user.insert("flow".into(), json!(client.flow));
        }
    }
    user.insert("level".into(), json!(8));
    Value::Object(user)
}

/// 把服务端传输设置转换为客户端写法
fn client_stream(stream: &StreamSettings) -> Value {
    let network = stream.network();
    let mut out = Map::new();
    out.insert("network".into(), json!(network));

    let transport_key = format!("{}Settings", network);
    if let Some(transport) = stream.raw().get(&transport_key) {
        out.insert(transport_key, transport.clone());
    }

    match stream.security() {
        "tls" => {
            let mut tls = Map::new();
            insert_some(&mut tls, "serverName", stream.str_at("/tlsSettings/serverName"));
            insert_some(&mut tls, "fingerprint", stream.str_at("/tlsSettings/settings/fingerprint"));
            if let Some(alpn) = stream.raw().pointer("/tlsSettings/alpn") {
                tls.insert("alpn".into(), alpn.clone());
            }
            if stream.bool_at("/tlsSettings/settings/allowInsecure") {
                tls.insert("allowInsecure".into(), json!(true));
            }
            out.insert("security".into(), json!("tls"));
            out.insert("tlsSettings".into(), Value::Object(tls));
        }
        "reality" => {
            let mut reality = Map::new();
            insert_some(&mut reality, "serverName", stream.first_at("/realitySettings/serverNames"));
            insert_some(&mut reality, "publicKey", stream.str_at("/realitySettings/settings/publicKey"));
            insert_some(&mut reality, "shortId", stream.first_at("/realitySettings/shortIds"));
            insert_some(&mut reality, "spiderX", stream.str_at("/realitySettings/settings/spiderX"));
            insert_some(&mut reality, "fingerprint", stream.str_at("/realitySettings/settings/fingerprint"));
            out.insert("security".into(), json!("reality"));
            out.insert("realitySettings".into(), Value::Object(reality));
        }
        _ => {
            out.insert("security".into(), json!("none"));
        }
    }

    Value::Object(out)
}

fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

/// 解析配置中的附加项，格式错误时记录日志并忽略
fn parse_addon(name: &str, raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("⚠️ JSON 订阅附加项 {} 格式错误，已忽略: {}", name, e);
            None
        }
    }
}
