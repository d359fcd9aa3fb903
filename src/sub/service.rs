//! 链接订阅服务

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::inbound::InboundSettings;
use super::link::{render_link, rewrite_host};
use super::remark::{DatePicker, RemarkStyle};
use super::SubError;
use crate::config::SubSettings;
use crate::entity::client_traffic;
use crate::store::{InboundRecord, InboundRepository, SettingProvider};
use crate::traffic::TrafficSummary;

/// 链接订阅服务
///
/// 每次请求独立执行：查询入站、解析回落主入站、逐个客户端渲染链接并汇总流量。
/// 不持有可变状态，可在请求间共享。
#[derive(Clone)]
pub struct SubService {
    settings: Arc<SubSettings>,
    inbounds: Arc<dyn InboundRepository>,
    setting_provider: Arc<dyn SettingProvider>,
}

impl SubService {
    pub fn new(
        settings: Arc<SubSettings>,
        inbounds: Arc<dyn InboundRepository>,
        setting_provider: Arc<dyn SettingProvider>,
    ) -> Self {
        Self {
            settings,
            inbounds,
            setting_provider,
        }
    }

    pub fn settings(&self) -> &SubSettings {
        &self.settings
    }

    /// 生成订阅链接列表和 `Subscription-Userinfo` 头
    ///
    /// 每个客户端依次产生原始链接和替换主机后的链接，共 2N 条。
    pub async fn get_subs(&self, sub_id: &str, host: &str) -> Result<(Vec<String>, String), SubError> {
        self.get_subs_at(sub_id, host, Utc::now()).await
    }

    pub(crate) async fn get_subs_at(
        &self,
        sub_id: &str,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<String>, String), SubError> {
        let records = self.resolve_inbounds(sub_id).await?;
        let remark = self.remark_style(now).await;

        let mut links = Vec::new();
        let mut traffics = Vec::new();

        for record in &records {
            for email in subscribed_emails(record, sub_id) {
                match render_link(record, &email, host, &remark) {
                    Ok(link) => {
                        let rewritten = rewrite_host(&link, host, &self.settings.alternate_host);
                        links.push(link);
                        links.push(rewritten);
                        traffics.push(client_summary(record, &email));
                    }
                    Err(e) => {
                        warn!("⚠️ 客户端 {} 链接生成失败，已跳过: {}", email, e);
                    }
                }
            }
        }

        if links.is_empty() {
            return Err(SubError::NotFound(sub_id.to_string()));
        }

        let header = TrafficSummary::fold(traffics).header();
        debug!("订阅 {} 生成 {} 条链接", sub_id, links.len());

        Ok((links, header))
    }

    /// 查询订阅下的入站，并把回落入站替换为主入站的监听信息
    pub(crate) async fn resolve_inbounds(&self, sub_id: &str) -> Result<Vec<InboundRecord>, SubError> {
        let mut records = self.inbounds.find_inbounds_by_sub_id(sub_id).await?;
        if records.is_empty() {
            return Err(SubError::NotFound(sub_id.to_string()));
        }

        for record in records.iter_mut() {
            if !record.inbound.listen.starts_with('@') {
                continue;
            }

            match self
                .inbounds
                .resolve_fallback_master(&record.inbound.listen, &record.inbound.stream_settings)
                .await
            {
                Ok(master) => {
                    record.inbound.listen = master.listen;
                    record.inbound.port = master.port;
                    record.inbound.stream_settings = master.stream_settings;
                }
                Err(e) => {
                    warn!("⚠️ 入站 {} 回落主入站解析失败: {}", record.inbound.tag, e);
                }
            }
        }

        Ok(records)
    }

    pub(crate) async fn remark_style(&self, now: DateTime<Utc>) -> RemarkStyle {
        let datepicker = match self.setting_provider.datepicker().await {
            Ok(value) => DatePicker::from_setting(&value),
            Err(e) => {
                warn!("读取日期选择器设置失败，使用公历: {}", e);
                DatePicker::Gregorian
            }
        };

        RemarkStyle::new(&self.settings.remark_model, self.settings.show_info, datepicker, now)
    }
}

/// 入站中属于该订阅且已启用的客户端邮箱
pub(crate) fn subscribed_emails(record: &InboundRecord, sub_id: &str) -> Vec<String> {
    match InboundSettings::parse(&record.inbound.settings) {
        Ok(settings) => settings.subscribed(sub_id).map(|c| c.email.clone()).collect(),
        Err(e) => {
            warn!("⚠️ 入站 {} 客户端列表解析失败: {}", record.inbound.tag, e);
            Vec::new()
        }
    }
}

/// 客户端的流量记录，缺失时按全零处理
pub(crate) fn client_summary(record: &InboundRecord, email: &str) -> TrafficSummary {
    record
        .client_stats
        .iter()
        .find(|s| s.email == email)
        .map(TrafficSummary::from)
        .unwrap_or_else(|| TrafficSummary::from(&client_traffic::Model::empty(email)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entity::inbound;
    use crate::store::FallbackMaster;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    pub(crate) const UUID: &str = "11111111-1111-1111-1111-111111111111";

    /// 内存中的入站数据
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub records: Vec<InboundRecord>,
        pub master: Option<FallbackMaster>,
        pub datepicker: Option<String>,
        pub fail: bool,
    }

    #[async_trait]
    impl InboundRepository for MemoryStore {
        async fn find_inbounds_by_sub_id(&self, _sub_id: &str) -> Result<Vec<InboundRecord>> {
            if self.fail {
                return Err(anyhow!("database is locked"));
            }
            Ok(self.records.clone())
        }

        async fn resolve_fallback_master(&self, listen: &str, _stream_settings: &str) -> Result<FallbackMaster> {
            self.master
                .clone()
                .ok_or_else(|| anyhow!("未找到回落目标为 {} 的主入站", listen))
        }
    }

    #[async_trait]
    impl SettingProvider for MemoryStore {
        async fn datepicker(&self) -> Result<String> {
            self.datepicker.clone().ok_or_else(|| anyhow!("settings unavailable"))
        }
    }

    pub(crate) fn record(protocol: &str, listen: &str, port: i32, clients: Value, stream: Value) -> InboundRecord {
        InboundRecord {
            inbound: inbound::Model {
                id: port as i64,
                user_id: 1,
                up: 0,
                down: 0,
                total: 0,
                remark: "DE".to_string(),
                enable: true,
                expiry_time: 0,
                listen: listen.to_string(),
                port,
                protocol: protocol.to_string(),
                settings: json!({ "clients": clients }).to_string(),
                stream_settings: stream.to_string(),
                tag: format!("inbound-{}", port),
                sniffing: "{}".to_string(),
            },
            client_stats: vec![],
        }
    }

    pub(crate) fn traffic(email: &str, up: i64, down: i64, total: i64, expiry_time: i64) -> client_traffic::Model {
        client_traffic::Model {
            id: 1,
            inbound_id: 1,
            enable: true,
            email: email.to_string(),
            up,
            down,
            expiry_time,
            total,
            reset: 0,
        }
    }

    /// subId 为 abc 的单个 vless 客户端
    pub(crate) fn single_vless_store() -> MemoryStore {
        let mut vless = record(
            "vless",
            "",
            443,
            json!([{"id": UUID, "email": "user1", "enable": true, "subId": "abc"}]),
            json!({"network": "tcp", "security": "none"}),
        );
        vless.client_stats = vec![traffic("user1", 1000, 2000, 0, 1_700_000_000_000)];

        MemoryStore {
            records: vec![vless],
            datepicker: Some("gregorian".to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn service(store: MemoryStore, settings: SubSettings) -> SubService {
        let store = Arc::new(store);
        SubService::new(Arc::new(settings), store.clone(), store)
    }

    fn plain_settings() -> SubSettings {
        SubSettings {
            show_info: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_vless_client() {
        let sub = service(single_vless_store(), plain_settings());
        let (links, header) = sub.get_subs("abc", "203.0.113.1").await.unwrap();

        assert_eq!(links.len(), 2);
        assert!(links[0].starts_with(&format!("vless://{}@203.0.113.1:443?", UUID)));
        assert!(links[1].starts_with(&format!("vless://{}@germ.realityvpn.ru:443?", UUID)));
        assert_eq!(header, "upload=1000; download=2000; total=0; expire=1700000000");
    }

    #[tokio::test]
    async fn test_two_links_per_client() {
        let clients = json!([
            {"id": UUID, "email": "a", "enable": true, "subId": "abc"},
            {"id": UUID, "email": "b", "enable": true, "subId": "abc"},
            {"id": UUID, "email": "c", "enable": false, "subId": "abc"},
            {"id": UUID, "email": "d", "enable": true, "subId": "xyz"}
        ]);
        let trojan = json!([{"password": "pw", "email": "e", "enable": true, "subId": "abc"}]);
        let store = MemoryStore {
            records: vec![
                record("vless", "", 443, clients, json!({"network": "ws"})),
                record("trojan", "", 8443, trojan, json!({"network": "tcp"})),
            ],
            datepicker: Some("gregorian".to_string()),
            ..Default::default()
        };

        let (links, header) = service(store, plain_settings()).get_subs("abc", "h.example").await.unwrap();
        assert_eq!(links.len(), 6);
        assert_eq!(header, "upload=0; download=0; total=0; expire=0");
    }

    #[tokio::test]
    async fn test_traffic_aggregation() {
        let mut store = single_vless_store();
        let second = record(
            "trojan",
            "",
            8443,
            json!([{"password": "pw", "email": "user2", "enable": true, "subId": "abc"}]),
            json!({"network": "tcp"}),
        );
        store.records[0].client_stats = vec![traffic("user1", 100, 200, 1000, 1_700_000_000_000)];
        store.records.push(InboundRecord {
            client_stats: vec![traffic("user2", 1, 2, 3000, 1_700_000_000_000)],
            ..second
        });

        let (_, header) = service(store, plain_settings()).get_subs("abc", "h").await.unwrap();
        assert_eq!(header, "upload=101; download=202; total=4000; expire=1700000000");
    }

    #[tokio::test]
    async fn test_fallback_master_applied() {
        let mut store = single_vless_store();
        store.records[0].inbound.listen = "@vless-ws".to_string();
        store.records[0].inbound.port = 0;
        store.master = Some(FallbackMaster {
            listen: "0.0.0.0".to_string(),
            port: 8443,
            stream_settings: json!({"network": "tcp", "security": "tls", "tlsSettings": {"serverName": "sni.example"}})
                .to_string(),
        });

        let (links, _) = service(store, plain_settings()).get_subs("abc", "h").await.unwrap();
        assert!(links[0].contains("@h:8443?"));
        assert!(links[0].contains("security=tls"));
        assert!(links[0].contains("sni=sni.example"));
    }

    #[tokio::test]
    async fn test_fallback_failure_keeps_original() {
        let mut store = single_vless_store();
        store.records[0].inbound.listen = "@missing".to_string();

        let (links, _) = service(store, plain_settings()).get_subs("abc", "h").await.unwrap();
        assert!(links[0].contains("@h:443?"));
    }

    #[tokio::test]
    async fn test_not_found_and_storage_errors() {
        let empty = MemoryStore::default();
        assert!(matches!(
            service(empty, plain_settings()).get_subs("abc", "h").await,
            Err(SubError::NotFound(id)) if id == "abc"
        ));

        let failing = MemoryStore {
            fail: true,
            ..Default::default()
        };
        assert!(matches!(
            service(failing, plain_settings()).get_subs("abc", "h").await,
            Err(SubError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_unrenderable_clients_are_skipped() {
        let mut store = single_vless_store();
        store.records.push(record(
            "wireguard",
            "",
            51820,
            json!([{"id": UUID, "email": "wg", "enable": true, "subId": "abc"}]),
            json!({}),
        ));
        let (links, header) = service(store, plain_settings()).get_subs("abc", "h").await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(header, "upload=1000; download=2000; total=0; expire=1700000000");

        let only_broken = MemoryStore {
            records: vec![record(
                "wireguard",
                "",
                51820,
                json!([{"id": UUID, "email": "wg", "enable": true, "subId": "abc"}]),
                json!({}),
            )],
            ..Default::default()
        };
        assert!(matches!(
            service(only_broken, plain_settings()).get_subs("abc", "h").await,
            Err(SubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_datepicker_failure_uses_gregorian() {
        let mut store = single_vless_store();
        store.datepicker = None;
        let now = Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap();

        let sub = service(store, SubSettings::default());
        let (links, _) = sub.get_subs_at("abc", "h", now).await.unwrap();
        let remark = links[0].rsplit('#').next().unwrap();
        let remark = urlencoding::decode(remark).unwrap();

        assert!(remark.starts_with("DE-user1-"));
        assert!(remark.contains("D,"));
        assert!(remark.ends_with("📅2023-11-14"));
    }
}
