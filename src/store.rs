//! 订阅数据访问
//!
//! 订阅服务只读取面板数据库：按 subId 查找入站、解析回落主入站、读取日期选择器设置。
//! 以 trait 形式暴露，便于替换为其他存储实现。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::{Map, Value};
use tracing::debug;

use crate::entity::setting::setting_keys;
use crate::entity::{client_traffic, inbound, setting, ClientTraffic, Inbound, Setting};

/// 入站及其客户端流量记录
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub inbound: inbound::Model,
    pub client_stats: Vec<client_traffic::Model>,
}

/// 回落主入站的监听信息
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackMaster {
    pub listen: String,
    pub port: i32,
    pub stream_settings: String,
}

/// 入站查询接口
#[async_trait]
pub trait InboundRepository: Send + Sync {
    /// 查找包含指定 subId 客户端的所有已启用入站（仅限 vmess/vless/trojan/shadowsocks）
    async fn find_inbounds_by_sub_id(&self, sub_id: &str) -> Result<Vec<InboundRecord>>;

    /// 解析 `@` 开头的回落监听地址，返回主入站的监听信息和合并后的传输设置
    async fn resolve_fallback_master(&self, listen: &str, stream_settings: &str) -> Result<FallbackMaster>;
}

/// 面板设置接口
#[async_trait]
pub trait SettingProvider: Send + Sync {
    async fn datepicker(&self) -> Result<String>;
}

const SUB_ID_FILTER: &str = "inbounds.id IN (
    SELECT DISTINCT inbounds.id
    FROM inbounds,
        JSON_EACH(JSON_EXTRACT(inbounds.settings, '$.clients')) AS client
    WHERE
        protocol IN ('vmess', 'vless', 'trojan', 'shadowsocks')
        AND JSON_EXTRACT(client.value, '$.subId') = ? AND enable = ?
)";

const FALLBACK_FILTER: &str = "JSON_TYPE(inbounds.settings, '$.fallbacks') = 'array'
    AND EXISTS (
        SELECT * FROM JSON_EACH(inbounds.settings, '$.fallbacks')
        WHERE JSON_EXTRACT(value, '$.dest') = ?
    )";

/// 基于 sea-orm 的数据库实现
#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InboundRepository for DbStore {
    async fn find_inbounds_by_sub_id(&self, sub_id: &str) -> Result<Vec<InboundRecord>> {
        let rows = Inbound::find()
            .filter(Expr::cust_with_values(
                SUB_ID_FILTER,
                [sea_orm::Value::from(sub_id), sea_orm::Value::from(true)],
            ))
            .find_with_related(ClientTraffic)
            .all(&self.db)
            .await?;

        debug!("subId {} 匹配到 {} 个入站", sub_id, rows.len());

        Ok(rows
            .into_iter()
            .map(|(inbound, client_stats)| InboundRecord { inbound, client_stats })
            .collect())
    }

    async fn resolve_fallback_master(&self, listen: &str, stream_settings: &str) -> Result<FallbackMaster> {
        let master = Inbound::find()
            .filter(Expr::cust_with_values(FALLBACK_FILTER, [listen]))
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow!("未找到回落目标为 {} 的主入站", listen))?;

        Ok(FallbackMaster {
            stream_settings: merge_master_stream(stream_settings, &master.stream_settings)?,
            listen: master.listen,
            port: master.port,
        })
    }
}

#[async_trait]
impl SettingProvider for DbStore {
    async fn datepicker(&self) -> Result<String> {
        let value = Setting::find()
            .filter(setting::Column::Key.eq(setting_keys::DATEPICKER))
            .one(&self.db)
            .await?
            .map(|s| s.value)
            .unwrap_or_else(|| "gregorian".to_string());
        Ok(value)
    }
}

/// 回落入站沿用主入站的安全层设置
pub fn merge_master_stream(stream_settings: &str, master_stream_settings: &str) -> Result<String> {
    let mut stream: Map<String, Value> = serde_json::from_str(stream_settings)?;
    let master: Map<String, Value> = serde_json::from_str(master_stream_settings)?;

    for key in ["security", "tlsSettings", "externalProxy"] {
        match master.get(key) {
            Some(value) => {
                stream.insert(key.to_string(), value.clone());
            }
            None => {
                stream.remove(key);
            }
        }
    }

    Ok(serde_json::to_string_pretty(&stream)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::migration::init_memory;
    use sea_orm::{ActiveModelTrait, NotSet, Set};
    use serde_json::json;

    pub(crate) async fn insert_inbound(
        db: &DatabaseConnection,
        protocol: &str,
        listen: &str,
        port: i32,
        enable: bool,
        settings: Value,
        stream_settings: Value,
    ) -> i64 {
        let model = inbound::ActiveModel {
            id: NotSet,
            user_id: Set(1),
            up: Set(0),
            down: Set(0),
            total: Set(0),
            remark: Set(format!("{}-{}", protocol, port)),
            enable: Set(enable),
            expiry_time: Set(0),
            listen: Set(listen.to_string()),
            port: Set(port),
            protocol: Set(protocol.to_string()),
            settings: Set(settings.to_string()),
            stream_settings: Set(stream_settings.to_string()),
            tag: Set(format!("inbound-{}", port)),
            sniffing: Set("{}".to_string()),
        }
        .insert(db)
        .await
        .unwrap();
        model.id
    }

    pub(crate) async fn insert_traffic(
        db: &DatabaseConnection,
        inbound_id: i64,
        email: &str,
        up: i64,
        down: i64,
        total: i64,
        expiry_time: i64,
    ) {
        client_traffic::ActiveModel {
            id: NotSet,
            inbound_id: Set(inbound_id),
            enable: Set(true),
            email: Set(email.to_string()),
            up: Set(up),
            down: Set(down),
            expiry_time: Set(expiry_time),
            total: Set(total),
            reset: Set(0),
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn clients(sub_id: &str, email: &str) -> Value {
        json!({
            "clients": [
                {"id": "11111111-1111-1111-1111-111111111111", "email": email, "enable": true, "subId": sub_id}
            ]
        })
    }

    #[tokio::test]
    async fn test_find_inbounds_by_sub_id() {
        let db = init_memory().await;
        let tcp = json!({"network": "tcp", "security": "none"});

        let matched = insert_inbound(&db, "vless", "", 443, true, clients("abc", "a@x"), tcp.clone()).await;
        insert_inbound(&db, "vless", "", 444, false, clients("abc", "b@x"), tcp.clone()).await;
        insert_inbound(&db, "wireguard", "", 445, true, clients("abc", "c@x"), tcp.clone()).await;
        insert_inbound(&db, "vmess", "", 446, true, clients("other", "d@x"), tcp.clone()).await;
        insert_traffic(&db, matched, "a@x", 10, 20, 0, 0).await;

        let store = DbStore::new(db);
        let found = store.find_inbounds_by_sub_id("abc").await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].inbound.id, matched);
        assert_eq!(found[0].client_stats.len(), 1);
        assert_eq!(found[0].client_stats[0].email, "a@x");

        assert!(store.find_inbounds_by_sub_id("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fallback_master() {
        let db = init_memory().await;
        let master_settings = json!({
            "clients": [],
            "fallbacks": [{"dest": "@vless-ws", "xver": 0}]
        });
        let master_stream = json!({
            "network": "tcp",
            "security": "tls",
            "tlsSettings": {"serverName": "example.com"}
        });
        insert_inbound(&db, "vless", "0.0.0.0", 443, true, master_settings, master_stream).await;

        let store = DbStore::new(db);
        let child_stream = json!({"network": "ws", "security": "none", "wsSettings": {"path": "/ws"}}).to_string();
        let master = store.resolve_fallback_master("@vless-ws", &child_stream).await.unwrap();

        assert_eq!(master.listen, "0.0.0.0");
        assert_eq!(master.port, 443);
        let merged: Value = serde_json::from_str(&master.stream_settings).unwrap();
        assert_eq!(merged["network"], "ws");
        assert_eq!(merged["security"], "tls");
        assert_eq!(merged["tlsSettings"]["serverName"], "example.com");

        assert!(store.resolve_fallback_master("@missing", &child_stream).await.is_err());
    }

    #[tokio::test]
    async fn test_datepicker_default_and_stored() {
        let db = init_memory().await;
        let store = DbStore::new(db.clone());
        assert_eq!(store.datepicker().await.unwrap(), "gregorian");

        setting::ActiveModel {
            id: NotSet,
            key: Set(setting_keys::DATEPICKER.to_string()),
            value: Set("jalalian".to_string()),
        }
        .insert(&db)
        .await
        .unwrap();
        assert_eq!(store.datepicker().await.unwrap(), "jalalian");
    }

    #[test]
    fn test_merge_master_stream_drops_missing_keys() {
        let child = json!({"network": "ws", "security": "tls", "externalProxy": []}).to_string();
        let master = json!({"network": "tcp", "security": "reality"}).to_string();
        let merged: Value = serde_json::from_str(&merge_master_stream(&child, &master).unwrap()).unwrap();

        assert_eq!(merged["security"], "reality");
        assert!(merged.get("externalProxy").is_none());
        assert_eq!(merged["network"], "ws");
    }
}
