use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inbounds")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub up: i64,
    pub down: i64,
    pub total: i64,
    pub remark: String,
    pub enable: bool,
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
    /// 监听地址，以 `@` 开头表示回落到主入站
    pub listen: String,
    pub port: i32,
    /// vmess, vless, trojan, shadowsocks ...
    pub protocol: String,
    /// 协议设置（JSON），包含 clients 与 fallbacks
    pub settings: String,
    /// 传输层设置（JSON）
    #[serde(rename = "streamSettings")]
    pub stream_settings: String,
    pub tag: String,
    pub sniffing: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::client_traffic::Entity")]
    ClientTraffics,
}

impl Related<super::client_traffic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClientTraffics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
