use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client_traffics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[serde(rename = "inboundId")]
    pub inbound_id: i64,
    pub enable: bool,
    pub email: String,
    pub up: i64,
    pub down: i64,
    /// 到期时间（毫秒），0 为永不过期，负数为首次使用后开始计时
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
    /// 流量配额（字节），0 为不限量
    pub total: i64,
    pub reset: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inbound::Entity",
        from = "Column::InboundId",
        to = "super::inbound::Column::Id"
    )]
    Inbound,
}

impl Related<super::inbound::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inbound.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 没有流量记录时使用的空记录
    pub fn empty(email: &str) -> Self {
        Self {
            id: 0,
            inbound_id: 0,
            enable: true,
            email: email.to_string(),
            up: 0,
            down: 0,
            expiry_time: 0,
            total: 0,
            reset: 0,
        }
    }
}
