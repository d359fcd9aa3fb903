use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 入站表（与面板共用，不存在时才创建）
        manager
            .create_table(
                Table::create()
                    .table(Inbounds::Table)
                    .if_not_exists()
                    .col(big_integer(Inbounds::Id).auto_increment().primary_key())
                    .col(big_integer(Inbounds::UserId).default(0))
                    .col(big_integer(Inbounds::Up).default(0))
                    .col(big_integer(Inbounds::Down).default(0))
                    .col(big_integer(Inbounds::Total).default(0))
                    .col(string(Inbounds::Remark).default(""))
                    .col(boolean(Inbounds::Enable).default(true))
                    .col(big_integer(Inbounds::ExpiryTime).default(0))
                    .col(string(Inbounds::Listen).default(""))
                    .col(integer(Inbounds::Port))
                    .col(string(Inbounds::Protocol))
                    .col(text(Inbounds::Settings).default("{}"))
                    .col(text(Inbounds::StreamSettings).default("{}"))
                    .col(string(Inbounds::Tag).default(""))
                    .col(text(Inbounds::Sniffing).default("{}"))
                    .to_owned(),
            )
            .await?;

        // 客户端流量表
        manager
            .create_table(
                Table::create()
                    .table(ClientTraffics::Table)
                    .if_not_exists()
                    .col(big_integer(ClientTraffics::Id).auto_increment().primary_key())
                    .col(big_integer(ClientTraffics::InboundId))
                    .col(boolean(ClientTraffics::Enable).default(true))
                    .col(string(ClientTraffics::Email))
                    .col(big_integer(ClientTraffics::Up).default(0))
                    .col(big_integer(ClientTraffics::Down).default(0))
                    .col(big_integer(ClientTraffics::ExpiryTime).default(0))
                    .col(big_integer(ClientTraffics::Total).default(0))
                    .col(integer(ClientTraffics::Reset).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_client_traffics_inbound")
                            .from(ClientTraffics::Table, ClientTraffics::InboundId)
                            .to(Inbounds::Table, Inbounds::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_client_traffics_inbound_id")
                    .table(ClientTraffics::Table)
                    .col(ClientTraffics::InboundId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // 面板设置表
        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(big_integer(Settings::Id).auto_increment().primary_key())
                    .col(string(Settings::Key))
                    .col(text(Settings::Value))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClientTraffics::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Inbounds::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Inbounds {
    Table,
    Id,
    UserId,
    Up,
    Down,
    Total,
    Remark,
    Enable,
    ExpiryTime,
    Listen,
    Port,
    Protocol,
    Settings,
    StreamSettings,
    Tag,
    Sniffing,
}

#[derive(DeriveIden)]
enum ClientTraffics {
    Table,
    Id,
    InboundId,
    Enable,
    Email,
    Up,
    Down,
    ExpiryTime,
    Total,
    Reset,
}

#[derive(DeriveIden)]
enum Settings {
    Table,
    Id,
    Key,
    Value,
}
