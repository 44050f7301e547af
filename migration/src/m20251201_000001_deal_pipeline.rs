use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Deals {
    Table,
    Id,
    OwnerId,
    Title,
    ValueCents,
    Currency,
    Stage,
    Outcome,
    LostReason,
    AssignedTo,
    CreatedAt,
    StageChangedAt,
    ClosedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DealStageHistory {
    Table,
    Id,
    DealId,
    Seq,
    FromStage,
    ToStage,
    FromOutcome,
    ToOutcome,
    Note,
    ChangedBy,
    ChangedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Deals::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Deals::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Deals::Title).string_len(200).not_null())
                    .col(
                        ColumnDef::new(Deals::ValueCents)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Deals::ValueCents).gte(0)),
                    )
                    .col(ColumnDef::new(Deals::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Deals::Stage).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Deals::Outcome)
                            .string_len(8)
                            .not_null()
                            .default("OPEN"),
                    )
                    .col(ColumnDef::new(Deals::LostReason).text())
                    .col(ColumnDef::new(Deals::AssignedTo).uuid())
                    .col(
                        ColumnDef::new(Deals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deals::StageChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deals::ClosedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Deals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deals_owner_outcome")
                    .table(Deals::Table)
                    .col(Deals::OwnerId)
                    .col(Deals::Outcome)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DealStageHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DealStageHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DealStageHistory::DealId).uuid().not_null())
                    .col(ColumnDef::new(DealStageHistory::Seq).integer().not_null())
                    .col(
                        ColumnDef::new(DealStageHistory::FromStage)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::ToStage)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::FromOutcome)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::ToOutcome)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DealStageHistory::Note).text())
                    .col(ColumnDef::new(DealStageHistory::ChangedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(DealStageHistory::ChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deal_stage_history_deal")
                            .from(DealStageHistory::Table, DealStageHistory::DealId)
                            .to(Deals::Table, Deals::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deal_stage_history_deal_seq")
                    .table(DealStageHistory::Table)
                    .col(DealStageHistory::DealId)
                    .col(DealStageHistory::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(DealStageHistory::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Deals::Table).if_exists().to_owned())
            .await
    }
}
