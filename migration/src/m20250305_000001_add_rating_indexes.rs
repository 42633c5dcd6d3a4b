use sea_orm_migration::prelude::*;

use crate::m20250301_000001_create_movie_tables::Ratings;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_ratings_rated_at")
                    .table(Ratings::Table)
                    .col(Ratings::RatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ratings_movie_source")
                    .table(Ratings::Table)
                    .col(Ratings::MovieId)
                    .col(Ratings::Source)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_ratings_movie_source").table(Ratings::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_ratings_rated_at").table(Ratings::Table).to_owned())
            .await?;
        Ok(())
    }
}
