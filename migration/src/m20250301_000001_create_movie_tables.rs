use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(big_integer(Movies::Id).primary_key())
                    .col(string(Movies::Title))
                    .col(text(Movies::Overview))
                    .col(integer_null(Movies::Year))
                    .col(text(Movies::Genres))
                    .col(double_null(Movies::ExternalRating))
                    .col(string_null(Movies::PosterUrl))
                    .col(string(Movies::Status))
                    .col(integer_null(Movies::UserRating))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_status")
                    .table(Movies::Table)
                    .col(Movies::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ratings::Table)
                    .if_not_exists()
                    .col(pk_auto(Ratings::Id))
                    .col(big_integer(Ratings::MovieId))
                    .col(integer(Ratings::UserRating))
                    .col(string(Ratings::Source))
                    .col(big_integer(Ratings::RatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ratings_movie_id")
                            .from(Ratings::Table, Ratings::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Ratings::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Movies {
    Table,
    Id,
    Title,
    Overview,
    Year,
    Genres,
    ExternalRating,
    PosterUrl,
    Status,
    UserRating,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Ratings {
    Table,
    Id,
    MovieId,
    UserRating,
    Source,
    RatedAt,
}
