use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PkceChallenge::Table)
                    .if_not_exists()
                    .col(string(PkceChallenge::ChallengeId).primary_key().to_owned())
                    .col(string(PkceChallenge::CodeChallenge))
                    .col(string(PkceChallenge::CodeChallengeMethod))
                    .col(string(PkceChallenge::State))
                    .col(string_null(PkceChallenge::ClientId))
                    .col(string_null(PkceChallenge::Scope))
                    .col(timestamp_with_time_zone(PkceChallenge::CreatedAt))
                    .col(timestamp_with_time_zone(PkceChallenge::ExpiresAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthAccessToken::Table)
                    .if_not_exists()
                    .col(string(OauthAccessToken::Token).primary_key().to_owned())
                    .col(string(OauthAccessToken::Subject))
                    .col(string(OauthAccessToken::ClientId))
                    .col(string(OauthAccessToken::Scope))
                    .col(string(OauthAccessToken::LineageId))
                    .col(timestamp_with_time_zone(OauthAccessToken::IssuedAt))
                    .col(timestamp_with_time_zone(OauthAccessToken::ExpiresAt))
                    .col(timestamp_with_time_zone_null(OauthAccessToken::RevokedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthRefreshToken::Table)
                    .if_not_exists()
                    .col(string(OauthRefreshToken::Token).primary_key().to_owned())
                    .col(string(OauthRefreshToken::AccessToken))
                    .col(string(OauthRefreshToken::Subject))
                    .col(string(OauthRefreshToken::ClientId))
                    .col(string(OauthRefreshToken::Scope))
                    .col(string(OauthRefreshToken::LineageId))
                    .col(timestamp_with_time_zone(OauthRefreshToken::IssuedAt))
                    .col(timestamp_with_time_zone(OauthRefreshToken::ExpiresAt))
                    .col(timestamp_with_time_zone_null(OauthRefreshToken::RevokedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthUser::Table)
                    .if_not_exists()
                    .col(string(AuthUser::Id).primary_key().to_owned())
                    .col(string_uniq(AuthUser::Username))
                    .col(string(AuthUser::PasswordHash))
                    .col(string(AuthUser::Scopes).default("").to_owned())
                    .col(boolean(AuthUser::Disabled).default(false).to_owned())
                    .col(
                        timestamp_with_time_zone(AuthUser::CreatedAt)
                            .default(Expr::current_timestamp())
                            .to_owned(),
                    )
                    .to_owned(),
            )
            .await?;

        // Lineage revocation and expiry sweeps filter on these
        manager
            .create_index(
                Index::create()
                    .name("idx_access_token_lineage")
                    .table(OauthAccessToken::Table)
                    .col(OauthAccessToken::LineageId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_refresh_token_lineage")
                    .table(OauthRefreshToken::Table)
                    .col(OauthRefreshToken::LineageId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_access_token_expires_at")
                    .table(OauthAccessToken::Table)
                    .col(OauthAccessToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_refresh_token_expires_at")
                    .table(OauthRefreshToken::Table)
                    .col(OauthRefreshToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_pkce_challenge_expires_at")
                    .table(PkceChallenge::Table)
                    .col(PkceChallenge::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthUser::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthRefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthAccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PkceChallenge::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PkceChallenge {
    Table,
    ChallengeId,
    CodeChallenge,
    CodeChallengeMethod,
    State,
    ClientId,
    Scope,
    CreatedAt,
    ExpiresAt,
}

#[derive(Iden)]
enum OauthAccessToken {
    Table,
    Token,
    Subject,
    ClientId,
    Scope,
    LineageId,
    IssuedAt,
    ExpiresAt,
    RevokedAt,
}

#[derive(Iden)]
enum OauthRefreshToken {
    Table,
    Token,
    AccessToken,
    Subject,
    ClientId,
    Scope,
    LineageId,
    IssuedAt,
    ExpiresAt,
    RevokedAt,
}

#[derive(Iden)]
enum AuthUser {
    Table,
    Id,
    Username,
    PasswordHash,
    Scopes,
    Disabled,
    CreatedAt,
}
