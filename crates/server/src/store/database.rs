//! sea-orm backed stores.
//!
//! Single-use guarantees rely on the database: a challenge is consumed by the
//! caller whose `DELETE` affects the row, a refresh token by the caller whose
//! `UPDATE ... WHERE revoked_at IS NULL` affects it.

use crate::config::UserConfig;
use crate::entity::{auth_user, oauth_access_token, oauth_refresh_token, pkce_challenge};
use crate::error::StoreError;
use crate::oauth2::model::{AccessToken, PkceChallenge, RefreshToken, TokenPair, UserRecord};
use crate::oauth2::types::{ChallengeMethod, ClientId, ScopeSet};
use crate::store::{ChallengeStore, StoreResult, TokenStore, UserDirectory};
use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
    sea_query::Expr,
};
use std::sync::Arc;
use time::OffsetDateTime;

fn parse_client_id(raw: String) -> Result<ClientId, StoreError> {
    ClientId::try_from(raw).map_err(StoreError::Corrupt)
}

impl TryFrom<pkce_challenge::Model> for PkceChallenge {
    type Error = StoreError;

    fn try_from(model: pkce_challenge::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            code_challenge_method: model
                .code_challenge_method
                .parse::<ChallengeMethod>()
                .map_err(StoreError::Corrupt)?,
            client_id: model.client_id.map(parse_client_id).transpose()?,
            scope: model.scope.as_deref().map(ScopeSet::parse_lossy),
            challenge_id: model.challenge_id,
            code_challenge: model.code_challenge,
            state: model.state,
            created_at: model.created_at,
            expires_at: model.expires_at,
        })
    }
}

impl TryFrom<oauth_access_token::Model> for AccessToken {
    type Error = StoreError;

    fn try_from(model: oauth_access_token::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            client_id: parse_client_id(model.client_id)?,
            scope: ScopeSet::parse_lossy(&model.scope),
            revoked: model.revoked_at.is_some(),
            token: model.token,
            subject: model.subject,
            lineage_id: model.lineage_id,
            issued_at: model.issued_at,
            expires_at: model.expires_at,
        })
    }
}

impl TryFrom<oauth_refresh_token::Model> for RefreshToken {
    type Error = StoreError;

    fn try_from(model: oauth_refresh_token::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            client_id: parse_client_id(model.client_id)?,
            scope: ScopeSet::parse_lossy(&model.scope),
            revoked: model.revoked_at.is_some(),
            token: model.token,
            access_token: model.access_token,
            subject: model.subject,
            lineage_id: model.lineage_id,
            issued_at: model.issued_at,
            expires_at: model.expires_at,
        })
    }
}

#[derive(Clone)]
pub struct DbChallengeStore {
    db: Arc<DatabaseConnection>,
}

impl DbChallengeStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChallengeStore for DbChallengeStore {
    async fn insert(&self, challenge: PkceChallenge) -> StoreResult<()> {
        let model = pkce_challenge::ActiveModel {
            challenge_id: Set(challenge.challenge_id),
            code_challenge: Set(challenge.code_challenge),
            code_challenge_method: Set(challenge.code_challenge_method.as_str().to_string()),
            state: Set(challenge.state),
            client_id: Set(challenge.client_id.map(String::from)),
            scope: Set(challenge.scope.map(|s| s.to_string())),
            created_at: Set(challenge.created_at),
            expires_at: Set(challenge.expires_at),
        };
        pkce_challenge::Entity::insert(model)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn get(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>> {
        pkce_challenge::Entity::find_by_id(challenge_id)
            .one(self.db.as_ref())
            .await?
            .map(PkceChallenge::try_from)
            .transpose()
    }

    async fn consume(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>> {
        let Some(model) = pkce_challenge::Entity::find_by_id(challenge_id)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        let result = pkce_challenge::Entity::delete_by_id(challenge_id)
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected != 1 {
            // Another request deleted it between our read and delete
            return Ok(None);
        }
        PkceChallenge::try_from(model).map(Some)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let result = pkce_challenge::Entity::delete_many()
            .filter(pkce_challenge::Column::ExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

#[derive(Clone)]
pub struct DbTokenStore {
    db: Arc<DatabaseConnection>,
}

impl DbTokenStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn insert_pair(&self, pair: &TokenPair) -> StoreResult<()> {
        let access = oauth_access_token::ActiveModel {
            token: Set(pair.access.token.clone()),
            subject: Set(pair.access.subject.clone()),
            client_id: Set(pair.access.client_id.to_string()),
            scope: Set(pair.access.scope.to_string()),
            lineage_id: Set(pair.access.lineage_id.clone()),
            issued_at: Set(pair.access.issued_at),
            expires_at: Set(pair.access.expires_at),
            revoked_at: Set(None),
        };
        let refresh = oauth_refresh_token::ActiveModel {
            token: Set(pair.refresh.token.clone()),
            access_token: Set(pair.refresh.access_token.clone()),
            subject: Set(pair.refresh.subject.clone()),
            client_id: Set(pair.refresh.client_id.to_string()),
            scope: Set(pair.refresh.scope.to_string()),
            lineage_id: Set(pair.refresh.lineage_id.clone()),
            issued_at: Set(pair.refresh.issued_at),
            expires_at: Set(pair.refresh.expires_at),
            revoked_at: Set(None),
        };

        let txn = self.db.begin().await?;
        oauth_access_token::Entity::insert(access).exec(&txn).await?;
        oauth_refresh_token::Entity::insert(refresh)
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn find_access(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        oauth_access_token::Entity::find_by_id(token)
            .one(self.db.as_ref())
            .await?
            .map(AccessToken::try_from)
            .transpose()
    }

    async fn find_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        oauth_refresh_token::Entity::find_by_id(token)
            .one(self.db.as_ref())
            .await?
            .map(RefreshToken::try_from)
            .transpose()
    }

    async fn consume_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let result = oauth_refresh_token::Entity::update_many()
            .col_expr(
                oauth_refresh_token::Column::RevokedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(oauth_refresh_token::Column::Token.eq(token))
            .filter(oauth_refresh_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected != 1 {
            return Ok(None);
        }
        self.find_refresh(token).await
    }

    async fn revoke_access(&self, token: &str) -> StoreResult<bool> {
        let result = oauth_access_token::Entity::update_many()
            .col_expr(
                oauth_access_token::Column::RevokedAt,
                Expr::value(OffsetDateTime::now_utc()),
            )
            .filter(oauth_access_token::Column::Token.eq(token))
            .filter(oauth_access_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 1 {
            return Ok(true);
        }
        Ok(self.find_access(token).await?.is_some())
    }

    async fn revoke_lineage(&self, lineage_id: &str) -> StoreResult<u64> {
        let now = OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;
        let access = oauth_access_token::Entity::update_many()
            .col_expr(oauth_access_token::Column::RevokedAt, Expr::value(now))
            .filter(oauth_access_token::Column::LineageId.eq(lineage_id))
            .filter(oauth_access_token::Column::RevokedAt.is_null())
            .exec(&txn)
            .await?;
        let refresh = oauth_refresh_token::Entity::update_many()
            .col_expr(oauth_refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(oauth_refresh_token::Column::LineageId.eq(lineage_id))
            .filter(oauth_refresh_token::Column::RevokedAt.is_null())
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(access.rows_affected + refresh.rows_affected)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let access = oauth_access_token::Entity::delete_many()
            .filter(oauth_access_token::Column::ExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;
        let refresh = oauth_refresh_token::Entity::delete_many()
            .filter(oauth_refresh_token::Column::ExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;
        Ok(access.rows_affected + refresh.rows_affected)
    }
}

#[derive(Clone)]
pub struct DbUserDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbUserDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert configured users that do not exist yet. Existing rows are left
    /// untouched so passwords changed in the database survive restarts.
    pub async fn seed(&self, users: &[UserConfig]) -> StoreResult<u64> {
        let mut inserted = 0;
        for user in users {
            let exists = auth_user::Entity::find()
                .filter(auth_user::Column::Username.eq(user.username.as_str()))
                .one(self.db.as_ref())
                .await?
                .is_some();
            if exists {
                continue;
            }
            let scopes: ScopeSet = user.scopes.iter().copied().collect();
            let model = auth_user::ActiveModel {
                id: Set(user
                    .id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
                username: Set(user.username.clone()),
                password_hash: Set(user.password_hash.clone()),
                scopes: Set(scopes.to_string()),
                disabled: Set(user.disabled),
                created_at: Set(OffsetDateTime::now_utc()),
            };
            auth_user::Entity::insert(model)
                .exec(self.db.as_ref())
                .await?;
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(auth_user::Entity::find()
            .filter(auth_user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?
            .map(|user| UserRecord {
                id: user.id,
                username: user.username,
                password_hash: user.password_hash,
                scopes: ScopeSet::parse_lossy(&user.scopes),
                disabled: user.disabled,
            }))
    }
}
