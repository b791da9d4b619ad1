use anyhow::Context;
use axum::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    qrcodes::repo_types::{NewQrCodeHistory, QrCodeHistory},
};

/// System of record for users and their saved QR codes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Returns `None` when the email is already registered.
    async fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>>;
    async fn insert_history(&self, new: NewQrCodeHistory) -> anyhow::Result<QrCodeHistory>;
    async fn list_history(&self, owner_id: Uuid) -> anyhow::Result<Vec<QrCodeHistory>>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        User::find_by_email(&self.db, email).await
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        User::create(&self.db, email, password_hash).await
    }

    async fn insert_history(&self, new: NewQrCodeHistory) -> anyhow::Result<QrCodeHistory> {
        QrCodeHistory::insert(&self.db, &new).await
    }

    async fn list_history(&self, owner_id: Uuid) -> anyhow::Result<Vec<QrCodeHistory>> {
        QrCodeHistory::list_by_owner(&self.db, owner_id).await
    }
}

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")
}

/// Drops every table this service owns and re-applies the migrations.
pub async fn reset_schema(db: &PgPool) -> anyhow::Result<()> {
    let mut tx = db.begin().await.context("begin tx")?;
    for stmt in [
        "DROP TABLE IF EXISTS qr_code_histories",
        "DROP TABLE IF EXISTS users",
        "DROP TABLE IF EXISTS _sqlx_migrations",
    ] {
        sqlx::query(stmt)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("execute {stmt}"))?;
    }
    tx.commit().await.context("commit tx")?;
    migrate(db).await
}
