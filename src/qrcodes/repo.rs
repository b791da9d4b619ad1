use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewQrCodeHistory, QrCodeHistory};

impl QrCodeHistory {
    pub async fn insert(db: &PgPool, new: &NewQrCodeHistory) -> anyhow::Result<QrCodeHistory> {
        let row = sqlx::query_as::<_, QrCodeHistory>(
            r#"
            INSERT INTO qr_code_histories
                (id, text, qr_code_image_filename, qr_code_image_base64, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, text, created_at, qr_code_image_filename,
                      qr_code_image_base64, owner_id
            "#,
        )
        .bind(new.id)
        .bind(&new.text)
        .bind(&new.qr_code_image_filename)
        .bind(new.qr_code_image_base64.as_deref())
        .bind(new.owner_id)
        .fetch_one(db)
        .await
        .context("insert qr history")?;
        Ok(row)
    }

    /// History of one owner, newest first.
    pub async fn list_by_owner(db: &PgPool, owner_id: Uuid) -> anyhow::Result<Vec<QrCodeHistory>> {
        let rows = sqlx::query_as::<_, QrCodeHistory>(
            r#"
            SELECT id, text, created_at, qr_code_image_filename,
                   qr_code_image_base64, owner_id
              FROM qr_code_histories
             WHERE owner_id = $1
             ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(db)
        .await
        .context("list qr history by owner")?;
        Ok(rows)
    }
}
