use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QrCodeHistory {
    pub id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub qr_code_image_filename: String,
    pub qr_code_image_base64: Option<String>,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewQrCodeHistory {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub qr_code_image_filename: String,
    pub qr_code_image_base64: Option<String>,
}
