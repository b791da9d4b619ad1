use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::QrCodeHistory;

/// `data` may arrive in the query string or as a form body.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateParams {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveHistoryRequest {
    pub text: String,
    #[serde(alias = "filename", alias = "image_filename")]
    pub qr_code_image_filename: String,
    #[serde(alias = "image_base64")]
    pub qr_code_image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub qr_code_image_filename: String,
    pub image_url: String,
    pub qr_code_image_base64: Option<String>,
}

impl HistoryEntry {
    pub fn from_row(row: QrCodeHistory, image_url: String) -> Self {
        Self {
            id: row.id,
            text: row.text,
            created_at: row.created_at,
            qr_code_image_filename: row.qr_code_image_filename,
            image_url,
            qr_code_image_base64: row.qr_code_image_base64,
        }
    }
}
