use std::io::Cursor;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Luma};
use lazy_static::lazy_static;
use qrcode::{types::QrError, EcLevel, QrCode};
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use super::{dto::HistoryEntry, dto::SaveHistoryRequest, repo_types::NewQrCodeHistory};
use crate::{
    auth::session::SessionUser,
    error::{AppError, AppResult},
    state::AppState,
};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encodes `text` as a QR symbol and returns it as PNG bytes.
pub fn render_png(text: &str) -> AppResult<Vec<u8>> {
    if text.is_empty() {
        return Err(AppError::Validation("data is required".into()));
    }
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M).map_err(|e| {
        match e {
            QrError::DataTooLong => AppError::EncodingTooLarge,
            other => AppError::Internal(anyhow::anyhow!("qr encode: {other}")),
        }
    })?;
    let img = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(256, 256)
        .build();

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .context("encode qr png")?;
    Ok(buf.into_inner())
}

/// Decodes a base64 PNG (optionally as a `data:` URL) and checks it really is one.
pub fn decode_png_base64(payload: &str) -> AppResult<Vec<u8>> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = match compact.get(..PNG_DATA_URL_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(PNG_DATA_URL_PREFIX) => {
            &compact[PNG_DATA_URL_PREFIX.len()..]
        }
        _ => compact.as_str(),
    };
    let bytes = STANDARD
        .decode(raw)
        .map_err(|_| AppError::InvalidImageData)?;
    if !matches!(image::guess_format(&bytes), Ok(ImageFormat::Png)) {
        return Err(AppError::InvalidImageData);
    }
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|_| AppError::InvalidImageData)?;
    Ok(bytes)
}

pub fn validate_filename(name: &str) -> AppResult<()> {
    lazy_static! {
        static ref FILENAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap();
    }
    if FILENAME_RE.is_match(name) && name.to_ascii_lowercase().ends_with(".png") {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid image filename".into()))
    }
}

/// Storage key of a saved image: one directory per owner, one object per history row.
pub fn history_key(owner_id: Uuid, history_id: Uuid, filename: &str) -> String {
    format!("qrcodes/{}/{}-{}", owner_id, history_id, filename)
}

pub async fn save_history(
    state: &AppState,
    user: &SessionUser,
    req: SaveHistoryRequest,
) -> AppResult<HistoryEntry> {
    if req.text.is_empty() {
        return Err(AppError::Validation("text is required".into()));
    }
    validate_filename(&req.qr_code_image_filename)?;
    let png = decode_png_base64(&req.qr_code_image_base64)?;

    let owner = state
        .store
        .find_user_by_email(&user.email)
        .await?
        .ok_or(AppError::NotFound)?;

    let history_id = Uuid::new_v4();
    let key = history_key(owner.id, history_id, &req.qr_code_image_filename);
    let encoded = STANDARD.encode(&png);
    state
        .storage
        .put_object(&key, Bytes::from(png), "image/png")
        .await
        .with_context(|| format!("store {}", key))?;

    let row = state
        .store
        .insert_history(NewQrCodeHistory {
            id: history_id,
            owner_id: owner.id,
            text: req.text,
            qr_code_image_filename: req.qr_code_image_filename,
            qr_code_image_base64: Some(encoded),
        })
        .await?;

    info!(user_id = %owner.id, history_id = %row.id, "qr history saved");
    Ok(HistoryEntry::from_row(row, state.storage.public_url(&key)))
}

pub async fn list_history(state: &AppState, user: &SessionUser) -> AppResult<Vec<HistoryEntry>> {
    let owner = state
        .store
        .find_user_by_email(&user.email)
        .await?
        .ok_or(AppError::NotFound)?;
    let rows = state.store.list_history(owner.id).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let url = state
                .storage
                .public_url(&history_key(row.owner_id, row.id, &row.qr_code_image_filename));
            HistoryEntry::from_row(row, url)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_png() {
        let png = render_png("hello").unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let img = image::load_from_memory(&png).unwrap();
        assert!(img.width() >= 256);
        assert_eq!(img.width(), img.height());
    }

    #[test]
    fn render_rejects_oversized_text() {
        let text = "x".repeat(5000);
        assert!(matches!(render_png(&text), Err(AppError::EncodingTooLarge)));
    }

    #[test]
    fn render_rejects_empty_text() {
        assert!(matches!(render_png(""), Err(AppError::Validation(_))));
    }

    #[test]
    fn decode_accepts_raw_and_data_url() {
        let png = render_png("hi").unwrap();
        let b64 = STANDARD.encode(&png);
        assert_eq!(decode_png_base64(&b64).unwrap(), png);
        assert_eq!(decode_png_base64(&format!("{PNG_DATA_URL_PREFIX}{b64}")).unwrap(), png);
    }

    #[test]
    fn decode_accepts_any_case_data_url_prefix() {
        let png = render_png("hi").unwrap();
        let b64 = STANDARD.encode(&png);
        assert_eq!(decode_png_base64(&format!("data:image/PNG;base64,{b64}")).unwrap(), png);
        assert_eq!(decode_png_base64(&format!("DATA:IMAGE/PNG;BASE64,{b64}")).unwrap(), png);
    }

    #[test]
    fn history_key_is_unique_per_row() {
        let owner = Uuid::new_v4();
        let first = history_key(owner, Uuid::new_v4(), "qr-1.png");
        let second = history_key(owner, Uuid::new_v4(), "qr-1.png");
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("qrcodes/{owner}/")));
        assert!(first.ends_with("-qr-1.png"));
    }

    #[test]
    fn decode_rejects_bad_payloads() {
        assert!(matches!(decode_png_base64("%%%not base64"), Err(AppError::InvalidImageData)));
        let not_png = STANDARD.encode(b"GIF89a plain bytes");
        assert!(matches!(decode_png_base64(&not_png), Err(AppError::InvalidImageData)));
        // PNG signature followed by garbage
        let mut truncated = b"\x89PNG\r\n\x1a\n".to_vec();
        truncated.extend_from_slice(b"garbage");
        assert!(matches!(
            decode_png_base64(&STANDARD.encode(truncated)),
            Err(AppError::InvalidImageData)
        ));
    }

    #[test]
    fn filenames_cannot_escape() {
        assert!(validate_filename("qr-123.png").is_ok());
        assert!(validate_filename("Hello_World.PNG").is_ok());
        for bad in ["../x.png", "a/b.png", ".hidden.png", "x.jpg", "", "x y.png"] {
            assert!(validate_filename(bad).is_err(), "{bad} accepted");
        }
    }
}
