//! Asset service tests
//!
//! End-to-end flows through the public operations: upload, links, thumbnails,
//! single-use uploads and legacy numeric links.

use super::*;
use crate::linkstore::MemoryLinkStore;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tempfile::TempDir;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 90]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn dimensions(bytes: &[u8]) -> (u32, u32) {
    image::load_from_memory(bytes).unwrap().dimensions()
}

fn create_test_service(hash_filenames: bool) -> (AssetService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = ServerConfig::with_storage_root(temp_dir.path().to_path_buf())
        .with_secret("service-test-secret")
        .with_hash_filenames(hash_filenames);
    (AssetService::new(&config).unwrap(), temp_dir)
}

#[test]
fn test_upload_and_download() {
    for hashed in [false, true] {
        let (service, _temp_dir) = create_test_service(hashed);
        let bytes = png(32, 32);
        service.upload("pets/cat.png", bytes.clone(), None).unwrap();
        assert_eq!(service.download("pets/cat.png", None).unwrap(), bytes);
    }
}

#[test]
fn test_encrypted_download_needs_secret() {
    let (service, _temp_dir) = create_test_service(false);
    let bytes = png(32, 32);
    service.upload("cat.png", bytes.clone(), Some("pw")).unwrap();

    assert_eq!(service.download("cat.png", Some("pw")).unwrap(), bytes);
    assert!(matches!(
        service.download("cat.png", None),
        Err(VaultError::BadEncryptionSecret)
    ));
}

#[test]
fn test_link_roundtrip() {
    let (service, _temp_dir) = create_test_service(true);
    let bytes = png(40, 30);
    service.upload("cat.png", bytes.clone(), None).unwrap();

    let link = service.create_link("cat.png", None, None).unwrap();
    let remaining = link.expires_at - Utc::now();
    assert!(remaining > chrono::Duration::hours(23));
    assert!(remaining <= chrono::Duration::hours(24));

    let redeemed = service.redeem_link(&link.token, None).unwrap();
    assert_eq!(redeemed.bytes, bytes);
    assert_eq!(
        redeemed.expires_at.map(|t| t.timestamp()),
        Some(link.expires_at.timestamp())
    );
}

#[test]
fn test_link_requires_existing_asset_and_secret() {
    let (service, _temp_dir) = create_test_service(false);
    assert!(service
        .create_link("missing.png", None, None)
        .unwrap_err()
        .is_not_found());

    service.upload("cat.png", png(8, 8), Some("pw")).unwrap();
    assert!(matches!(
        service.create_link("cat.png", None, Some("nope")),
        Err(VaultError::BadEncryptionSecret)
    ));
}

#[test]
fn test_link_secret_travels_in_token() {
    let (service, _temp_dir) = create_test_service(false);
    let bytes = png(8, 8);
    service.upload("cat.png", bytes.clone(), Some("pw")).unwrap();

    let link = service.create_link("cat.png", None, Some("pw")).unwrap();
    assert_eq!(service.redeem_link(&link.token, None).unwrap().bytes, bytes);
}

#[test]
fn test_redeem_falls_back_to_caller_secret() {
    let (service, _temp_dir) = create_test_service(false);
    let bytes = png(8, 8);
    service.upload("cat.png", bytes.clone(), Some("pw")).unwrap();

    // Link made without the secret; the holder has to bring it
    let token = service
        .codec
        .create_token("cat.png", None, None, None)
        .unwrap();
    assert_eq!(service.redeem_link(&token, Some("pw")).unwrap().bytes, bytes);
    assert!(matches!(
        service.redeem_link(&token, None),
        Err(VaultError::BadEncryptionSecret)
    ));
}

#[test]
fn test_expired_and_forged_links() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("cat.png", png(8, 8), None).unwrap();

    let expired = service
        .create_link("cat.png", Some(Duration::ZERO), None)
        .unwrap();
    std::thread::sleep(Duration::from_millis(1100));
    assert!(matches!(
        service.redeem_link(&expired.token, None),
        Err(VaultError::TokenExpired)
    ));

    assert!(matches!(
        service.redeem_link("definitely-not-a-token", None),
        Err(VaultError::InvalidToken)
    ));
}

#[test]
fn test_thumbnail_link() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("cat.png", png(800, 600), None).unwrap();

    let fit = service
        .create_thumbnail_link("cat.png", 200, false, None, None)
        .unwrap();
    let crop = service
        .create_thumbnail_link("cat.png", 200, true, None, None)
        .unwrap();

    assert_eq!(dimensions(&service.redeem_link(&fit.token, None).unwrap().bytes), (200, 150));
    assert_eq!(dimensions(&service.redeem_link(&crop.token, None).unwrap().bytes), (200, 200));
    assert_eq!(service.cache_stats().syntheses, 2);
}

#[test]
fn test_thumbnail_batch_skips_failures() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("a.png", png(64, 32), None).unwrap();
    service.upload("b.png", png(32, 64), None).unwrap();

    let names = vec!["a.png".to_string(), "missing.png".to_string(), "b.png".to_string()];
    let batch = service
        .create_thumbnail_links(&names, 16, false, None, None)
        .unwrap();

    assert_eq!(batch.tokens.len(), 2);
    assert!(!batch.tokens.contains_key("missing.png"));
    let b = service.redeem_link(&batch.tokens["b.png"], None).unwrap();
    assert_eq!(dimensions(&b.bytes), (8, 16));
}

#[test]
fn test_reupload_invalidates_thumbnail_links() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("cat.png", png(100, 50), None).unwrap();
    let link = service
        .create_thumbnail_link("cat.png", 20, false, None, None)
        .unwrap();

    service.upload("cat.png", png(50, 100), None).unwrap();
    assert!(service.redeem_link(&link.token, None).unwrap_err().is_not_found());

    // Asking again renders from the new source
    let link = service
        .create_thumbnail_link("cat.png", 20, false, None, None)
        .unwrap();
    assert_eq!(dimensions(&service.redeem_link(&link.token, None).unwrap().bytes), (10, 20));
}

#[test]
fn test_upload_link_is_single_use() {
    let (service, _temp_dir) = create_test_service(false);
    let link = service
        .create_upload_link("incoming/cat.png", None, Some("pw"), Some(&[64, 32]))
        .unwrap();
    assert_eq!(service.pending_uploads(), 1);

    let identity = service.redeem_upload_link(&link.token, png(128, 96)).unwrap();
    assert_eq!(identity, "incoming/cat.png");
    assert_eq!(service.pending_uploads(), 0);

    // Written with the token's secret and pre-generated in fit mode
    assert!(matches!(
        service.download("incoming/cat.png", None),
        Err(VaultError::BadEncryptionSecret)
    ));
    assert_eq!(service.cache_stats().syntheses, 2);
    assert!(service.store().exists("incoming/cat.png_64"));
    assert!(service.store().exists("incoming/cat.png_32"));

    assert!(matches!(
        service.redeem_upload_link(&link.token, png(8, 8)),
        Err(VaultError::InvalidToken)
    ));
}

#[test]
fn test_upload_link_survives_rejected_content() {
    let (service, _temp_dir) = create_test_service(false);
    let link = service.create_upload_link("cat.png", None, None, None).unwrap();

    assert!(matches!(
        service.redeem_upload_link(&link.token, b"not an image".to_vec()),
        Err(VaultError::InvalidContentType { .. })
    ));
    assert_eq!(service.pending_uploads(), 1);
    service.redeem_upload_link(&link.token, png(8, 8)).unwrap();
}

#[test]
fn test_pregeneration_failure_does_not_fail_upload() {
    let (service, _temp_dir) = create_test_service(false);

    // An animated GIF can be stored but not thumbnailed
    let mut gif = Vec::new();
    {
        let mut encoder = image::codecs::gif::GifEncoder::new(&mut gif);
        let frames = (0..2u8).map(|i| {
            image::Frame::new(image::RgbaImage::from_pixel(4, 4, image::Rgba([i * 100, 0, 0, 255])))
        });
        encoder.encode_frames(frames).unwrap();
    }

    let link = service
        .create_upload_link("anim.gif", None, None, Some(&[2]))
        .unwrap();
    service.redeem_upload_link(&link.token, gif).unwrap();
    assert!(service.store().exists("anim.gif"));
    assert!(!service.store().exists("anim.gif_2"));
}

#[test]
fn test_upload_link_grants_no_read_access() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("priv.png", png(16, 16), Some("pw")).unwrap();

    let upload = service
        .create_upload_link("priv.png", None, Some("pw"), None)
        .unwrap();
    assert!(matches!(
        service.redeem_link(&upload.token, None),
        Err(VaultError::InvalidToken)
    ));
    // Refusing the read does not consume the upload grant
    assert_eq!(service.pending_uploads(), 1);
}

#[test]
fn test_read_link_cannot_upload() {
    let (service, _temp_dir) = create_test_service(false);
    let original = png(16, 16);
    service.upload("cat.png", original.clone(), None).unwrap();

    let read = service.create_link("cat.png", None, None).unwrap();
    assert!(matches!(
        service.redeem_upload_link(&read.token, png(8, 8)),
        Err(VaultError::InvalidToken)
    ));
    assert_eq!(service.download("cat.png", None).unwrap(), original);
}

#[test]
fn test_secret_on_public_thumbnail_does_not_lock_it() {
    let (service, _temp_dir) = create_test_service(false);
    service.upload("pub.png", png(64, 32), None).unwrap();

    service
        .create_thumbnail_link("pub.png", 16, false, None, Some("whatever"))
        .unwrap();
    let link = service
        .create_thumbnail_link("pub.png", 16, false, None, None)
        .unwrap();
    assert_eq!(dimensions(&service.redeem_link(&link.token, None).unwrap().bytes), (16, 8));
}

#[test]
fn test_upload_link_rejects_bad_name_up_front() {
    let (service, _temp_dir) = create_test_service(false);
    assert!(matches!(
        service.create_upload_link("../escape.png", None, None, None),
        Err(VaultError::InvalidName { .. })
    ));
}

#[tokio::test]
async fn test_legacy_links() {
    let (service, _temp_dir) = create_test_service(false);
    let service = service.with_link_store(Arc::new(MemoryLinkStore::new()));
    let bytes = png(16, 16);
    service.upload("cat.png", bytes.clone(), None).unwrap();

    let link = service.create_legacy_link("cat.png", None, None).await.unwrap();
    assert!(link.token > 0);
    let redeemed = service.redeem_legacy_link(link.token, None).await.unwrap();
    assert_eq!(redeemed.bytes, bytes);
    assert!(service
        .redeem_legacy_link(link.token.wrapping_add(1), None)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_legacy_links_disabled_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = ServerConfig::with_storage_root(temp_dir.path().to_path_buf());
    let service = AssetService::start(&config).await.unwrap();
    service.upload("cat.png", png(8, 8), None).unwrap();

    assert!(matches!(
        service.create_legacy_link("cat.png", None, None).await,
        Err(VaultError::Config(_))
    ));
}

#[tokio::test]
async fn test_sweeper_follows_configured_interval() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ServerConfig::with_storage_root(temp_dir.path().to_path_buf());
    config.legacy_links.enabled = true;

    config.legacy_links.sweep_interval_secs = 0;
    let service = AssetService::start(&config).await.unwrap();
    assert!(service.legacy.is_some());
    assert!(service.sweeper.is_none());

    config.legacy_links.sweep_interval_secs = 60;
    let service = AssetService::start(&config).await.unwrap();
    assert!(service.sweeper.is_some());
}
