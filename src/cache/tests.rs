//! Derivation cache tests
//!
//! Cover lazy synthesis, dependency registration, concurrent requests for the
//! same key and secret handling on both sources and derivatives.

use super::*;
use crate::core::error::VaultError;
use crate::crypto::envelope::{is_sealed, seal};
use crate::storage::NamingPolicy;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tempfile::TempDir;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn create_test_cache(policy: NamingPolicy) -> (DerivationCache, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = AssetStore::new(temp_dir.path(), policy);
    (DerivationCache::new(store, Thumbnailer::new(75)), temp_dir)
}

fn put_source(cache: &DerivationCache, name: &str, secret: Option<&str>) {
    let store = cache.store();
    let identity = store.asset_identity(name).unwrap();
    store
        .write(&identity, &seal(secret, png(800, 600)).unwrap())
        .unwrap();
}

#[test]
fn test_first_request_synthesizes_then_hits() {
    let (cache, _temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "cat.png", None);

    let first = cache.check_or_create("cat.png", 200, false, None).unwrap();
    let second = cache.check_or_create("cat.png", 200, false, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(image::load_from_memory(&first).unwrap().dimensions(), (200, 150));

    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 1,
            misses: 1,
            syntheses: 1,
        }
    );
}

#[test]
fn test_crop_and_fit_are_separate_entries() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "cat.png", None);

    let fit = cache.check_or_create("cat.png", 100, false, None).unwrap();
    let crop = cache.check_or_create("cat.png", 100, true, None).unwrap();
    assert_eq!(image::load_from_memory(&fit).unwrap().dimensions(), (100, 75));
    assert_eq!(image::load_from_memory(&crop).unwrap().dimensions(), (100, 100));

    assert!(temp_dir.path().join("cat.png_100").is_file());
    assert!(temp_dir.path().join("cat.png_100_crop").is_file());
}

#[test]
fn test_derivative_is_registered_with_source() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Hashed);
    put_source(&cache, "albums/cat.png", None);
    cache.check_or_create("albums/cat.png", 64, true, None).unwrap();

    let store = cache.store();
    let source = store.asset_identity("albums/cat.png").unwrap();
    let derivative = store
        .derivative_identity(&DerivativeKey::new("albums/cat.png", 64, true).unwrap())
        .unwrap();

    let entries = store.dependencies(&source).entries().unwrap();
    assert_eq!(entries, vec![derivative.clone()]);
    assert!(temp_dir.path().join(&derivative).is_file());
}

#[test]
fn test_concurrent_requests_converge() {
    let (cache, _temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "cat.png", None);

    let results: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| cache.check_or_create("cat.png", 120, false, None).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 8);
    assert!(stats.syntheses >= 1);

    // However many threads raced, the record names the derivative once
    let entries = cache.store().dependencies("cat.png").entries().unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_purged_derivative_is_rebuilt() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "cat.png", None);
    cache.check_or_create("cat.png", 50, false, None).unwrap();

    cache.store().dependencies("cat.png").purge().unwrap();
    assert!(!temp_dir.path().join("cat.png_50").exists());

    cache.check_or_create("cat.png", 50, false, None).unwrap();
    assert_eq!(cache.stats().syntheses, 2);
}

#[test]
fn test_missing_source_is_not_found() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    let err = cache.check_or_create("ghost.png", 50, false, None).unwrap_err();
    assert!(err.is_not_found());
    assert!(!temp_dir.path().join("ghost.png_deps").exists());
    assert_eq!(cache.stats().syntheses, 0);
}

#[test]
fn test_encrypted_source_and_derivative() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "secret.png", Some("hunter2"));

    let thumb = cache
        .check_or_create("secret.png", 80, false, Some("hunter2"))
        .unwrap();
    assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (80, 60));

    let stored = std::fs::read(temp_dir.path().join("secret.png_80")).unwrap();
    assert!(is_sealed(&stored));
}

#[test]
fn test_wrong_secret_on_source() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "secret.png", Some("hunter2"));

    for secret in [None, Some("wrong")] {
        let err = cache
            .check_or_create("secret.png", 80, false, secret)
            .unwrap_err();
        assert!(matches!(err, VaultError::BadEncryptionSecret));
    }
    assert!(!temp_dir.path().join("secret.png_80").exists());
}

#[test]
fn test_wrong_secret_on_existing_derivative_is_not_regenerated() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "secret.png", Some("hunter2"));
    cache
        .check_or_create("secret.png", 80, false, Some("hunter2"))
        .unwrap();
    let before = std::fs::read(temp_dir.path().join("secret.png_80")).unwrap();

    let err = cache
        .check_or_create("secret.png", 80, false, Some("wrong"))
        .unwrap_err();
    assert!(matches!(err, VaultError::BadEncryptionSecret));

    let after = std::fs::read(temp_dir.path().join("secret.png_80")).unwrap();
    assert_eq!(before, after);
    assert_eq!(cache.stats().syntheses, 1);
}

#[test]
fn test_public_source_keeps_public_derivative() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "pub.png", None);

    cache
        .check_or_create("pub.png", 40, false, Some("whatever"))
        .unwrap();
    let stored = std::fs::read(temp_dir.path().join("pub.png_40")).unwrap();
    assert!(!is_sealed(&stored));

    // Callers without a secret still get the cached thumbnail
    let thumb = cache.check_or_create("pub.png", 40, false, None).unwrap();
    assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (40, 30));
    assert_eq!(cache.stats().syntheses, 1);
}

#[test]
fn test_source_changes_reach_thumbnails_of_thumbnails() {
    let (cache, temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    let writer = crate::writer::ContentWriter::new(cache.store().clone());
    put_source(&cache, "cat.png", None);

    cache.check_or_create("cat.png", 200, false, None).unwrap();
    cache.check_or_create("cat.png_200", 100, false, None).unwrap();
    assert!(temp_dir.path().join("cat.png_200_100").is_file());

    writer.write_asset("cat.png", png(600, 800), None).unwrap();
    assert!(!temp_dir.path().join("cat.png_200").exists());
    assert!(!temp_dir.path().join("cat.png_200_100").exists());
    assert!(!temp_dir.path().join("cat.png_200_deps").exists());
}

#[test]
fn test_hashed_keys_of_different_sources_stay_apart() {
    let (cache, _temp_dir) = create_test_cache(NamingPolicy::Hashed);
    put_source(&cache, "a1", None);
    let store = cache.store();
    store
        .write(&store.asset_identity("a12").unwrap(), &png(100, 400))
        .unwrap();

    let a1 = cache.check_or_create("a1", 23, false, None).unwrap();
    let a12 = cache.check_or_create("a12", 3, false, None).unwrap();
    assert_ne!(a1, a12);
    assert_eq!(image::load_from_memory(&a12).unwrap().dimensions(), (1, 3));
}

#[test]
fn test_zero_resolution_rejected() {
    let (cache, _temp_dir) = create_test_cache(NamingPolicy::Verbatim);
    put_source(&cache, "cat.png", None);
    assert!(matches!(
        cache.check_or_create("cat.png", 0, false, None),
        Err(VaultError::InvalidResolution { resolution: 0 })
    ));
}
