// 输入获取的白名单分类与拒绝路径测试
use std::fs;
use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use proptest::prelude::*;

use media_converter::converter::acquire::{
    acquire, classify_mime, IMAGE_MIME_ALLOWLIST, VIDEO_MIME_ALLOWLIST,
};
use media_converter::converter::formats::MediaKind;
use media_converter::converter::{ConvertConfig, ConvertError};

fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x % 255) as u8, (y % 255) as u8, 64, 255])
    });

    let dyn_img = DynamicImage::ImageRgba8(img);
    let mut cursor = Cursor::new(Vec::new());
    dyn_img
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("failed to encode test image");
    cursor.into_inner()
}

// 最小 mp4 头：ftyp box，足够让签名嗅探命中 video/mp4
fn create_mp4_header_bytes() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
    bytes.extend_from_slice(b"ftypmp42");
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    bytes.extend_from_slice(b"mp42isom");
    bytes
}

#[test]
fn png_file_is_classified_as_image() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("sample.png");
    fs::write(&path, create_png_bytes(16, 16)).expect("write fixture should succeed");

    let config = ConvertConfig::default();
    let source = acquire(path.to_str().expect("utf8 path"), None, &config)
        .expect("png acquisition should succeed");

    assert_eq!(source.kind, MediaKind::Image);
    assert_eq!(source.mime, "image/png");
    assert_eq!(source.name, "sample.png");
}

#[test]
fn declared_mime_takes_precedence_over_extension() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("sample.bin");
    fs::write(&path, create_png_bytes(16, 16)).expect("write fixture should succeed");

    let config = ConvertConfig::default();
    let source = acquire(
        path.to_str().expect("utf8 path"),
        Some("image/png".to_string()),
        &config,
    )
    .expect("declared-mime acquisition should succeed");

    assert_eq!(source.kind, MediaKind::Image);
}

#[test]
fn mp4_signature_is_classified_as_video() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("clip.mp4");
    fs::write(&path, create_mp4_header_bytes()).expect("write fixture should succeed");

    let config = ConvertConfig::default();
    let source = acquire(path.to_str().expect("utf8 path"), None, &config)
        .expect("mp4 acquisition should succeed");

    assert_eq!(source.kind, MediaKind::Video);
    assert_eq!(source.mime, "video/mp4");
}

#[test]
fn pdf_declaration_is_rejected_as_unsupported() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("doc.pdf");
    fs::write(&path, b"%PDF-1.7 not really a pdf").expect("write fixture should succeed");

    let config = ConvertConfig::default();
    let result = acquire(
        path.to_str().expect("utf8 path"),
        Some("application/pdf".to_string()),
        &config,
    );

    assert!(matches!(result, Err(ConvertError::UnsupportedType(_))));
}

#[test]
fn image_bytes_masquerading_as_video_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("fake.mp4");
    fs::write(&path, create_png_bytes(16, 16)).expect("write fixture should succeed");

    let config = ConvertConfig::default();
    let result = acquire(path.to_str().expect("utf8 path"), None, &config);

    assert!(matches!(result, Err(ConvertError::UnsupportedType(_))));
}

#[test]
fn oversized_file_hits_the_resource_limit() {
    let dir = tempfile::tempdir().expect("tempdir should succeed");
    let path = dir.path().join("big.png");
    fs::write(&path, create_png_bytes(64, 64)).expect("write fixture should succeed");

    let mut config = ConvertConfig::default();
    config.max_file_size = 16;

    let result = acquire(path.to_str().expect("utf8 path"), None, &config);
    assert!(matches!(result, Err(ConvertError::ResourceLimit(_))));
}

proptest! {
    #[test]
    fn every_allowlisted_image_mime_maps_to_image(index in 0usize..IMAGE_MIME_ALLOWLIST.len()) {
        let mime = IMAGE_MIME_ALLOWLIST[index];
        prop_assert_eq!(classify_mime(mime), Some(MediaKind::Image));
        prop_assert_eq!(classify_mime(&mime.to_uppercase()), Some(MediaKind::Image));
    }

    #[test]
    fn every_allowlisted_video_mime_maps_to_video(index in 0usize..VIDEO_MIME_ALLOWLIST.len()) {
        let mime = VIDEO_MIME_ALLOWLIST[index];
        prop_assert_eq!(classify_mime(mime), Some(MediaKind::Video));
        prop_assert_eq!(classify_mime(&mime.to_uppercase()), Some(MediaKind::Video));
    }

    #[test]
    fn arbitrary_off_list_mimes_are_unclassified(
        top in "[a-z]{3,12}",
        sub in "[a-z0-9.+-]{1,16}",
    ) {
        let mime = format!("{}/{}", top, sub);
        prop_assume!(!IMAGE_MIME_ALLOWLIST.contains(&mime.as_str()));
        prop_assume!(!VIDEO_MIME_ALLOWLIST.contains(&mime.as_str()));

        prop_assert_eq!(classify_mime(&mime), None);
    }
}
