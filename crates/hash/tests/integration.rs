//! Integration tests for hash crate

use sprig_hash::Hash;
use tempfile::tempdir;
use tokio::fs;

#[test]
fn hex_roundtrip() {
    let hash = Hash::from_data(b"zlib@1.3");
    let parsed = Hash::from_hex(&hash.to_hex()).unwrap();
    assert_eq!(hash, parsed);
    assert_eq!(hash.short().len(), sprig_hash::SHORT_LEN);
    assert!(hash.to_hex().starts_with(&hash.short()));
}

#[test]
fn rejects_wrong_length() {
    assert!(Hash::from_hex("abcd").is_err());
    assert!(Hash::from_hex("not hex").is_err());
}

#[test]
fn serializes_as_hex_string() {
    let hash = Hash::from_data(b"");
    let json = serde_json::to_string(&hash).unwrap();
    assert_eq!(json, format!("\"{}\"", hash.to_hex()));
}

#[tokio::test]
async fn file_hash_matches_data_hash() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("src.tar");
    fs::write(&path, b"archive bytes").await.unwrap();
    let from_file = Hash::hash_file(&path).await.unwrap();
    assert_eq!(from_file, Hash::from_data(b"archive bytes"));
}

#[tokio::test]
async fn missing_file_is_io_error() {
    let temp = tempdir().unwrap();
    let err = Hash::hash_file(&temp.path().join("missing")).await.unwrap_err();
    assert!(matches!(err, sprig_errors::Error::Io { .. }));
}
