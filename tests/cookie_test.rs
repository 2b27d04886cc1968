//! Integration tests for browser cookie extraction.
//!
//! Builds synthetic Chromium and Firefox profiles on disk and runs the full
//! extraction path: master key unwrap, locked-copy, AES-256-GCM decryption.

use std::path::PathBuf;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::Connection;
use tempfile::TempDir;

use quotawatch::discovery::{
    BrowserCookieSource, ChromiumProfile, FirefoxProfile, SecretSource, StaticKeyUnwrap,
};

const KEY: [u8; 32] = [0xAB; 32];

fn encrypt_v10(plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(&KEY).unwrap();
    let nonce = [9u8; 12];
    let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce), plaintext).unwrap();

    let mut value = b"v10".to_vec();
    value.extend_from_slice(&nonce);
    value.extend_from_slice(&ciphertext);
    value
}

fn chromium_profile(dir: &TempDir, cookies: &[(&str, &str, Vec<u8>)]) -> ChromiumProfile {
    let mut blob = b"DPAPI".to_vec();
    blob.extend_from_slice(b"wrapped-master-key");
    let local_state = dir.path().join("Local State");
    std::fs::write(
        &local_state,
        serde_json::json!({"os_crypt": {"encrypted_key": BASE64.encode(&blob)}}).to_string(),
    )
    .unwrap();

    let cookies_db = dir.path().join("Cookies");
    let conn = Connection::open(&cookies_db).unwrap();
    conn.execute_batch("CREATE TABLE cookies (host_key TEXT, name TEXT, encrypted_value BLOB)")
        .unwrap();
    for (host, name, value) in cookies {
        conn.execute(
            "INSERT INTO cookies (host_key, name, encrypted_value) VALUES (?1, ?2, ?3)",
            rusqlite::params![host, name, value],
        )
        .unwrap();
    }

    ChromiumProfile {
        local_state,
        cookies_db,
    }
}

fn source_for(profile: ChromiumProfile) -> BrowserCookieSource {
    BrowserCookieSource::new(
        "zai",
        "example.com",
        "session_token",
        Arc::new(StaticKeyUnwrap(KEY.to_vec())),
    )
    .with_chromium_profiles(vec![profile])
}

#[tokio::test]
async fn v10_cookie_round_trips_through_the_full_path() {
    let dir = TempDir::new().unwrap();
    let profile = chromium_profile(
        &dir,
        &[(".example.com", "session_token", encrypt_v10(b"tok-round-trip"))],
    );

    let found = source_for(profile).discover().await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].provider_id, "zai");
    assert_eq!(found[0].secret, "tok-round-trip");
    assert_eq!(found[0].source_label, "Browser Cookie");
}

#[tokio::test]
async fn corrupted_cookie_is_skipped_without_aborting_the_batch() {
    let dir = TempDir::new().unwrap();
    let mut corrupted = encrypt_v10(b"unreadable");
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xff;

    let profile = chromium_profile(
        &dir,
        &[
            (".example.com", "broken_cookie", corrupted),
            (".example.com", "session_token", encrypt_v10(b"still-good")),
        ],
    );

    let found = source_for(profile).discover().await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].secret, "still-good");
}

#[tokio::test]
async fn firefox_profile_is_read_in_plaintext() {
    let dir = TempDir::new().unwrap();
    let cookies_db = dir.path().join("cookies.sqlite");
    let conn = Connection::open(&cookies_db).unwrap();
    conn.execute_batch("CREATE TABLE moz_cookies (host TEXT, name TEXT, value TEXT)")
        .unwrap();
    conn.execute(
        "INSERT INTO moz_cookies (host, name, value) VALUES ('.example.com', 'session_token', 'ff-tok')",
        [],
    )
    .unwrap();
    drop(conn);

    let source = BrowserCookieSource::new(
        "zai",
        "example.com",
        "session_token",
        Arc::new(StaticKeyUnwrap(KEY.to_vec())),
    )
    .with_firefox_profiles(vec![FirefoxProfile { cookies_db }]);

    let found = source.discover().await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].secret, "ff-tok");
}

#[tokio::test]
async fn missing_profiles_yield_nothing() {
    let source = BrowserCookieSource::new(
        "zai",
        "example.com",
        "session_token",
        Arc::new(StaticKeyUnwrap(KEY.to_vec())),
    )
    .with_chromium_profiles(vec![ChromiumProfile {
        local_state: PathBuf::from("/nonexistent/Local State"),
        cookies_db: PathBuf::from("/nonexistent/Cookies"),
    }]);

    assert!(source.discover().await.is_empty());
}
