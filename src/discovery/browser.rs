//! Browser cookie secret source.
//!
//! Extracts session cookies from local browser profiles. Chromium-family
//! browsers wrap a per-profile master key with the OS user-scoped protection
//! API and encrypt cookie values with AES-256-GCM; Firefox stores values in
//! plaintext. Both keep their databases locked while the browser runs, so
//! every read goes through a private temporary copy that is removed on all
//! exit paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{QuotaWatchError, Result};

use super::{DiscoveredSecret, SecretSource};

const LABEL: &str = "Browser Cookie";

/// Tag prefixed to the base64-decoded master key blob in "Local State".
const KEY_BLOB_TAG: &[u8] = b"DPAPI";

/// Version prefixes marking AES-GCM-encrypted cookie values.
const GCM_PREFIXES: &[&[u8]] = &[b"v10", b"v11"];

const PREFIX_LEN: usize = 3;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Unwraps blobs protected by the OS user-scoped protection API.
///
/// The platform implementation (DPAPI on Windows, keychain-derived keys
/// elsewhere) plugs in here; tests inject fixed keys.
pub trait KeyUnwrap: Send + Sync {
    /// Returns the unwrapped bytes, or `None` when the blob cannot be
    /// unwrapped for this user.
    fn unwrap_blob(&self, blob: &[u8]) -> Option<Vec<u8>>;
}

/// Unwrap that returns a fixed byte string for any blob. For platforms with
/// a known static key and for tests.
pub struct StaticKeyUnwrap(pub Vec<u8>);

impl KeyUnwrap for StaticKeyUnwrap {
    fn unwrap_blob(&self, _blob: &[u8]) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

/// One Chromium-family profile: the browser-level "Local State" file holding
/// the wrapped master key, and the profile's cookie database.
#[derive(Debug, Clone)]
pub struct ChromiumProfile {
    pub local_state: PathBuf,
    pub cookies_db: PathBuf,
}

/// One Firefox profile (cookies stored unencrypted).
#[derive(Debug, Clone)]
pub struct FirefoxProfile {
    pub cookies_db: PathBuf,
}

/// A cookie as read from a profile, value already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Copy a possibly-locked database to a private temp file.
///
/// The source is opened read-only; the copy disappears when the returned
/// handle drops, including on error paths in the caller.
fn locked_copy(source: &Path) -> Result<NamedTempFile> {
    let bytes = std::fs::read(source)?;
    let mut copy = NamedTempFile::new()?;
    std::io::Write::write_all(&mut copy, &bytes)?;
    Ok(copy)
}

/// Read and unwrap the Chromium master key from a "Local State" file.
///
/// # Errors
/// Returns an error when the file is unreadable, the JSON shape is wrong,
/// the blob is not tagged, or the unwrap fails.
pub fn chromium_master_key(local_state: &Path, unwrap: &dyn KeyUnwrap) -> Result<Vec<u8>> {
    let raw = std::fs::read_to_string(local_state)?;
    let state: Value = serde_json::from_str(&raw)?;

    let encoded = state
        .get("os_crypt")
        .and_then(|v| v.get("encrypted_key"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            QuotaWatchError::ParseResponse("Local State has no os_crypt.encrypted_key".to_string())
        })?;

    let blob = BASE64
        .decode(encoded)
        .map_err(|e| QuotaWatchError::ParseResponse(format!("master key base64: {e}")))?;

    let wrapped = blob.strip_prefix(KEY_BLOB_TAG).ok_or_else(|| {
        QuotaWatchError::ParseResponse("master key blob missing DPAPI tag".to_string())
    })?;

    unwrap
        .unwrap_blob(wrapped)
        .ok_or_else(|| QuotaWatchError::ParseResponse("master key unwrap failed".to_string()))
}

/// Decrypt one Chromium cookie value.
///
/// Versioned values are 3-byte prefix + 12-byte nonce + ciphertext +
/// 16-byte tag under AES-256-GCM with the profile master key; anything else
/// is legacy whole-value protection-API encryption.
#[must_use]
pub fn decrypt_cookie_value(
    encrypted: &[u8],
    master_key: &[u8],
    unwrap: &dyn KeyUnwrap,
) -> Option<String> {
    if GCM_PREFIXES.iter().any(|p| encrypted.starts_with(p)) {
        if encrypted.len() < PREFIX_LEN + NONCE_LEN + TAG_LEN {
            return None;
        }
        let nonce = &encrypted[PREFIX_LEN..PREFIX_LEN + NONCE_LEN];
        let ciphertext = &encrypted[PREFIX_LEN + NONCE_LEN..];

        let cipher = Aes256Gcm::new_from_slice(master_key).ok()?;
        let plaintext = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    } else {
        let plaintext = unwrap.unwrap_blob(encrypted)?;
        String::from_utf8(plaintext).ok()
    }
}

/// Read all cookies for a domain from a Chromium profile.
///
/// Individual decryption failures skip that cookie; the batch continues.
pub fn read_chromium_cookies(
    profile: &ChromiumProfile,
    domain: &str,
    unwrap: &dyn KeyUnwrap,
) -> Result<Vec<Cookie>> {
    let master_key = chromium_master_key(&profile.local_state, unwrap)?;

    let copy = locked_copy(&profile.cookies_db)?;
    let conn = Connection::open_with_flags(copy.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| QuotaWatchError::History(format!("open cookie db: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT name, encrypted_value FROM cookies WHERE host_key LIKE ?1")
        .map_err(|e| QuotaWatchError::History(format!("prepare cookie query: {e}")))?;

    let rows = stmt
        .query_map([format!("%{domain}%")], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(|e| QuotaWatchError::History(format!("query cookies: {e}")))?;

    let mut cookies = Vec::new();
    for row in rows {
        let Ok((name, encrypted)) = row else {
            continue;
        };
        match decrypt_cookie_value(&encrypted, &master_key, unwrap) {
            Some(value) => cookies.push(Cookie { name, value }),
            None => debug!(cookie = %name, "cookie decryption failed, skipping"),
        }
    }

    Ok(cookies)
}

/// Read all cookies for a domain from a Firefox profile (plaintext values).
pub fn read_firefox_cookies(profile: &FirefoxProfile, domain: &str) -> Result<Vec<Cookie>> {
    let copy = locked_copy(&profile.cookies_db)?;
    let conn = Connection::open_with_flags(copy.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| QuotaWatchError::History(format!("open cookie db: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT name, value FROM moz_cookies WHERE host LIKE ?1")
        .map_err(|e| QuotaWatchError::History(format!("prepare cookie query: {e}")))?;

    let rows = stmt
        .query_map([format!("%{domain}%")], |row| {
            Ok(Cookie {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })
        .map_err(|e| QuotaWatchError::History(format!("query cookies: {e}")))?;

    Ok(rows.filter_map(std::result::Result::ok).collect())
}

/// Secret source backed by browser session cookies.
///
/// Profiles are scanned in order; the first one yielding any cookie for the
/// domain ends the scan, whether or not it holds the wanted cookie.
pub struct BrowserCookieSource {
    provider_id: String,
    domain: String,
    cookie_name: String,
    chromium_profiles: Vec<ChromiumProfile>,
    firefox_profiles: Vec<FirefoxProfile>,
    unwrap: Arc<dyn KeyUnwrap>,
}

impl BrowserCookieSource {
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        domain: impl Into<String>,
        cookie_name: impl Into<String>,
        unwrap: Arc<dyn KeyUnwrap>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            domain: domain.into(),
            cookie_name: cookie_name.into(),
            chromium_profiles: Vec::new(),
            firefox_profiles: Vec::new(),
            unwrap,
        }
    }

    #[must_use]
    pub fn with_chromium_profiles(mut self, profiles: Vec<ChromiumProfile>) -> Self {
        self.chromium_profiles = profiles;
        self
    }

    #[must_use]
    pub fn with_firefox_profiles(mut self, profiles: Vec<FirefoxProfile>) -> Self {
        self.firefox_profiles = profiles;
        self
    }

    fn first_cookie_set(&self) -> Vec<Cookie> {
        for profile in &self.chromium_profiles {
            match read_chromium_cookies(profile, &self.domain, self.unwrap.as_ref()) {
                Ok(cookies) if !cookies.is_empty() => return cookies,
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        profile = %profile.cookies_db.display(),
                        error = %e,
                        "chromium profile unreadable, skipping"
                    );
                }
            }
        }
        for profile in &self.firefox_profiles {
            match read_firefox_cookies(profile, &self.domain) {
                Ok(cookies) if !cookies.is_empty() => return cookies,
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        profile = %profile.cookies_db.display(),
                        error = %e,
                        "firefox profile unreadable, skipping"
                    );
                }
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl SecretSource for BrowserCookieSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        let cookies = self.first_cookie_set();
        cookies
            .into_iter()
            .find(|c| c.name == self.cookie_name)
            .map(|c| vec![DiscoveredSecret::new(&self.provider_id, c.value, LABEL)])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_KEY: [u8; 32] = [7u8; 32];

    fn encrypt_v10(plaintext: &[u8], key: &[u8; 32]) -> Vec<u8> {
        let cipher = Aes256Gcm::new_from_slice(key).unwrap();
        let nonce = [1u8; NONCE_LEN];
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .unwrap();

        let mut value = b"v10".to_vec();
        value.extend_from_slice(&nonce);
        value.extend_from_slice(&ciphertext);
        value
    }

    fn write_local_state(dir: &TempDir) -> PathBuf {
        let mut blob = KEY_BLOB_TAG.to_vec();
        blob.extend_from_slice(b"opaque-wrapped-key");
        let state = serde_json::json!({
            "os_crypt": {"encrypted_key": BASE64.encode(&blob)}
        });
        let path = dir.path().join("Local State");
        std::fs::write(&path, state.to_string()).unwrap();
        path
    }

    fn write_chromium_db(dir: &TempDir, rows: &[(&str, &str, Vec<u8>)]) -> PathBuf {
        let path = dir.path().join("Cookies");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cookies (host_key TEXT, name TEXT, encrypted_value BLOB)",
        )
        .unwrap();
        for (host, name, value) in rows {
            conn.execute(
                "INSERT INTO cookies (host_key, name, encrypted_value) VALUES (?1, ?2, ?3)",
                rusqlite::params![host, name, value],
            )
            .unwrap();
        }
        path
    }

    fn test_profile(dir: &TempDir, rows: &[(&str, &str, Vec<u8>)]) -> ChromiumProfile {
        ChromiumProfile {
            local_state: write_local_state(dir),
            cookies_db: write_chromium_db(dir, rows),
        }
    }

    fn unwrap() -> StaticKeyUnwrap {
        StaticKeyUnwrap(TEST_KEY.to_vec())
    }

    #[test]
    fn v10_round_trip_reproduces_plaintext() {
        let encrypted = encrypt_v10(b"session-token-42", &TEST_KEY);
        let decrypted = decrypt_cookie_value(&encrypted, &TEST_KEY, &unwrap()).unwrap();
        assert_eq!(decrypted, "session-token-42");
    }

    #[test]
    fn corrupted_tag_fails_cleanly() {
        let mut encrypted = encrypt_v10(b"secret", &TEST_KEY);
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        assert!(decrypt_cookie_value(&encrypted, &TEST_KEY, &unwrap()).is_none());
    }

    #[test]
    fn truncated_value_fails_cleanly() {
        assert!(decrypt_cookie_value(b"v10short", &TEST_KEY, &unwrap()).is_none());
    }

    #[test]
    fn legacy_value_goes_through_unwrap() {
        // No version prefix: the whole value is protection-API-wrapped.
        let unwrapper = StaticKeyUnwrap(b"legacy-plaintext".to_vec());
        let decrypted =
            decrypt_cookie_value(b"\x01\x02opaque", &TEST_KEY, &unwrapper).unwrap();
        assert_eq!(decrypted, "legacy-plaintext");
    }

    #[test]
    fn master_key_requires_dpapi_tag() {
        let dir = TempDir::new().unwrap();
        let state = serde_json::json!({
            "os_crypt": {"encrypted_key": BASE64.encode(b"untagged")}
        });
        let path = dir.path().join("Local State");
        std::fs::write(&path, state.to_string()).unwrap();

        assert!(chromium_master_key(&path, &unwrap()).is_err());
    }

    #[test]
    fn chromium_read_skips_undecryptable_cookies() {
        let dir = TempDir::new().unwrap();
        let mut corrupted = encrypt_v10(b"broken", &TEST_KEY);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        let profile = test_profile(
            &dir,
            &[
                (".example.com", "session", encrypt_v10(b"good-token", &TEST_KEY)),
                (".example.com", "broken", corrupted),
                (".other.org", "unrelated", encrypt_v10(b"x", &TEST_KEY)),
            ],
        );

        let cookies = read_chromium_cookies(&profile, "example.com", &unwrap()).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "session");
        assert_eq!(cookies[0].value, "good-token");
    }

    #[test]
    fn firefox_cookies_read_in_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE moz_cookies (host TEXT, name TEXT, value TEXT)")
            .unwrap();
        conn.execute(
            "INSERT INTO moz_cookies (host, name, value) VALUES ('.example.com', 'session', 'ff-token')",
            [],
        )
        .unwrap();
        drop(conn);

        let cookies =
            read_firefox_cookies(&FirefoxProfile { cookies_db: path }, "example.com").unwrap();
        assert_eq!(cookies, vec![Cookie {
            name: "session".to_string(),
            value: "ff-token".to_string(),
        }]);
    }

    #[tokio::test]
    async fn first_profile_with_cookies_wins() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();

        let first = test_profile(
            &first_dir,
            &[(".example.com", "session", encrypt_v10(b"first", &TEST_KEY))],
        );
        let second = test_profile(
            &second_dir,
            &[(".example.com", "session", encrypt_v10(b"second", &TEST_KEY))],
        );

        let source = BrowserCookieSource::new(
            "zai",
            "example.com",
            "session",
            Arc::new(unwrap()),
        )
        .with_chromium_profiles(vec![first, second]);

        let found = source.discover().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].secret, "first");
        assert_eq!(found[0].source_label, LABEL);
    }

    #[tokio::test]
    async fn unreadable_profile_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let broken = ChromiumProfile {
            local_state: PathBuf::from("/nonexistent/Local State"),
            cookies_db: PathBuf::from("/nonexistent/Cookies"),
        };
        let good = test_profile(
            &dir,
            &[(".example.com", "session", encrypt_v10(b"tok", &TEST_KEY))],
        );

        let source = BrowserCookieSource::new(
            "zai",
            "example.com",
            "session",
            Arc::new(unwrap()),
        )
        .with_chromium_profiles(vec![broken, good]);

        let found = source.discover().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].secret, "tok");
    }
}
