//! Vault 암호화 프리미티브 및 마스터키 관리
//!
//! - 시크릿은 XChaCha20-Poly1305로 행 단위 암호화 (per-row 24 byte nonce)
//! - 마스터키는 프로세스 시작 시 1회 결정: env(`ROTOR_MASTER_KEY`, base64)
//!   → OS Keychain(`rotor:master_key_v1`) 순서로 조회
//! - 어디에도 없으면 `MasterKeyMissing`로 기동 실패. 조용한 재생성은
//!   기존 암호문을 전부 고아로 만들기 때문에 허용하지 않는다.
//!   (`MasterKey::provision`이 유일한 명시적 생성 경로)
//!
//! Vault export 파일 포맷 (v1):
//! - magic: `ROTRSEC1` (8 bytes)
//! - nonce: 24 bytes
//! - ciphertext: AEAD 결과 (= 암호문 + 태그)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use keyring::Entry;
use rand::Rng;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use zeroize::Zeroize;

use crate::error::CoreError;

/// Export 파일 매직 (8 bytes)
pub const VAULT_MAGIC: &[u8; 8] = b"ROTRSEC1";

/// 마스터키 길이 (256-bit)
pub const MASTER_KEY_LEN: usize = 32;

/// Nonce 길이 (XChaCha20-Poly1305용 24 bytes)
pub const NONCE_LEN: usize = 24;

/// Keychain 서비스 이름
const KEYCHAIN_SERVICE: &str = "com.rotor.app";
/// 마스터키 Keychain 키
const MASTER_KEY_KEYCHAIN_KEY: &str = "rotor:master_key_v1";
/// 마스터키 환경변수 (base64, 32 bytes)
const MASTER_KEY_ENV: &str = "ROTOR_MASTER_KEY";

/// Zeroize가 적용된 마스터키 래퍼
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 키 바이트는 절대 로그/디버그 출력에 노출하지 않는다
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// base64 문자열 → 마스터키
    pub fn from_base64(encoded: &str) -> Result<Self, CoreError> {
        let mut decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| CoreError::InvalidMasterKey)?;

        if decoded.len() != MASTER_KEY_LEN {
            decoded.zeroize();
            return Err(CoreError::InvalidMasterKey);
        }

        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(Self { bytes })
    }

    /// 기동 시 1회 호출: env → keychain 순서로 마스터키를 결정.
    /// 어디에도 없으면 `MasterKeyMissing` (fatal).
    pub fn resolve() -> Result<Self, CoreError> {
        if let Ok(encoded) = std::env::var(MASTER_KEY_ENV) {
            if !encoded.trim().is_empty() {
                return Self::from_base64(&encoded);
            }
        }

        match Self::load_from_keychain() {
            Ok(key) => Ok(key),
            Err(CoreError::MasterKeyMissing) => Err(CoreError::MasterKeyMissing),
            Err(e) => Err(e),
        }
    }

    /// 명시적 프로비저닝: 새 키를 생성해 Keychain에 저장.
    /// 이미 키가 있으면 실패한다 (기존 암호문 보호).
    pub fn provision() -> Result<Self, CoreError> {
        if Self::load_from_keychain().is_ok() {
            return Err(CoreError::Keychain(
                "master key already provisioned".to_string(),
            ));
        }

        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill(&mut bytes);
        let key = Self { bytes };

        key.save_to_keychain()?;
        println!("[Vault] New master key provisioned to keychain");
        Ok(key)
    }

    fn load_from_keychain() -> Result<Self, CoreError> {
        let entry = Entry::new(KEYCHAIN_SERVICE, MASTER_KEY_KEYCHAIN_KEY)
            .map_err(|e| CoreError::Keychain(e.to_string()))?;

        let password = match entry.get_password() {
            Ok(password) => password,
            Err(keyring::Error::NoEntry) => return Err(CoreError::MasterKeyMissing),
            Err(e) => return Err(CoreError::Keychain(e.to_string())),
        };

        Self::from_base64(&password)
    }

    fn save_to_keychain(&self) -> Result<(), CoreError> {
        let entry = Entry::new(KEYCHAIN_SERVICE, MASTER_KEY_KEYCHAIN_KEY)
            .map_err(|e| CoreError::Keychain(e.to_string()))?;

        entry
            .set_password(&BASE64.encode(self.bytes))
            .map_err(|e| CoreError::Keychain(e.to_string()))?;

        Ok(())
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.bytes).into())
    }
}

/// 시크릿 한 건 암호화 → (ciphertext, nonce)
pub fn seal_secret(key: &MasterKey, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?;

    Ok((ciphertext, nonce.to_vec()))
}

/// 시크릿 한 건 복호화
pub fn open_secret(key: &MasterKey, ciphertext: &[u8], nonce: &[u8]) -> Result<String, CoreError> {
    if nonce.len() != NONCE_LEN {
        return Err(CoreError::DecryptionFailed(format!(
            "invalid nonce length: {}",
            nonce.len()
        )));
    }

    let plaintext = key
        .cipher()
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| CoreError::DecryptionFailed(e.to_string()))?;

    match String::from_utf8(plaintext) {
        Ok(secret) => Ok(secret),
        Err(e) => {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            Err(CoreError::DecryptionFailed(
                "secret is not valid UTF-8".to_string(),
            ))
        }
    }
}

/// 페이로드를 암호화해 export 파일에 저장 (atomic write: tmp에 쓰고 rename)
pub fn encrypt_and_write(
    path: &Path,
    key: &MasterKey,
    plaintext: &[u8],
) -> Result<(), CoreError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CoreError::EncryptionFailed(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("vault.tmp");

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(VAULT_MAGIC)?;
    file.write_all(&nonce)?;
    file.write_all(&ciphertext)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Export 파일을 읽고 복호화
pub fn read_and_decrypt(path: &Path, key: &MasterKey) -> Result<Vec<u8>, CoreError> {
    let mut file = fs::File::open(path)?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != VAULT_MAGIC {
        return Err(CoreError::InvalidVaultFile("bad magic".to_string()));
    }

    let mut nonce = [0u8; NONCE_LEN];
    file.read_exact(&mut nonce)?;

    let mut ciphertext = Vec::new();
    file.read_to_end(&mut ciphertext)?;

    key.cipher()
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|e| CoreError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_key(seed: u8) -> MasterKey {
        MasterKey::from_bytes([seed; MASTER_KEY_LEN])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key(7);
        let (ciphertext, nonce) = seal_secret(&key, "hunter2!@#한글").unwrap();

        assert_ne!(ciphertext, b"hunter2!@#\xed\x95\x9c\xea\xb8\x80");
        assert_eq!(nonce.len(), NONCE_LEN);

        let opened = open_secret(&key, &ciphertext, &nonce).unwrap();
        assert_eq!(opened, "hunter2!@#한글");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = test_key(7);
        let (ct1, n1) = seal_secret(&key, "same").unwrap();
        let (ct2, n2) = seal_secret(&key, "same").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ciphertext, nonce) = seal_secret(&test_key(1), "secret").unwrap();
        let result = open_secret(&test_key(2), &ciphertext, &nonce);
        assert!(matches!(result, Err(CoreError::DecryptionFailed(_))));
    }

    #[test]
    fn test_corrupt_nonce_fails() {
        let key = test_key(1);
        let (ciphertext, _) = seal_secret(&key, "secret").unwrap();
        let result = open_secret(&key, &ciphertext, &[0u8; 3]);
        assert!(matches!(result, Err(CoreError::DecryptionFailed(_))));
    }

    #[test]
    fn test_file_roundtrip_and_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.vault");
        let key = test_key(9);

        encrypt_and_write(&path, &key, b"payload bytes").unwrap();
        assert_eq!(read_and_decrypt(&path, &key).unwrap(), b"payload bytes");

        std::fs::write(&path, b"NOTMAGICxxxxxxxxxxxxxxxxxxxxxxxxxxxx").unwrap();
        assert!(matches!(
            read_and_decrypt(&path, &key),
            Err(CoreError::InvalidVaultFile(_))
        ));
    }

    #[test]
    fn test_master_key_base64() {
        let encoded = BASE64.encode([3u8; MASTER_KEY_LEN]);
        assert!(MasterKey::from_base64(&encoded).is_ok());
        assert!(matches!(
            MasterKey::from_base64("c2hvcnQ="),
            Err(CoreError::InvalidMasterKey)
        ));
    }
}
