//! Secure Storage Module
//!
//! Per-key files under the console data directory. On Windows the bytes are
//! protected with DPAPI so a copied file is useless on another account.

use std::path::{Path, PathBuf};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

/// File-backed storage with one `<key>.dat` file per key
#[derive(Debug, Clone)]
pub struct SecureStorage {
    storage_path: PathBuf,
}

impl SecureStorage {
    /// Open storage rooted at `storage_path`, creating the directory if needed
    pub fn open(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();

        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Secure storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    pub fn root(&self) -> &Path {
        &self.storage_path
    }

    /// Serialize `data` to JSON, protect it and write it under `key`
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec(data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let protected = protect(&json)?;

        std::fs::write(self.file_for(key), protected)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Saved protected data for key: {}", key);
        Ok(())
    }

    /// Read the value under `key`; `Ok(None)` when nothing is stored
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let protected = match std::fs::read(self.file_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let json = unprotect(&protected)?;

        serde_json::from_slice(&json)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Remove the value under `key`. Missing keys are not an error.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.file_for(key);

        match std::fs::remove_file(&file_path) {
            Ok(()) => {
                info!("Deleted stored data for key: {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_for(key).exists()
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.dat", key))
    }
}

#[cfg(windows)]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi::protect(data)
}

#[cfg(windows)]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi::unprotect(data)
}

// Plain bytes off Windows; the file lives in the user's private data dir.
#[cfg(not(windows))]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

#[cfg(windows)]
mod dpapi {
    use super::StorageError;
    use windows::Win32::Foundation::{LocalFree, HLOCAL};
    use windows::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
    };

    fn input_blob(data: &[u8]) -> CRYPT_INTEGER_BLOB {
        CRYPT_INTEGER_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        }
    }

    /// Copy a DPAPI output blob into owned memory and release the original.
    unsafe fn take(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
        let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();
        LocalFree(HLOCAL(blob.pbData as *mut std::ffi::c_void));
        bytes
    }

    pub fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
        let input = input_blob(data);
        let mut output = CRYPT_INTEGER_BLOB::default();

        unsafe {
            CryptProtectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
                .map_err(|e| StorageError::Encryption(e.to_string()))?;
            Ok(take(output))
        }
    }

    pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
        let input = input_blob(data);
        let mut output = CRYPT_INTEGER_BLOB::default();

        unsafe {
            CryptUnprotectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
                .map_err(|e| StorageError::Decryption(e.to_string()))?;
            Ok(take(output))
        }
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}
