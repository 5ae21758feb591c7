//! Persistent token-decimals cache.
//!
//! Keyed by lowercase address, backed by a JSON file that is rewritten
//! atomically after fetch cycles. The cache is authoritative after the first
//! successful read; per-element fetch failures store the default so misses
//! are never repeated.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::{Address, Bytes, U256};
use dashmap::DashMap;
use eyre::{Context, Result};
use tracing::{debug, warn};

use crate::batch::{BatchFetcher, EthCall};
use crate::client::RpcClient;

/// `decimals()` function selector.
const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
/// Tokens fetched per batch on the miss path.
const FETCH_BATCH_SIZE: usize = 100;
/// Stored when a token's decimals are unknowable.
pub const DEFAULT_DECIMALS: u8 = 18;
/// Values above this are treated as garbage and replaced by the default.
const MAX_DECIMALS: u8 = 36;

/// Token → decimals mapping with JSON-file persistence.
pub struct DecimalsCache {
    path: PathBuf,
    entries: DashMap<Address, u8>,
    dirty: AtomicBool,
}

impl DecimalsCache {
    /// Loads the cache from `path`; a missing file yields an empty cache.
    ///
    /// # Errors
    /// Returns error only when the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = DashMap::new();

        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let stored: HashMap<String, u8> = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
            for (key, value) in stored {
                match key.parse::<Address>() {
                    Ok(address) => {
                        entries.insert(address, value.min(MAX_DECIMALS));
                    }
                    Err(_) => warn!(key, "skipping malformed address in decimals cache"),
                }
            }
            debug!(entries = entries.len(), path = %path.display(), "loaded decimals cache");
        }

        Ok(Self {
            path,
            entries,
            dirty: AtomicBool::new(false),
        })
    }

    /// Number of cached tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Memory-only lookup.
    pub fn get(&self, token: Address) -> Option<u8> {
        self.entries.get(&token).map(|entry| *entry)
    }

    /// Inserts a value and marks the cache dirty.
    pub fn insert(&self, token: Address, decimals: u8) {
        self.entries.insert(token, decimals.min(MAX_DECIMALS));
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Returns decimals for every requested token, fetching misses in
    /// batches of 100. Hits are served from memory with no I/O; fetch
    /// failures are stored as the default so they are not retried.
    pub async fn ensure(&self, client: &RpcClient, tokens: &[Address]) -> HashMap<Address, u8> {
        let mut result = HashMap::with_capacity(tokens.len());
        let mut seen = std::collections::HashSet::with_capacity(tokens.len());
        let mut misses = Vec::new();

        for &token in tokens {
            if !seen.insert(token) {
                continue;
            }
            match self.get(token) {
                Some(decimals) => {
                    result.insert(token, decimals);
                }
                None => misses.push(token),
            }
        }

        if misses.is_empty() {
            return result;
        }
        debug!(
            hits = result.len(),
            misses = misses.len(),
            "fetching missing token decimals"
        );

        let fetcher = BatchFetcher::new(client);
        for chunk in misses.chunks(FETCH_BATCH_SIZE) {
            let calls: Vec<EthCall> = chunk
                .iter()
                .map(|token| EthCall {
                    to: *token,
                    data: Bytes::from_static(&DECIMALS_SELECTOR),
                })
                .collect();

            let returns = fetcher.fetch(&calls).await;
            for (token, data) in chunk.iter().zip(returns) {
                let decimals = data
                    .as_deref()
                    .and_then(|bytes| decode_decimals(bytes))
                    .unwrap_or(DEFAULT_DECIMALS);
                self.insert(*token, decimals);
                result.insert(*token, decimals);
            }
        }

        result
    }

    /// Rewrites the backing file atomically (temp file + rename) when the
    /// cache has unsaved writes.
    pub fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let stored: HashMap<String, u8> = self
            .entries
            .iter()
            .map(|entry| (format!("{:#x}", entry.key()), *entry.value()))
            .collect();
        let json = serde_json::to_string_pretty(&stored).wrap_err("failed to serialize cache")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .wrap_err_with(|| format!("failed to replace {}", self.path.display()))?;

        debug!(entries = self.entries.len(), path = %self.path.display(), "flushed decimals cache");
        Ok(())
    }
}

fn decode_decimals(data: &[u8]) -> Option<u8> {
    if data.len() > 32 {
        return None;
    }
    let value = U256::from_be_slice(data);
    if value <= U256::from(MAX_DECIMALS) {
        Some(value.to::<u8>())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
    const WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");

    fn word(value: u8) -> Vec<u8> {
        let mut data = vec![0u8; 32];
        data[31] = value;
        data
    }

    #[test]
    fn decode_decimals_reads_low_byte() {
        assert_eq!(decode_decimals(&word(6)), Some(6));
        assert_eq!(decode_decimals(&word(18)), Some(18));
    }

    #[test]
    fn decode_decimals_rejects_garbage() {
        assert_eq!(decode_decimals(&word(200)), None);
        let mut high_word = word(6);
        high_word[0] = 0x01;
        assert_eq!(decode_decimals(&high_word), None);
        assert_eq!(decode_decimals(&[0u8; 64]), None);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DecimalsCache::load(dir.path().join("decimals.json")).expect("load");
        assert!(cache.is_empty());
    }

    #[test]
    fn writes_survive_flush_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache").join("decimals.json");

        let cache = DecimalsCache::load(&path).expect("load");
        cache.insert(USDC, 6);
        cache.insert(WETH, 18);
        cache.flush().expect("flush");

        let reloaded = DecimalsCache::load(&path).expect("reload");
        assert_eq!(reloaded.get(USDC), Some(6));
        assert_eq!(reloaded.get(WETH), Some(18));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn reload_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("decimals.json");

        let cache = DecimalsCache::load(&path).expect("load");
        cache.insert(USDC, 6);
        cache.flush().expect("flush");

        let first = DecimalsCache::load(&path).expect("first reload");
        let second = DecimalsCache::load(&path).expect("second reload");
        assert_eq!(first.get(USDC), second.get(USDC));
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn flush_without_writes_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("decimals.json");

        let cache = DecimalsCache::load(&path).expect("load");
        cache.flush().expect("flush");
        assert!(!path.exists());
    }

    #[test]
    fn cache_keys_serialize_lowercase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("decimals.json");

        let cache = DecimalsCache::load(&path).expect("load");
        cache.insert(USDC, 6);
        cache.flush().expect("flush");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("0x2791bca1f2de4661ed88a30c99a7a9449aa84174"));
    }
}
