//! Cache directory for footprints and reference results
//!
//! Two artifact kinds are written by a cached check:
//!
//! ```text
//! .huella_cache/
//! ├── {stem}-{hash}_results.bin        one per reference
//! └── footprint_{sha256(names)}.bin    key: concatenated reference names
//! ```
//!
//! Reference names are reduced to a file-safe stem followed by a short hash
//! of the full name, so names that only differ in unsafe characters
//! (`hw1/part1`, `hw1_part1`) never share a file.
//!
//! Artifacts are MessagePack blobs (rmp-serde). The layout is an internal
//! detail, versioned by [`CACHE_FORMAT_VERSION`], not a wire format.
//!
//! Persisted observations keep timing samples as samples, other values as
//! their type name and canonical tree, and values without an encoding as an
//! opaque token. Snapshots fingerprint exactly like the values they were
//! taken from, so footprints loaded back combine and deduplicate like the
//! originals.
//!
//! Each footprint artifact carries a store sequence number, one above the
//! highest already present in the directory. Loading replays footprints in
//! store order, which is the order their timestamps are offset in.

use crate::complexity::TimeComplexitySample;
use crate::fingerprint::{identity_token, Canonical, FingerprintError, Observable, ObservedValue};
use crate::footprint::{combine, CallRecord, Footprint, Observation};
use crate::reference::ReferenceResult;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = ".huella_cache";

/// Version of the persisted footprint layout
pub const CACHE_FORMAT_VERSION: u32 = 2;

const FOOTPRINT_PREFIX: &str = "footprint_";
const ARTIFACT_EXTENSION: &str = "bin";

/// Hex digits of the name hash appended to result file stems
const STEM_HASH_LEN: usize = 16;

/// Errors that can occur while reading or writing the cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode cache artifact: {0}")]
    EncodeError(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode cache artifact {path}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: rmp_serde::decode::Error,
    },

    #[error("Cache format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedFootprint {
    version: u32,
    sequence: u64,
    observations: Vec<PersistedObservation>,
    calls: Vec<CallRecord>,
    step_count: u64,
}

// Leading fields of a footprint artifact; the rest is skipped
#[derive(Debug, Deserialize)]
struct PersistedHeader {
    version: u32,
    sequence: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedObservation {
    value: PersistedValue,
    timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
enum PersistedValue {
    Timing(TimeComplexitySample),
    Data { type_name: String, tree: Canonical },
    Opaque { type_name: String, token: u64 },
}

impl PersistedValue {
    fn capture(shared: &ObservedValue) -> Self {
        let value: &dyn Observable = &**shared;
        if let Some(sample) = value.as_any().downcast_ref::<TimeComplexitySample>() {
            return PersistedValue::Timing(sample.clone());
        }
        match value.canonical() {
            Ok(tree) => PersistedValue::Data {
                type_name: value.type_name().to_string(),
                tree,
            },
            Err(e) => {
                tracing::warn!("caching {} as an opaque token: {}", value.type_name(), e);
                PersistedValue::Opaque {
                    type_name: value.type_name().to_string(),
                    token: identity_token(shared),
                }
            }
        }
    }

    fn restore(self) -> ObservedValue {
        match self {
            PersistedValue::Timing(sample) => Arc::new(sample) as ObservedValue,
            PersistedValue::Data { type_name, tree } => {
                Arc::new(RestoredValue { type_name, tree }) as ObservedValue
            }
            PersistedValue::Opaque { type_name, token } => {
                Arc::new(RestoredOpaque { type_name, token }) as ObservedValue
            }
        }
    }
}

/// Cached value, restored as the type name and tree it was stored with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredValue {
    pub type_name: String,
    pub tree: Canonical,
}

impl Observable for RestoredValue {
    fn canonical(&self) -> std::result::Result<Canonical, FingerprintError> {
        Ok(self.tree.clone())
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Placeholder for a cached value that had no content encoding
///
/// Still has no encoding, so each restored placeholder is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredOpaque {
    pub type_name: String,
    pub token: u64,
}

impl Serialize for RestoredOpaque {
    fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(format!(
            "cached {} has no content encoding",
            self.type_name
        )))
    }
}

/// Hex SHA-256 of the concatenated reference names
pub fn reference_key<S: AsRef<str>>(reference_names: &[S]) -> String {
    let mut hasher = Sha256::new();
    for name in reference_names {
        hasher.update(name.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// File-safe stem of a reference name: `{sanitized}-{hash}`
fn file_stem(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    format!("{}-{}", sanitized, &digest[..STEM_HASH_LEN])
}

/// Cache rooted at one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootprintCache {
    dir: PathBuf,
}

impl Default for FootprintCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl FootprintCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the result artifact for reference `name`
    pub fn results_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_results.{}", file_stem(name), ARTIFACT_EXTENSION))
    }

    /// Path of the footprint artifact for a set of references
    pub fn footprint_path<S: AsRef<str>>(&self, reference_names: &[S]) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            FOOTPRINT_PREFIX,
            reference_key(reference_names),
            ARTIFACT_EXTENSION
        ))
    }

    /// Persist one artifact per reference result
    pub fn store_results(&self, results: &[ReferenceResult]) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;

        let mut paths = Vec::with_capacity(results.len());
        for result in results {
            let path = self.results_path(&result.name);
            fs::write(&path, rmp_serde::to_vec_named(result)?)?;
            tracing::info!("cached result of {} at {}", result.name, path.display());
            paths.push(path);
        }
        Ok(paths)
    }

    /// Persist a footprint keyed by the references it was checked against
    pub fn store_footprint<S: AsRef<str>>(
        &self,
        footprint: &Footprint,
        reference_names: &[S],
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let persisted = PersistedFootprint {
            version: CACHE_FORMAT_VERSION,
            sequence: self.next_sequence()?,
            observations: footprint
                .observations()
                .iter()
                .map(|o| PersistedObservation {
                    value: PersistedValue::capture(&o.value),
                    timestamp: o.timestamp,
                })
                .collect(),
            calls: footprint.calls().to_vec(),
            step_count: footprint.step_count(),
        };

        let path = self.footprint_path(reference_names);
        fs::write(&path, rmp_serde::to_vec_named(&persisted)?)?;
        tracing::info!(
            "cached footprint #{} ({} observations) at {}",
            persisted.sequence,
            footprint.len(),
            path.display()
        );
        Ok(path)
    }

    /// One above the highest sequence number in the directory
    ///
    /// Unreadable artifacts are skipped; they fail again at load time.
    fn next_sequence(&self) -> Result<u64> {
        let mut highest = None;
        for path in self.footprint_paths()? {
            let header = fs::read(&path)
                .ok()
                .and_then(|bytes| rmp_serde::from_slice::<PersistedHeader>(&bytes).ok());
            match header {
                Some(header) if header.version == CACHE_FORMAT_VERSION => {
                    highest = highest.max(Some(header.sequence));
                }
                _ => tracing::debug!("no sequence number in {}", path.display()),
            }
        }
        Ok(highest.map_or(0, |h: u64| h.saturating_add(1)))
    }

    fn footprint_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_footprint = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with(FOOTPRINT_PREFIX)
                        && n.ends_with(&format!(".{}", ARTIFACT_EXTENSION))
                });
            if is_footprint {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Persist everything a check produced
    pub fn store_check(&self, footprint: &Footprint, results: &[ReferenceResult]) -> Result<()> {
        self.store_results(results)?;
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        self.store_footprint(footprint, &names)?;
        Ok(())
    }

    /// Read back the cached result of reference `name`
    pub fn load_result(&self, name: &str) -> Result<ReferenceResult> {
        let path = self.results_path(name);
        let bytes = fs::read(&path)?;
        rmp_serde::from_slice(&bytes).map_err(|source| CacheError::DecodeError { path, source })
    }

    /// Read one footprint artifact
    pub fn load_footprint(path: &Path) -> Result<Footprint> {
        Self::read_footprint(path).map(|(_, footprint)| footprint)
    }

    fn read_footprint(path: &Path) -> Result<(u64, Footprint)> {
        let bytes = fs::read(path)?;
        let persisted: PersistedFootprint =
            rmp_serde::from_slice(&bytes).map_err(|source| CacheError::DecodeError {
                path: path.to_path_buf(),
                source,
            })?;

        if persisted.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: persisted.version,
            });
        }

        let observations = persisted
            .observations
            .into_iter()
            .map(|o| Observation::new(o.value.restore(), o.timestamp))
            .collect();

        Ok((
            persisted.sequence,
            Footprint::from_parts(observations, persisted.calls, persisted.step_count),
        ))
    }

    /// Every cached footprint, in the order they were stored
    ///
    /// A missing cache directory holds no footprints.
    pub fn load_footprints(&self) -> Result<Vec<Footprint>> {
        let mut sequenced = self
            .footprint_paths()?
            .iter()
            .map(|path| Self::read_footprint(path))
            .collect::<Result<Vec<_>>>()?;
        // Stable: equal sequence numbers keep file name order
        sequenced.sort_by_key(|(sequence, _)| *sequence);

        let footprints: Vec<Footprint> = sequenced.into_iter().map(|(_, f)| f).collect();
        tracing::info!(
            "loaded {} cached footprints from {}",
            footprints.len(),
            self.dir.display()
        );
        Ok(footprints)
    }

    /// Every cached footprint combined into one
    pub fn load_combined(&self) -> Result<Footprint> {
        Ok(combine(&self.load_footprints()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::ComplexityClass;
    use crate::fingerprint::Opaque;
    use crate::footprint::CallKind;
    use crate::reference::{AnnotationDescriptor, AnnotationResult};
    use tempfile::TempDir;

    fn sample_footprint() -> Footprint {
        Footprint::from_parts(
            vec![
                Observation::of(vec![1, 2, 3], 1),
                Observation::of("text".to_string(), 2),
                Observation::of(TimeComplexitySample::new("f", 10, 0.5, 1.5), 3),
                Observation::of(2.5f64, 4),
            ],
            vec![CallRecord::new("main.rs:f", CallKind::Call)],
            6,
        )
    }

    fn sample_result(name: &str) -> ReferenceResult {
        ReferenceResult {
            name: name.to_string(),
            satisfied: true,
            results: vec![AnnotationResult {
                satisfied: true,
                annotation: AnnotationDescriptor {
                    kind: "time_complexity".to_string(),
                    name: "f".to_string(),
                    requirement: Some("linear".to_string()),
                },
                value: Some(ComplexityClass::LINEAR),
            }],
        }
    }

    #[test]
    fn test_reference_key_deterministic() {
        assert_eq!(reference_key(&["a", "b"]), reference_key(&["ab"]));
        assert_ne!(reference_key(&["a", "b"]), reference_key(&["b", "a"]));
        assert_eq!(reference_key(&["a"]).len(), 64);
    }

    #[test]
    fn test_footprint_roundtrip() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());
        let footprint = sample_footprint();

        let path = cache.store_footprint(&footprint, &["ref"]).unwrap();
        let loaded = FootprintCache::load_footprint(&path).unwrap();

        assert_eq!(loaded, footprint);
        let sample = loaded.observations()[2]
            .downcast_ref::<TimeComplexitySample>()
            .unwrap();
        assert_eq!(sample.n, 10);
    }

    #[test]
    fn test_opaque_values_survive_as_tokens() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());
        let footprint = Footprint::from_parts(
            vec![Observation::of(Opaque(std::sync::Mutex::new(1)), 0)],
            Vec::new(),
            1,
        );

        let path = cache.store_footprint(&footprint, &["ref"]).unwrap();
        let loaded = FootprintCache::load_footprint(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        let restored = loaded.observations()[0]
            .downcast_ref::<RestoredOpaque>()
            .unwrap();
        assert!(restored.type_name.contains("Mutex"));
        assert!(loaded.observations()[0].fingerprint().is_identity());
    }

    #[test]
    fn test_results_roundtrip() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path().join("nested"));

        let paths = cache.store_results(&[sample_result("hw1/part1")]).unwrap();
        assert_eq!(paths.len(), 1);
        let file_name = paths[0].file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("hw1_part1-"));
        assert!(file_name.ends_with("_results.bin"));

        let loaded = cache.load_result("hw1/part1").unwrap();
        assert_eq!(loaded, sample_result("hw1/part1"));
    }

    #[test]
    fn test_sanitized_names_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());

        let mut unsatisfied = sample_result("hw1_part1");
        unsatisfied.satisfied = false;
        cache
            .store_results(&[sample_result("hw1/part1"), unsatisfied])
            .unwrap();

        assert_ne!(cache.results_path("hw1/part1"), cache.results_path("hw1_part1"));
        assert!(cache.load_result("hw1/part1").unwrap().satisfied);
        assert!(!cache.load_result("hw1_part1").unwrap().satisfied);
        assert_eq!(cache.load_result("hw1_part1").unwrap().name, "hw1_part1");
    }

    #[test]
    fn test_restored_values_keep_fingerprints() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());
        let footprint = Footprint::from_parts(
            vec![
                Observation::of(f64::INFINITY, 0),
                Observation::of(f64::NEG_INFINITY, 1),
                Observation::of(None::<f64>, 2),
                Observation::of(5u64, 3),
                Observation::of(Some(5i32), 4),
            ],
            Vec::new(),
            5,
        );

        let path = cache.store_footprint(&footprint, &["ref"]).unwrap();
        let loaded = FootprintCache::load_footprint(&path).unwrap();

        assert_eq!(loaded.len(), 5);
        for (before, after) in footprint.observations().iter().zip(loaded.observations()) {
            assert_eq!(before.fingerprint(), after.fingerprint());
        }
        let restored = loaded.observations()[3]
            .downcast_ref::<RestoredValue>()
            .unwrap();
        assert_eq!(restored.type_name, "u64");
        assert_eq!(restored.tree, Canonical::UInt(5));

        // Restored and fresh copies still deduplicate against each other
        let fresh = Footprint::from_parts(vec![Observation::of(5u64, 0)], Vec::new(), 1);
        assert_eq!(combine([&loaded, &fresh]).len(), 5);
    }

    #[test]
    fn test_footprints_load_in_store_order() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());

        // File names are hashes, so store order is unrelated to name order
        let names = ["zeta", "alpha", "mid", "omega", "beta", "gamma"];
        for (i, name) in names.iter().enumerate() {
            let footprint = Footprint::from_parts(Vec::new(), Vec::new(), i as u64 + 1);
            cache.store_footprint(&footprint, &[name]).unwrap();
        }

        let steps: Vec<u64> = cache
            .load_footprints()
            .unwrap()
            .iter()
            .map(|f| f.step_count())
            .collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6]);

        // Storing again under an existing key moves it to the end
        let again = Footprint::from_parts(Vec::new(), Vec::new(), 10);
        cache.store_footprint(&again, &["alpha"]).unwrap();
        let steps: Vec<u64> = cache
            .load_footprints()
            .unwrap()
            .iter()
            .map(|f| f.step_count())
            .collect();
        assert_eq!(steps, vec![1, 3, 4, 5, 6, 10]);
    }

    #[test]
    fn test_later_segment_timestamps_follow_store_order() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());

        let first = Footprint::from_parts(vec![Observation::of("first", 0)], Vec::new(), 3);
        let second = Footprint::from_parts(vec![Observation::of("second", 0)], Vec::new(), 2);
        cache.store_footprint(&first, &["yy"]).unwrap();
        cache.store_footprint(&second, &["xx"]).unwrap();

        let combined = cache.load_combined().unwrap();
        assert_eq!(combined.observations()[0].timestamp, 0);
        assert_eq!(combined.observations()[1].timestamp, 3);
        assert_eq!(
            combined.observations()[1].downcast_ref::<RestoredValue>().unwrap().tree,
            Canonical::Str("second".to_string())
        );
    }

    #[test]
    fn test_old_format_is_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("footprint_old.bin");
        let old = PersistedFootprint {
            version: 1,
            sequence: 0,
            observations: Vec::new(),
            calls: Vec::new(),
            step_count: 0,
        };
        fs::write(&path, rmp_serde::to_vec_named(&old).unwrap()).unwrap();

        let err = FootprintCache::load_footprint(&path).unwrap_err();
        assert!(matches!(
            err,
            CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: 1
            }
        ));
    }

    #[test]
    fn test_load_from_missing_dir() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path().join("absent"));
        assert!(cache.load_footprints().unwrap().is_empty());
        assert_eq!(cache.load_combined().unwrap().step_count(), 0);
    }

    #[test]
    fn test_load_combined_skips_other_files() {
        let temp = TempDir::new().unwrap();
        let cache = FootprintCache::new(temp.path());

        cache.store_footprint(&sample_footprint(), &["a"]).unwrap();
        cache.store_footprint(&sample_footprint(), &["b"]).unwrap();
        cache.store_results(&[sample_result("a")]).unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let footprints = cache.load_footprints().unwrap();
        assert_eq!(footprints.len(), 2);

        let combined = cache.load_combined().unwrap();
        assert_eq!(combined.len(), 4);
        assert_eq!(combined.step_count(), 12);
        assert_eq!(combined.calls().len(), 2);
    }

    #[test]
    fn test_corrupt_artifact_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("footprint_bad.bin");
        fs::write(&path, b"not msgpack").unwrap();

        let err = FootprintCache::load_footprint(&path).unwrap_err();
        assert!(matches!(err, CacheError::DecodeError { .. }));
    }
}
