use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::script::{Script, Substory};

/// Suffix marking a package directory as claimed by a worker.
const CLAIM_SUFFIX: &str = ".claimed";

/// Everything persisted about one package, written as `script.json` at
/// packaging time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package id (directory name)
    pub id: String,
    /// Stem of the processed script this substory came from
    pub source: String,
    /// Packaging timestamp
    pub created_at: DateTime<Utc>,
    /// The one substory this package renders
    pub substory: Substory,
}

/// Pipeline stage of a package, derived from the artifacts on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStage {
    /// Only the script copy exists
    Created,
    /// Images generated, audio still missing
    ImagesDone,
    /// Images and audio generated; eligible for video assembly
    AudioDone,
    /// Video rendered but not yet promoted
    VideoDone,
}

/// One unit of work: a UUID-keyed directory owning a substory's script
/// copy and its generated assets through to the final video.
#[derive(Debug, Clone)]
pub struct Package {
    /// Package id (uuid string)
    pub id: String,
    /// Current directory (inside `packages/`, possibly claim-suffixed)
    pub path: PathBuf,
}

impl Package {
    /// Rehydrate from an existing directory.
    pub fn from_dir(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid package directory: {}", path.display()))?;

        Ok(Self {
            id: name.trim_end_matches(CLAIM_SUFFIX).to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn script_path(&self) -> PathBuf {
        self.path.join("script.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.path.join("images")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.path.join("audio")
    }

    pub fn captions_path(&self) -> PathBuf {
        self.path.join("captions.srt")
    }

    pub fn video_path(&self) -> PathBuf {
        self.path.join("video.mp4")
    }

    pub fn is_claimed(&self) -> bool {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(CLAIM_SUFFIX))
    }

    /// Readiness predicate for video assembly: script copy present AND
    /// images directory non-empty AND audio directory non-empty. This is
    /// the contract a batch sweep resumes against.
    pub fn is_ready_for_video(&self) -> bool {
        self.script_path().exists()
            && dir_has_entries(&self.images_dir())
            && dir_has_entries(&self.audio_dir())
    }

    /// Current stage, derived purely from what exists on disk.
    pub fn stage(&self) -> PackageStage {
        if self.video_path().exists() {
            PackageStage::VideoDone
        } else if self.is_ready_for_video() {
            PackageStage::AudioDone
        } else if dir_has_entries(&self.images_dir()) {
            PackageStage::ImagesDone
        } else {
            PackageStage::Created
        }
    }

    /// Read the manifest back.
    pub async fn manifest(&self) -> Result<PackageManifest> {
        let content = tokio::fs::read_to_string(self.script_path())
            .await
            .with_context(|| format!("reading {}", self.script_path().display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Owner of the stage-directory namespace:
///
/// ```text
/// <base>/scripts/            raw model output, one .txt per chapter
/// <base>/used_scripts/       raw files already consumed by the parser
/// <base>/processed_scripts/  validated script JSON
/// <base>/packages/<uuid>/    in-progress packages
/// <base>/ready/<uuid>/       completed packages
/// ```
///
/// Directory renames are the only state transitions; claiming a package
/// (an atomic rename) is the sole guard against two workers processing
/// the same package.
#[derive(Debug, Clone)]
pub struct PackageStore {
    base_dir: PathBuf,
}

impl PackageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.base_dir.join("scripts")
    }

    pub fn used_scripts_dir(&self) -> PathBuf {
        self.base_dir.join("used_scripts")
    }

    pub fn processed_scripts_dir(&self) -> PathBuf {
        self.base_dir.join("processed_scripts")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.base_dir.join("packages")
    }

    pub fn ready_dir(&self) -> PathBuf {
        self.base_dir.join("ready")
    }

    /// Create the full stage-directory layout.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.scripts_dir(),
            self.used_scripts_dir(),
            self.processed_scripts_dir(),
            self.packages_dir(),
            self.ready_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    /// Move a consumed raw script into `used_scripts/`.
    pub async fn consume_raw_script(&self, raw_path: &Path) -> Result<PathBuf> {
        let name = raw_path
            .file_name()
            .ok_or_else(|| anyhow!("raw script has no file name: {}", raw_path.display()))?;
        let target = self.used_scripts_dir().join(name);

        tokio::fs::rename(raw_path, &target)
            .await
            .with_context(|| format!("moving {} to used_scripts", raw_path.display()))?;

        debug!("Consumed raw script: {}", target.display());
        Ok(target)
    }

    /// Write a validated script to `processed_scripts/<stem>.json`.
    pub async fn persist_processed_script(&self, stem: &str, script: &Script) -> Result<PathBuf> {
        let target = self.processed_scripts_dir().join(format!("{}.json", stem));
        let json = serde_json::to_string_pretty(script)?;

        tokio::fs::write(&target, json)
            .await
            .with_context(|| format!("writing {}", target.display()))?;

        debug!("Persisted processed script: {}", target.display());
        Ok(target)
    }

    /// All validated scripts, as (stem, script) pairs in name order.
    pub async fn load_processed_scripts(&self) -> Result<Vec<(String, Script)>> {
        let dir = self.processed_scripts_dir();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading {}", dir.display()))?;

        let mut scripts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let content = tokio::fs::read_to_string(&path).await?;
                let script: Script = serde_json::from_str(&content)
                    .with_context(|| format!("parsing {}", path.display()))?;
                scripts.push((stem, script));
            }
        }

        scripts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(scripts)
    }

    /// Create a fresh package directory for one substory.
    pub async fn create_package(&self, substory: &Substory, source: &str) -> Result<Package> {
        let id = Uuid::new_v4().to_string();
        let path = self.packages_dir().join(&id);
        tokio::fs::create_dir_all(&path).await?;

        let manifest = PackageManifest {
            id: id.clone(),
            source: source.to_string(),
            created_at: Utc::now(),
            substory: substory.clone(),
        };

        let package = Package { id, path };
        tokio::fs::write(
            package.script_path(),
            serde_json::to_string_pretty(&manifest)?,
        )
        .await?;

        info!("📦 Created package {} for '{}'", package.id, substory.title);
        Ok(package)
    }

    /// Unclaimed in-progress packages, in name order.
    ///
    /// A missing `packages/` directory is surfaced as an error: sweeping a
    /// namespace that was never created is a broken precondition, not an
    /// empty batch.
    pub async fn list_packages(&self) -> Result<Vec<Package>> {
        let dir = self.packages_dir();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading {}", dir.display()))?;

        let mut packages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let package = Package::from_dir(&path)?;
            if !package.is_claimed() {
                packages.push(package);
            }
        }

        packages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packages)
    }

    /// Claim a package for exclusive processing via an atomic rename.
    ///
    /// Fails if another worker already claimed it (the rename source is
    /// gone), which is exactly the guarantee the caller needs.
    pub async fn claim(&self, package: Package) -> Result<Package> {
        let claimed_path = self
            .packages_dir()
            .join(format!("{}{}", package.id, CLAIM_SUFFIX));

        tokio::fs::rename(&package.path, &claimed_path)
            .await
            .with_context(|| format!("claiming package {}", package.id))?;

        debug!("Claimed package {}", package.id);
        Ok(Package {
            id: package.id,
            path: claimed_path,
        })
    }

    /// Return a claimed package to the unclaimed namespace.
    pub async fn release(&self, package: Package) -> Result<Package> {
        let open_path = self.packages_dir().join(&package.id);

        tokio::fs::rename(&package.path, &open_path)
            .await
            .with_context(|| format!("releasing package {}", package.id))?;

        debug!("Released package {}", package.id);
        Ok(Package {
            id: package.id,
            path: open_path,
        })
    }

    /// Move a finished package to the ready namespace. After this the
    /// package no longer appears in sweeps of `packages/`.
    pub async fn promote(&self, package: Package) -> Result<PathBuf> {
        let target = self.ready_dir().join(&package.id);

        tokio::fs::rename(&package.path, &target)
            .await
            .with_context(|| format!("promoting package {}", package.id))?;

        info!("✅ Package {} promoted to ready", package.id);
        Ok(target)
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Substory;

    fn substory() -> Substory {
        Substory {
            title: "The Siege".to_string(),
            lines: (0..5).map(|i| format!("Line {}", i)).collect(),
            prompts: (0..5).map(|i| format!("Prompt {}", i)).collect(),
            general_prompt: "grim oil painting".to_string(),
        }
    }

    async fn store() -> (tempfile::TempDir, PackageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        store.ensure_layout().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_layout_creation() {
        let (_tmp, store) = store().await;
        for dir in [
            store.scripts_dir(),
            store.used_scripts_dir(),
            store.processed_scripts_dir(),
            store.packages_dir(),
            store.ready_dir(),
        ] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[tokio::test]
    async fn test_package_manifest_round_trip() {
        let (_tmp, store) = store().await;
        let package = store.create_package(&substory(), "Chapter_One").await.unwrap();

        let manifest = package.manifest().await.unwrap();
        assert_eq!(manifest.id, package.id);
        assert_eq!(manifest.source, "Chapter_One");
        assert_eq!(manifest.substory, substory());
    }

    #[tokio::test]
    async fn test_stage_progression_from_disk() {
        let (_tmp, store) = store().await;
        let package = store.create_package(&substory(), "src").await.unwrap();

        assert_eq!(package.stage(), PackageStage::Created);
        assert!(!package.is_ready_for_video());

        std::fs::create_dir_all(package.images_dir()).unwrap();
        std::fs::write(package.images_dir().join("image_0.png"), b"img").unwrap();
        assert_eq!(package.stage(), PackageStage::ImagesDone);

        std::fs::create_dir_all(package.audio_dir()).unwrap();
        std::fs::write(package.audio_dir().join("audio_0.mp3"), b"aud").unwrap();
        assert_eq!(package.stage(), PackageStage::AudioDone);
        assert!(package.is_ready_for_video());

        std::fs::write(package.video_path(), b"vid").unwrap();
        assert_eq!(package.stage(), PackageStage::VideoDone);
    }

    #[tokio::test]
    async fn test_claim_then_promote_is_exactly_once() {
        let (_tmp, store) = store().await;
        let package = store.create_package(&substory(), "src").await.unwrap();

        let listed = store.list_packages().await.unwrap();
        assert_eq!(listed.len(), 1);

        let claimed = store.claim(listed.into_iter().next().unwrap()).await.unwrap();
        assert!(claimed.is_claimed());
        assert_eq!(claimed.id, package.id);

        // A claimed package is invisible to other sweeps.
        assert!(store.list_packages().await.unwrap().is_empty());

        let ready_path = store.promote(claimed).await.unwrap();
        assert!(ready_path.is_dir());
        assert_eq!(ready_path, store.ready_dir().join(&package.id));

        // Second sweep finds nothing to do.
        assert!(store.list_packages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_claim_fails() {
        let (_tmp, store) = store().await;
        let package = store.create_package(&substory(), "src").await.unwrap();

        let first = store.claim(package.clone()).await;
        assert!(first.is_ok());

        let second = store.claim(package).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_release_restores_visibility() {
        let (_tmp, store) = store().await;
        let package = store.create_package(&substory(), "src").await.unwrap();

        let claimed = store.claim(package).await.unwrap();
        store.release(claimed).await.unwrap();

        assert_eq!(store.list_packages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweeping_missing_namespace_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path().join("never-created"));

        assert!(store.list_packages().await.is_err());
    }

    #[tokio::test]
    async fn test_script_storage_transitions() {
        let (_tmp, store) = store().await;

        let raw = store.scripts_dir().join("Chapter_One.txt");
        tokio::fs::write(&raw, "raw text").await.unwrap();

        let used = store.consume_raw_script(&raw).await.unwrap();
        assert!(!raw.exists());
        assert!(used.exists());

        let script = Script {
            substories: vec![substory()],
        };
        store
            .persist_processed_script("Chapter_One", &script)
            .await
            .unwrap();

        let loaded = store.load_processed_scripts().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "Chapter_One");
        assert_eq!(loaded[0].1, script);
    }
}
