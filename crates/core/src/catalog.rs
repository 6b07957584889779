//! Update catalog (C8): the in-memory package set, version comparison, and
//! applicability checks against a device's reported build.

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackage {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub min_version: String,
    #[serde(default)]
    pub target_build: String,
    #[serde(default)]
    pub install_notify_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    packages: Vec<UpdatePackage>,
}

static VERSION_NUMBERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Parse a build string into a 4-tuple of version numbers for lexicographic
/// comparison, e.g. `"Nova-3.0.5-64"` -> `(3, 0, 5, 64)`.
pub fn version_tuple(build: &str) -> (u32, u32, u32, u32) {
    let mut numbers: Vec<u32> = VERSION_NUMBERS
        .find_iter(build)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if numbers.is_empty() {
        return (0, 0, 0, 0);
    }
    while numbers.len() < 4 {
        numbers.push(0);
    }
    (numbers[0], numbers[1], numbers[2], numbers[3])
}

/// Whether `pkg` applies to a device currently on `device_build`.
pub fn applies(pkg: &UpdatePackage, device_build: &str) -> bool {
    let device_version = version_tuple(device_build);

    if !pkg.min_version.is_empty() && device_version < version_tuple(&pkg.min_version) {
        return false;
    }
    if !pkg.target_build.is_empty() && device_version >= version_tuple(&pkg.target_build) {
        return false;
    }
    true
}

/// In-memory package catalog backed by a JSON manifest file. Reads dominate;
/// a rescan takes a brief write lock to swap in an updated snapshot (§5).
pub struct Catalog {
    packages_dir: PathBuf,
    manifest_path: PathBuf,
    packages: RwLock<HashMap<String, UpdatePackage>>,
}

impl Catalog {
    /// Load the catalog from `<packages_dir>/manifest.json`, creating an
    /// empty manifest if none exists yet. A corrupt manifest is logged and
    /// treated as empty rather than failing startup (§7, `CatalogIOError`).
    pub async fn load(packages_dir: impl Into<PathBuf>) -> Self {
        let packages_dir = packages_dir.into();
        let manifest_path = packages_dir.join("manifest.json");

        let packages = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(contents) => match serde_json::from_str::<Manifest>(&contents) {
                Ok(manifest) => manifest
                    .packages
                    .into_iter()
                    .map(|p| (p.name.clone(), p))
                    .collect(),
                Err(e) => {
                    log::error!("manifest at {} is corrupt: {e}", manifest_path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let catalog = Catalog {
            packages_dir,
            manifest_path,
            packages: RwLock::new(packages),
        };
        if let Err(e) = catalog.save().await {
            log::warn!("could not write initial manifest: {e}");
        }
        catalog
    }

    async fn save(&self) -> crate::Result<()> {
        tokio::fs::create_dir_all(&self.packages_dir)
            .await
            .map_err(|e| Error::CatalogIo(e.to_string()))?;

        let packages = self.packages.read().await;
        let manifest = Manifest {
            packages: packages.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| Error::CatalogIo(e.to_string()))?;
        tokio::fs::write(&self.manifest_path, json)
            .await
            .map_err(|e| Error::CatalogIo(e.to_string()))
    }

    /// Rescan the packages directory for `*.ipk`/`*.dipk` files not yet in
    /// the catalog, hash them, and append default entries.
    pub async fn scan(&self) -> crate::Result<usize> {
        tokio::fs::create_dir_all(&self.packages_dir)
            .await
            .map_err(|e| Error::CatalogIo(e.to_string()))?;

        let mut entries = tokio::fs::read_dir(&self.packages_dir)
            .await
            .map_err(|e| Error::CatalogIo(e.to_string()))?;

        let mut discovered = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::CatalogIo(e.to_string()))? {
            let path = entry.path();
            let is_package = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("ipk") || ext.eq_ignore_ascii_case("dipk"))
                .unwrap_or(false);
            if is_package {
                discovered.push(path);
            }
        }

        let mut added = 0;
        {
            let mut packages = self.packages.write().await;
            let known_filenames: Vec<String> = packages.values().map(|p| p.filename.clone()).collect();

            for path in discovered {
                let filename = match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                if known_filenames.contains(&filename) {
                    continue;
                }
                if let Some(pkg) = Self::hash_package(&path, &filename).await {
                    packages.insert(pkg.name.clone(), pkg);
                    added += 1;
                }
            }
        }

        if added > 0 {
            self.save().await?;
        }
        Ok(added)
    }

    async fn hash_package(path: &Path, filename: &str) -> Option<UpdatePackage> {
        let bytes = tokio::fs::read(path).await.ok()?;
        let size = bytes.len() as u64;
        let digest = Md5::digest(&bytes);
        let name = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        Some(UpdatePackage {
            description: format!("Update package: {name}"),
            name,
            version: "1.0.0".to_string(),
            filename: filename.to_string(),
            size,
            md5: format!("{digest:x}"),
            min_version: String::new(),
            target_build: String::new(),
            install_notify_url: String::new(),
        })
    }

    /// The applicable package with the largest `target_build` (falling back
    /// to `version`), or `None` if no package applies. Ties are broken by
    /// iteration order.
    ///
    /// `device_model`/`device_carrier` are accepted for parity with the
    /// ground truth's `check_update_available(build, model, carrier)`
    /// signature; neither is consulted by `applies` today, matching the
    /// original, which also accepts but does not filter on them.
    pub async fn check_update_available(
        &self,
        device_build: &str,
        _device_model: Option<&str>,
        _device_carrier: Option<&str>,
    ) -> Option<UpdatePackage> {
        let packages = self.packages.read().await;
        packages
            .values()
            .filter(|p| applies(p, device_build))
            .max_by_key(|p| {
                let key = if p.target_build.is_empty() {
                    &p.version
                } else {
                    &p.target_build
                };
                version_tuple(key)
            })
            .cloned()
    }

    pub async fn list(&self) -> Vec<UpdatePackage> {
        self.packages.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.packages.read().await.len()
    }

    pub fn package_path(&self, filename: &str) -> PathBuf {
        self.packages_dir.join(filename)
    }
}

#[cfg(test)]
impl Catalog {
    /// Insert a package directly, bypassing `scan`, for tests in this crate
    /// that need a known catalog without touching the filesystem.
    pub async fn insert_for_test(&self, pkg: UpdatePackage) {
        self.packages.write().await.insert(pkg.name.clone(), pkg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tuple_extracts_and_pads() {
        assert_eq!(version_tuple("Nova-3.0.5-64"), (3, 0, 5, 64));
        assert_eq!(version_tuple("3.0.5"), (3, 0, 5, 0));
        assert_eq!(version_tuple("no-digits-here"), (0, 0, 0, 0));
    }

    fn package(name: &str, target_build: &str) -> UpdatePackage {
        UpdatePackage {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            filename: format!("{name}.ipk"),
            size: 0,
            md5: String::new(),
            description: String::new(),
            min_version: String::new(),
            target_build: target_build.to_string(),
            install_notify_url: String::new(),
        }
    }

    #[test]
    fn package_with_no_constraints_applies_to_every_device() {
        let pkg = package("any", "");
        assert!(applies(&pkg, "Nova-0.0.1-0"));
        assert!(applies(&pkg, "Nova-99.0.0-0"));
    }

    #[test]
    fn target_build_excludes_devices_already_past_it() {
        let pkg = package("p", "Nova-3.0.5-86");
        assert!(applies(&pkg, "Nova-3.0.5-64"));
        assert!(!applies(&pkg, "Nova-3.0.5-86"));
        assert!(!applies(&pkg, "Nova-3.0.5-90"));
    }

    #[tokio::test]
    async fn check_update_available_picks_the_newest_applicable_package() {
        let dir = tempdir();
        let catalog = Catalog::load(&dir).await;
        {
            let mut packages = catalog.packages.write().await;
            packages.insert("a".to_string(), package("a", "3.0.5"));
            packages.insert("b".to_string(), package("b", "3.0.6"));
        }

        let selected = catalog.check_update_available("3.0.4", None, None).await.unwrap();
        assert_eq!(selected.name, "b");
    }

    #[tokio::test]
    async fn no_candidate_returns_none_when_device_is_up_to_date() {
        let dir = tempdir();
        let catalog = Catalog::load(&dir).await;
        {
            let mut packages = catalog.packages.write().await;
            packages.insert("a".to_string(), package("a", "3.0.5"));
        }

        assert!(catalog.check_update_available("9.9.9.9", None, None).await.is_none());
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("omadm-catalog-test-{:x}", rand::random::<u64>()));
        dir
    }
}
