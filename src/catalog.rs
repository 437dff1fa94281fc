//! Asset catalog
//!
//! Static mapping from asset id to overlay image, description and metadata.
//! The default catalog is embedded in the binary; a catalog file can be
//! supplied through settings instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CATALOG: &str = include_str!("../assets/catalog.json");

/// Metadata `type` shared by all animal mask assets
const PASSPORT_PHOTO: &str = "passport_photo";

/// Catalog loading errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Asset metadata as stored in the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Tree type ("oak") or asset kind ("passport_photo")
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub animal: Option<String>,
    #[serde(default)]
    pub clothing: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetEntry {
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metadata: AssetMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    images: BTreeMap<String, AssetEntry>,
}

/// Overlay family an asset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Tree,
    Animal,
    Other,
}

/// A catalog entry, immutable for the lifetime of the application
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub display_name: String,
    /// Image location, resolved against the catalog directory
    pub url: PathBuf,
    pub description: String,
    pub metadata: AssetMetadata,
    pub kind: AssetKind,
}

/// Read-only asset catalog
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    assets: BTreeMap<String, Asset>,
}

impl AssetCatalog {
    /// Catalog compiled into the binary. Image paths resolve against `base_dir`.
    pub fn embedded(base_dir: &Path) -> Result<Self, CatalogError> {
        Self::from_json(DEFAULT_CATALOG, base_dir)
    }

    /// Load a catalog file; relative image paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&text, base_dir)
    }

    pub fn from_json(text: &str, base_dir: &Path) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;

        let assets = file
            .images
            .into_iter()
            .map(|(id, entry)| {
                let kind = classify(&id, &entry.metadata);
                let display_name = display_name(&id, &entry.metadata, kind);
                let url = base_dir.join(&entry.url);
                let asset = Asset {
                    id: id.clone(),
                    display_name,
                    url,
                    description: entry.description,
                    metadata: entry.metadata,
                    kind,
                };
                (id, asset)
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!("Loaded asset catalog with {} entries", assets.len());
        Ok(Self { assets })
    }

    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets usable as tree overlays, in id order
    pub fn tree_assets(&self) -> Vec<&Asset> {
        self.of_kind(AssetKind::Tree)
    }

    /// Assets usable as animal masks, in id order
    pub fn animal_assets(&self) -> Vec<&Asset> {
        self.of_kind(AssetKind::Animal)
    }

    fn of_kind(&self, kind: AssetKind) -> Vec<&Asset> {
        self.assets.values().filter(|a| a.kind == kind).collect()
    }
}

/// Directory holding the built-in catalog's images: the configured one, else
/// `assets/` next to the executable or up to two levels above it, else
/// `assets/` in the working directory.
pub fn find_assets_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }

    let near_exe = std::env::current_exe().ok().and_then(|exe| {
        exe.ancestors()
            .skip(1)
            .take(3)
            .map(|dir| dir.join("assets"))
            .find(|dir| dir.exists())
    });

    near_exe.unwrap_or_else(|| PathBuf::from("assets"))
}

fn classify(id: &str, metadata: &AssetMetadata) -> AssetKind {
    if metadata.kind.as_deref() == Some(PASSPORT_PHOTO) && metadata.animal.is_some() {
        AssetKind::Animal
    } else if id.contains("tree") {
        AssetKind::Tree
    } else {
        AssetKind::Other
    }
}

fn display_name(id: &str, metadata: &AssetMetadata, kind: AssetKind) -> String {
    match kind {
        AssetKind::Animal => {
            let animal = capitalize(metadata.animal.as_deref().unwrap_or("unknown"));
            match &metadata.clothing {
                Some(clothing) => format!("{} ({})", animal, clothing),
                None => animal,
            }
        }
        AssetKind::Tree => match &metadata.kind {
            Some(kind) => format!("{} Tree", capitalize(kind)),
            None => title_case(&id.replacen('_', " ", 1)),
        },
        AssetKind::Other => title_case(&id.replace('_', " ")),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercase the first letter of every word
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        let is_word = c.is_alphanumeric() || c == '_';
        if is_word && at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !is_word;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AssetCatalog {
        AssetCatalog::embedded(Path::new("/opt/assets")).unwrap()
    }

    #[test]
    fn test_embedded_catalog_parses() {
        let catalog = catalog();
        assert!(!catalog.is_empty());
        assert!(catalog.contains("oak_tree"));
        assert!(catalog.contains("cat_formal_transparent"));
    }

    #[test]
    fn test_tree_and_animal_partition() {
        let catalog = catalog();
        let trees = catalog.tree_assets();
        let animals = catalog.animal_assets();

        assert!(trees.iter().all(|a| a.id.contains("tree")));
        assert!(animals
            .iter()
            .all(|a| a.metadata.kind.as_deref() == Some(PASSPORT_PHOTO)));
        assert!(!trees.iter().any(|a| a.id == "forest_background"));
        assert!(!animals.iter().any(|a| a.id == "forest_background"));
    }

    #[test]
    fn test_display_names() {
        let catalog = catalog();
        assert_eq!(catalog.get("oak_tree").unwrap().display_name, "Oak Tree");
        assert_eq!(catalog.get("willow_tree").unwrap().display_name, "Willow Tree");
        assert_eq!(
            catalog.get("cat_formal_transparent").unwrap().display_name,
            "Cat (formal)"
        );
        assert_eq!(catalog.get("fox_transparent").unwrap().display_name, "Fox");
    }

    #[test]
    fn test_untyped_tree_name_replaces_first_underscore_only() {
        let json = r#"{"images": {"old_oak_tree": {"url": "a.png", "description": ""}}}"#;
        let catalog = AssetCatalog::from_json(json, Path::new(".")).unwrap();
        assert_eq!(catalog.get("old_oak_tree").unwrap().display_name, "Old Oak_tree");
    }

    #[test]
    fn test_urls_resolve_against_base_dir() {
        let catalog = catalog();
        let oak = catalog.get("oak_tree").unwrap();
        assert_eq!(oak.url, Path::new("/opt/assets/images/oak_tree.png"));
    }

    #[test]
    fn test_bundled_assets_exist_for_every_entry() {
        let assets_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
        let catalog = AssetCatalog::embedded(&assets_dir).unwrap();
        assert_eq!(catalog.len(), catalog.assets.len());
        for asset in catalog.assets.values() {
            assert!(asset.url.is_file(), "{} has no image at {}", asset.id, asset.url.display());
            let image = image::open(&asset.url).unwrap();
            assert!(image.width() > 0 && image.height() > 0);
        }
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result = AssetCatalog::from_json("{\"images\": 3}", Path::new("."));
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AssetCatalog::load(Path::new("/nonexistent/catalog.json"));
        assert!(matches!(result, Err(CatalogError::Io { .. })));
    }
}
