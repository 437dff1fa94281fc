//! Filter selection state
//!
//! Tracks what the user picked and decides when an overlay bitmap has to be
//! (re)loaded. Only the UI thread touches it.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{AssetCatalog, AssetKind};
use crate::overlay::DrawStrategy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown asset '{0}'")]
    UnknownAsset(String),
    #[error("Asset '{id}' is not a {expected:?} overlay")]
    WrongFamily { id: String, expected: FilterFamily },
}

/// Top-level view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Debug landmarks
    FaceMesh,
    #[default]
    Filter,
}

/// Overlay family, also the compositor's image slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterFamily {
    #[default]
    Tree,
    Animal,
}

impl FilterFamily {
    fn asset_kind(self) -> AssetKind {
        match self {
            FilterFamily::Tree => AssetKind::Tree,
            FilterFamily::Animal => AssetKind::Animal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TreeStyle {
    #[default]
    Procedural,
    /// Catalog bitmap
    Asset,
}

/// Request to decode an overlay bitmap into a family slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub family: FilterFamily,
    pub asset_id: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Selection {
    mode: ViewMode,
    family: FilterFamily,
    tree_style: TreeStyle,
    tree_asset: String,
    animal_asset: String,
    /// Asset last requested per slot
    requested_tree: Option<String>,
    requested_animal: Option<String>,
}

impl Selection {
    pub fn new(tree_asset: impl Into<String>, animal_asset: impl Into<String>) -> Self {
        Self {
            mode: ViewMode::default(),
            family: FilterFamily::default(),
            tree_style: TreeStyle::default(),
            tree_asset: tree_asset.into(),
            animal_asset: animal_asset.into(),
            requested_tree: None,
            requested_animal: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn family(&self) -> FilterFamily {
        self.family
    }

    pub fn tree_style(&self) -> TreeStyle {
        self.tree_style
    }

    pub fn tree_asset(&self) -> &str {
        &self.tree_asset
    }

    pub fn animal_asset(&self) -> &str {
        &self.animal_asset
    }

    pub fn asset_for(&self, family: FilterFamily) -> &str {
        match family {
            FilterFamily::Tree => &self.tree_asset,
            FilterFamily::Animal => &self.animal_asset,
        }
    }

    /// How the overlay should be drawn for this selection
    pub fn strategy(&self) -> DrawStrategy {
        match (self.mode, self.family, self.tree_style) {
            (ViewMode::FaceMesh, _, _) => DrawStrategy::MeshDebug,
            (ViewMode::Filter, FilterFamily::Animal, _) => DrawStrategy::AnimalImage,
            (ViewMode::Filter, FilterFamily::Tree, TreeStyle::Asset) => DrawStrategy::TreeImage,
            (ViewMode::Filter, FilterFamily::Tree, TreeStyle::Procedural) => {
                DrawStrategy::ProceduralTree
            }
        }
    }

    /// Family whose bitmap the current strategy draws, if any
    pub fn active_image_family(&self) -> Option<FilterFamily> {
        match self.strategy() {
            DrawStrategy::AnimalImage => Some(FilterFamily::Animal),
            DrawStrategy::TreeImage => Some(FilterFamily::Tree),
            DrawStrategy::MeshDebug | DrawStrategy::ProceduralTree => None,
        }
    }

    pub fn set_mode(&mut self, mode: ViewMode, catalog: &AssetCatalog) -> Option<LoadRequest> {
        self.mode = mode;
        self.pending_load(catalog)
    }

    pub fn set_family(&mut self, family: FilterFamily, catalog: &AssetCatalog) -> Option<LoadRequest> {
        self.family = family;
        self.pending_load(catalog)
    }

    pub fn set_tree_style(&mut self, style: TreeStyle, catalog: &AssetCatalog) -> Option<LoadRequest> {
        self.tree_style = style;
        self.pending_load(catalog)
    }

    /// Pick a tree bitmap. Unknown or non-tree ids leave everything unchanged.
    pub fn select_tree_asset(
        &mut self,
        id: &str,
        catalog: &AssetCatalog,
    ) -> Result<Option<LoadRequest>, SelectionError> {
        self.select_asset(FilterFamily::Tree, id, catalog)
    }

    /// Pick an animal mask. Unknown or non-animal ids leave everything unchanged.
    pub fn select_animal_asset(
        &mut self,
        id: &str,
        catalog: &AssetCatalog,
    ) -> Result<Option<LoadRequest>, SelectionError> {
        self.select_asset(FilterFamily::Animal, id, catalog)
    }

    fn select_asset(
        &mut self,
        family: FilterFamily,
        id: &str,
        catalog: &AssetCatalog,
    ) -> Result<Option<LoadRequest>, SelectionError> {
        let asset = catalog
            .get(id)
            .ok_or_else(|| SelectionError::UnknownAsset(id.to_string()))?;
        if asset.kind != family.asset_kind() {
            return Err(SelectionError::WrongFamily {
                id: id.to_string(),
                expected: family,
            });
        }

        match family {
            FilterFamily::Tree => self.tree_asset = id.to_string(),
            FilterFamily::Animal => self.animal_asset = id.to_string(),
        }
        log::info!("Selected {:?} asset '{}'", family, id);

        if self.active_image_family() == Some(family) {
            Ok(self.request(family, catalog))
        } else {
            Ok(None)
        }
    }

    /// Load request for the active slot if it has not been requested for its asset yet
    pub fn pending_load(&mut self, catalog: &AssetCatalog) -> Option<LoadRequest> {
        let family = self.active_image_family()?;
        let requested = match family {
            FilterFamily::Tree => &self.requested_tree,
            FilterFamily::Animal => &self.requested_animal,
        };
        if requested.as_deref() == Some(self.asset_for(family)) {
            return None;
        }
        self.request(family, catalog)
    }

    fn request(&mut self, family: FilterFamily, catalog: &AssetCatalog) -> Option<LoadRequest> {
        let asset_id = self.asset_for(family).to_string();
        let Some(asset) = catalog.get(&asset_id) else {
            log::warn!("Selected asset '{}' is missing from the catalog", asset_id);
            return None;
        };
        let request = LoadRequest {
            family,
            asset_id: asset_id.clone(),
            path: asset.url.clone(),
        };
        match family {
            FilterFamily::Tree => self.requested_tree = Some(asset_id),
            FilterFamily::Animal => self.requested_animal = Some(asset_id),
        }
        Some(request)
    }

    /// One-line description for the status area
    pub fn describe(&self, catalog: &AssetCatalog) -> String {
        let name = |id: &str| {
            catalog
                .get(id)
                .map(|a| a.display_name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        match self.strategy() {
            DrawStrategy::MeshDebug => "Face mesh".to_string(),
            DrawStrategy::AnimalImage => format!("Animal: {}", name(&self.animal_asset)),
            DrawStrategy::TreeImage => format!("Tree: {}", name(&self.tree_asset)),
            DrawStrategy::ProceduralTree => "Tree: Procedural".to_string(),
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new("oak_tree", "cat_formal_transparent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn catalog() -> AssetCatalog {
        AssetCatalog::embedded(Path::new("assets")).unwrap()
    }

    #[test]
    fn test_defaults() {
        let selection = Selection::default();
        assert_eq!(selection.mode(), ViewMode::Filter);
        assert_eq!(selection.family(), FilterFamily::Tree);
        assert_eq!(selection.tree_style(), TreeStyle::Procedural);
        assert_eq!(selection.tree_asset(), "oak_tree");
        assert_eq!(selection.animal_asset(), "cat_formal_transparent");
        assert_eq!(selection.strategy(), DrawStrategy::ProceduralTree);
    }

    #[test]
    fn test_strategy_mapping() {
        let catalog = catalog();
        let mut s = Selection::default();
        s.set_tree_style(TreeStyle::Asset, &catalog);
        assert_eq!(s.strategy(), DrawStrategy::TreeImage);
        s.set_family(FilterFamily::Animal, &catalog);
        assert_eq!(s.strategy(), DrawStrategy::AnimalImage);
        s.set_mode(ViewMode::FaceMesh, &catalog);
        assert_eq!(s.strategy(), DrawStrategy::MeshDebug);
    }

    #[test]
    fn test_unknown_asset_leaves_state_unchanged() {
        let catalog = catalog();
        let mut s = Selection::default();
        s.set_family(FilterFamily::Animal, &catalog);

        let err = s.select_animal_asset("unicorn_transparent", &catalog).unwrap_err();
        assert_eq!(err, SelectionError::UnknownAsset("unicorn_transparent".into()));
        assert_eq!(s.animal_asset(), "cat_formal_transparent");
        assert!(s.pending_load(&catalog).is_none());
    }

    #[test]
    fn test_wrong_family_is_rejected() {
        let catalog = catalog();
        let mut s = Selection::default();
        assert!(matches!(
            s.select_tree_asset("fox_transparent", &catalog),
            Err(SelectionError::WrongFamily { .. })
        ));
        assert!(s.select_animal_asset("oak_tree", &catalog).is_err());
        assert_eq!(s.tree_asset(), "oak_tree");
    }

    #[test]
    fn test_family_switch_loads_once() {
        let catalog = catalog();
        let mut s = Selection::default();

        let first = s.set_family(FilterFamily::Animal, &catalog).unwrap();
        assert_eq!(first.family, FilterFamily::Animal);
        assert_eq!(first.asset_id, "cat_formal_transparent");
        assert!(first.path.ends_with("images/cat_formal_transparent.png"));

        assert!(s.set_family(FilterFamily::Tree, &catalog).is_none());
        assert!(s.set_family(FilterFamily::Animal, &catalog).is_none());
    }

    #[test]
    fn test_selecting_active_asset_requests_load() {
        let catalog = catalog();
        let mut s = Selection::default();
        s.set_family(FilterFamily::Animal, &catalog);

        let request = s.select_animal_asset("fox_transparent", &catalog).unwrap().unwrap();
        assert_eq!(request.asset_id, "fox_transparent");
        assert_eq!(s.animal_asset(), "fox_transparent");
    }

    #[test]
    fn test_selecting_inactive_family_defers_load() {
        let catalog = catalog();
        let mut s = Selection::default();

        // Procedural style draws no bitmap
        assert!(s.select_tree_asset("pine_tree", &catalog).unwrap().is_none());

        let request = s.set_tree_style(TreeStyle::Asset, &catalog).unwrap();
        assert_eq!(request.asset_id, "pine_tree");
        assert!(s.set_tree_style(TreeStyle::Asset, &catalog).is_none());
    }

    #[test]
    fn test_describe() {
        let catalog = catalog();
        let mut s = Selection::default();
        assert_eq!(s.describe(&catalog), "Tree: Procedural");
        s.set_family(FilterFamily::Animal, &catalog);
        assert_eq!(s.describe(&catalog), "Animal: Cat (formal)");
    }
}
