//! Background overlay image loading
//!
//! Each request decodes on its own short-lived thread. Results carry the
//! generation of the slot at request time; anything older than the slot's
//! latest request is dropped, so the most recent selection always wins.

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;

use crate::overlay::OverlayImage;
use crate::selection::{FilterFamily, LoadRequest};

struct Loaded {
    family: FilterFamily,
    asset_id: String,
    generation: u64,
    result: image::ImageResult<RgbaImage>,
}

pub struct ImageLoader {
    tx: Sender<Loaded>,
    rx: Receiver<Loaded>,
    tree_generation: u64,
    animal_generation: u64,
}

impl ImageLoader {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            tree_generation: 0,
            animal_generation: 0,
        }
    }

    fn generation_mut(&mut self, family: FilterFamily) -> &mut u64 {
        match family {
            FilterFamily::Tree => &mut self.tree_generation,
            FilterFamily::Animal => &mut self.animal_generation,
        }
    }

    fn generation(&self, family: FilterFamily) -> u64 {
        match family {
            FilterFamily::Tree => self.tree_generation,
            FilterFamily::Animal => self.animal_generation,
        }
    }

    /// Start decoding; supersedes any load still running for the same slot
    pub fn request(&mut self, request: LoadRequest) {
        let generation = {
            let g = self.generation_mut(request.family);
            *g += 1;
            *g
        };
        log::debug!(
            "Loading overlay image '{}' from {}",
            request.asset_id,
            request.path.display()
        );

        let tx = self.tx.clone();
        let spawned = std::thread::Builder::new()
            .name("image-loader".into())
            .spawn(move || {
                let result = image::open(&request.path).map(|img| img.to_rgba8());
                let _ = tx.send(Loaded {
                    family: request.family,
                    asset_id: request.asset_id,
                    generation,
                    result,
                });
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn image loader thread: {}", e);
        }
    }

    /// Finished loads that are still current. Failed loads are logged and skipped.
    pub fn poll(&mut self) -> Vec<(FilterFamily, OverlayImage)> {
        let mut ready = Vec::new();
        while let Ok(loaded) = self.rx.try_recv() {
            if loaded.generation != self.generation(loaded.family) {
                log::debug!("Discarding stale overlay image '{}'", loaded.asset_id);
                continue;
            }
            match loaded.result {
                Ok(bitmap) => {
                    log::info!(
                        "Loaded overlay image '{}' ({}x{})",
                        loaded.asset_id,
                        bitmap.width(),
                        bitmap.height()
                    );
                    ready.push((loaded.family, OverlayImage::new(loaded.asset_id, bitmap)));
                }
                Err(e) => {
                    log::warn!("Failed to load overlay image '{}': {}", loaded.asset_id, e);
                }
            }
        }
        ready
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AssetCatalog;
    use crate::geometry::{FaceBox, FaceTrack};
    use crate::overlay::{Compositor, DrawStrategy, OverlayConfig};
    use crate::selection::{Selection, ViewMode};
    use image::Rgba;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn write_png(name: &str, w: u32, h: u32) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("face-filters-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255])).save(&path).unwrap();
        path
    }

    fn poll_until(loader: &mut ImageLoader, count: usize) -> Vec<(FilterFamily, OverlayImage)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < count && Instant::now() < deadline {
            out.extend(loader.poll());
            std::thread::sleep(Duration::from_millis(10));
        }
        out
    }

    fn request(family: FilterFamily, id: &str, path: PathBuf) -> LoadRequest {
        LoadRequest {
            family,
            asset_id: id.to_string(),
            path,
        }
    }

    #[test]
    fn test_loads_image_into_slot() {
        let mut loader = ImageLoader::new();
        loader.request(request(FilterFamily::Animal, "cat", write_png("cat.png", 8, 4)));

        let ready = poll_until(&mut loader, 1);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, FilterFamily::Animal);
        assert_eq!(ready[0].1.asset_id(), "cat");
        assert_eq!(ready[0].1.source().dimensions(), (8, 4));
    }

    #[test]
    fn test_stale_load_is_discarded() {
        let mut loader = ImageLoader::new();
        let old = write_png("old.png", 2, 2);
        let new = write_png("new.png", 3, 3);
        loader.request(request(FilterFamily::Tree, "old", old));
        loader.request(request(FilterFamily::Tree, "new", new));

        // Give both threads time to finish, then drain
        std::thread::sleep(Duration::from_millis(200));
        let ready = poll_until(&mut loader, 1);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1.asset_id(), "new");
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        let mut loader = ImageLoader::new();
        loader.request(request(
            FilterFamily::Tree,
            "ghost",
            PathBuf::from("/nonexistent/ghost.png"),
        ));
        std::thread::sleep(Duration::from_millis(200));
        assert!(loader.poll().is_empty());
    }

    #[test]
    fn test_rejected_and_failed_selections_keep_rendered_mask() {
        let good = write_png("mask.png", 12, 12);
        let dir = good.parent().unwrap().to_path_buf();
        let json = r#"{"images": {
            "oak_tree": {"url": "oak.png", "metadata": {"type": "oak"}},
            "cat_mask": {"url": "mask.png", "metadata": {"type": "passport_photo"}},
            "dog_mask": {"url": "missing-dog.png", "metadata": {"type": "passport_photo"}}
        }}"#;
        let catalog = AssetCatalog::from_json(json, &dir).unwrap();
        let mut selection = Selection::new("oak_tree", "cat_mask");
        let mut loader = ImageLoader::new();
        let mut compositor = Compositor::new(OverlayConfig::default());
        let track = FaceTrack {
            face: FaceBox {
                center_x: 80.0,
                center_y: 60.0,
                width: 30.0,
                height: 36.0,
            },
            detected: true,
        };

        assert!(selection.set_mode(ViewMode::Filter, &catalog).is_none());
        let request = selection
            .set_family(FilterFamily::Animal, &catalog)
            .expect("initial mask load");
        loader.request(request);
        for (family, image) in poll_until(&mut loader, 1) {
            compositor.set_image(family, image);
        }
        let before = compositor
            .render(&track, None, DrawStrategy::AnimalImage, 160, 120)
            .data()
            .to_vec();
        assert!(before.iter().skip(3).step_by(4).any(|&a| a > 0));

        // Unknown id: rejected, nothing to load
        assert!(selection.select_animal_asset("no_such_mask", &catalog).is_err());
        assert_eq!(selection.animal_asset(), "cat_mask");

        // Known id whose file is missing: the load fails and is dropped
        let request = selection
            .select_animal_asset("dog_mask", &catalog)
            .unwrap()
            .expect("load for the active slot");
        loader.request(request);
        std::thread::sleep(Duration::from_millis(200));
        for (family, image) in loader.poll() {
            compositor.set_image(family, image);
        }

        assert_eq!(compositor.image(FilterFamily::Animal).map(|i| i.asset_id()), Some("cat_mask"));
        let after = compositor.render(&track, None, DrawStrategy::AnimalImage, 160, 120);
        assert_eq!(after.data(), &before[..]);
    }
}
