//! Application state holding the wgpu graphics context and the face filter UI
//!
//! The window shows the camera image mirrored, with the overlay canvas drawn
//! on top of it. Both are plain egui textures; the only render passes are a
//! clear and the egui pass. Everything here runs on the UI thread.

use std::sync::Arc;
use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::{list_cameras, BackendOpener, CameraConfig, CameraFrame, CameraInfo, NokhwaCamera};
use crate::catalog::{find_assets_dir, Asset, AssetCatalog};
use crate::detector::{DetectorConfig, DetectorOpener, FaceMeshDetector, LandmarkDetector};
use crate::geometry::{FaceTrack, Landmark};
use crate::loader::ImageLoader;
use crate::overlay::Compositor;
use crate::selection::{FilterFamily, LoadRequest, Selection, TreeStyle, ViewMode};
use crate::session::{Pipeline, SessionFactory};
use crate::settings::Settings;

const WINDOW_TITLE: &str = "Face Filters";
const FACE_FOUND_COLOR: egui::Color32 = egui::Color32::from_rgb(0x4c, 0xaf, 0x50);
const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(0xe5, 0x39, 0x35);

/// Builds real camera and detector instances from settings
struct AppSessionFactory {
    camera: CameraConfig,
    detector: DetectorConfig,
}

impl SessionFactory for AppSessionFactory {
    fn detector(&self) -> DetectorOpener {
        let config = self.detector.clone();
        Box::new(move || Ok(Box::new(FaceMeshDetector::new(config)?) as Box<dyn LandmarkDetector>))
    }

    fn camera(&self) -> BackendOpener {
        NokhwaCamera::opener(self.camera.clone())
    }
}

/// Things the user asked for during one UI pass
enum UiAction {
    TogglePipeline,
    SetMode(ViewMode),
    SetFamily(FilterFamily),
    SetTreeStyle(TreeStyle),
    SelectTree(String),
    SelectAnimal(String),
    SelectCamera(u32),
    RefreshCameras,
}

/// Main application state
pub struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Capture and detection
    factory: AppSessionFactory,
    pipeline: Pipeline,
    cameras: Vec<CameraInfo>,

    // Filters
    catalog: AssetCatalog,
    selection: Selection,
    loader: ImageLoader,
    compositor: Compositor,
    track: FaceTrack,
    landmarks: Option<Vec<Landmark>>,
    /// Size of the frame the last detection result belongs to
    frame_size: Option<(u32, u32)>,
    overlay_dirty: bool,

    // Display textures
    video_texture: Option<egui::TextureHandle>,
    overlay_texture: Option<egui::TextureHandle>,
    last_video_frame: Option<u64>,

    show_fps: bool,

    // Frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create a new App instance with initialized wgpu context
    pub async fn new(window: Arc<Window>, settings: Settings) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find suitable GPU adapter");

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Face Filters Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);

        // egui expects a linear target and does its own gamma
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        log::info!("Surface format: {:?}", surface_format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let catalog = load_catalog(&settings);
        let mut selection = Selection::new(
            settings.default_tree_asset.clone(),
            settings.default_animal_asset.clone(),
        );
        let mut loader = ImageLoader::new();
        if let Some(request) = selection.pending_load(&catalog) {
            loader.request(request);
        }

        let now = Instant::now();

        Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            egui_ctx,
            egui_state,
            egui_renderer,
            factory: AppSessionFactory {
                camera: settings.camera.clone(),
                detector: settings.detector.clone(),
            },
            pipeline: Pipeline::new(),
            cameras: list_cameras(),
            catalog,
            selection,
            loader,
            compositor: Compositor::new(settings.overlay.clone()),
            track: FaceTrack::default(),
            landmarks: None,
            frame_size: None,
            overlay_dirty: false,
            video_texture: None,
            overlay_texture: None,
            last_video_frame: None,
            show_fps: settings.show_fps,
            fps: 0.0,
            last_fps_update: now,
            frames_since_update: 0,
        }
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Start the camera and detector, or stop them if running or starting
    pub fn toggle_pipeline(&mut self) {
        if self.pipeline.is_active() || self.pipeline.is_starting() {
            self.stop_pipeline();
        } else {
            self.start_pipeline();
        }
    }

    fn start_pipeline(&mut self) {
        self.reset_display();
        // Failures are logged and kept as the pipeline's user message; the
        // camera open and model load settle later in `update`
        let _ = self.pipeline.start(&self.factory);
    }

    fn stop_pipeline(&mut self) {
        if let Some(report) = self.pipeline.stop() {
            if !report.is_clean() {
                log::warn!("Session teardown reported errors: {:?}", report);
            }
        }
        self.reset_display();
    }

    fn reset_display(&mut self) {
        self.track.lose();
        self.landmarks = None;
        self.frame_size = None;
        self.video_texture = None;
        self.overlay_texture = None;
        self.last_video_frame = None;
    }

    /// Switch to the landmark debug view
    pub fn show_mesh(&mut self) {
        let request = self.selection.set_mode(ViewMode::FaceMesh, &self.catalog);
        self.apply(request);
    }

    /// Switch to the filter view showing `family`
    pub fn show_filter(&mut self, family: FilterFamily) {
        let request = self.selection.set_mode(ViewMode::Filter, &self.catalog);
        self.apply(request);
        let request = self.selection.set_family(family, &self.catalog);
        self.apply(request);
    }

    fn apply(&mut self, request: Option<LoadRequest>) {
        if let Some(request) = request {
            self.loader.request(request);
        }
        self.overlay_dirty = true;
    }

    fn handle_action(&mut self, action: UiAction) {
        match action {
            UiAction::TogglePipeline => self.toggle_pipeline(),
            UiAction::SetMode(ViewMode::FaceMesh) => self.show_mesh(),
            UiAction::SetMode(ViewMode::Filter) => {
                let request = self.selection.set_mode(ViewMode::Filter, &self.catalog);
                self.apply(request);
            }
            UiAction::SetFamily(family) => self.show_filter(family),
            UiAction::SetTreeStyle(style) => {
                let request = self.selection.set_tree_style(style, &self.catalog);
                self.apply(request);
            }
            UiAction::SelectTree(id) => match self.selection.select_tree_asset(&id, &self.catalog) {
                Ok(request) => self.apply(request),
                Err(e) => log::warn!("{}", e),
            },
            UiAction::SelectAnimal(id) => {
                match self.selection.select_animal_asset(&id, &self.catalog) {
                    Ok(request) => self.apply(request),
                    Err(e) => log::warn!("{}", e),
                }
            }
            UiAction::SelectCamera(index) => {
                if self.factory.camera.index != index {
                    log::info!("Switching to camera {}", index);
                    self.factory.camera.index = index;
                    if self.pipeline.is_active() || self.pipeline.is_starting() {
                        self.start_pipeline();
                    }
                }
            }
            UiAction::RefreshCameras => self.cameras = list_cameras(),
        }
    }

    /// Pull loaded bitmaps, the latest frame and the newest detection result
    pub fn update(&mut self) {
        for (family, image) in self.loader.poll() {
            self.compositor.set_image(family, image);
            self.overlay_dirty = true;
        }

        if self.pipeline.update().is_some() {
            self.overlay_dirty = true;
        }

        if let Some(frame) = self.pipeline.latest_frame() {
            if self.last_video_frame != Some(frame.frame_number) {
                self.upload_video(&frame);
            }
        }

        if let Some(result) = self.pipeline.poll() {
            self.track
                .update(result.landmarks.as_deref(), result.width, result.height);
            self.landmarks = result.landmarks;
            self.frame_size = Some((result.width, result.height));
            self.overlay_dirty = true;
        }

        if self.overlay_dirty {
            self.redraw_overlay();
        }
    }

    fn upload_video(&mut self, frame: &CameraFrame) {
        let size = [frame.width as usize, frame.height as usize];
        if frame.data.len() != size[0] * size[1] * 4 {
            log::warn!("Skipping malformed frame {}", frame.frame_number);
            return;
        }
        let image = egui::ColorImage::from_rgba_unmultiplied(size, &frame.data);
        upload_texture(&self.egui_ctx, &mut self.video_texture, "camera-video", image);
        self.last_video_frame = Some(frame.frame_number);
    }

    fn redraw_overlay(&mut self) {
        let Some((width, height)) = self.frame_size else {
            return;
        };
        self.overlay_dirty = false;

        let canvas = self.compositor.render(
            &self.track,
            self.landmarks.as_deref(),
            self.selection.strategy(),
            width,
            height,
        );
        let size = [canvas.width() as usize, canvas.height() as usize];
        let image = egui::ColorImage::from_rgba_premultiplied(size, canvas.data());
        upload_texture(&self.egui_ctx, &mut self.overlay_texture, "face-overlay", image);
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        let fps = self.fps;
        let show_fps = self.show_fps;
        let running = self.pipeline.is_active();
        let starting = self.pipeline.is_starting();
        let error = self.pipeline.error().map(str::to_string);
        let frames = self
            .pipeline
            .session()
            .and_then(|s| s.camera())
            .map(|c| c.frame_count())
            .unwrap_or(0);
        let track = self.track;
        let selection = &self.selection;
        let catalog = &self.catalog;
        let cameras = &self.cameras;
        let camera_index = self.factory.camera.index;
        let video = self.video_texture.as_ref().map(|t| (t.id(), t.size_vec2()));
        let overlay = self.overlay_texture.as_ref().map(|t| t.id());

        let mut actions = Vec::new();

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(WINDOW_TITLE).strong());
                    ui.separator();
                    if show_fps {
                        ui.label(format!("FPS: {:.1}", fps));
                        ui.separator();
                    }
                    let mode = selection.mode();
                    if ui
                        .selectable_label(mode == ViewMode::FaceMesh, "Face Mesh")
                        .clicked()
                    {
                        actions.push(UiAction::SetMode(ViewMode::FaceMesh));
                    }
                    if ui
                        .selectable_label(mode == ViewMode::Filter, "Filters")
                        .clicked()
                    {
                        actions.push(UiAction::SetMode(ViewMode::Filter));
                    }
                });
            });

            egui::SidePanel::left("controls")
                .default_width(260.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        camera_section(ui, running, starting, frames, error.as_deref(), cameras, camera_index, &mut actions);
                        ui.separator();
                        face_section(ui, running, &track);
                        ui.separator();
                        filter_section(ui, selection, catalog, &mut actions);
                        ui.separator();
                        ui.label(selection.describe(catalog));
                    });
                });

            egui::CentralPanel::default()
                .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
                .show(ctx, |ui| {
                    let available = ui.max_rect();
                    match video {
                        Some((texture, size)) => {
                            let rect = fit_rect(available, size);
                            let painter = ui.painter_at(available);
                            painter.image(texture, rect, mirrored_uv(), egui::Color32::WHITE);
                            if let Some(overlay) = overlay {
                                painter.image(overlay, rect, full_uv(), egui::Color32::WHITE);
                            }
                        }
                        None => {
                            ui.centered_and_justified(|ui| {
                                let text = if running || starting { "Waiting for camera..." } else { "Camera stopped" };
                                ui.label(egui::RichText::new(text).color(egui::Color32::GRAY));
                            });
                        }
                    }
                });
        });

        for action in actions {
            self.handle_action(action);
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            self.egui_renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_pipeline();
    }
}

fn load_catalog(settings: &Settings) -> AssetCatalog {
    let loaded = match &settings.catalog_path {
        Some(path) => AssetCatalog::load(path),
        None => AssetCatalog::embedded(&find_assets_dir(settings.assets_dir.as_deref())),
    };
    match loaded {
        Ok(catalog) => {
            log::info!("Asset catalog ready ({} entries)", catalog.len());
            catalog
        }
        Err(e) => {
            log::error!("Failed to load asset catalog: {}", e);
            AssetCatalog::default()
        }
    }
}

fn upload_texture(
    ctx: &egui::Context,
    slot: &mut Option<egui::TextureHandle>,
    name: &str,
    image: egui::ColorImage,
) {
    match slot {
        Some(handle) => handle.set(image, egui::TextureOptions::LINEAR),
        None => *slot = Some(ctx.load_texture(name, image, egui::TextureOptions::LINEAR)),
    }
}

/// Largest rect with the frame's aspect ratio centered in `available`
fn fit_rect(available: egui::Rect, frame: egui::Vec2) -> egui::Rect {
    if frame.x <= 0.0 || frame.y <= 0.0 {
        return available;
    }
    let scale = (available.width() / frame.x).min(available.height() / frame.y);
    egui::Rect::from_center_size(available.center(), frame * scale)
}

/// Texture coordinates that flip the image horizontally
fn mirrored_uv() -> egui::Rect {
    egui::Rect::from_min_max(egui::pos2(1.0, 0.0), egui::pos2(0.0, 1.0))
}

fn full_uv() -> egui::Rect {
    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0))
}

fn camera_section(
    ui: &mut egui::Ui,
    running: bool,
    starting: bool,
    frames: u64,
    error: Option<&str>,
    cameras: &[CameraInfo],
    camera_index: u32,
    actions: &mut Vec<UiAction>,
) {
    ui.heading("Camera");

    let selected = cameras
        .iter()
        .find(|c| c.index == camera_index)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("Camera {}", camera_index));
    ui.horizontal(|ui| {
        egui::ComboBox::from_id_salt("camera_select")
            .selected_text(selected)
            .show_ui(ui, |ui| {
                for cam in cameras {
                    if ui
                        .selectable_label(cam.index == camera_index, format!("{}: {}", cam.index, cam.name))
                        .clicked()
                    {
                        actions.push(UiAction::SelectCamera(cam.index));
                    }
                }
            });
        if ui.small_button("Refresh").clicked() {
            actions.push(UiAction::RefreshCameras);
        }
    });

    let label = if running || starting { "Stop" } else { "Start" };
    if ui.button(label).clicked() {
        actions.push(UiAction::TogglePipeline);
    }
    if starting {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label("Starting...");
        });
    }
    if running {
        ui.label(format!("Frames: {}", frames));
    }
    if let Some(message) = error {
        ui.colored_label(ERROR_COLOR, message);
    }
}

fn face_section(ui: &mut egui::Ui, running: bool, track: &FaceTrack) {
    ui.heading("Face");
    if !running {
        ui.label("-");
    } else if track.detected {
        ui.colored_label(FACE_FOUND_COLOR, "Face detected");
        ui.label(format!(
            "{:.0} x {:.0} px",
            track.face.width, track.face.height
        ));
    } else {
        ui.label("No face");
    }
}

fn filter_section(
    ui: &mut egui::Ui,
    selection: &Selection,
    catalog: &AssetCatalog,
    actions: &mut Vec<UiAction>,
) {
    ui.heading("Filter");

    ui.horizontal(|ui| {
        let family = selection.family();
        if ui
            .selectable_label(family == FilterFamily::Tree, "Tree")
            .clicked()
        {
            actions.push(UiAction::SetFamily(FilterFamily::Tree));
        }
        if ui
            .selectable_label(family == FilterFamily::Animal, "Animal")
            .clicked()
        {
            actions.push(UiAction::SetFamily(FilterFamily::Animal));
        }
    });

    match selection.family() {
        FilterFamily::Tree => {
            ui.horizontal(|ui| {
                let style = selection.tree_style();
                if ui
                    .selectable_label(style == TreeStyle::Procedural, "Procedural")
                    .clicked()
                {
                    actions.push(UiAction::SetTreeStyle(TreeStyle::Procedural));
                }
                if ui
                    .selectable_label(style == TreeStyle::Asset, "Image")
                    .clicked()
                {
                    actions.push(UiAction::SetTreeStyle(TreeStyle::Asset));
                }
            });
            if selection.tree_style() == TreeStyle::Asset {
                let picked = asset_grid(ui, "tree_grid", &catalog.tree_assets(), selection.tree_asset());
                if let Some(id) = picked {
                    actions.push(UiAction::SelectTree(id));
                }
            }
        }
        FilterFamily::Animal => {
            let picked = asset_grid(ui, "animal_grid", &catalog.animal_assets(), selection.animal_asset());
            if let Some(id) = picked {
                actions.push(UiAction::SelectAnimal(id));
            }
        }
    }
}

/// Two-column grid of asset cards; returns the id clicked this frame
fn asset_grid(ui: &mut egui::Ui, id: &str, assets: &[&Asset], selected: &str) -> Option<String> {
    let mut picked = None;
    if assets.is_empty() {
        ui.label("No assets available");
        return None;
    }

    egui::Grid::new(id)
        .num_columns(2)
        .spacing([6.0, 6.0])
        .show(ui, |ui| {
            for (i, asset) in assets.iter().enumerate() {
                let is_selected = asset.id == selected;
                let response = ui
                    .vertical(|ui| {
                        ui.set_width(110.0);
                        let title = egui::RichText::new(&asset.display_name).strong();
                        let clicked = ui.selectable_label(is_selected, title).clicked();
                        ui.label(egui::RichText::new(&asset.description).small());
                        clicked
                    })
                    .inner;
                if response && !is_selected {
                    picked = Some(asset.id.clone());
                }
                if i % 2 == 1 {
                    ui.end_row();
                }
            }
        });

    picked
}
