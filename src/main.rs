//! Face Filters - Main Entry Point

use std::sync::Arc;
use std::time::{Duration, Instant};

use face_filters::selection::FilterFamily;
use face_filters::settings::Settings;
use face_filters::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Face Filters";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized,
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
}

struct FaceFiltersApp {
    state: AppState,
    /// Handed to `App` when the window is created
    settings: Option<Settings>,
    frame_duration: Duration,
    next_redraw_at: Instant,
}

impl FaceFiltersApp {
    fn new(settings: Settings) -> Self {
        let fps = settings.target_fps.max(1) as u64;
        Self {
            state: AppState::Uninitialized,
            settings: Some(settings),
            frame_duration: Duration::from_nanos(1_000_000_000 / fps),
            next_redraw_at: Instant::now(),
        }
    }
}

impl ApplicationHandler for FaceFiltersApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let AppState::Uninitialized = &self.state {
            let Some(settings) = self.settings.take() else {
                return;
            };

            let window_attributes = WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));

            let window = Arc::new(
                event_loop
                    .create_window(window_attributes)
                    .expect("Failed to create window"),
            );

            log::info!(
                "Window created: {}x{}",
                window.inner_size().width,
                window.inner_size().height
            );

            let app = pollster::block_on(App::new(window.clone(), settings));

            log::info!("Face Filters ready");
            log::info!("Space starts the camera, 1/2/3 switch mesh/animal/tree, ESC exits");

            self.state = AppState::Running { window, app };
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // egui sees every event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::Escape => {
                    log::info!("Escape pressed, exiting...");
                    event_loop.exit();
                }
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                    }
                }
                KeyCode::Space => app.toggle_pipeline(),
                KeyCode::Digit1 => app.show_mesh(),
                KeyCode::Digit2 => app.show_filter(FilterFamily::Animal),
                KeyCode::Digit3 => app.show_filter(FilterFamily::Tree),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::RedrawRequested => {
                app.update();

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        log::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory!");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::warn!("Surface error: {:?}", e);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, .. } = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        let now = Instant::now();
        if now >= self.next_redraw_at {
            window.request_redraw();
            self.next_redraw_at += self.frame_duration;

            // Fell too far behind, resync
            if now > self.next_redraw_at + self.frame_duration * 2 {
                self.next_redraw_at = now + self.frame_duration;
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Release camera and detector before the window goes away
        self.state = AppState::Uninitialized;
    }
}

fn main() {
    let log_level = Settings::stored_log_level().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let settings = Settings::load();

    log::info!("Face Filters v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = Settings::path() {
        log::info!("Settings: {:?}", path);
    }

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = FaceFiltersApp::new(settings);
    event_loop.run_app(&mut app).expect("Event loop error");
}
