use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The `egui` re-export for building native GUIs with the eframe framework.
use eframe::egui::{self, Color32, ColorImage, TextureHandle, TextureOptions};
/// The `egui_plot` crate for the frame-time plot.
use egui_plot::{Line, Plot, PlotPoints};
use log::{error, info, warn};

use metaballs::{FrameBuffer, FrameTimes, RenderToggles, Simulation, SimulationConfig};

/// Frames faster than this are padded with a sleep so the display thread can take the lock.
const MIN_FRAME_TIME: Duration = Duration::from_millis(4);
const ROLLING_FRAMES: usize = 240;

// ===================================================================================
// Render driver thread
// ===================================================================================

/// Background thread running step → rebuild → render until stopped.
struct Driver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    frames: Arc<FrameBuffer>,
    toggles: Arc<RenderToggles>,
    stats: Arc<Mutex<FrameTimes>>,
}

impl Driver {
    fn spawn(config: SimulationConfig, ctx: egui::Context) -> Result<Self, String> {
        let mut sim = Simulation::new(config).map_err(|e| e.to_string())?;
        let frames = sim.frame_buffer();
        let toggles = sim.toggles();
        let stats = Arc::new(Mutex::new(FrameTimes::new(ROLLING_FRAMES)));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("render-driver".into())
                .spawn(move || {
                    let mut previous = Instant::now();
                    while !stop.load(Ordering::Relaxed) {
                        let now = Instant::now();
                        let dt = (now - previous).as_secs_f32();
                        previous = now;

                        sim.step(dt);
                        sim.rebuild_index();
                        let report = match sim.render_frame() {
                            Ok(frame) => *frame.report(),
                            Err(e) => {
                                error!("render driver stopped: {e}");
                                break;
                            }
                        };
                        if report.failed_tiles > 0 {
                            warn!("frame {}: {} tiles kept stale content", report.frame, report.failed_tiles);
                        }
                        stats
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(report.elapsed.as_secs_f32() * 1000.0);
                        ctx.request_repaint();

                        if let Some(rest) = MIN_FRAME_TIME.checked_sub(now.elapsed()) {
                            thread::sleep(rest);
                        }
                    }
                    info!("render driver exited after {} frames", sim.frames_rendered());
                })
                .map_err(|e| e.to_string())?
        };

        Ok(Self {
            stop,
            handle: Some(handle),
            frames,
            toggles,
            stats,
        })
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("render driver panicked");
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ===================================================================================
// Main Application
// ===================================================================================

/// The display side:
/// - A configuration UI (sliders) used before starting
/// - A running driver thread producing frames into the shared frame buffer
/// - A texture refreshed from the front buffer on every repaint
struct MetaballsApp {
    params: SimulationConfig, // user-chosen parameters
    driver: Option<Driver>,
    texture: Option<TextureHandle>,
    last_error: Option<String>,
}

impl MetaballsApp {
    fn new() -> Self {
        Self {
            params: SimulationConfig::default(),
            driver: None,
            texture: None,
            last_error: None,
        }
    }

    fn start(&mut self, ctx: &egui::Context) {
        self.stop();
        match Driver::spawn(self.params.clone(), ctx.clone()) {
            Ok(driver) => {
                self.last_error = None;
                self.driver = Some(driver);
            }
            Err(e) => {
                error!("cannot start simulation: {e}");
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.shutdown();
        }
    }

    fn handle_keys(&self, ctx: &egui::Context) {
        let Some(driver) = &self.driver else {
            return;
        };
        let (g, b, space) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::G),
                i.key_pressed(egui::Key::B),
                i.key_pressed(egui::Key::Space),
            )
        });
        if g {
            info!("gradient {}", driver.toggles.toggle_gradient());
        }
        if b {
            info!("blur {}", driver.toggles.toggle_blur());
        }
        if space {
            info!("paused {}", driver.toggles.toggle_paused());
        }
    }

    /// Copies the front buffer into the texture.
    fn upload_front(&mut self, ctx: &egui::Context) {
        let Some(driver) = &self.driver else {
            return;
        };
        let image = {
            let front = driver.frames.front();
            let rgb: Vec<u8> = front
                .pixels()
                .iter()
                .flat_map(|&p| [(p >> 16) as u8, (p >> 8) as u8, p as u8])
                .collect();
            ColorImage::from_rgb([front.width(), front.height()], &rgb)
        };
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("front-buffer", image, TextureOptions::LINEAR)),
        }
    }
}

impl eframe::App for MetaballsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);

        // --------------------------
        // Sidebar with configuration
        // --------------------------
        egui::SidePanel::left("config_panel").show(ctx, |ui| {
            ui.heading("Metaballs");

            let running = self.driver.is_some();
            if !running {
                let p = &mut self.params;
                ui.add(egui::Slider::new(&mut p.source_count, 1..=400).text("Sources"));
                ui.add(egui::Slider::new(&mut p.min_radius, 1.0..=50.0).text("Min Radius"));
                ui.add(egui::Slider::new(&mut p.max_radius, 2.0..=100.0).text("Max Radius"));
                ui.add(egui::Slider::new(&mut p.max_speed, 1.0..=500.0).text("Max Speed"));
                ui.add(egui::Slider::new(&mut p.tile_count, 1..=256).text("Tiles"));
                ui.add(egui::Slider::new(&mut p.worker_threads, 1..=64).text("Workers"));
                ui.add(egui::Slider::new(&mut p.iso_threshold, 0.1..=4.0).text("Iso Threshold"));
                ui.checkbox(&mut p.gradient, "Gradient");
                ui.checkbox(&mut p.blur, "Blur");
            } else {
                ui.label("Parameters locked while running. Stop to change.");
            }

            ui.separator();

            if running {
                if ui.button("Stop").clicked() {
                    self.stop();
                }
            } else if ui.button("Start").clicked() {
                self.start(ctx);
            }
            if ui.button("Reset").clicked() {
                self.params = SimulationConfig::default();
                self.stop();
            }

            ui.separator();
            ui.label("g: gradient   b: blur   space: pause");
            if let Some(driver) = &self.driver {
                ui.label(format!(
                    "gradient {} / blur {} / paused {}",
                    driver.toggles.gradient(),
                    driver.toggles.blur(),
                    driver.toggles.paused()
                ));
            }
            if let Some(e) = &self.last_error {
                ui.colored_label(Color32::RED, e);
            }
        });

        egui::SidePanel::right("right_panel")
            .resizable(true)
            .show(ctx, |ui| {
                let Some(driver) = &self.driver else {
                    ui.label("Not running");
                    return;
                };
                let stats = driver.stats.lock().unwrap_or_else(PoisonError::into_inner);
                ui.label(format!("{:.1} fps ({:.2} ms/frame)", stats.fps(), stats.average_ms()));
                ui.label(format!("frames: {}", stats.total_frames()));

                let plot = Plot::new("frame_times")
                    .width(200.0)
                    .height(300.0)
                    .allow_scroll(true)
                    .allow_drag(true);
                plot.show(ui, |plot_ui| {
                    if !stats.is_empty() {
                        let points: Vec<[f64; 2]> = stats
                            .history()
                            .enumerate()
                            .map(|(i, ms)| [i as f64, ms as f64])
                            .collect();
                        plot_ui.line(Line::new(PlotPoints::from(points)));
                    }
                });
            });

        self.upload_front(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = &self.texture {
                let size = ui.available_size();
                ui.image((texture.id(), size));
            }
        });
    }
}

// ===================================================================================
// main
// ===================================================================================

fn main() -> eframe::Result<()> {
    env_logger::init();

    // The blur pass uses the global pool; tile evaluation has its own.
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get_physical())
        .build_global()
    {
        warn!("could not size the global rayon pool: {e}");
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 700.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Metaballs",
        native_options,
        Box::new(|_cc| Ok(Box::new(MetaballsApp::new()))),
    )
}
