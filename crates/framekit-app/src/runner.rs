//! Application runner and frame loop.

use std::thread;
use std::time::{Duration, Instant};

use framekit_gpu::GraphicsDevice;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::FrameApp;
use crate::context::AppContext;
use crate::host::WindowHost;

/// Longest frame time handed to `update`, in seconds.
pub const MAX_FRAME_TIME: f32 = 0.167;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "framekit".to_string(),
            width: 800,
            height: 600,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Minimum duration of one frame, if pacing is enabled.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}

/// Run a [`FrameApp`] until its window is closed or a fatal error occurs.
///
/// Initializes logging, creates the window, device and swapchain, and drives
/// the frame loop. Fatal errors are logged and returned after cleanup.
pub fn run_app<A: FrameApp>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    // Declared before the context so the window outlives the device.
    let mut host = WindowHost::new(&config.title, config.width, config.height)?;
    let mut ctx = AppContext::new(host.window().clone(), &config)?;
    let mut app = A::init(&mut ctx)?;
    info!("Application ready!");

    let mut stats = FpsStats::default();
    let result = run_loop(&mut host, &mut ctx, &mut app, &config, &mut stats);
    if let Err(e) = &result {
        error!("Frame loop terminated: {e:#}");
    }

    stats.log(ctx.frame_count);

    info!("Starting cleanup...");
    if let Err(e) = ctx.device().wait_idle() {
        error!("Failed to wait idle: {e}");
    }
    app.cleanup(&mut ctx);
    drop(ctx);
    info!("Cleanup complete");

    result
}

fn init_logging() {
    // Keep a subscriber the embedding binary may already have installed.
    #[cfg(feature = "profiling-tracy")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,framekit_app=trace,framekit_render=trace,framekit_gpu=trace")
        });
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .try_init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();
    }
}

fn run_loop<A: FrameApp>(
    host: &mut WindowHost,
    ctx: &mut AppContext,
    app: &mut A,
    config: &AppConfig,
    stats: &mut FpsStats,
) -> anyhow::Result<()> {
    let target_frame_time = config.target_frame_time();
    let mut generation = ctx.renderer().generation();
    let mut last_frame = Instant::now();

    loop {
        host.poll_events();
        for event in host.drain_events() {
            app.on_event(&event);
        }
        if host.close_requested() {
            info!("Close requested");
            return Ok(());
        }

        let frame_start = Instant::now();
        let dt = clamp_frame_time(frame_start.duration_since(last_frame));
        last_frame = frame_start;
        stats.record(dt);

        app.update(ctx, dt);

        if let Some(command_buffer) = ctx.renderer_mut().begin_frame(host)? {
            let frame = ctx.renderer().frame_context(dt)?;
            ctx.renderer().begin_swapchain_render_pass(command_buffer)?;
            app.render(ctx, &frame)?;
            ctx.renderer().end_swapchain_render_pass(command_buffer)?;
            ctx.renderer_mut().end_frame(host)?;
            ctx.frame_count += 1;
        }

        if ctx.renderer().generation() != generation {
            generation = ctx.renderer().generation();
            app.on_swapchain_recreated(ctx)?;
        }

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
    }
}

/// Frame time in seconds, capped at [`MAX_FRAME_TIME`].
fn clamp_frame_time(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32().min(MAX_FRAME_TIME)
}

/// Frame rate extremes and average, reported at shutdown.
#[derive(Debug)]
struct FpsStats {
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    samples: u64,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            samples: 0,
        }
    }
}

impl FpsStats {
    fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.samples += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.fps_sum / self.samples as f64)
    }

    fn log(&self, frames: u64) {
        if let Some(avg_fps) = self.average() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.vsync);
        assert_eq!(config.validation, cfg!(debug_assertions));
        assert!(config.target_frame_time().is_none());
    }

    #[test]
    fn config_builder() {
        let config = AppConfig::new("viewer")
            .with_size(1024, 768)
            .with_vsync(false)
            .with_validation(false)
            .with_target_fps(50);

        assert_eq!(config.title, "viewer");
        assert_eq!((config.width, config.height), (1024, 768));
        assert!(!config.vsync);
        assert!(!config.validation);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert!(AppConfig::default().with_target_fps(0).target_frame_time().is_none());
    }

    #[test]
    fn long_frames_are_clamped() {
        approx::assert_relative_eq!(clamp_frame_time(Duration::from_secs(2)), MAX_FRAME_TIME);
        approx::assert_relative_eq!(clamp_frame_time(Duration::from_millis(16)), 0.016);
    }

    #[test]
    fn fps_stats_track_extremes() {
        let mut stats = FpsStats::default();
        assert!(stats.average().is_none());

        stats.record(0.0);
        stats.record(0.01);
        stats.record(0.02);

        approx::assert_relative_eq!(stats.max_fps, 100.0, epsilon = 1e-3);
        approx::assert_relative_eq!(stats.min_fps, 50.0, epsilon = 1e-3);
        approx::assert_relative_eq!(stats.average().unwrap(), 75.0, epsilon = 1e-3);
    }
}
