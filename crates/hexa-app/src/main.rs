// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use hexa_core::init_tracing;
use hexa_platform::PlatformWindow;
use hexa_render::{FrameOrchestrator, FrameOutcome, WindowSurface};
use hexa_render_vk::VkRenderer;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

mod config;
mod fps;
mod scene;

use fps::FpsCounter;
use scene::TerrainCamera;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, default_value = "hexa.toml")]
    config: PathBuf,

    /// Enable VK_LAYER_KHRONOS_validation and route its messages to the log
    #[arg(long)]
    validation: bool,

    /// Physical device index to try first
    #[arg(long)]
    device: Option<usize>,
}

const FPS_WINDOW: usize = 100;

/// A window that starts minimized has nothing to build a swapchain for.
/// Returns `false` if it closes before gaining a size.
fn wait_for_surface<W: WindowSurface + ?Sized>(window: &mut W) -> Result<bool> {
    if window.framebuffer_size().is_empty() {
        info!("window starts minimized; waiting for a non-zero size");
    }
    while window.framebuffer_size().is_empty() {
        if window.close_requested() {
            return Ok(false);
        }
        window.wait_events()?;
    }
    Ok(true)
}

fn run(
    platform: &mut PlatformWindow,
    orchestrator: &mut FrameOrchestrator<VkRenderer>,
    camera: &mut TerrainCamera,
) -> Result<()> {
    let mut fps = FpsCounter::new(Instant::now(), FPS_WINDOW);
    loop {
        if !platform.pump(Some(Duration::ZERO))? || platform.close_requested() {
            return Ok(());
        }
        camera.apply_input(platform.take_input());

        match orchestrator.draw_frame(platform, camera)? {
            FrameOutcome::Presented { .. } => {
                if let Some(r) = fps.tick(Instant::now()) {
                    info!("fps ~ {:.0} ({:.2} ms)", r.fps, r.frame_ms);
                }
            }
            FrameOutcome::Abandoned => {}
            FrameOutcome::Closed => return Ok(()),
        }
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();
    let cfg = config::load_cfg(&args.config).with_overrides(args.validation, args.device);

    let batches = scene::hex_grid_batches(cfg.scene.grid_width, cfg.scene.grid_height);
    info!(
        "scene: {}x{} grid, {} batches",
        cfg.scene.grid_width,
        cfg.scene.grid_height,
        batches.len()
    );

    let mut platform = PlatformWindow::new(cfg.window_spec())?;
    while platform.window().is_none() {
        if !platform.pump(Some(Duration::from_millis(16)))? {
            return Ok(());
        }
    }
    if !wait_for_surface(&mut platform)? {
        return Ok(());
    }

    let renderer = {
        let window = platform.window().context("window vanished before renderer init")?;
        VkRenderer::new(
            window,
            window,
            platform.framebuffer_size(),
            &cfg.renderer_config(),
            &batches,
        )?
    };
    info!("backend = vk ({})", renderer.device_name());

    let mut orchestrator = FrameOrchestrator::new(renderer);
    let mut camera = TerrainCamera::new(cfg.orbit_camera());
    let result = run(&mut platform, &mut orchestrator, &mut camera);
    if let Err(e) = &result {
        error!("frame loop: {e:#}");
    }

    info!(
        "exiting after {} frames, {} swapchain rebuilds",
        orchestrator.frames(),
        orchestrator.recreations()
    );
    // Renderer goes before the window whose handles it was built from.
    orchestrator.shutdown()?;
    platform.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexa_render::RenderSize;

    /// Reports each size in turn, one per `wait_events`.
    struct Scripted {
        sizes: Vec<RenderSize>,
        waits: usize,
        close_after: Option<usize>,
    }

    impl WindowSurface for Scripted {
        fn framebuffer_size(&self) -> RenderSize {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }
        fn take_resized(&mut self) -> bool {
            false
        }
        fn wait_events(&mut self) -> Result<()> {
            self.waits += 1;
            Ok(())
        }
        fn close_requested(&self) -> bool {
            self.close_after.is_some_and(|n| self.waits >= n)
        }
    }

    #[test]
    fn startup_waits_out_a_minimized_window() {
        let mut w = Scripted {
            sizes: vec![RenderSize::new(0, 0), RenderSize::new(0, 0), RenderSize::new(640, 480)],
            waits: 0,
            close_after: None,
        };
        assert!(wait_for_surface(&mut w).unwrap());
        assert_eq!(w.waits, 2);
        assert!(!w.framebuffer_size().is_empty());
    }

    #[test]
    fn startup_stops_when_closed_while_minimized() {
        let mut w = Scripted {
            sizes: vec![RenderSize::new(0, 0)],
            waits: 0,
            close_after: Some(1),
        };
        assert!(!wait_for_surface(&mut w).unwrap());
        assert_eq!(w.waits, 1);
    }

    #[test]
    fn visible_window_does_not_wait() {
        let mut w = Scripted {
            sizes: vec![RenderSize::new(800, 600)],
            waits: 0,
            close_after: None,
        };
        assert!(wait_for_surface(&mut w).unwrap());
        assert_eq!(w.waits, 0);
    }
}
