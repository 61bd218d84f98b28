// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use hexa_render::{RenderSize, WindowSurface};
use std::time::Duration;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::input::CameraInput;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "hexaterrain".into(),
            width: 800,
            height: 600,
        }
    }
}

/// Window facts the frame loop polls. Fed from window events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceTracker {
    size: RenderSize,
    resized: bool,
    close_requested: bool,
}

impl SurfaceTracker {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn on_resize(&mut self, size: RenderSize) {
        self.size = size;
        self.resized = true;
    }

    pub fn on_close(&mut self) {
        self.close_requested = true;
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

struct WindowState {
    spec: WindowSpec,
    window: Option<Window>,
    tracker: SurfaceTracker,
    input: CameraInput,
    create_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.spec.title.clone())
            .with_inner_size(PhysicalSize::new(self.spec.width, self.spec.height));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                self.tracker = SurfaceTracker::new(RenderSize::new(size.width, size.height));
                info!("window: created {}x{}", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => {
                error!("window: create failed: {e}");
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("window: close requested");
                self.tracker.on_close();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                let size = RenderSize::new(new_size.width, new_size.height);
                debug!("window: resized to {size}");
                self.tracker.on_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => self.input.on_key_event(&event),
            WindowEvent::MouseWheel { delta, .. } => self.input.on_scroll(delta),
            _ => {}
        }
    }
}

/// A winit window plus the loop that feeds it.
pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    pub fn new(spec: WindowSpec) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        Ok(Self {
            event_loop,
            state: WindowState {
                spec,
                window: None,
                tracker: SurfaceTracker::default(),
                input: CameraInput::default(),
                create_error: None,
            },
        })
    }

    /// Dispatches pending events, waiting at most `timeout` (`None` blocks
    /// until something arrives). Returns `false` once the loop has exited.
    pub fn pump(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let status = self.event_loop.pump_app_events(timeout, &mut self.state);
        if let Some(e) = self.state.create_error.take() {
            return Err(anyhow!("create_window: {e}"));
        }
        Ok(match status {
            PumpStatus::Continue => true,
            PumpStatus::Exit(code) => {
                debug!("window: event loop exited ({code})");
                self.state.tracker.on_close();
                false
            }
        })
    }

    /// Camera input seen since the last call.
    pub fn take_input(&mut self) -> CameraInput {
        std::mem::take(&mut self.state.input)
    }

    /// `None` until the platform has resumed us.
    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    /// Drops the native window. Anything built on its handles must already
    /// be gone.
    pub fn close(&mut self) {
        self.state.window = None;
    }
}

impl WindowSurface for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.tracker.size()
    }

    fn take_resized(&mut self) -> bool {
        self.state.tracker.take_resized()
    }

    fn wait_events(&mut self) -> Result<()> {
        self.pump(None).map(|_| ())
    }

    fn close_requested(&self) -> bool {
        self.state.tracker.close_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_flag_is_consumed_once() {
        let mut t = SurfaceTracker::new(RenderSize::new(800, 600));
        assert!(!t.take_resized());
        t.on_resize(RenderSize::new(1024, 768));
        t.on_resize(RenderSize::new(1280, 720));
        assert!(t.take_resized());
        assert!(!t.take_resized());
        assert_eq!(t.size(), RenderSize::new(1280, 720));
    }

    #[test]
    fn minimize_reports_empty_size() {
        let mut t = SurfaceTracker::new(RenderSize::new(800, 600));
        t.on_resize(RenderSize::new(0, 0));
        assert!(t.size().is_empty());
        assert!(!t.close_requested());
        t.on_close();
        assert!(t.close_requested());
    }

    #[test]
    fn default_spec_is_800_by_600() {
        let spec = WindowSpec::default();
        assert_eq!((spec.width, spec.height), (800, 600));
    }
}
