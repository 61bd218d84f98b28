// SPDX-License-Identifier: CEPL-1.0
use hexa_math::OrbitCamera;
use hexa_platform::WindowSpec;
use hexa_render_vk::{DeviceConfig, PresentModePref, RendererConfig, ShaderSource};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let spec = WindowSpec::default();
        WindowCfg {
            width: spec.width,
            height: spec.height,
            title: spec.title,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePref,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModePref::Mailbox,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

/// Both paths must be set to replace the bundled shaders.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ShaderCfg {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SceneCfg {
    pub grid_width: u32,
    pub grid_height: u32,
    pub orbit_radius: f32,
    pub orbit_speed: f32,
    pub fov_degrees: f32,
}

impl Default for SceneCfg {
    fn default() -> Self {
        let cam = OrbitCamera::default();
        SceneCfg {
            grid_width: 10,
            grid_height: 10,
            orbit_radius: cam.radius,
            orbit_speed: cam.speed,
            fov_degrees: cam.fov_degrees,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub device: DeviceConfig,
    pub shaders: ShaderCfg,
    pub scene: SceneCfg,
}

impl AppCfg {
    pub fn parse(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<AppCfg>(src)
    }

    /// Command-line flags win over the file.
    pub fn with_overrides(mut self, validation: bool, device: Option<usize>) -> Self {
        if validation {
            self.device.enable_validation = true;
        }
        if device.is_some() {
            self.device.preferred_device_index = device;
        }
        self
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width.max(1),
            height: self.window.height.max(1),
        }
    }

    pub fn shader_source(&self) -> ShaderSource {
        match (&self.shaders.vertex, &self.shaders.fragment) {
            (Some(vertex), Some(fragment)) => ShaderSource::Files {
                vertex: vertex.clone(),
                fragment: fragment.clone(),
            },
            (None, None) => ShaderSource::Builtin,
            _ => {
                warn!("[shaders] needs both vertex and fragment; using built-in shaders");
                ShaderSource::Builtin
            }
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            device: self.device,
            present_mode: self.render.present_mode,
            clear_color: self.render.clear_color,
            shaders: self.shader_source(),
        }
    }

    pub fn orbit_camera(&self) -> OrbitCamera {
        OrbitCamera {
            radius: self.scene.orbit_radius,
            speed: self.scene.orbit_speed,
            fov_degrees: self.scene.fov_degrees,
            ..OrbitCamera::default()
        }
    }
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match AppCfg::parse(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("config {}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(e) => {
            debug!("config {} not read ({e}); using defaults", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(AppCfg::parse("").unwrap(), AppCfg::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [render]
            present_mode = "fifo"

            [device]
            preferred_device_index = 1

            [scene]
            grid_width = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.present_mode, PresentModePref::Fifo);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.device.preferred_device_index, Some(1));
        assert!(!cfg.device.enable_validation);
        assert_eq!((cfg.scene.grid_width, cfg.scene.grid_height), (4, 10));
        assert_eq!(cfg.window, WindowCfg::default());
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        assert!(AppCfg::parse("[render]\npresent_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let cfg = AppCfg::parse("[device]\npreferred_device_index = 2\n")
            .unwrap()
            .with_overrides(true, Some(0));
        assert!(cfg.device.enable_validation);
        assert_eq!(cfg.device.preferred_device_index, Some(0));

        let kept = AppCfg::parse("[device]\nenable_validation = true\n")
            .unwrap()
            .with_overrides(false, None);
        assert!(kept.device.enable_validation);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Path::new("/nonexistent/hexa/hexa.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn shader_paths_need_both_stages() {
        let both = AppCfg::parse(
            "[shaders]\nvertex = \"a.vert.spv\"\nfragment = \"a.frag.spv\"\n",
        )
        .unwrap();
        assert_eq!(
            both.shader_source(),
            ShaderSource::Files {
                vertex: PathBuf::from("a.vert.spv"),
                fragment: PathBuf::from("a.frag.spv"),
            }
        );
        let one = AppCfg::parse("[shaders]\nvertex = \"a.vert.spv\"\n").unwrap();
        assert_eq!(one.shader_source(), ShaderSource::Builtin);
    }

    #[test]
    fn scene_feeds_orbit_camera() {
        let cfg = AppCfg::parse("[scene]\norbit_radius = 5.0\nfov_degrees = 60.0\n").unwrap();
        let cam = cfg.orbit_camera();
        assert_eq!(cam.radius, 5.0);
        assert_eq!(cam.fov_degrees, 60.0);
        assert_eq!(cam.near, OrbitCamera::default().near);
    }
}
