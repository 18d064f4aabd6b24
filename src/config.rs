use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_main_script")]
    pub main_script: PathBuf,
    #[serde(default = "ScriptConfig::default_script_root")]
    pub script_root: PathBuf,
    #[serde(default = "ScriptConfig::default_enable_jit")]
    pub enable_jit: bool,
    #[serde(default)]
    pub hot_reload: bool,
    #[serde(default = "ScriptConfig::default_preload")]
    pub preload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "ViewportConfig::default_width")]
    pub width: u32,
    #[serde(default = "ViewportConfig::default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scripts: ScriptConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOverrides {
    pub main_script: Option<PathBuf>,
    pub enable_jit: Option<bool>,
    pub hot_reload: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ScriptConfig {
    fn default_main_script() -> PathBuf {
        PathBuf::from("scripts/main.lua")
    }

    fn default_script_root() -> PathBuf {
        PathBuf::from("scripts")
    }

    const fn default_enable_jit() -> bool {
        true
    }

    const fn default_preload() -> bool {
        true
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            main_script: Self::default_main_script(),
            script_root: Self::default_script_root(),
            enable_jit: Self::default_enable_jit(),
            hot_reload: false,
            preload: Self::default_preload(),
        }
    }
}

impl ViewportConfig {
    const fn default_width() -> u32 {
        1280
    }

    const fn default_height() -> u32 {
        720
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { width: Self::default_width(), height: Self::default_height() }
    }
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("[runtime] config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &RuntimeOverrides) {
        if let Some(script) = &overrides.main_script {
            self.scripts.main_script = script.clone();
        }
        if let Some(enable_jit) = overrides.enable_jit {
            self.scripts.enable_jit = enable_jit;
        }
        if let Some(hot_reload) = overrides.hot_reload {
            self.scripts.hot_reload = hot_reload;
        }
        if let Some(width) = overrides.width {
            self.viewport.width = width;
        }
        if let Some(height) = overrides.height {
            self.viewport.height = height;
        }
    }
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.main_script.is_some() {
            fields.push("main_script");
        }
        if self.enable_jit.is_some() {
            fields.push("enable_jit");
        }
        if self.hot_reload.is_some() {
            fields.push("hot_reload");
        }
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        fields
    }
}
