//! Engine-facing driver: owns the VM host and the main script instance and
//! turns absolute frame times into `think`/`draw` calls.

use anyhow::{Context, Result};
use glam::Vec2;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::package::{PreloadReport, ScriptPackage};
use crate::renderer::{RecordingRenderer, Renderer};
use crate::script_watch::ScriptWatcher;
use crate::scripts::{ScriptClass, ScriptInstance, VmHost, VmOptions};
use crate::time::Time;
use crate::variant::{FunctionCall, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub think_ok: bool,
    pub render_ok: bool,
    pub elapsed_seconds: f64,
    pub delta_seconds: f64,
}

pub struct GameRuntime {
    config: RuntimeConfig,
    host: VmHost,
    instance: Option<ScriptInstance>,
    time: Time,
    watcher: Option<ScriptWatcher>,
    last_preload: Option<PreloadReport>,
}

impl GameRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let host = VmHost::new(VmOptions::from(&config.scripts));
        Self { config, host, instance: None, time: Time::new(), watcher: None, last_preload: None }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn host(&self) -> &VmHost {
        &self.host
    }

    pub fn instance(&self) -> Option<&ScriptInstance> {
        self.instance.as_ref()
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn last_preload(&self) -> Option<&PreloadReport> {
        self.last_preload.as_ref()
    }

    pub fn viewport(&self) -> Vec2 {
        Vec2::new(self.config.viewport.width as f32, self.config.viewport.height as f32)
    }

    /// Starts the VM and, when configured, preloads the script root and
    /// starts watching it.
    pub fn initialize(&mut self) -> Result<()> {
        self.host.initialize().context("Failed to start script VM")?;
        let scripts = &self.config.scripts;
        if scripts.preload && scripts.script_root.is_dir() {
            let package = ScriptPackage::new(&scripts.script_root);
            self.last_preload = Some(package.preload(&mut self.host)?);
        }
        if scripts.hot_reload && self.watcher.is_none() {
            self.watcher = Some(self.start_watcher()?);
        }
        Ok(())
    }

    /// Loads the main script and creates the instance that receives frames.
    pub fn start(&mut self) -> Result<()> {
        self.initialize()?;
        let path = self.config.scripts.main_script.clone();
        let class = self
            .host
            .load_or_get_class(&path)
            .with_context(|| format!("Failed to load main script {}", path.display()))?;
        let instance = self
            .host
            .create_instance(&class)
            .with_context(|| format!("Failed to create instance of {}", path.display()))?;
        if let Some(previous) = self.instance.replace(instance) {
            self.host.destroy_instance(previous);
        }
        self.time = Time::new();
        info!("[runtime] started {} ({} functions)", path.display(), class.function_count());
        Ok(())
    }

    /// Runs one frame at absolute time `now` (seconds): `think` then `draw`.
    pub fn frame(&mut self, renderer: &mut dyn Renderer, now: f64) -> FrameReport {
        let delta = self.time.advance_to(now);
        self.run_frame(renderer, delta)
    }

    /// Fixed-step variant of [`GameRuntime::frame`].
    pub fn step(&mut self, renderer: &mut dyn Renderer, dt: f64) -> FrameReport {
        let delta = self.time.advance_by(dt);
        self.run_frame(renderer, delta)
    }

    fn run_frame(&mut self, renderer: &mut dyn Renderer, delta: f64) -> FrameReport {
        if self.watcher.is_some() {
            self.poll_hot_reload();
        }
        let elapsed = self.time.elapsed_seconds();
        let mut report = FrameReport { elapsed_seconds: elapsed, delta_seconds: delta, ..FrameReport::default() };
        let Some(instance) = self.instance.as_ref() else {
            return report;
        };
        renderer.begin_frame();
        report.think_ok = instance.think(elapsed, delta);
        report.render_ok = instance.render(renderer);
        renderer.end_frame();
        report
    }

    /// Destroys the main instance and shuts the VM down.
    pub fn end(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.host.destroy_instance(instance);
        }
        self.watcher = None;
        self.host.shutdown();
        info!("[runtime] stopped");
    }

    /// Throws away the VM with every class and instance and starts again
    /// from the main script.
    pub fn reload_vm(&mut self) -> Result<()> {
        info!("[runtime] reloading VM");
        self.end();
        self.start()
    }

    pub fn call_function(&self, call: &FunctionCall) -> bool {
        match &self.instance {
            Some(instance) => instance.call_function(call),
            None => {
                warn!("[runtime] call to '{}' before start", call.name);
                false
            }
        }
    }

    pub fn invoke(&self, call: &FunctionCall) -> Result<Vec<Variant>> {
        let instance = self.instance.as_ref().context("Runtime has not been started")?;
        instance.invoke(call).with_context(|| format!("Calling '{}'", call.name))
    }

    pub fn reset(&self) -> bool {
        self.instance.as_ref().is_some_and(ScriptInstance::reset)
    }

    /// Reloads classes whose files changed. Returns the paths that were
    /// reloaded successfully.
    pub fn poll_hot_reload(&mut self) -> Vec<PathBuf> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Vec::new();
        };
        let changes = watcher.drain_changes();
        changes.into_iter().filter(|path| self.reload_script(path)).collect()
    }

    /// Reloads the cached class for `path` if its contents changed.
    pub fn reload_script(&self, path: &std::path::Path) -> bool {
        match self.host.reload_path(path) {
            Some(Ok(true)) => {
                info!("[runtime] hot reloaded {}", path.display());
                true
            }
            Some(Ok(false)) => false,
            Some(Err(err)) => {
                warn!("[runtime] hot reload of {} failed: {err}", path.display());
                false
            }
            None => {
                debug!("[runtime] ignoring change to unloaded script {}", path.display());
                false
            }
        }
    }

    pub fn main_class(&self) -> Option<&Rc<ScriptClass>> {
        self.instance.as_ref().map(ScriptInstance::class)
    }

    fn start_watcher(&self) -> Result<ScriptWatcher> {
        let mut watcher = ScriptWatcher::new()?;
        let scripts = &self.config.scripts;
        if scripts.script_root.is_dir() {
            watcher.watch(&scripts.script_root)?;
        }
        if let Some(parent) = scripts.main_script.parent().filter(|parent| parent.is_dir()) {
            watcher.watch(parent)?;
        }
        Ok(watcher)
    }
}

impl Drop for GameRuntime {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.host.destroy_instance(instance);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessSummary {
    pub frames: u32,
    pub think_failures: u32,
    pub render_failures: u32,
    pub draw_commands: usize,
}

/// Runs the main script for `frames` fixed steps against a recording
/// renderer.
pub fn run_headless(config: RuntimeConfig, frames: u32, dt: f64) -> Result<(HeadlessSummary, RecordingRenderer)> {
    let mut runtime = GameRuntime::new(config);
    runtime.start()?;
    let mut renderer = RecordingRenderer::new(runtime.viewport());
    let mut summary = HeadlessSummary::default();
    for _ in 0..frames {
        let report = runtime.step(&mut renderer, dt);
        summary.frames += 1;
        summary.think_failures += u32::from(!report.think_ok);
        summary.render_failures += u32::from(!report.render_ok);
    }
    summary.draw_commands = renderer.commands().len();
    runtime.end();
    Ok((summary, renderer))
}
