//! Deterministic fixture runner: drives one script for a fixed number of
//! steps and captures everything it did as JSON-friendly data.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::renderer::{DrawCommand, RecordingRenderer};
use crate::runtime::GameRuntime;
use crate::variant::{FunctionCall, Variant};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    pub script: String,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default = "default_viewport")]
    pub viewport: [f32; 2],
    #[serde(default)]
    pub calls: Vec<FixtureCall>,
    /// Instance fields recorded after the last step.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// A named call issued after `after_step` steps have run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureCall {
    #[serde(default)]
    pub after_step: usize,
    #[serde(flatten)]
    pub call: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub script: String,
    pub steps: usize,
    pub dt: f64,
    pub functions: Vec<String>,
    pub results: Vec<StepResult>,
    pub calls: Vec<CallResult>,
    pub fields: BTreeMap<String, Variant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub think_ok: bool,
    pub render_ok: bool,
    pub commands: Vec<DrawCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallResult {
    pub after_step: usize,
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HarnessFixture {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            steps: default_steps(),
            dt: default_dt(),
            viewport: default_viewport(),
            calls: Vec::new(),
            fields: Vec::new(),
            base_dir: None,
        }
    }

    /// The script path, resolved against the fixture's directory when
    /// relative.
    pub fn script_path(&self) -> PathBuf {
        let script = Path::new(&self.script);
        match &self.base_dir {
            Some(base) if script.is_relative() => base.join(script),
            _ => script.to_path_buf(),
        }
    }
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    let mut config = RuntimeConfig::default();
    config.scripts.main_script = fixture.script_path();
    config.scripts.preload = false;
    config.scripts.hot_reload = false;

    let mut runtime = GameRuntime::new(config);
    runtime.start().with_context(|| format!("starting fixture script '{}'", fixture.script))?;
    let functions = runtime.main_class().map(|class| class.function_names()).unwrap_or_default();
    let [width, height] = fixture.viewport;
    let mut renderer = RecordingRenderer::new(Vec2::new(width, height));

    let mut calls = Vec::new();
    run_calls_due(&runtime, fixture, 0, &mut calls);
    let mut results = Vec::with_capacity(fixture.steps);
    for step in 0..fixture.steps {
        let report = runtime.step(&mut renderer, fixture.dt);
        results.push(StepResult {
            step,
            think_ok: report.think_ok,
            render_ok: report.render_ok,
            commands: renderer.take_commands(),
        });
        run_calls_due(&runtime, fixture, step + 1, &mut calls);
    }

    let mut fields = BTreeMap::new();
    if let Some(instance) = runtime.instance() {
        for name in &fixture.fields {
            let value = instance.field(name).with_context(|| format!("reading field '{name}'"))?;
            fields.insert(name.clone(), value);
        }
    }
    runtime.end();

    Ok(HarnessOutput { script: fixture.script.clone(), steps: fixture.steps, dt: fixture.dt, functions, results, calls, fields })
}

fn run_calls_due(runtime: &GameRuntime, fixture: &HarnessFixture, step: usize, out: &mut Vec<CallResult>) {
    for entry in fixture.calls.iter().filter(|entry| entry.after_step == step) {
        let name = entry.call.name.clone();
        let result = match runtime.invoke(&entry.call) {
            Ok(results) => CallResult { after_step: step, name, ok: true, results, error: None },
            Err(err) => {
                CallResult { after_step: step, name, ok: false, results: Vec::new(), error: Some(format!("{err:#}")) }
            }
        };
        out.push(result);
    }
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening fixture '{}'", path.display()))?;
    let mut fixture: HarnessFixture = serde_json::from_reader(file).with_context(|| "parsing fixture JSON")?;
    fixture.base_dir = path.parent().map(Path::to_path_buf);
    Ok(fixture)
}

fn default_dt() -> f64 {
    1.0 / 60.0
}

fn default_steps() -> usize {
    3
}

fn default_viewport() -> [f32; 2] {
    [320.0, 240.0]
}
