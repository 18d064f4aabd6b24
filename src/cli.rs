use crate::config::RuntimeOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/runtime.json";
pub const DEFAULT_FRAMES: u32 = 60;
pub const DEFAULT_DT: f64 = 1.0 / 60.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    jit: Option<bool>,
    hot_reload: Option<bool>,
    width: Option<u32>,
    height: Option<u32>,
    frames: Option<u32>,
    dt: Option<f64>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "script" => overrides.script = Some(PathBuf::from(value)),
                "jit" => overrides.jit = Some(parse_bool_flag("jit", &value)?),
                "hot-reload" => overrides.hot_reload = Some(parse_bool_flag("hot-reload", &value)?),
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "frames" => {
                    overrides.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "dt" => {
                    let dt = value.parse::<f64>().with_context(|| format!("Invalid dt '{value}'"))?;
                    if !(dt.is_finite() && dt > 0.0) {
                        bail!("Invalid dt '{value}'. Use a positive number of seconds.");
                    }
                    overrides.dt = Some(dt);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --script, --jit, --hot-reload, --width, --height, --frames, --dt."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn frames(&self) -> u32 {
        self.frames.unwrap_or(DEFAULT_FRAMES)
    }

    pub fn dt(&self) -> f64 {
        self.dt.unwrap_or(DEFAULT_DT)
    }

    pub fn config_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            main_script: self.script.clone(),
            enable_jit: self.jit,
            hot_reload: self.hot_reload,
            width: self.width,
            height: self.height,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_and_viewport_flags() {
        let args = ["arcade", "--script", "games/pong.lua", "--width", "640", "--height", "480", "--jit", "off"];
        let cli = CliOverrides::parse(args).expect("parse overrides");
        let overrides = cli.config_overrides();
        assert_eq!(overrides.main_script, Some(PathBuf::from("games/pong.lua")));
        assert_eq!((overrides.width, overrides.height), (Some(640), Some(480)));
        assert_eq!(overrides.enable_jit, Some(false));
        assert_eq!(overrides.hot_reload, None);
    }

    #[test]
    fn run_length_defaults_apply() {
        let cli = CliOverrides::parse(["arcade"]).expect("parse");
        assert_eq!(cli.frames(), DEFAULT_FRAMES);
        assert_eq!(cli.dt(), DEFAULT_DT);
        assert_eq!(cli.config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.config_overrides().is_empty());

        let cli = CliOverrides::parse(["arcade", "--frames", "3", "--dt", "0.5", "--frames", "4"]).expect("parse");
        assert_eq!((cli.frames(), cli.dt()), (4, 0.5));
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["arcade", "--width"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        let err = CliOverrides::parse(["arcade", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        let err = CliOverrides::parse(["arcade", "--dt", "-1"]).unwrap_err();
        assert!(err.to_string().contains("Invalid dt"));
        let err = CliOverrides::parse(["arcade", "--hot-reload", "maybe"]).unwrap_err();
        assert!(err.to_string().contains("Invalid hot-reload value"));
    }
}
