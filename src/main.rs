use arcade_runtime::cli::CliOverrides;
use arcade_runtime::config::RuntimeConfig;
use arcade_runtime::runtime::run_headless;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let mut config = RuntimeConfig::load_or_default(cli.config_path());
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        log::info!("[cli] overriding {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }
    match run_headless(config, cli.frames(), cli.dt()) {
        Ok((summary, _renderer)) => log::info!(
            "[runtime] {} frames, {} draw commands, {} think failures, {} render failures",
            summary.frames,
            summary.draw_commands,
            summary.think_failures,
            summary.render_failures
        ),
        Err(err) => {
            eprintln!("Application error: {err:?}");
            std::process::exit(1);
        }
    }
}
