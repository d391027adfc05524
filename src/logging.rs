use env_logger::{Builder, Env};

/// `GESTURECTL_LOG` takes precedence over `RUST_LOG`; both default to `info`.
pub fn init() {
    let env = Env::default()
        .filter_or("GESTURECTL_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .write_style("GESTURECTL_LOG_STYLE");
    Builder::from_env(env).format_timestamp_millis().init();
}
