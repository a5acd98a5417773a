use std::io::Write;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::wire::FortuneMethod;

/// Filter directives for a `-v` count. `--debug` implies at least `-v`.
fn filter_for(verbose: u8, debug: bool) -> &'static str {
    match verbose.max(u8::from(debug)) {
        0 => "warn",
        1 => "warn,oracle_nexus=debug",
        2 => "info,oracle_nexus=trace",
        _ => "trace",
    }
}

/// Logs go to stderr so the streamed report on stdout stays clean.
/// `RUST_LOG` wins over the flags.
pub fn init(verbose: u8, debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(verbose, debug)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

pub fn print_method_debug(method: &FortuneMethod) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(method)?;
    eprintln!("\n===== DEBUG [method]: SELECTED METHOD JSON =====\n{}\n", json);
    std::io::stderr().flush().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_levels() {
        assert_eq!(filter_for(0, false), "warn");
        assert_eq!(filter_for(0, true), "warn,oracle_nexus=debug");
        assert_eq!(filter_for(2, true), "info,oracle_nexus=trace");
        assert_eq!(filter_for(9, false), "trace");
    }
}
