//! Installs a global tracing subscriber for test binaries, selected by the
//! `LIGHTBRIDGE_TRACE` environment variable:
//!
//! - `1`, `true` or `on`: full format on stdout;
//! - `compact` or `pretty`: the matching fmt format on stdout;
//! - `log-file`: daily rolling file under `LIGHTBRIDGE_TRACE_PATH`
//!   (defaults to `<crate>/logs`).
//!
//! Filtering follows `RUST_LOG`. A test crate opts in with
//! [`enable_tracing!`].

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]

use ctor::ctor;
use std::env::var;
use tracing_subscriber::{
    EnvFilter,
    fmt::format,
};

const TRACE_VAR: &str = "LIGHTBRIDGE_TRACE";
const TRACE_PATH_VAR: &str = "LIGHTBRIDGE_TRACE_PATH";

#[ctor]
pub static TRACE: () = {
    if let Ok(mode) = var(TRACE_VAR) {
        init(&mode.to_lowercase());
    }
};

fn init(mode: &str) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    let _ = match mode {
        "1" | "true" | "on" => builder.try_init(),
        "compact" => builder.event_format(format().compact()).try_init(),
        "pretty" => builder.event_format(format().pretty()).try_init(),
        "log-file" => {
            let path = var(TRACE_PATH_VAR).unwrap_or_else(|_| {
                concat!(env!("CARGO_MANIFEST_DIR"), "/logs").to_string()
            });
            builder
                .event_format(format().compact())
                // ANSI escapes garble the file output
                .with_ansi(false)
                .with_writer(tracing_appender::rolling::daily(path, "lightbridge.log"))
                .try_init()
        }
        _ => return,
    };
}

/// Pulls the [`TRACE`] initializer into the calling test binary.
#[macro_export]
macro_rules! enable_tracing {
    () => {
        static _TRACE: &$crate::TRACE<()> = &$crate::TRACE;
    };
}

#[cfg(test)]
mod tests {
    use tracing::*;

    #[test]
    fn works() {
        error!("visible when LIGHTBRIDGE_TRACE=1 is set");
        info!("visible when LIGHTBRIDGE_TRACE=1 and RUST_LOG=info are set");
    }
}
