//! Build-time metadata embedded by the build script.
//!
//! Reported by `webshim version` and attached to the default `User-Agent`
//! diagnostics.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("WEBSHIM_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("WEBSHIM_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("WEBSHIM_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// Multi-line build report used by the CLI `version` command.
pub fn build_report() -> String {
    format!(
        "webshim {VERSION}\ncommit:  {GIT_HASH}\nprofile: {BUILD_PROFILE}\nbuilt:   {}",
        build_time()
    )
}

fn build_time() -> String {
    BUILD_TIMESTAMP
        .parse::<i64>()
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| BUILD_TIMESTAMP.to_string())
}
