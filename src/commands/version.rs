//! Command: print version information.

/// Version string baked in at build time.
#[must_use]
pub fn current() -> &'static str {
    option_env!("UPDATER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the updater version to stdout.
pub fn run() {
    println!("updater {}", current());
}
