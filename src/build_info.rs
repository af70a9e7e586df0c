/// Build-time git commit SHA stamped by build.rs when available.
pub fn git_sha() -> Option<&'static str> {
    option_env!("CHECKROOM_BUILD_GIT_SHA")
}

/// Version string for `--version`, with the commit SHA when known.
pub fn long_version() -> String {
    match git_sha() {
        Some(sha) => format!("{} ({sha})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}
