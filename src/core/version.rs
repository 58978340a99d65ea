//! Build metadata accessors shared across the runtime and the binary.
//! This includes the generated version.rs from the build script,
//! providing a single source of truth.

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Crate version from Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

/// One-line banner used at startup and by `--version`
pub fn long_version() -> String {
    format!("{} ({}, built {})", version(), git_hash(), build_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_version_contains_parts() {
        let banner = long_version();
        assert!(banner.starts_with(version()));
        assert!(banner.contains(git_hash()));
        assert!(banner.contains(build_time()));
    }
}
