//! Build metadata.
//!
//! Constructed once at process start and shared by reference; nothing in
//! the process mutates it.

/// Version, commit and build date of this binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub date: String,
}

impl BuildInfo {
    /// Metadata embedded at compile time. `BUILD_COMMIT` and `BUILD_DATE`
    /// are read from the build environment when set.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("BUILD_COMMIT").unwrap_or("undefined").to_string(),
            date: option_env!("BUILD_DATE").unwrap_or("undefined").to_string(),
        }
    }

    /// Startup banner printed before serving.
    pub fn banner(&self) -> String {
        format!(
            "serve-orchestrator {} ({}, built {})\n\
             Admin and public interfaces are starting. Terminate with Ctrl+C.",
            self.version, self.commit, self.date
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_mentions_version() {
        let info = BuildInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.banner().contains(&info.version));
    }
}
