//! Names the binary distribution for the current operating system and
//! architecture.

use std::fmt;

use crate::config::PostgresVersion;

/// Coordinates of one binary distribution in the artifact repository.
///
/// # Examples
/// ```
/// use pg_embedded_lifecycle::{BinaryArtifact, PostgresVersion};
///
/// let artifact = BinaryArtifact::new("linux", "amd64", PostgresVersion::V12);
/// assert_eq!(
///     artifact.file_stem(),
///     "embedded-postgres-binaries-linux-amd64-12.1.0"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    os: String,
    arch: String,
    version: PostgresVersion,
}

impl BinaryArtifact {
    /// Creates coordinates from explicit platform names.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>, version: PostgresVersion) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            version,
        }
    }

    /// Creates coordinates for the platform this process runs on.
    #[must_use]
    pub fn for_current_platform(version: PostgresVersion) -> Self {
        Self::new(
            repository_os(std::env::consts::OS),
            repository_arch(std::env::consts::ARCH),
            version,
        )
    }

    /// Returns the repository name of the operating system.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Returns the repository name of the architecture.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Returns the distribution version.
    #[must_use]
    pub const fn version(&self) -> &PostgresVersion {
        &self.version
    }

    /// Maven artifact id, e.g. `embedded-postgres-binaries-linux-amd64`.
    #[must_use]
    pub fn artifact_id(&self) -> String {
        format!("embedded-postgres-binaries-{}-{}", self.os, self.arch)
    }

    /// Artifact id suffixed with the version; used for cache and jar names.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.artifact_id(), self.version)
    }
}

impl fmt::Display for BinaryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

fn repository_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn repository_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64v8",
        "arm" => "arm32v7",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("linux", "linux")]
    #[case("macos", "darwin")]
    #[case("windows", "windows")]
    fn maps_rust_os_names(#[case] rust: &str, #[case] repository: &str) {
        assert_eq!(repository_os(rust), repository);
    }

    #[rstest]
    #[case("x86_64", "amd64")]
    #[case("aarch64", "arm64v8")]
    #[case("arm", "arm32v7")]
    #[case("x86", "i386")]
    fn maps_rust_arch_names(#[case] rust: &str, #[case] repository: &str) {
        assert_eq!(repository_arch(rust), repository);
    }

    #[test]
    fn artifact_id_omits_version() {
        let artifact = BinaryArtifact::new("darwin", "amd64", PostgresVersion::V11);
        assert_eq!(artifact.artifact_id(), "embedded-postgres-binaries-darwin-amd64");
        assert_eq!(
            artifact.to_string(),
            "embedded-postgres-binaries-darwin-amd64-11.6.0"
        );
    }
}
