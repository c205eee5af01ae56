//! Per-platform installation of the `cm` client.
//!
//! Each backend turns a [`VersionSpec`] into an installed client and reports
//! the search-path additions it needs as an [`EnvDelta`]; applying the delta
//! is left to the caller.
mod linux;
mod macos;
mod windows;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Endpoints;
use crate::download::DownloadError;
use crate::process::{CommandRunner, Invocation, RunError};
use crate::version::{ConcreteVersion, VersionError, VersionResolver, VersionSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

#[derive(Debug, Error)]
#[error("unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub String);

impl Platform {
    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Result<Self, UnsupportedPlatform> {
        match os {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        })
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("`{command}` failed with exit code {code:?}")]
    Command { command: String, code: Option<i32> },
    #[error("failed to find the installer package in {}", .0.display())]
    NoPackage(PathBuf),
    #[error("found {} installer packages in {}, expected exactly one", .found.len(), .dir.display())]
    AmbiguousPackage { dir: PathBuf, found: Vec<PathBuf> },
    #[error("failed to clean up {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Process-environment changes an installer needs applied for the rest of the job.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvDelta {
    pub path_entries: Vec<PathBuf>,
}

impl EnvDelta {
    pub fn add_path(dir: impl Into<PathBuf>) -> Self {
        Self {
            path_entries: vec![dir.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path_entries.is_empty()
    }
}

/// Everything a backend may touch while installing.
pub struct InstallContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub http: &'a reqwest::blocking::Client,
    pub endpoints: &'a Endpoints,
    pub staging_dir: &'a Path,
}

impl InstallContext<'_> {
    pub fn resolver(&self) -> VersionResolver<'_> {
        VersionResolver::new(self.http, &self.endpoints.version_url)
    }

    /// Run `invocation`, treating a non-zero exit as an installation failure.
    pub fn run_checked(&self, invocation: Invocation) -> Result<(), InstallError> {
        let out = self.runner.run(&invocation)?;
        if out.success() {
            Ok(())
        } else {
            Err(InstallError::Command {
                command: invocation.to_string(),
                code: out.code,
            })
        }
    }
}

pub trait Installer {
    fn install(&self, version: &VersionSpec) -> Result<EnvDelta, InstallError>;
}

/// The backend for `platform`, borrowing everything from `ctx`.
pub fn backend_for<'a>(platform: Platform, ctx: InstallContext<'a>) -> Box<dyn Installer + 'a> {
    match platform {
        Platform::Windows => Box::new(windows::WindowsInstaller::new(ctx)),
        Platform::MacOs => Box::new(macos::MacInstaller::new(ctx)),
        Platform::Linux => Box::new(linux::LinuxInstaller::new(ctx)),
    }
}

/// `{base}/{version}/plasticscm/{os}/cloudedition`; only concrete versions fit.
fn installer_url(base: &str, version: &ConcreteVersion, os: &str) -> String {
    format!(
        "{}/{}/plasticscm/{}/cloudedition",
        base.trim_end_matches('/'),
        version,
        os
    )
}

fn remove_artifact(path: &Path) -> Result<(), InstallError> {
    std::fs::remove_file(path).map_err(|source| InstallError::Cleanup {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove an expanded staging directory; one that was never created is fine.
fn remove_staged_dir(path: &Path) -> Result<(), InstallError> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(InstallError::Cleanup {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_from_os_names() {
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        let err = Platform::from_os("freebsd").unwrap_err();
        assert_eq!(err.to_string(), "unsupported platform: freebsd");
    }

    #[test]
    fn installer_url_shapes() {
        let v = ConcreteVersion::parse("11.0.16.8101").unwrap();
        assert_eq!(
            installer_url("https://dl.example/", &v, "windows"),
            "https://dl.example/11.0.16.8101/plasticscm/windows/cloudedition"
        );
        assert_eq!(
            installer_url("https://dl.example", &v, "macosx"),
            "https://dl.example/11.0.16.8101/plasticscm/macosx/cloudedition"
        );
    }

    #[test]
    fn remove_staged_dir_removes_tree_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("expanded");
        std::fs::create_dir_all(staged.join("client.pkg")).unwrap();
        std::fs::write(staged.join("client.pkg").join("payload"), b"x").unwrap();

        remove_staged_dir(&staged).unwrap();
        assert!(!staged.exists());
        remove_staged_dir(&staged).unwrap();
    }
}
