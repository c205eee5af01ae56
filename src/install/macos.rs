use std::path::{Path, PathBuf};

use crate::download::{download_to, extract_zip};
use crate::process::Invocation;
use crate::version::VersionSpec;

use super::{
    installer_url, remove_artifact, remove_staged_dir, EnvDelta, InstallContext, InstallError,
    Installer,
};

const INSTALL_TARGET: &str = "/Applications";

pub struct MacInstaller<'a> {
    ctx: InstallContext<'a>,
}

impl<'a> MacInstaller<'a> {
    pub fn new(ctx: InstallContext<'a>) -> Self {
        Self { ctx }
    }
}

impl Installer for MacInstaller<'_> {
    fn install(&self, version: &VersionSpec) -> Result<EnvDelta, InstallError> {
        let version = version.to_concrete(&self.ctx.resolver())?;
        let url = installer_url(&self.ctx.endpoints.download_base, &version, "macosx");
        let artifact = format!("unity-vcs-{version}-mac.pkg.zip");
        tracing::info!("Downloading {artifact} from {url}...");

        let archive = download_to(self.ctx.http, &url, &self.ctx.staging_dir.join(&artifact))?;
        let expanded = self.ctx.staging_dir.join(format!("unity-vcs-{version}-mac"));
        let result = extract_zip(&archive, &expanded)
            .map_err(InstallError::from)
            .and_then(|dir| find_single_pkg(&dir))
            .and_then(|pkg| {
                self.ctx.run_checked(
                    Invocation::new("sudo")
                        .args(["installer", "-pkg"])
                        .arg(pkg.to_string_lossy())
                        .args(["-target", INSTALL_TARGET]),
                )
            });
        // Staged files go either way; an install failure outranks a cleanup failure.
        let cleanup = remove_artifact(&archive).and(remove_staged_dir(&expanded));
        result?;
        cleanup?;

        // The package installer links `cm` into a directory already on PATH.
        Ok(EnvDelta::default())
    }
}

/// The one top-level `*.pkg` entry (file or bundle directory) in `dir`.
fn find_single_pkg(dir: &Path) -> Result<PathBuf, InstallError> {
    let entries = std::fs::read_dir(dir).map_err(|_| InstallError::NoPackage(dir.to_path_buf()))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pkg"))
        .collect();
    found.sort();

    match found.len() {
        0 => Err(InstallError::NoPackage(dir.to_path_buf())),
        1 => Ok(found.remove(0)),
        _ => Err(InstallError::AmbiguousPackage {
            dir: dir.to_path_buf(),
            found,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::download::testing::make_zip;
    use crate::process::testing::{Reply, ScriptedRunner};
    use httpmock::prelude::*;
    use tempfile::tempdir;

    fn serve_zip<'a>(server: &'a MockServer, version: &str, zip: Vec<u8>) -> httpmock::Mock<'a> {
        let path = format!("/downloadinstaller/{version}/plasticscm/macosx/cloudedition");
        server.mock(move |when, then| {
            when.method(GET).path(path);
            then.status(200).body(zip);
        })
    }

    fn endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            download_base: server.url("/downloadinstaller"),
            version_url: server.url("/download"),
            ..Endpoints::default()
        }
    }

    #[test]
    fn installs_the_single_package() {
        let server = MockServer::start();
        let dl = serve_zip(
            &server,
            "11.0.16.8101",
            make_zip(&[("plasticscm-cloud-11.0.16.8101.pkg", b"xar!".as_slice())]),
        );

        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let http = reqwest::blocking::Client::new();
        let endpoints = endpoints(&server);
        let delta = MacInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::parse("11.0.16.8101").unwrap())
        .unwrap();

        dl.assert_hits(1);
        assert!(delta.is_empty());
        let pkg = dir
            .path()
            .join("unity-vcs-11.0.16.8101-mac")
            .join("plasticscm-cloud-11.0.16.8101.pkg");
        assert_eq!(
            runner.calls(),
            vec![format!(
                "sudo installer -pkg {} -target /Applications",
                pkg.display()
            )]
        );
        assert!(!dir.path().join("unity-vcs-11.0.16.8101-mac.pkg.zip").exists());
        assert!(!dir.path().join("unity-vcs-11.0.16.8101-mac").exists());
    }

    #[test]
    fn failed_installer_still_removes_staged_files() {
        let server = MockServer::start();
        serve_zip(
            &server,
            "11.0.16.2",
            make_zip(&[("plasticscm-cloud.pkg", b"xar!".as_slice())]),
        );

        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new().on("sudo installer", [Reply::Exit(1, "")]);
        let http = reqwest::blocking::Client::new();
        let endpoints = endpoints(&server);
        let err = MacInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::parse("11.0.16.2").unwrap())
        .unwrap_err();

        assert!(matches!(err, InstallError::Command { code: Some(1), .. }));
        assert!(!dir.path().join("unity-vcs-11.0.16.2-mac.pkg.zip").exists());
        assert!(!dir.path().join("unity-vcs-11.0.16.2-mac").exists());
    }

    #[test]
    fn archive_without_package_fails_before_installer() {
        let server = MockServer::start();
        serve_zip(&server, "11.0.16.1", make_zip(&[("README.txt", b"nothing".as_slice())]));

        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let http = reqwest::blocking::Client::new();
        let endpoints = endpoints(&server);
        let err = MacInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::parse("11.0.16.1").unwrap())
        .unwrap_err();

        assert!(matches!(err, InstallError::NoPackage(_)));
        assert!(err.to_string().contains("failed to find the installer package"));
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join("unity-vcs-11.0.16.1-mac.pkg.zip").exists());
        assert!(!dir.path().join("unity-vcs-11.0.16.1-mac").exists());
    }

    #[test]
    fn find_single_pkg_refuses_to_guess() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.pkg"), b"").unwrap();
        std::fs::write(dir.path().join("b.pkg"), b"").unwrap();
        let err = find_single_pkg(dir.path()).unwrap_err();
        match err {
            InstallError::AmbiguousPackage { found, .. } => assert_eq!(found.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn find_single_pkg_accepts_bundle_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("client.pkg").join("Contents")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let pkg = find_single_pkg(dir.path()).unwrap();
        assert_eq!(pkg, dir.path().join("client.pkg"));
    }
}
