use crate::download::download_to;
use crate::process::Invocation;
use crate::version::VersionSpec;

use super::{remove_artifact, EnvDelta, InstallContext, InstallError, Installer};

const PACKAGE: &str = "plasticscm-cloud";
const SOURCES_LIST: &str = "/etc/apt/sources.list.d/plasticscm-stable.list";

/// Installs from the vendor's apt repository. Re-running overwrites the same
/// sources entry and re-imports the same key, so it is safe to repeat.
pub struct LinuxInstaller<'a> {
    ctx: InstallContext<'a>,
}

impl<'a> LinuxInstaller<'a> {
    pub fn new(ctx: InstallContext<'a>) -> Self {
        Self { ctx }
    }

    fn apt_get<'s>(args: impl IntoIterator<Item = &'s str>) -> Invocation {
        Invocation::new("sudo").arg("apt-get").args(args)
    }
}

/// `plasticscm-cloud`, or `plasticscm-cloud=<version>` when pinned.
fn package_arg(version: &VersionSpec) -> String {
    match version {
        VersionSpec::Latest => PACKAGE.to_string(),
        VersionSpec::Exact(v) => format!("{PACKAGE}={v}"),
    }
}

impl Installer for LinuxInstaller<'_> {
    fn install(&self, version: &VersionSpec) -> Result<EnvDelta, InstallError> {
        let repo = self.ctx.endpoints.apt_repo.trim_end_matches('/');

        self.ctx.run_checked(Self::apt_get(["update"]))?;
        self.ctx
            .run_checked(Self::apt_get(["install", "-y", "apt-transport-https"]))?;

        let entry = format!("deb {repo}/ ./");
        self.ctx.run_checked(
            Invocation::new("sudo")
                .args(["sh", "-c"])
                .arg(format!("echo \"{entry}\" > {SOURCES_LIST}")),
        )?;

        let key = download_to(
            self.ctx.http,
            &format!("{repo}/Release.key"),
            &self.ctx.staging_dir.join("Release.key"),
        )?;
        let imported = self.ctx.run_checked(
            Invocation::new("sudo")
                .args(["apt-key", "add"])
                .arg(key.to_string_lossy()),
        );
        let cleanup = remove_artifact(&key);
        imported?;
        cleanup?;

        self.ctx.run_checked(Self::apt_get(["update"]))?;
        let package = package_arg(version);
        self.ctx
            .run_checked(Self::apt_get(["install", "-y", package.as_str()]))?;

        Ok(EnvDelta::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::process::testing::{Reply, ScriptedRunner};
    use httpmock::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn package_arg_pins_only_exact_versions() {
        assert_eq!(package_arg(&VersionSpec::Latest), "plasticscm-cloud");
        assert_eq!(
            package_arg(&VersionSpec::parse("11.0.16.8101").unwrap()),
            "plasticscm-cloud=11.0.16.8101"
        );
    }

    #[test]
    fn registers_repo_then_installs_pinned_package() {
        let server = MockServer::start();
        let key = server.mock(|when, then| {
            when.method(GET).path("/debian/Release.key");
            then.status(200).body("-----BEGIN PGP PUBLIC KEY BLOCK-----");
        });
        let meta = server.mock(|when, then| {
            when.method(GET).path("/download");
            then.status(200).body("{}");
        });

        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let http = reqwest::blocking::Client::new();
        let endpoints = Endpoints {
            apt_repo: server.url("/debian"),
            version_url: server.url("/download"),
            ..Endpoints::default()
        };
        LinuxInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::parse("11.0.16.8101").unwrap())
        .unwrap();

        key.assert_hits(1);
        meta.assert_hits(0);
        let repo = server.url("/debian");
        assert_eq!(
            runner.calls(),
            vec![
                "sudo apt-get update".to_string(),
                "sudo apt-get install -y apt-transport-https".to_string(),
                format!("sudo sh -c echo \"deb {repo}/ ./\" > {SOURCES_LIST}"),
                format!(
                    "sudo apt-key add {}",
                    dir.path().join("Release.key").display()
                ),
                "sudo apt-get update".to_string(),
                "sudo apt-get install -y plasticscm-cloud=11.0.16.8101".to_string(),
            ]
        );
        assert!(!dir.path().join("Release.key").exists());
    }

    #[test]
    fn rejected_key_is_still_removed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/debian/Release.key");
            then.status(200).body("not a key");
        });

        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new().on("sudo apt-key add", [Reply::Exit(2, "")]);
        let http = reqwest::blocking::Client::new();
        let endpoints = Endpoints {
            apt_repo: server.url("/debian"),
            ..Endpoints::default()
        };
        let err = LinuxInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::Latest)
        .unwrap_err();

        assert!(matches!(err, InstallError::Command { code: Some(2), .. }));
        assert!(!dir.path().join("Release.key").exists());
        assert_eq!(runner.count("sudo apt-get install -y plasticscm-cloud"), 0);
    }

    #[test]
    fn failed_index_refresh_stops_install() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new().on("sudo apt-get update", [Reply::Exit(100, "")]);
        let http = reqwest::blocking::Client::new();
        let endpoints = Endpoints::default();
        let err = LinuxInstaller::new(InstallContext {
            runner: &runner,
            http: &http,
            endpoints: &endpoints,
            staging_dir: dir.path(),
        })
        .install(&VersionSpec::Latest)
        .unwrap_err();

        assert!(matches!(err, InstallError::Command { code: Some(100), .. }));
        assert_eq!(runner.calls().len(), 1);
    }
}
