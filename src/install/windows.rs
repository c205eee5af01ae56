use crate::process::Invocation;
use crate::version::VersionSpec;

use super::{installer_url, remove_artifact, EnvDelta, InstallContext, InstallError, Installer};

const INSTALL_DIR: &str = r"C:\Program Files\PlasticSCM5\client";

/// IDE plug-ins the unattended installer would otherwise add.
const DISABLED_COMPONENTS: &str = "ideintegrations,eclipse,mylyn,intellij12";

pub struct WindowsInstaller<'a> {
    ctx: InstallContext<'a>,
}

impl<'a> WindowsInstaller<'a> {
    pub fn new(ctx: InstallContext<'a>) -> Self {
        Self { ctx }
    }
}

impl Installer for WindowsInstaller<'_> {
    fn install(&self, version: &VersionSpec) -> Result<EnvDelta, InstallError> {
        let version = version.to_concrete(&self.ctx.resolver())?;
        let url = installer_url(&self.ctx.endpoints.download_base, &version, "windows");
        let artifact = format!("unity-vcs-{version}-win.exe");
        tracing::info!("Downloading {artifact} from {url}...");

        let installer = crate::download::download_to(
            self.ctx.http,
            &url,
            &self.ctx.staging_dir.join(&artifact),
        )?;

        let result = self.ctx.run_checked(
            Invocation::new("cmd")
                .arg("/c")
                .arg(installer.to_string_lossy())
                .args(["--mode", "unattended", "--unattendedmodeui", "none"])
                .args(["--disable-components", DISABLED_COMPONENTS]),
        );
        // The artifact goes either way; an install failure outranks a cleanup failure.
        let cleanup = remove_artifact(&installer);
        result?;
        cleanup?;

        Ok(EnvDelta::add_path(INSTALL_DIR))
    }
}
