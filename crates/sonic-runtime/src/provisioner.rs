//! Instance provisioning.
//!
//! Drives one resolved instance from its declaration to a directory that the
//! plugin host can activate:
//!
//! ```text
//! Resolved ─┬─▶ Skipped (existing directory kept, local config merged)
//!           └─▶ Fetched ─▶ LocallyMerged ─▶ Environed ─▶ DependenciesInstalled
//!                                                   ─▶ ArtifactsWritten ─▶ Ready
//! ```
//!
//! Only a missing dependency manifest and an unsupported host platform stop
//! the whole run. Environment and installer failures are logged and
//! provisioning carries on.

use std::path::{Path, PathBuf};

use sonic_core::{
    ENVIRONMENT_DIR, EnvironmentStatus, ExtensionGlobalConfig, FetchRequest, HostContext,
    HostError, HostPlatform, ProvisioningState, ReplacePolicy,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::artifacts;
use crate::error::{ProvisionError, ProvisionResult};
use crate::merger;

/// Outcome of provisioning one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedInstance {
    /// The configuration after local merge.
    pub config: ExtensionGlobalConfig,
    /// Either [`ProvisioningState::Ready`] or [`ProvisioningState::Skipped`].
    pub state: ProvisioningState,
}

/// Provisions instances using the collaborators of a [`HostContext`].
pub struct Provisioner {
    ctx: HostContext,
    platform: HostPlatform,
    language_version: OnceCell<String>,
}

impl Provisioner {
    /// Creates a provisioner for the current host platform.
    ///
    /// Fails with [`ProvisionError::UnsupportedPlatform`] before any instance
    /// is touched when the platform has no known environment layout.
    pub fn new(ctx: HostContext) -> ProvisionResult<Self> {
        let platform = HostPlatform::current().map_err(|e| match e {
            HostError::UnsupportedPlatform { os } => ProvisionError::UnsupportedPlatform { os },
            other => ProvisionError::Host(other),
        })?;
        Ok(Self::with_platform(ctx, platform))
    }

    /// Creates a provisioner for an explicit platform.
    pub fn with_platform(ctx: HostContext, platform: HostPlatform) -> Self {
        Self {
            ctx,
            platform,
            language_version: OnceCell::new(),
        }
    }

    /// Returns the platform environments are laid out for.
    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    /// Provisions one instance.
    #[instrument(skip_all, fields(instance = %instance.id, category = %instance.category))]
    pub async fn provision(
        &self,
        instance: ExtensionGlobalConfig,
        policy: ReplacePolicy,
    ) -> ProvisionResult<ProvisionedInstance> {
        let mut state = ProvisioningState::Resolved;

        if instance.path.exists() && !self.prepare_existing(&instance, policy).await? {
            info!(path = %instance.path.display(), "Skipping directory");
            let config = merger::merge_local(&instance);
            advance(&mut state, ProvisioningState::Skipped);
            return Ok(ProvisionedInstance { config, state });
        }

        self.materialize(&instance).await?;
        advance(&mut state, ProvisioningState::Fetched);

        let config = merger::merge_local(&instance);
        advance(&mut state, ProvisioningState::LocallyMerged);

        let interpreter = self.ensure_environment(&config).await?;
        advance(&mut state, ProvisioningState::Environed);

        self.install_dependencies(&config, &interpreter).await?;
        advance(&mut state, ProvisioningState::DependenciesInstalled);

        let version = self.language_version().await.map_err(|e| {
            ProvisionError::Artifact {
                path: config.path.join(sonic_core::BOOTSTRAP_FILE),
                reason: format!("cannot determine interpreter version: {e}"),
            }
        })?;
        artifacts::write_artifacts(&config, self.platform, version).await?;
        advance(&mut state, ProvisioningState::ArtifactsWritten);

        advance(&mut state, ProvisioningState::Ready);
        info!(path = %config.path.display(), "Extension instance ready");
        Ok(ProvisionedInstance { config, state })
    }

    /// Applies the replace policy to an existing directory.
    ///
    /// Returns `false` when the directory must be kept as is.
    async fn prepare_existing(
        &self,
        instance: &ExtensionGlobalConfig,
        policy: ReplacePolicy,
    ) -> ProvisionResult<bool> {
        match policy {
            ReplacePolicy::NeverReplace => Ok(false),
            ReplacePolicy::AlwaysReplace => {
                if instance.copy_folder {
                    remove_dir(&instance.path).await?;
                }
                Ok(true)
            }
            ReplacePolicy::AskInteractively => {
                if instance.path == Path::new(&instance.source) {
                    return Ok(true);
                }
                let replace = self
                    .ctx
                    .prompt()?
                    .confirm_replace(&instance.path)
                    .await
                    .map_err(|source| ProvisionError::Prompt {
                        path: instance.path.clone(),
                        source,
                    })?;
                if replace {
                    remove_dir(&instance.path).await?;
                }
                Ok(replace)
            }
        }
    }

    /// Clones, copies or uses the source in place.
    async fn materialize(&self, instance: &ExtensionGlobalConfig) -> ProvisionResult<()> {
        let source = Path::new(&instance.source);

        if !source.exists() {
            if let Some(parent) = instance.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ProvisionError::Fetch {
                        instance: instance.id.clone(),
                        source: e.into(),
                    })?;
            }
            let request = FetchRequest::new(&instance.source, &instance.path)
                .with_branch(instance.branch.clone())
                .with_token(instance.token.clone());
            debug!(request = ?request, "Cloning repository");
            self.ctx
                .fetcher()?
                .clone_repository(&request)
                .await
                .map_err(|source| ProvisionError::Fetch {
                    instance: instance.id.clone(),
                    source,
                })?;
            info!("Git repository cloned");
        } else if instance.copy_folder {
            self.ctx
                .fetcher()?
                .copy_tree(source, &instance.path)
                .await
                .map_err(|source| ProvisionError::Copy {
                    instance: instance.id.clone(),
                    source,
                })?;
            info!(source = %source.display(), "Extension copied");
        } else {
            debug!("Using extension in place");
        }

        Ok(())
    }

    /// Ensures the isolated environment and returns its interpreter.
    async fn ensure_environment(&self, config: &ExtensionGlobalConfig) -> ProvisionResult<PathBuf> {
        let venv = config.path.join(ENVIRONMENT_DIR);
        match self.ctx.environment()?.ensure(&venv).await {
            Ok(EnvironmentStatus::Created) => info!("Virtual environment created"),
            Ok(EnvironmentStatus::AlreadyPresent) => warn!("Virtual environment already exists"),
            Err(e) => error!(error = %e, "Error creating virtual environment"),
        }
        Ok(self.platform.interpreter(&venv))
    }

    /// Installs the dependency manifest.
    async fn install_dependencies(
        &self,
        config: &ExtensionGlobalConfig,
        interpreter: &Path,
    ) -> ProvisionResult<()> {
        let manifest = config.requirements_path();
        if !manifest.is_file() {
            error!(path = %manifest.display(), "Requirements file not found");
            return Err(ProvisionError::ManifestMissing {
                instance: config.id.clone(),
                path: manifest,
            });
        }

        match self.ctx.installer()?.install(interpreter, &manifest).await {
            Ok(()) => info!("Requirements installed"),
            Err(e) => error!(
                error = %e,
                interpreter = %interpreter.display(),
                "Error installing requirements"
            ),
        }
        Ok(())
    }

    async fn language_version(&self) -> Result<&str, HostError> {
        let environment = self.ctx.environment()?;
        self.language_version
            .get_or_try_init(|| environment.language_version())
            .await
            .map(String::as_str)
    }
}

fn advance(state: &mut ProvisioningState, next: ProvisioningState) {
    debug!(from = %state, to = %next, "Provisioning state");
    *state = next;
}

async fn remove_dir(path: &Path) -> ProvisionResult<()> {
    info!(path = %path.display(), "Removing existing directory");
    tokio::fs::remove_dir_all(path)
        .await
        .map_err(|e| ProvisionError::Remove {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
