//! Supervision of provisioned extension processes.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sonic_core::{
    ControlMessage, ExtensionGlobalConfig, HostContext, InstanceIdentity, PluginProcess,
    PluginStatus, StatusSource,
};
use tracing::{debug, error, info, warn};

use crate::error::SupervisorError;

/// A discovered plugin process and the configuration it was matched to.
#[derive(Clone)]
pub struct PluginHandle {
    process: Arc<dyn PluginProcess>,
    config: Option<ExtensionGlobalConfig>,
    identity: Option<InstanceIdentity>,
}

impl PluginHandle {
    fn new(process: Arc<dyn PluginProcess>, config: Option<ExtensionGlobalConfig>) -> Self {
        let identity = config.as_ref().map(|c| InstanceIdentity {
            id: c.id.clone(),
            category: c.category.clone(),
        });
        Self {
            process,
            config,
            identity,
        }
    }

    pub fn path(&self) -> &Path {
        self.process.path()
    }

    pub fn is_activated(&self) -> bool {
        self.process.is_activated()
    }

    pub fn config(&self) -> Option<&ExtensionGlobalConfig> {
        self.config.as_ref()
    }

    pub fn identity(&self) -> Option<&InstanceIdentity> {
        self.identity.as_ref()
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("path", &self.path())
            .field("identity", &self.identity)
            .field("activated", &self.is_activated())
            .finish()
    }
}

/// Owns the plugin handles of one run.
pub struct PluginSupervisor {
    ctx: HostContext,
    extensions_root: PathBuf,
    configs: Vec<ExtensionGlobalConfig>,
    handles: RwLock<Vec<PluginHandle>>,
}

impl PluginSupervisor {
    /// Creates a supervisor over the configurations of all provisioned
    /// instances.
    pub fn new(
        ctx: HostContext,
        extensions_root: impl Into<PathBuf>,
        configs: Vec<ExtensionGlobalConfig>,
    ) -> Self {
        Self {
            ctx,
            extensions_root: extensions_root.into(),
            configs,
            handles: RwLock::new(Vec::new()),
        }
    }

    /// Returns the supervised configurations.
    pub fn configs(&self) -> &[ExtensionGlobalConfig] {
        &self.configs
    }

    /// Returns a snapshot of the current handles.
    pub fn handles(&self) -> Vec<PluginHandle> {
        self.handles.read().clone()
    }

    /// Asks the plugin host for processes in every instance directory.
    ///
    /// Returns the number of newly added handles. Paths that already have a
    /// handle are not added again.
    pub async fn discover(&self) -> Result<usize, SupervisorError> {
        let dirs: Vec<PathBuf> = self.configs.iter().map(|c| c.path.clone()).collect();
        let found = self
            .ctx
            .plugin_host()
            .map_err(SupervisorError::Discovery)?
            .collect(&dirs)
            .await
            .map_err(SupervisorError::Discovery)?;

        let mut handles = self.handles.write();
        let mut added = 0;
        for process in found {
            if handles.iter().any(|h| h.path() == process.path()) {
                debug!(path = %process.path().display(), "Plugin already known");
                continue;
            }
            let config = self.match_config(process.path()).cloned();
            handles.push(PluginHandle::new(process, config));
            added += 1;
        }

        info!(discovered = added, total = handles.len(), "Plugins discovered");
        Ok(added)
    }

    /// Finds the configuration a plugin directory belongs to.
    ///
    /// In-place instances match on their normalized source path. Managed
    /// instances match when the path folds back to
    /// `<extensions_root>/<category>/<id>`.
    pub fn match_config(&self, path: &Path) -> Option<&ExtensionGlobalConfig> {
        let target = normalize(path);
        let root = normalize(&self.extensions_root);

        self.configs.iter().find(|config| {
            if config.runs_in_place() {
                normalize(&config.path) == target
            } else {
                folds_to(&target, &root, &config.category, &config.id)
            }
        })
    }

    /// Activates every handle that is not running and delivers its
    /// configuration.
    ///
    /// Returns the number of handles activated by this call. A failing
    /// handle is logged and left inactive.
    pub async fn activate_all(&self) -> usize {
        let pending: Vec<PluginHandle> = self
            .handles
            .read()
            .iter()
            .filter(|h| !h.is_activated())
            .cloned()
            .collect();

        let mut activated = 0;
        for handle in &pending {
            match activate(handle).await {
                Ok(()) => activated += 1,
                Err(SupervisorError::Unmatched { path }) => {
                    warn!(path = %path.display(), "No configuration for plugin, skipping");
                }
                Err(e) => error!(error = %e, "Failed to activate plugin"),
            }
        }

        info!(activated, "Plugins activated");
        activated
    }

    /// Returns the number of handles whose process is running.
    pub fn count_alive(&self) -> usize {
        self.handles
            .read()
            .iter()
            .filter(|h| h.is_activated())
            .count()
    }

    /// Deactivates every running handle.
    ///
    /// Returns the number of handles stopped by this call.
    pub async fn shutdown_all(&self) -> usize {
        let running: Vec<PluginHandle> = self
            .handles
            .read()
            .iter()
            .filter(|h| h.is_activated())
            .cloned()
            .collect();

        let mut stopped = 0;
        for handle in &running {
            match handle.process.deactivate().await {
                Ok(()) => {
                    stopped += 1;
                    debug!(path = %handle.path().display(), "Plugin deactivated");
                }
                Err(e) => error!(
                    path = %handle.path().display(),
                    error = %e,
                    "Failed to deactivate plugin"
                ),
            }
        }

        if stopped > 0 {
            info!(stopped, "Plugins shut down");
        }
        stopped
    }

    /// Returns a status snapshot of every matched handle.
    pub fn status(&self) -> Vec<PluginStatus> {
        self.handles
            .read()
            .iter()
            .filter_map(|h| {
                let identity = h.identity()?;
                Some(PluginStatus {
                    id: identity.id.clone(),
                    category: identity.category.clone(),
                    path: h.path().to_path_buf(),
                    alive: h.is_activated(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl StatusSource for PluginSupervisor {
    async fn statuses(&self) -> Vec<PluginStatus> {
        self.status()
    }
}

async fn activate(handle: &PluginHandle) -> Result<(), SupervisorError> {
    let (Some(config), Some(identity)) = (handle.config(), handle.identity()) else {
        return Err(SupervisorError::Unmatched {
            path: handle.path().to_path_buf(),
        });
    };
    let plugin_error = |source| SupervisorError::Plugin {
        instance: identity.id.clone(),
        source,
    };

    handle
        .process
        .activate(identity)
        .await
        .map_err(plugin_error)?;

    let message = ControlMessage::loaded(config);
    if let Err(e) = handle.process.send(&message).await {
        if let Err(stop) = handle.process.deactivate().await {
            warn!(instance = %identity.id, error = %stop, "Failed to stop unconfigured plugin");
        }
        return Err(plugin_error(e));
    }

    info!(instance = %identity.id, category = %identity.category, "Plugin activated");
    Ok(())
}

/// Makes `path` absolute and removes `.` and `..` components lexically.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn folds_to(target: &Path, root: &Path, category: &str, id: &str) -> bool {
    let (Some(last), Some(parent)) = (target.file_name(), target.parent()) else {
        return false;
    };
    let (Some(second), Some(prefix)) = (parent.file_name(), parent.parent()) else {
        return false;
    };
    last == id && second == category && prefix.ends_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use sonic_core::{ExtensionDeclaration, PLUGIN_MANIFEST};
    use std::sync::atomic::Ordering;

    fn managed(root: &Path, category: &str, id: &str) -> ExtensionGlobalConfig {
        let declaration = ExtensionDeclaration {
            id: id.to_string(),
            category: category.to_string(),
            source: format!("https://git.example/{id}.git"),
            copy_folder: true,
            branch: None,
            token: None,
            overrides: Default::default(),
        };
        let mut config = ExtensionGlobalConfig::from_declaration(&declaration);
        config.path = root.join(category).join(id);
        std::fs::create_dir_all(&config.path).unwrap();
        std::fs::write(config.path.join(PLUGIN_MANIFEST), "[Core]\n").unwrap();
        config
    }

    fn three(root: &Path) -> Vec<ExtensionGlobalConfig> {
        vec![
            managed(root, "audio", "vad"),
            managed(root, "audio", "asr"),
            managed(root, "report", "stats"),
        ]
    }

    #[tokio::test]
    async fn test_activate_and_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), three(root.path()));

        assert_eq!(supervisor.discover().await.unwrap(), 3);
        assert_eq!(supervisor.activate_all().await, 3);
        assert_eq!(supervisor.count_alive(), 3);

        assert_eq!(supervisor.shutdown_all().await, 3);
        assert_eq!(supervisor.count_alive(), 0);
        assert_eq!(supervisor.shutdown_all().await, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_allows_retry() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let configs = vec![managed(root.path(), "audio", "vad")];
        let vad_path = configs[0].path.clone();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), configs);

        supervisor.discover().await.unwrap();
        let plugin = host.plugin_host.plugin(&vad_path).unwrap();
        plugin.fail_send.store(true, Ordering::SeqCst);

        assert_eq!(supervisor.activate_all().await, 0);
        assert!(!plugin.active.load(Ordering::SeqCst));
        assert_eq!(supervisor.count_alive(), 0);

        plugin.fail_send.store(false, Ordering::SeqCst);
        assert_eq!(supervisor.activate_all().await, 1);
        assert_eq!(supervisor.count_alive(), 1);
        assert_eq!(plugin.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_control_message_delivered() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let configs = three(root.path());
        let vad_path = configs[0].path.clone();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), configs);

        supervisor.discover().await.unwrap();
        supervisor.activate_all().await;

        let plugin = host.plugin_host.plugin(&vad_path).unwrap();
        let messages = plugin.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].greeting, "Loaded vad");
        assert_eq!(messages[0].config.id, "vad");
        assert_eq!(
            plugin.identity.lock().as_ref().map(|i| i.category.as_str()),
            Some("audio")
        );
    }

    #[tokio::test]
    async fn test_discover_does_not_duplicate() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), three(root.path()));

        assert_eq!(supervisor.discover().await.unwrap(), 3);
        assert_eq!(supervisor.discover().await.unwrap(), 0);
        assert_eq!(supervisor.handles().len(), 3);
    }

    #[tokio::test]
    async fn test_activate_all_skips_running() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let configs = three(root.path());
        let vad_path = configs[0].path.clone();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), configs);

        supervisor.discover().await.unwrap();
        assert_eq!(supervisor.activate_all().await, 3);
        assert_eq!(supervisor.activate_all().await, 0);

        let plugin = host.plugin_host.plugin(&vad_path).unwrap();
        assert_eq!(plugin.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_others() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let configs = three(root.path());
        let asr_path = configs[1].path.clone();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), configs);

        supervisor.discover().await.unwrap();
        host.plugin_host
            .plugin(&asr_path)
            .unwrap()
            .fail_activation
            .store(true, Ordering::SeqCst);

        assert_eq!(supervisor.activate_all().await, 2);
        assert_eq!(supervisor.count_alive(), 2);
    }

    #[tokio::test]
    async fn test_exited_plugin_not_alive() {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let configs = three(root.path());
        let stats_path = configs[2].path.clone();
        let supervisor = PluginSupervisor::new(host.context(false), root.path(), configs);

        supervisor.discover().await.unwrap();
        supervisor.activate_all().await;
        host.plugin_host.plugin(&stats_path).unwrap().exit();

        assert_eq!(supervisor.count_alive(), 2);
        let status = supervisor.status();
        let stats = status.iter().find(|s| s.id == "stats").unwrap();
        assert!(!stats.alive);
        assert_eq!(stats.category, "report");
    }

    #[test]
    fn test_match_managed_path() {
        let root = tempfile::tempdir().unwrap();
        let supervisor =
            PluginSupervisor::new(HostContext::new(), root.path(), three(root.path()));

        let dotted = root.path().join("audio").join(".").join("asr");
        assert_eq!(supervisor.match_config(&dotted).unwrap().id, "asr");

        let other_root = tempfile::tempdir().unwrap();
        let foreign = other_root.path().join("audio").join("asr");
        assert!(supervisor.match_config(&foreign).is_none());

        let wrong_category = root.path().join("report").join("vad");
        assert!(supervisor.match_config(&wrong_category).is_none());
    }

    #[test]
    fn test_match_in_place_path() {
        let source = tempfile::tempdir().unwrap();
        let mut config = managed(source.path(), "audio", "vad");
        config.copy_folder = false;
        config.source = source.path().to_string_lossy().into_owned();
        config.path = source.path().to_path_buf();

        let supervisor = PluginSupervisor::new(HostContext::new(), "extensions", vec![config]);
        let roundabout = source.path().join("sub").join("..");
        assert_eq!(supervisor.match_config(&roundabout).unwrap().id, "vad");
        assert!(supervisor.match_config(&source.path().join("sub")).is_none());
    }

    #[tokio::test]
    async fn test_discover_without_plugin_host() {
        let supervisor = PluginSupervisor::new(HostContext::new(), "extensions", Vec::new());
        assert!(matches!(
            supervisor.discover().await,
            Err(SupervisorError::Discovery(_))
        ));
    }
}
