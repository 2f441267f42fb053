//! Extension processes running in their own interpreter.
//!
//! A provisioned instance directory is a package: the generated
//! `__init__.py` puts the environment's site-packages on the search path and
//! imports the extension's `main` module. Activation starts the
//! environment's interpreter in the parent directory and imports that
//! package. The control channel is the child's stdin; every message is one
//! JSON document on its own line.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_core::{
    ControlMessage, ENVIRONMENT_DIR, HostError, HostPlatform, HostResult, InstanceIdentity,
    PLUGIN_MANIFEST, PluginHost, PluginProcess,
};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, warn};

use crate::command::command;

/// Imports the instance package named by `argv[1]`, reads the first control
/// message and hands it to the extension's `run` function if it has one.
const LAUNCHER: &str = r#"import importlib, json, sys
sys.path.insert(0, ".")
extension = importlib.import_module(sys.argv[1])
message = json.loads(sys.stdin.readline())
if hasattr(extension, "run"):
    extension.run(message)
"#;

/// Discovers provisioned instances and runs each in a child process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessPluginHost {
    platform: HostPlatform,
}

impl ProcessPluginHost {
    /// Creates a host for the current platform.
    pub fn new() -> HostResult<Self> {
        Ok(Self::with_platform(HostPlatform::current()?))
    }

    pub fn with_platform(platform: HostPlatform) -> Self {
        Self { platform }
    }

    /// Builds the process handle for one instance directory.
    pub fn plugin(&self, dir: &Path) -> ProcessPlugin {
        let interpreter = self.platform.interpreter(&dir.join(ENVIRONMENT_DIR));
        let module = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        ProcessPlugin::with_command(
            dir,
            interpreter,
            vec!["-c".to_string(), LAUNCHER.to_string(), module],
        )
    }
}

#[async_trait]
impl PluginHost for ProcessPluginHost {
    async fn collect(&self, dirs: &[PathBuf]) -> HostResult<Vec<Arc<dyn PluginProcess>>> {
        let mut found: Vec<Arc<dyn PluginProcess>> = Vec::new();
        for dir in dirs {
            if !dir.join(PLUGIN_MANIFEST).is_file() {
                debug!(path = %dir.display(), "No plugin manifest");
                continue;
            }
            found.push(Arc::new(self.plugin(dir)));
        }
        debug!(count = found.len(), "Collected plugins");
        Ok(found)
    }
}

/// One extension child process.
pub struct ProcessPlugin {
    path: PathBuf,
    program: PathBuf,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
}

impl ProcessPlugin {
    /// Creates a handle that runs `program args...` from the parent of
    /// `path` when activated.
    pub fn with_command(
        path: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            program: program.into(),
            args,
            child: Mutex::new(None),
            stdin: tokio::sync::Mutex::new(None),
        }
    }

    fn working_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }
}

#[async_trait]
impl PluginProcess for ProcessPlugin {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_activated(&self) -> bool {
        let mut child = self.child.lock();
        match child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    async fn activate(&self, identity: &InstanceIdentity) -> HostResult<()> {
        if self.is_activated() {
            return Ok(());
        }

        let mut cmd = command(&self.program);
        cmd.args(&self.args)
            .current_dir(self.working_dir())
            .env("SONIC_INSTANCE_ID", &identity.id)
            .env("SONIC_INSTANCE_CATEGORY", &identity.category)
            .stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| HostError::Spawn {
            program: self.program.display().to_string(),
            reason: e.to_string(),
        })?;
        let stdin = child.stdin.take();

        info!(
            instance = %identity.id,
            pid = ?child.id(),
            path = %self.path.display(),
            "Plugin process started"
        );
        *self.child.lock() = Some(child);
        *self.stdin.lock().await = stdin;
        Ok(())
    }

    async fn deactivate(&self) -> HostResult<()> {
        self.stdin.lock().await.take();
        let Some(mut child) = self.child.lock().take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(path = %self.path.display(), %status, "Plugin process already exited");
            return Ok(());
        }
        child.kill().await?;
        info!(path = %self.path.display(), "Plugin process stopped");
        Ok(())
    }

    async fn send(&self, message: &ControlMessage) -> HostResult<()> {
        let mut line =
            serde_json::to_vec(message).map_err(|e| HostError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(HostError::NotActivated {
                path: self.path.clone(),
            });
        };

        let written = async {
            pipe.write_all(&line).await?;
            pipe.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Control channel closed");
            stdin.take();
            return Err(HostError::ChannelClosed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}
