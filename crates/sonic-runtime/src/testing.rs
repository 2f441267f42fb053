//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_core::{
    BoxedSubscription, Broker, BusError, BusMessage, BusResult, ControlMessage,
    DependencyInstaller, EnvironmentBuilder, EnvironmentStatus, FetchRequest, HostContext,
    HostError, HostResult, InstanceIdentity, PLUGIN_MANIFEST, PluginHost, PluginProcess,
    ReplacePrompt, SourceFetcher, StaticPrompt, Subscription,
};
use tokio::sync::mpsc;

// =============================================================================
// Provisioning collaborators
// =============================================================================

/// Fetcher that creates the target directory with a few files.
#[derive(Default)]
pub struct MockFetcher {
    pub clones: Mutex<Vec<FetchRequest>>,
    pub copies: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub fail: AtomicBool,
    pub with_requirements: AtomicBool,
}

impl MockFetcher {
    pub fn new() -> Self {
        let fetcher = Self::default();
        fetcher.with_requirements.store(true, Ordering::SeqCst);
        fetcher
    }

    fn populate(&self, target: &Path) -> HostResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::CommandFailed {
                program: "git".to_string(),
                status: Some(128),
                stderr: "repository not found".to_string(),
            });
        }
        std::fs::create_dir_all(target)?;
        std::fs::write(target.join("main.py"), "def run(config):\n    pass\n")?;
        if self.with_requirements.load(Ordering::SeqCst) {
            std::fs::write(target.join("requirements.txt"), "numpy\n")?;
        }
        Ok(())
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn clone_repository(&self, request: &FetchRequest) -> HostResult<()> {
        self.clones.lock().push(request.clone());
        self.populate(&request.target)
    }

    async fn copy_tree(&self, source: &Path, target: &Path) -> HostResult<()> {
        self.copies
            .lock()
            .push((source.to_path_buf(), target.to_path_buf()));
        self.populate(target)
    }
}

/// Environment builder that only creates the directory.
#[derive(Default)]
pub struct MockEnvironment {
    pub ensured: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl EnvironmentBuilder for MockEnvironment {
    async fn ensure(&self, venv: &Path) -> HostResult<EnvironmentStatus> {
        self.ensured.lock().push(venv.to_path_buf());
        if venv.exists() {
            return Ok(EnvironmentStatus::AlreadyPresent);
        }
        std::fs::create_dir_all(venv)?;
        Ok(EnvironmentStatus::Created)
    }

    async fn language_version(&self) -> HostResult<String> {
        Ok("3.11".to_string())
    }
}

/// Installer recording its invocations.
#[derive(Default)]
pub struct MockInstaller {
    pub installs: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl DependencyInstaller for MockInstaller {
    async fn install(&self, interpreter: &Path, manifest: &Path) -> HostResult<()> {
        self.installs
            .lock()
            .push((interpreter.to_path_buf(), manifest.to_path_buf()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::CommandFailed {
                program: "pip".to_string(),
                status: Some(1),
                stderr: "no matching distribution".to_string(),
            });
        }
        Ok(())
    }
}

/// Prompt that counts how often it was asked.
pub struct CountingPrompt {
    pub answer: bool,
    pub asked: AtomicUsize,
}

impl CountingPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReplacePrompt for CountingPrompt {
    async fn confirm_replace(&self, _path: &Path) -> HostResult<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// A plugin process whose liveness is a flag.
pub struct MockPlugin {
    path: PathBuf,
    pub active: AtomicBool,
    pub identity: Mutex<Option<InstanceIdentity>>,
    pub messages: Mutex<Vec<ControlMessage>>,
    pub fail_activation: AtomicBool,
    pub fail_send: AtomicBool,
}

impl MockPlugin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: AtomicBool::new(false),
            identity: Mutex::new(None),
            messages: Mutex::new(Vec::new()),
            fail_activation: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        }
    }

    /// Simulates the process exiting on its own.
    pub fn exit(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginProcess for MockPlugin {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_activated(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn activate(&self, identity: &InstanceIdentity) -> HostResult<()> {
        if self.fail_activation.load(Ordering::SeqCst) {
            return Err(HostError::Spawn {
                program: "python".to_string(),
                reason: "not found".to_string(),
            });
        }
        *self.identity.lock() = Some(identity.clone());
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) -> HostResult<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &ControlMessage) -> HostResult<()> {
        if !self.is_activated() {
            return Err(HostError::NotActivated {
                path: self.path.clone(),
            });
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(HostError::ChannelClosed {
                path: self.path.clone(),
            });
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// Plugin host handing out one [`MockPlugin`] per directory holding a
/// manifest; repeated discovery returns the same handles.
#[derive(Default)]
pub struct MockPluginHost {
    pub plugins: Mutex<HashMap<PathBuf, Arc<MockPlugin>>>,
    pub require_manifest: bool,
}

impl MockPluginHost {
    pub fn plugin(&self, path: &Path) -> Option<Arc<MockPlugin>> {
        self.plugins.lock().get(path).cloned()
    }
}

#[async_trait]
impl PluginHost for MockPluginHost {
    async fn collect(&self, dirs: &[PathBuf]) -> HostResult<Vec<Arc<dyn PluginProcess>>> {
        let mut plugins = self.plugins.lock();
        let mut found: Vec<Arc<dyn PluginProcess>> = Vec::new();
        for dir in dirs {
            if self.require_manifest && !dir.join(PLUGIN_MANIFEST).is_file() {
                continue;
            }
            let plugin = plugins
                .entry(dir.clone())
                .or_insert_with(|| Arc::new(MockPlugin::new(dir.clone())))
                .clone();
            found.push(plugin);
        }
        Ok(found)
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Broker backed by per-channel unbounded channels.
#[derive(Default)]
pub struct MockBroker {
    pub down: AtomicBool,
    senders: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>,
    hashes: Mutex<HashMap<(String, String), Vec<u8>>>,
}

struct MockSubscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

#[async_trait]
impl Subscription for MockSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Option<BusMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(BusError::SubscriptionClosed {
                channel: self.channel.clone(),
            }),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn ping(&self) -> BusResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn flush(&self) -> BusResult<()> {
        self.hashes.lock().clear();
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> BusResult<BoxedSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(Box::new(MockSubscription {
            channel: channel.to_string(),
            rx,
        }))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> BusResult<usize> {
        let senders = self.senders.lock();
        let Some(list) = senders.get(channel) else {
            return Ok(0);
        };
        let message = BusMessage::new(channel, payload);
        Ok(list
            .iter()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count())
    }

    async fn store(&self, name: &str, key: &str, value: Vec<u8>) -> BusResult<bool> {
        Ok(self
            .hashes
            .lock()
            .insert((name.to_string(), key.to_string()), value)
            .is_none())
    }

    async fn retrieve(&self, name: &str, key: &str) -> BusResult<Option<Vec<u8>>> {
        Ok(self
            .hashes
            .lock()
            .get(&(name.to_string(), key.to_string()))
            .cloned())
    }

    async fn delete(&self, name: &str, key: &str) -> BusResult<bool> {
        Ok(self
            .hashes
            .lock()
            .remove(&(name.to_string(), key.to_string()))
            .is_some())
    }
}

// =============================================================================
// Context
// =============================================================================

/// All mocks wired into one context.
pub struct MockHost {
    pub fetcher: Arc<MockFetcher>,
    pub environment: Arc<MockEnvironment>,
    pub installer: Arc<MockInstaller>,
    pub plugin_host: Arc<MockPluginHost>,
    pub broker: Arc<MockBroker>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            fetcher: Arc::new(MockFetcher::new()),
            environment: Arc::new(MockEnvironment::default()),
            installer: Arc::new(MockInstaller::default()),
            plugin_host: Arc::new(MockPluginHost {
                require_manifest: true,
                ..Default::default()
            }),
            broker: Arc::new(MockBroker::default()),
        }
    }

    /// Builds a context answering `answer` to every replace prompt.
    pub fn context(&self, answer: bool) -> HostContext {
        self.context_with_prompt(Arc::new(StaticPrompt::new(answer)))
    }

    pub fn context_with_prompt(&self, prompt: Arc<dyn ReplacePrompt>) -> HostContext {
        HostContext::new()
            .with_fetcher(self.fetcher.clone())
            .with_environment(self.environment.clone())
            .with_installer(self.installer.clone())
            .with_plugin_host(self.plugin_host.clone())
            .with_prompt(prompt)
            .with_broker(self.broker.clone())
    }
}
