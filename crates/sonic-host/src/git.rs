//! Source fetching through `git` and recursive directory copies.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sonic_core::{FetchRequest, HostError, HostResult, SourceFetcher};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::command::{command, run};

/// Fetches sources with the `git` command line client.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: PathBuf,
}

impl GitFetcher {
    /// Creates a fetcher using `git` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    /// Uses a specific `git` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn clone_repository(&self, request: &FetchRequest) -> HostResult<()> {
        let mut cmd = command(&self.program);

        // Only PATH and HOME are inherited; git must never prompt.
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");

        cmd.arg("clone");
        if let Some(branch) = &request.branch {
            cmd.arg("-b").arg(branch);
        }
        cmd.arg(request.authenticated_url());
        cmd.arg(&request.target);

        debug!(request = ?request, "Running git clone");
        run(cmd, "git").await?;
        info!(target = %request.target.display(), "Repository cloned");
        Ok(())
    }

    async fn copy_tree(&self, source: &Path, target: &Path) -> HostResult<()> {
        let source = source.to_path_buf();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || copy_dir(&source, &target))
            .await
            .map_err(|e| HostError::Io(e.to_string()))?
    }
}

/// Copies `source` recursively into `target`, which must not exist yet.
pub fn copy_dir(source: &Path, target: &Path) -> HostResult<()> {
    if target.exists() {
        return Err(HostError::Io(format!(
            "destination {} already exists",
            target.display()
        )));
    }

    let mut files = 0usize;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|e| HostError::Io(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| HostError::Io(e.to_string()))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            std::fs::copy(entry.path(), &destination)?;
            files += 1;
        }
    }

    debug!(
        source = %source.display(),
        target = %target.display(),
        files,
        "Directory copied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_copy_dir_recursive() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("pkg").join("nested")).unwrap();
        fs::write(source.path().join("main.py"), "print('hi')").unwrap();
        fs::write(source.path().join("pkg").join("nested").join("x.txt"), "x").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("audio").join("vad");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        copy_dir(source.path(), &target).unwrap();

        assert_eq!(
            fs::read_to_string(target.join("main.py")).unwrap(),
            "print('hi')"
        );
        assert!(target.join("pkg").join("nested").join("x.txt").is_file());
    }

    #[test]
    fn test_copy_dir_refuses_existing_target() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        assert!(matches!(
            copy_dir(source.path(), target.path()),
            Err(HostError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_tree_async() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("requirements.txt"), "").unwrap();
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("copy");

        GitFetcher::new()
            .copy_tree(source.path(), &target)
            .await
            .unwrap();
        assert!(target.join("requirements.txt").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clone_keeps_token_out_of_logs_and_errors() {
        use parking_lot::Mutex;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let bin = tempfile::tempdir().unwrap();
        let git = bin.path().join("git");
        fs::write(
            &git,
            "#!/bin/sh\necho \"fatal: repository '$4' not found\" >&2\nexit 128\n",
        )
        .unwrap();
        fs::set_permissions(&git, fs::Permissions::from_mode(0o755)).unwrap();

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dest = tempfile::tempdir().unwrap();
        let request = FetchRequest::new("https://git.example/org/vad.git", dest.path().join("vad"))
            .with_branch(Some("main".to_string()))
            .with_token(Some("s3cret".to_string()));
        let result = GitFetcher::with_program(&git).clone_repository(&request).await;

        match result {
            Err(HostError::CommandFailed { stderr, .. }) => {
                assert!(stderr.contains("git.example/org/vad.git"));
                assert!(!stderr.contains("s3cret"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let output = String::from_utf8_lossy(&logs.0.lock()).into_owned();
        assert!(output.contains("Running command"));
        assert!(output.contains("git.example/org/vad.git"));
        assert!(!output.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_clone_failure_is_reported() {
        let dest = tempfile::tempdir().unwrap();
        let request = FetchRequest::new("https://git.invalid/none.git", dest.path().join("x"));
        let fetcher = GitFetcher::with_program("sonic-missing-git");
        assert!(matches!(
            fetcher.clone_repository(&request).await,
            Err(HostError::Spawn { .. })
        ));
    }
}
