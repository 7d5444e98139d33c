//! Engine child processes.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use ow_core::Stopwatch;

use crate::error::{AppError, AppResult};

/// Starts engine processes. The engine is invoked as `<executable> <script>`;
/// tests substitute a spawner that runs a stand-in.
pub trait EngineSpawner: Send {
    fn spawn(&self, engine: &Path, script: &Path, work_dir: &Path) -> std::io::Result<Child>;
}

/// Runs the engine executable directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl EngineSpawner for SystemSpawner {
    fn spawn(&self, engine: &Path, script: &Path, work_dir: &Path) -> std::io::Result<Child> {
        Command::new(engine)
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .spawn()
    }
}

/// A running (or finished) engine.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    pid: u32,
    script: PathBuf,
    status: Option<ExitStatus>,
}

impl EngineProcess {
    pub fn spawn(
        spawner: &dyn EngineSpawner,
        engine: &Path,
        script: &Path,
        work_dir: &Path,
    ) -> AppResult<Self> {
        let child = spawner.spawn(engine, script, work_dir).map_err(|e| {
            AppError::Process(format!(
                "failed to start {} with {}: {e}",
                engine.display(),
                script.display()
            ))
        })?;
        let pid = child.id();
        tracing::info!(pid, engine = %engine.display(), script = %script.display(), "engine started");
        Ok(Self {
            child,
            pid,
            script: script.to_path_buf(),
            status: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    pub fn has_exited(&mut self) -> AppResult<bool> {
        if self.status.is_some() {
            return Ok(true);
        }
        match self.child.try_wait() {
            Ok(status) => {
                self.status = status;
                Ok(status.is_some())
            }
            Err(e) => Err(AppError::Process(format!(
                "cannot query engine pid {}: {e}",
                self.pid
            ))),
        }
    }

    /// Kill the engine and reap it. Does nothing if it has already exited.
    pub fn terminate(&mut self) -> AppResult<()> {
        if self.has_exited()? {
            return Ok(());
        }
        if let Err(e) = self.child.kill() {
            // it may have exited between the check and the kill
            if !self.has_exited()? {
                return Err(AppError::Process(format!(
                    "cannot terminate engine pid {}: {e}",
                    self.pid
                )));
            }
            return Ok(());
        }
        let status = self.child.wait().map_err(|e| {
            AppError::Process(format!("cannot reap engine pid {}: {e}", self.pid))
        })?;
        self.status = Some(status);
        tracing::info!(pid = self.pid, "engine terminated");
        Ok(())
    }

    /// Wait for the engine to exit on its own. On timeout the process is
    /// left running for the caller to terminate.
    pub fn wait_for_exit(
        &mut self,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> AppResult<ExitStatus> {
        let clock = Stopwatch::start("engine_exit");
        loop {
            if self.has_exited()? {
                if let Some(status) = self.status {
                    tracing::debug!(pid = self.pid, ?status, elapsed_s = clock.elapsed_s(), "engine exited");
                    return Ok(status);
                }
            }
            let slice = match timeout {
                Some(budget) => match clock.remaining(budget) {
                    Some(left) => left.min(poll_interval),
                    None => {
                        return Err(AppError::EngineTimeout {
                            path: self.script.clone(),
                            waited_s: clock.elapsed_s(),
                        });
                    }
                },
                None => poll_interval,
            };
            thread::sleep(slice);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    struct Shell;

    impl EngineSpawner for Shell {
        fn spawn(&self, engine: &Path, script: &Path, work_dir: &Path) -> std::io::Result<Child> {
            Command::new("sh")
                .arg("-c")
                .arg(engine.as_os_str())
                .arg(script)
                .current_dir(work_dir)
                .spawn()
        }
    }

    #[test]
    fn terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut p =
            EngineProcess::spawn(&Shell, Path::new("sleep 30"), Path::new("x"), dir.path()).unwrap();
        assert!(!p.has_exited().unwrap());
        p.terminate().unwrap();
        assert!(p.has_exited().unwrap());
        p.terminate().unwrap();
    }

    #[test]
    fn wait_for_exit_times_out_and_leaves_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut p =
            EngineProcess::spawn(&Shell, Path::new("sleep 30"), Path::new("x"), dir.path()).unwrap();
        let err = p
            .wait_for_exit(Some(Duration::from_millis(100)), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, AppError::EngineTimeout { .. }));
        assert!(!p.has_exited().unwrap());
        p.terminate().unwrap();
    }

    #[test]
    fn quick_exit_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        let mut p =
            EngineProcess::spawn(&Shell, Path::new("exit 3"), Path::new("x"), dir.path()).unwrap();
        let status = p.wait_for_exit(Some(Duration::from_secs(10)), Duration::from_millis(10)).unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn spawn_failure_names_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineProcess::spawn(
            &SystemSpawner,
            &dir.path().join("no-such-engine"),
            Path::new("s.xml"),
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no-such-engine"));
    }
}
