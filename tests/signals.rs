//! End-to-end signal handling against the real binary.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

struct Instance {
    _dir: tempfile::TempDir,
    pid_path: PathBuf,
    child: Child,
}

impl Instance {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("conspire.pid");
        // Explicit empty config so a per-user file cannot interfere.
        let config = dir.path().join("conspire.toml");
        std::fs::write(&config, "").unwrap();

        let child = Command::new(env!("CARGO_BIN_EXE_conspire"))
            .arg("--config")
            .arg(&config)
            .args(["--host", "127.0.0.1", "--port", "0", "--pid"])
            .arg(&pid_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let instance = Self {
            _dir: dir,
            pid_path,
            child,
        };
        instance.wait_for_pid_file();
        instance
    }

    fn wait_for_pid_file(&self) {
        let expected = format!("{}\n", self.child.id());
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if std::fs::read_to_string(&self.pid_path).is_ok_and(|c| c == expected) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("PID file {} never appeared", self.pid_path.display());
    }

    fn signal(&self, sig: Signal) {
        kill(Pid::from_raw(self.child.id() as i32), sig).unwrap();
    }

    fn wait(mut self, timeout: Duration) -> (ExitStatus, PathBuf) {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return (status, self.pid_path.clone());
            }
            if Instant::now() > deadline {
                let _ = self.child.kill();
                panic!("conspire did not exit within {timeout:?}");
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn assert_gone(path: &Path) {
    assert!(!path.exists(), "{} still exists", path.display());
}

#[test]
fn each_qualifying_signal_shuts_down_cleanly() {
    for sig in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP, Signal::SIGQUIT] {
        let instance = Instance::start();
        instance.signal(sig);
        let (status, pid_path) = instance.wait(Duration::from_secs(10));

        assert_eq!(status.code(), Some(0), "{sig:?}");
        assert_gone(&pid_path);
    }
}

#[test]
fn second_signal_forces_exit_and_removes_pid_file() {
    let instance = Instance::start();
    instance.signal(Signal::SIGTERM);
    thread::sleep(Duration::from_millis(20));
    instance.signal(Signal::SIGINT);
    let (status, pid_path) = instance.wait(Duration::from_secs(5));

    assert_eq!(status.code(), Some(1));
    assert_gone(&pid_path);
}

#[test]
fn unwritable_pid_file_exits_before_listening() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("conspire.toml");
    std::fs::write(&config, "").unwrap();
    let pid_path = dir.path().join("missing").join("conspire.pid");

    let output = Command::new(env!("CARGO_BIN_EXE_conspire"))
        .arg("--config")
        .arg(&config)
        .args(["--host", "127.0.0.1", "--port", "0", "--pid"])
        .arg(&pid_path)
        .env("RUST_LOG", "info")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PID file"), "stderr: {stderr}");
    assert!(!stderr.contains("Listening on"), "stderr: {stderr}");
    assert!(!stderr.contains("starting up"), "stderr: {stderr}");
}
