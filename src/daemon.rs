//! Unix daemon lifecycle for RPC servers.
//!
//! A [`Daemon`] runs a server's serve loop in a detached background process
//! and controls it through a pidfile. It keeps no in-memory notion of
//! "running": liveness is always re-derived from the pidfile and a zero
//! signal, so a fresh `Daemon` in another process can stop or restart an
//! instance started earlier.
//!
//! ```rust,no_run
//! use rpc_remotes::{Daemon, HttpServer, JsonRpc, MethodTable};
//!
//! let server = HttpServer::new("0.0.0.0", 7890, JsonRpc, || MethodTable::new("Empty"));
//! let mut daemon = Daemon::new(server, "/tmp/rpc/0.0.0.0:7890.pid");
//! let pid = daemon.start()?;
//! println!("started {}", pid);
//! daemon.stop()?;
//! # Ok::<(), rpc_remotes::DaemonError>(())
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::DaemonError;
use crate::server::Serve;

type Result<T> = std::result::Result<T, DaemonError>;

/// How long `stop` waits before and after escalating to SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Liveness polls after SIGTERM.
    pub attempts: u32,
    /// First poll delay; doubles on every attempt.
    pub initial_delay: Duration,
    /// Upper bound for a single poll delay.
    pub max_delay: Duration,
    /// How long to wait for death after SIGKILL.
    pub kill_wait: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            kill_wait: Duration::from_secs(2),
        }
    }
}

/// Result of a successful [`Daemon::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// No live process held the pidfile.
    NotRunning,
    /// The process died; `forced` is set when SIGKILL was needed.
    Terminated { pid: i32, forced: bool },
}

/// Supervises a server running as a background process.
pub struct Daemon<S: Serve> {
    server: S,
    pidfile: PathBuf,
    working_dir: PathBuf,
    start_timeout: Duration,
    stop_policy: StopPolicy,
}

impl<S: Serve> Daemon<S> {
    /// Create a daemon for `server`. `~` in `pidfile` is expanded.
    pub fn new(server: S, pidfile: impl AsRef<Path>) -> Self {
        Self {
            server,
            pidfile: expand_path(pidfile.as_ref()),
            working_dir: PathBuf::from("/"),
            start_timeout: Duration::from_secs(5),
            stop_policy: StopPolicy::default(),
        }
    }

    /// Working directory of the detached process (defaults to `/`).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// How long `start` waits for the pidfile to name a live process.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn pidfile(&self) -> &Path {
        &self.pidfile
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// PID recorded in the pidfile, if any.
    pub fn pid(&self) -> Option<i32> {
        read_pid_file(&self.pidfile)
    }

    /// Whether the pidfile names a live process.
    pub fn running(&self) -> bool {
        self.pid().is_some_and(pid_exists)
    }

    /// Fork into the background and serve there.
    ///
    /// Returns the daemon's PID once it has written a live pidfile. Never
    /// returns in the daemon process itself.
    pub fn start(&mut self) -> Result<i32> {
        if let Some(pid) = self.pid() {
            if pid_exists(pid) {
                return Err(DaemonError::AlreadyRunning { pid });
            }
            warn!(pid, pidfile = %self.pidfile.display(), "Removing stale pidfile");
            remove_pid_file(&self.pidfile)?;
        }

        if let Some(parent) = self.pidfile.parent() {
            fs::create_dir_all(parent)?;
        }

        // Bind in the parent so a busy port is reported to the caller.
        self.server.prepare()?;

        info!(pidfile = %self.pidfile.display(), "Starting daemon");

        let outcome = daemonize::Daemonize::new()
            .pid_file(&self.pidfile)
            .working_directory(&self.working_dir)
            .execute();

        match outcome {
            daemonize::Outcome::Parent(Ok(_)) => {
                self.server.release();
                self.wait_for_start()
            }
            daemonize::Outcome::Parent(Err(e)) => {
                self.server.release();
                Err(DaemonError::Daemonize(e.to_string()))
            }
            daemonize::Outcome::Child(Ok(_)) => self.run_detached(),
            daemonize::Outcome::Child(Err(e)) => {
                error!(error = %e, "Failed to detach daemon process");
                std::process::exit(1);
            }
        }
    }

    /// Serve in the current process, holding the pidfile while doing so.
    pub fn run_foreground(&mut self) -> Result<()> {
        if let Some(pid) = self.pid() {
            if pid_exists(pid) && pid != std::process::id() as i32 {
                return Err(DaemonError::AlreadyRunning { pid });
            }
        }
        write_pid_file(&self.pidfile)?;
        let served = self.server.serve();
        remove_pid_file(&self.pidfile)?;
        Ok(served?)
    }

    /// Terminate the process named by the pidfile.
    ///
    /// SIGTERM first, polling with exponential backoff, then SIGKILL. The
    /// pidfile is removed once the process is confirmed dead.
    pub fn stop(&self) -> Result<Stopped> {
        let Some(pid) = self.pid() else {
            warn!(pidfile = %self.pidfile.display(), "Pidfile does not exist, daemon not running?");
            return Ok(Stopped::NotRunning);
        };

        if !pid_exists(pid) {
            warn!(pid, "Daemon not running, removing stale pidfile");
            remove_pid_file(&self.pidfile)?;
            return Ok(Stopped::NotRunning);
        }

        info!(pid, "Stopping daemon");
        send_signal(pid, libc::SIGTERM)?;

        let policy = self.stop_policy;
        let mut delay = policy.initial_delay;
        for attempt in 1..=policy.attempts {
            thread::sleep(delay);
            if !pid_exists(pid) {
                debug!(pid, attempt, "Daemon exited after SIGTERM");
                remove_pid_file(&self.pidfile)?;
                return Ok(Stopped::Terminated { pid, forced: false });
            }
            delay = (delay * 2).min(policy.max_delay);
        }

        warn!(pid, "Daemon ignored SIGTERM, sending SIGKILL");
        send_signal(pid, libc::SIGKILL)?;

        let deadline = Instant::now() + policy.kill_wait;
        while Instant::now() < deadline {
            if !pid_exists(pid) {
                remove_pid_file(&self.pidfile)?;
                return Ok(Stopped::Terminated { pid, forced: true });
            }
            thread::sleep(Duration::from_millis(50));
        }

        error!(pid, "Daemon survived SIGKILL");
        Err(DaemonError::FailedToTerminate { pid })
    }

    /// `stop` followed by `start`.
    pub fn restart(&mut self) -> Result<i32> {
        self.stop()?;
        self.start()
    }

    pub fn reload(&self) -> Result<()> {
        Err(DaemonError::NotImplemented("reload"))
    }

    pub fn status(&self) -> Result<()> {
        Err(DaemonError::NotImplemented("status"))
    }

    fn wait_for_start(&self) -> Result<i32> {
        let start = Instant::now();
        while start.elapsed() < self.start_timeout {
            if let Some(pid) = self.pid() {
                if pid_exists(pid) {
                    info!(pid, "Daemon started");
                    return Ok(pid);
                }
            }
            thread::sleep(Duration::from_millis(50));
        }
        Err(DaemonError::StartTimeout {
            pidfile: self.pidfile.display().to_string(),
            waited_ms: start.elapsed().as_millis(),
        })
    }

    fn run_detached(&mut self) -> ! {
        info!(pid = std::process::id(), "Daemon process detached");
        let code = match self.server.serve() {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "Serve loop failed");
                1
            }
        };
        if let Err(e) = remove_pid_file(&self.pidfile) {
            warn!(error = %e, "Failed to remove pidfile");
        }
        std::process::exit(code)
    }
}

/// Whether a process with `pid` exists.
///
/// A permission error still means the process exists (it belongs to
/// someone else). Non-positive PIDs never exist.
pub fn pid_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs existence and permission checks.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn send_signal(pid: i32, signal: libc::c_int) -> Result<()> {
    // SAFETY: plain kill(2) on a PID read from our own pidfile.
    if unsafe { libc::kill(pid, signal) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone
        return Ok(());
    }
    Err(DaemonError::Io(err))
}

/// Read a PID from a pidfile. `None` if missing or unparsable.
pub fn read_pid_file(pid_file: impl AsRef<Path>) -> Option<i32> {
    let content = fs::read_to_string(expand_path(pid_file.as_ref())).ok()?;
    content.trim().parse().ok()
}

/// Write the current process's PID, creating parent directories.
pub fn write_pid_file(pid_file: impl AsRef<Path>) -> io::Result<()> {
    let pid_path = expand_path(pid_file.as_ref());

    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(&pid_path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Remove a pidfile; a missing file is not an error.
pub fn remove_pid_file(pid_file: impl AsRef<Path>) -> io::Result<()> {
    match fs::remove_file(expand_path(pid_file.as_ref())) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Expand `~` in path to home directory.
pub(crate) fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.as_ref())
}
