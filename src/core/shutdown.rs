//! Shutdown coordination and OS signal handling
//!
//! [`ShutdownCoordinator`] is the in-process "stop requested" latch shared by
//! the scheduler and anything that wants to observe shutdown. [`SignalListener`]
//! turns SIGTERM / SIGINT into a callback on a dedicated thread and puts the
//! previous signal dispositions back when it is stopped.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{broadcast, oneshot};

/// Coordinates graceful shutdown across the runtime
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        // Larger than one so bursts of triggers are not reported as lag
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown; returns false if it had already been triggered
    pub fn trigger_shutdown(&self) -> bool {
        let first = !self.shutdown_requested.swap(true, Ordering::AcqRel);
        let _ = self.shutdown_tx.send(());
        first
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset SIGPIPE to its default disposition
///
/// Rust ignores SIGPIPE at startup; a bot writing to a closed pipe should die
/// like any other unix process rather than loop on EPIPE.
pub fn reset_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

/// Signal dispositions captured before the listener installs its own handlers
///
/// tokio registers its OS-level handler only once per process. When a listener
/// restores the previous dispositions, the runtime handler it replaces is kept
/// in `RUNTIME_ACTIONS` so a later listener can put it back before subscribing.
struct SavedDispositions {
    #[cfg(unix)]
    actions: Vec<(libc::c_int, libc::sigaction)>,
}

#[cfg(unix)]
const LISTENED_SIGNALS: [libc::c_int; 2] = [libc::SIGTERM, libc::SIGINT];

#[cfg(unix)]
static RUNTIME_ACTIONS: std::sync::Mutex<Vec<(libc::c_int, libc::sigaction)>> =
    std::sync::Mutex::new(Vec::new());

#[cfg(unix)]
fn current_action(signum: libc::c_int) -> Option<libc::sigaction> {
    // SAFETY: a null new-action pointer only queries the current action
    let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::sigaction(signum, std::ptr::null(), &mut old) };
    (rc == 0).then_some(old)
}

#[cfg(unix)]
fn install_action(signum: libc::c_int, action: &libc::sigaction) -> bool {
    // SAFETY: every action passed here was produced by sigaction for this signal
    unsafe { libc::sigaction(signum, action, std::ptr::null_mut()) == 0 }
}

impl SavedDispositions {
    #[cfg(unix)]
    fn capture() -> Self {
        let mut actions = Vec::new();
        for signum in LISTENED_SIGNALS {
            match current_action(signum) {
                Some(action) => actions.push((signum, action)),
                None => log::warn!("Could not read disposition of signal {}", signum),
            }
        }

        let runtime_actions = match RUNTIME_ACTIONS.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for (signum, action) in &runtime_actions {
            if !install_action(*signum, action) {
                log::warn!("Could not reinstall runtime handler for signal {}", signum);
            }
        }

        Self { actions }
    }

    #[cfg(not(unix))]
    fn capture() -> Self {
        Self {}
    }

    #[cfg(unix)]
    fn restore(&self) {
        let mut replaced = Vec::new();
        for (signum, action) in &self.actions {
            if let Some(runtime_action) = current_action(*signum) {
                replaced.push((*signum, runtime_action));
            }
            if !install_action(*signum, action) {
                log::warn!("Could not restore disposition of signal {}", signum);
            }
        }

        let mut runtime_actions = match RUNTIME_ACTIONS.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if runtime_actions.is_empty() {
            *runtime_actions = replaced;
        }
    }

    #[cfg(not(unix))]
    fn restore(&self) {}
}

type SignalCallback = Arc<dyn Fn(&'static str) + Send + Sync>;

/// Listens for termination signals on its own thread
///
/// The first signal invokes the callback on a fresh thread, so a slow stop
/// sequence never prevents the listener from seeing a second signal. A second
/// signal exits the process with status 130.
pub struct SignalListener {
    cancel: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    saved: SavedDispositions,
}

impl SignalListener {
    pub fn spawn<F>(on_signal: F) -> io::Result<Self>
    where
        F: Fn(&'static str) + Send + Sync + 'static,
    {
        let saved = SavedDispositions::capture();
        let callback: SignalCallback = Arc::new(on_signal);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<io::Result<()>>();

        let thread = std::thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                runtime.block_on(listen(callback, cancel_rx, ready_tx));
            })?;

        let setup = ready_rx.recv().unwrap_or_else(|_| {
            Err(io::Error::other("signal listener exited during setup"))
        });
        let mut listener = Self {
            cancel: Some(cancel_tx),
            thread: Some(thread),
            saved,
        };
        match setup {
            Ok(()) => {
                log::debug!("Signal listener installed");
                Ok(listener)
            }
            Err(e) => {
                listener.shutdown();
                Err(e)
            }
        }
    }

    /// Stop listening and restore the previous signal dispositions
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            self.saved.restore();
            log::debug!("Signal listener removed, previous handlers restored");
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(unix)]
async fn listen(
    callback: SignalCallback,
    mut cancel_rx: oneshot::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<io::Result<()>>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let mut received = 0usize;
    loop {
        let name = tokio::select! {
            _ = &mut cancel_rx => break,
            Some(()) = terminate.recv() => "SIGTERM",
            Some(()) = interrupt.recv() => "SIGINT",
            else => break,
        };
        received += 1;
        if received > 1 {
            log::warn!("{} received while stopping; exiting", name);
            std::process::exit(130);
        }
        dispatch(&callback, name);
    }
}

#[cfg(not(unix))]
async fn listen(
    callback: SignalCallback,
    mut cancel_rx: oneshot::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<io::Result<()>>,
) {
    let _ = ready_tx.send(Ok(()));

    let mut received = 0usize;
    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            result = tokio::signal::ctrl_c() => {
                if result.is_err() {
                    break;
                }
            }
        }
        received += 1;
        if received > 1 {
            log::warn!("Ctrl-C received while stopping; exiting");
            std::process::exit(130);
        }
        dispatch(&callback, "CTRL_C");
    }
}

fn dispatch(callback: &SignalCallback, name: &'static str) {
    log::info!("{} received; requesting shutdown", name);
    let callback = Arc::clone(callback);
    let spawned = std::thread::Builder::new()
        .name("signal-shutdown".to_string())
        .spawn(move || callback(name));
    if let Err(e) = spawned {
        log::error!("Could not spawn shutdown thread for {}: {}", name, e);
    }
}
