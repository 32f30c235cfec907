/*!
 * Optimizer Runtime
 *
 * The three OS threads around a shared UnifiedProcessManager:
 * - scheduler: runs `tick` and sleeps for the wake it returns
 * - listener: forwards raw foreground events into the debouncer
 * - maintenance: standby-cache polling on its own cooldown
 *
 * Settings are only ever applied from the scheduler thread.
 */

use super::unified::UnifiedProcessManager;
use crate::core::errors::{OptimizerError, Result};
use crate::core::types::Pid;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the listener checks for shutdown while no events arrive
const LISTENER_POLL: Duration = Duration::from_millis(200);

/// Control messages for the scheduler thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    /// Run a tick immediately
    Trigger,
    Shutdown,
}

/// Handle to the running optimizer threads
pub struct OptimizerRuntime {
    manager: Arc<UnifiedProcessManager>,
    commands: flume::Sender<RuntimeCommand>,
    /// Dropping this disconnects every thread's stop receiver
    stop: Option<flume::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl OptimizerRuntime {
    pub fn spawn(manager: Arc<UnifiedProcessManager>) -> Result<Self> {
        let (commands, command_rx) = flume::unbounded();
        let (stop, stop_rx) = flume::bounded::<()>(1);
        let mut threads = Vec::with_capacity(3);

        let scheduler = Arc::clone(&manager);
        threads.push(spawn_named("optimizer-scheduler", move || {
            run_scheduler_loop(scheduler, command_rx)
        })?);

        let listener = Arc::clone(&manager);
        let events = manager.foreground_events();
        let listener_stop = stop_rx.clone();
        threads.push(spawn_named("optimizer-listener", move || {
            run_listener_loop(listener, events, listener_stop)
        })?);

        let maintenance = Arc::clone(&manager);
        threads.push(spawn_named("optimizer-maintenance", move || {
            run_maintenance_loop(maintenance, stop_rx)
        })?);

        info!(threads = threads.len(), "Optimizer runtime started");
        Ok(Self {
            manager,
            commands,
            stop: Some(stop),
            threads,
        })
    }

    pub fn manager(&self) -> &Arc<UnifiedProcessManager> {
        &self.manager
    }

    /// Wake the scheduler now instead of at its next deadline
    pub fn trigger(&self) {
        let _ = self.commands.send(RuntimeCommand::Trigger);
    }

    /// Feed a raw foreground event as a native hook would
    pub fn notify_foreground(&self, pid: Pid) {
        let _ = self.manager.foreground_sender().send(pid);
    }

    /// Stop all threads, then release handles, jobs and suspensions
    pub fn shutdown(mut self) {
        self.signal_stop();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("optimizer").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "Optimizer thread panicked");
            }
        }
        self.manager.shutdown();
        info!("Optimizer runtime shutdown complete");
    }

    fn signal_stop(&mut self) {
        let _ = self.commands.send(RuntimeCommand::Shutdown);
        self.stop.take();
    }
}

impl Drop for OptimizerRuntime {
    fn drop(&mut self) {
        // Threads still attached: ask them to exit without waiting
        if !self.threads.is_empty() {
            self.signal_stop();
        }
    }
}

fn spawn_named<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| OptimizerError::Internal(format!("failed to spawn {}: {}", name, e)))
}

fn run_scheduler_loop(manager: Arc<UnifiedProcessManager>, commands: flume::Receiver<RuntimeCommand>) {
    debug!("Scheduler loop started");
    loop {
        let wait = manager.tick(Instant::now());
        match commands.recv_timeout(wait) {
            Ok(RuntimeCommand::Trigger) | Err(flume::RecvTimeoutError::Timeout) => {}
            Ok(RuntimeCommand::Shutdown) | Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Scheduler loop stopped");
}

fn run_listener_loop(
    manager: Arc<UnifiedProcessManager>,
    events: flume::Receiver<Pid>,
    stop: flume::Receiver<()>,
) {
    debug!("Foreground listener started");
    loop {
        match events.recv_timeout(LISTENER_POLL) {
            Ok(pid) => {
                if let Err(e) = manager.request_foreground_change(pid, Instant::now()) {
                    debug!(pid, error = %e, "Foreground event ignored");
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
        if matches!(stop.try_recv(), Err(flume::TryRecvError::Disconnected)) {
            break;
        }
    }
    debug!("Foreground listener stopped");
}

fn run_maintenance_loop(manager: Arc<UnifiedProcessManager>, stop: flume::Receiver<()>) {
    let interval = Duration::from_secs(manager.config().maintenance.poll_interval_secs);
    debug!(interval_secs = interval.as_secs(), "Maintenance loop started");
    while let Err(flume::RecvTimeoutError::Timeout) = stop.recv_timeout(interval) {
        manager.standby_maintenance(Instant::now());
    }
    debug!("Maintenance loop stopped");
}
