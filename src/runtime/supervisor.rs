//! Liveness supervision: periodic heartbeats to the broker

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    channel::RequestChannel,
    error::{Result, RuntimeError},
};

use super::{name::AppName, stats::AtomicRuntimeStats};

/// Name of the heartbeat thread
pub const KEEPALIVE_THREAD_NAME: &str = "KeepAlive";

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

/// Background thread sending a heartbeat every interval
///
/// Heartbeats are sent while holding the stop flag's lock, so once
/// [`LivenessSupervisor::stop`] returns no further heartbeat can begin.
#[derive(Debug)]
pub struct LivenessSupervisor {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl LivenessSupervisor {
    /// Start sending heartbeats for `app_name` over `channel`
    pub fn start(
        channel: Arc<RequestChannel>,
        app_name: AppName,
        interval: Duration,
        stats: Arc<AtomicRuntimeStats>,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(RuntimeError::invalid_parameter(
                "interval",
                "Keepalive interval must be greater than 0",
            ));
        }

        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let thread = thread::Builder::new()
            .name(KEEPALIVE_THREAD_NAME.to_string())
            .spawn(move || run(&thread_signal, &channel, &app_name, interval, &stats))
            .map_err(|e| RuntimeError::from_io(e, "Failed to spawn keepalive thread"))?;

        Ok(Self {
            signal,
            thread: Some(thread),
            interval,
        })
    }

    /// Heartbeat period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the heartbeat thread has not been stopped yet
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop heartbeats and join the thread
    pub fn stop(&mut self) {
        {
            let mut stopped = self.signal.stopped.lock().unwrap_or_else(PoisonError::into_inner);
            *stopped = true;
            self.signal.wakeup.notify_all();
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("keepalive thread panicked");
            }
        }
    }
}

impl Drop for LivenessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    signal: &StopSignal,
    channel: &RequestChannel,
    app_name: &AppName,
    interval: Duration,
    stats: &AtomicRuntimeStats,
) {
    let started = Instant::now();
    let mut beat: u32 = 1;

    loop {
        let deadline = started + interval * beat;
        let mut stopped = signal.stopped.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if *stopped {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = signal
                .wakeup
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        match channel.send_keepalive(app_name) {
            Ok(()) => stats.record_heartbeat(true),
            Err(e) => {
                stats.record_heartbeat(false);
                log::warn!("Error in sending keep alive: {}", e);
            }
        }
        drop(stopped);

        // skip beats missed while descheduled instead of bursting
        let elapsed = started.elapsed();
        let due = (elapsed.as_nanos() / interval.as_nanos()) as u32;
        beat = beat.saturating_add(1).max(due.saturating_add(1));
    }
}
