use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::TimingConfig;
use crate::pipeline::{BusMessage, BusSender, SubgraphId, TimeoutKind};

/// Source of "now" used to verify that a duration really elapsed
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The runtime's monotonic clock
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One armed timeout for the active clip
#[derive(Debug)]
pub struct TimeoutHandle {
    kind: TimeoutKind,
    deadline: Duration,
    armed_at: Instant,
    task: JoinHandle<()>,
}

impl TimeoutHandle {
    /// False once the timer has fired or been cancelled
    pub fn is_armed(&self) -> bool {
        !self.task.is_finished()
    }

    fn cancel(self) {
        if !self.task.is_finished() {
            debug!(
                "{:?} timer cancelled {:?} into {:?}",
                self.kind,
                self.armed_at.elapsed(),
                self.deadline
            );
        }
        self.task.abort();
    }
}

/// Arms and cancels the duration timer and watchdog ceiling of the active clip.
///
/// Both timers post [`BusMessage::Timeout`] on the bus instead of acting
/// directly, so expirations reach the sequencer through the same wait as
/// pipeline events. At most one timer of each kind exists at a time.
pub struct TimerService {
    bus: BusSender,
    clock: Arc<dyn Clock>,
    min_timed_duration: Duration,
    watchdog_ceiling: Duration,
    duration: Option<TimeoutHandle>,
    watchdog: Option<TimeoutHandle>,
}

impl TimerService {
    pub fn new(bus: BusSender, timing: &TimingConfig) -> Self {
        Self::with_clock(bus, timing, Arc::new(TokioClock))
    }

    pub fn with_clock(bus: BusSender, timing: &TimingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            bus,
            clock,
            min_timed_duration: timing.min_timed_duration(),
            watchdog_ceiling: timing.watchdog(),
            duration: None,
            watchdog: None,
        }
    }

    /// Only clips longer than the threshold get a duration timer
    pub fn is_timed(&self, duration: Duration) -> bool {
        duration > self.min_timed_duration
    }

    /// Arm the watchdog ceiling for `subgraph`, replacing any previous one
    pub fn arm_watchdog(&mut self, subgraph: SubgraphId) {
        self.disarm(TimeoutKind::Watchdog);

        let bus = self.bus.clone();
        let ceiling = self.watchdog_ceiling;
        let task = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            bus.post(BusMessage::Timeout {
                subgraph,
                kind: TimeoutKind::Watchdog,
            });
        });

        debug!("{}: watchdog armed for {:?}", subgraph, ceiling);
        self.watchdog = Some(TimeoutHandle {
            kind: TimeoutKind::Watchdog,
            deadline: ceiling,
            armed_at: self.clock.now(),
            task,
        });
    }

    /// Arm the duration timer. Returns false when the clip is too short to be
    /// timed or a duration timer was already armed for this clip.
    pub fn arm_duration(&mut self, subgraph: SubgraphId, duration: Duration) -> bool {
        if !self.is_timed(duration) || self.duration.is_some() {
            return false;
        }

        let bus = self.bus.clone();
        let clock = self.clock.clone();
        let armed_at = clock.now();
        let task = tokio::spawn(run_duration_timer(bus, clock, subgraph, duration, armed_at));

        info!("{}: duration timer armed for {:?}", subgraph, duration);
        self.duration = Some(TimeoutHandle {
            kind: TimeoutKind::Duration,
            deadline: duration,
            armed_at,
            task,
        });
        true
    }

    pub fn handle(&self, kind: TimeoutKind) -> Option<&TimeoutHandle> {
        match kind {
            TimeoutKind::Duration => self.duration.as_ref(),
            TimeoutKind::Watchdog => self.watchdog.as_ref(),
        }
    }

    pub fn is_armed(&self, kind: TimeoutKind) -> bool {
        self.handle(kind).is_some_and(TimeoutHandle::is_armed)
    }

    /// Cancel one timer. Safe to call when nothing is armed.
    pub fn disarm(&mut self, kind: TimeoutKind) {
        let slot = match kind {
            TimeoutKind::Duration => &mut self.duration,
            TimeoutKind::Watchdog => &mut self.watchdog,
        };
        if let Some(handle) = slot.take() {
            handle.cancel();
        }
    }

    pub fn disarm_all(&mut self) {
        self.disarm(TimeoutKind::Duration);
        self.disarm(TimeoutKind::Watchdog);
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

/// Sleep until `requested` has really elapsed since `armed_at`, then post the
/// timeout. A wake-up that comes early re-arms for the remainder.
async fn run_duration_timer(
    bus: BusSender,
    clock: Arc<dyn Clock>,
    subgraph: SubgraphId,
    requested: Duration,
    armed_at: Instant,
) {
    let mut remaining = requested;
    loop {
        tokio::time::sleep(remaining).await;

        let elapsed = clock.now().saturating_duration_since(armed_at);
        if elapsed >= requested {
            break;
        }
        remaining = requested - elapsed;
        debug!(
            "{}: duration timer false alarm after {:?}, re-arming for {:?}",
            subgraph, elapsed, remaining
        );
    }

    bus.post(BusMessage::Timeout {
        subgraph,
        kind: TimeoutKind::Duration,
    });
}
