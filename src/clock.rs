// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Nanosecond clock and deadline scheduler
//!
//! [Clock] keeps a set of software timers against a monotonic nanosecond
//! timeline. It never calls anything itself: the machine loop snapshots the
//! timeline with [Clock::begin_tick], then drains each timer with
//! [Clock::consume] and runs the [TimerTask] the handle was registered
//! with. Keeping the clock passive means it can run against a [manual]
//! timeline in tests, where time only moves when told to.
//!
//! Cyclic timers reschedule by incrementing the old deadline, not from the
//! current time, so a busy wake does not smear the cadence. Timers
//! registered with `skip_missed` forgive a backlog instead, realigning to
//! the next period boundary when they fall more than one period behind.
//!
//! [manual]: Clock::manual

use crate::error::{Error, Result};
use std::time::Instant;

/// What the machine loop should do when a timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerTask {
    /// Fetch, decode, and execute one core cycle
    CpuCycle,
    /// Count the delay and sound registers down one step
    TimerDecay,
    /// Kick the screen composition pipeline
    FrameSignal,
}

/// Identifies one registered timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle(usize);

/// How a timer fires once started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    /// Registered but not yet given a period
    Unconfigured,
    /// Fires once, then goes inactive
    OneShot { timeout: u64 },
    /// Fires every `period` nanoseconds
    Cyclic { period: u64, skip_missed: bool },
}

#[derive(Clone, Copy, Debug)]
struct Timer {
    kind: Kind,
    task: TimerTask,
    active: bool,
    /// Absolute nanosecond the timer next fires at
    deadline: u64,
    /// Signed distance from pause time to the deadline, captured by
    /// [Clock::pause] and reapplied by [Clock::resume]
    offset: i64,
    was_active: bool,
    /// Fires consumed since [Clock::begin_tick], bounded by `max_execs`
    execs: u32,
}

/// Where the nanoseconds come from.
#[derive(Clone, Copy, Debug)]
enum TimeSource {
    /// Host monotonic time, measured from clock construction
    Host(Instant),
    /// A timeline that only [Clock::advance] moves
    Manual(u64),
}

/// Deadline scheduler over a nanosecond timeline.
///
/// # Examples
/// ```rust
/// # use cheep::prelude::*;
/// let mut clock = Clock::manual(1000);
/// let tick = clock.register(TimerTask::CpuCycle);
/// clock.cyclic(tick, 100, false).unwrap();
/// clock.start(tick).unwrap();
///
/// clock.advance(250);
/// clock.begin_tick();
/// // two full periods elapsed, so the timer fires twice
/// assert!(clock.consume(tick));
/// assert!(clock.consume(tick));
/// assert!(!clock.consume(tick));
/// ```
#[derive(Clone, Debug)]
pub struct Clock {
    timers: Vec<Timer>,
    source: TimeSource,
    /// Timeline snapshot taken by [Clock::begin_tick]
    tick_time: u64,
    paused: bool,
    max_execs: u32,
}

impl Clock {
    /// Creates a clock over host monotonic time. `max_execs` bounds how many
    /// fires one timer may consume per wake while catching up to real time.
    pub fn new(max_execs: u32) -> Self {
        Clock {
            timers: Vec::new(),
            source: TimeSource::Host(Instant::now()),
            tick_time: 0,
            paused: false,
            max_execs: max_execs.max(1),
        }
    }

    /// Creates a clock over a manual timeline that starts at zero and only
    /// moves through [Clock::advance].
    pub fn manual(max_execs: u32) -> Self {
        Clock {
            source: TimeSource::Manual(0),
            ..Self::new(max_execs)
        }
    }

    /// Registers a timer and the task the machine runs when it fires.
    /// Handles are issued in registration order, which is also the order
    /// the machine loop services them in.
    pub fn register(&mut self, task: TimerTask) -> TimerHandle {
        self.timers.push(Timer {
            kind: Kind::Unconfigured,
            task,
            active: false,
            deadline: 0,
            offset: 0,
            was_active: false,
            execs: 0,
        });
        TimerHandle(self.timers.len() - 1)
    }

    /// The task `handle` was registered with.
    pub fn task(&self, handle: TimerHandle) -> TimerTask {
        self.timers[handle.0].task
    }

    /// Number of registered timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Configures `handle` to fire once, `timeout` nanoseconds after it is
    /// started. Does not start it.
    pub fn one_shot(&mut self, handle: TimerHandle, timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(Error::ZeroPeriodTimer);
        }
        self.timers[handle.0].kind = Kind::OneShot { timeout };
        Ok(())
    }

    /// Configures `handle` to fire every `period` nanoseconds once started.
    /// With `skip_missed`, a backlog of more than one period is dropped and
    /// the timer realigns to its next boundary instead of replaying it.
    pub fn cyclic(&mut self, handle: TimerHandle, period: u64, skip_missed: bool) -> Result<()> {
        if period == 0 {
            return Err(Error::ZeroPeriodTimer);
        }
        self.timers[handle.0].kind = Kind::Cyclic {
            period,
            skip_missed,
        };
        Ok(())
    }

    /// Arms `handle`: its first deadline lands one period (or timeout) from
    /// now. Starting an [unconfigured] timer fails.
    ///
    /// [unconfigured]: Error::ZeroPeriodTimer
    pub fn start(&mut self, handle: TimerHandle) -> Result<()> {
        let now = self.now();
        let timer = &mut self.timers[handle.0];
        let step = match timer.kind {
            Kind::Unconfigured => return Err(Error::ZeroPeriodTimer),
            Kind::OneShot { timeout } => timeout,
            Kind::Cyclic { period, .. } => period,
        };
        timer.deadline = now + step;
        timer.active = true;
        Ok(())
    }

    /// Disarms `handle` without touching its configuration.
    pub fn stop(&mut self, handle: TimerHandle) {
        self.timers[handle.0].active = false;
    }

    /// Whether `handle` is armed.
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers[handle.0].active
    }

    /// Snapshots the timeline for one scheduler wake and resets each
    /// timer's per-wake fire budget.
    pub fn begin_tick(&mut self) {
        self.tick_time = self.now();
        for timer in &mut self.timers {
            timer.execs = 0;
        }
    }

    /// Takes one due fire from `handle`, rescheduling it in the process.
    ///
    /// Returns false when the timer is inactive, not yet due as of the last
    /// [begin_tick], or has used up its per-wake budget. The machine loop
    /// calls this in a `while` per timer, so a backlogged timer catches up
    /// at most `max_execs` fires per wake.
    ///
    /// [begin_tick]: Clock::begin_tick
    pub fn consume(&mut self, handle: TimerHandle) -> bool {
        let tick_time = self.tick_time;
        let max_execs = self.max_execs;
        let timer = &mut self.timers[handle.0];
        if !timer.active || timer.execs >= max_execs || tick_time < timer.deadline {
            return false;
        }
        timer.execs += 1;
        match timer.kind {
            Kind::Unconfigured => return false,
            Kind::OneShot { .. } => timer.active = false,
            Kind::Cyclic {
                period,
                skip_missed,
            } => {
                if skip_missed && timer.deadline + period < tick_time {
                    timer.deadline = next_boundary(timer.deadline, period, tick_time);
                } else {
                    timer.deadline += period;
                }
            }
        }
        true
    }

    /// The next nanosecond `handle` fires at, as seen from the last
    /// [begin_tick]: the pending deadline if it is still ahead, otherwise
    /// the first period boundary past the snapshot. One-shot timers report
    /// their pending deadline as-is.
    ///
    /// [begin_tick]: Clock::begin_tick
    pub fn next_deadline(&self, handle: TimerHandle) -> u64 {
        let timer = &self.timers[handle.0];
        match timer.kind {
            Kind::Cyclic { period, .. } if timer.deadline <= self.tick_time => {
                next_boundary(timer.deadline, period, self.tick_time)
            }
            _ => timer.deadline,
        }
    }

    /// Nanoseconds elapsed on the timeline right now.
    pub fn now(&self) -> u64 {
        match self.source {
            TimeSource::Host(epoch) => epoch.elapsed().as_nanos() as u64,
            TimeSource::Manual(now) => now,
        }
    }

    /// The timeline snapshot the current wake is running against. Steady
    /// within a wake, which makes it the right base for phase math.
    pub fn current_tick_time(&self) -> u64 {
        self.tick_time
    }

    /// Moves a [manual] timeline forward. Host-backed clocks move on their
    /// own; calling this on one does nothing.
    ///
    /// [manual]: Clock::manual
    pub fn advance(&mut self, ns: u64) {
        if let TimeSource::Manual(now) = &mut self.source {
            *now += ns;
        }
    }

    /// Freezes every timer, remembering how far each active one was from
    /// its deadline. A timer three quarters of the way through its period
    /// resumes with a quarter period left, however long the pause lasts.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        let now = self.now();
        for timer in &mut self.timers {
            timer.was_active = timer.active;
            if timer.active {
                timer.offset = timer.deadline as i64 - now as i64;
            }
            timer.active = false;
        }
    }

    /// Rearms every timer that was active at [pause], replaying its captured
    /// phase against the current time. A timer that was behind stays behind
    /// by the same amount and catches up through the per-wake budget.
    ///
    /// [pause]: Clock::pause
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let now = self.now();
        self.tick_time = now;
        for timer in &mut self.timers {
            if timer.was_active {
                timer.deadline = now.saturating_add_signed(timer.offset);
                timer.active = true;
                timer.was_active = false;
            }
        }
    }

    /// Whether the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for Clock {
    /// A host-backed clock with a fire budget fit for a 1MHz core.
    fn default() -> Self {
        Self::new(1000)
    }
}

/// First deadline on the `period` grid anchored at `deadline` that lands
/// strictly after `now`. Callers ensure `deadline <= now`.
fn next_boundary(deadline: u64, period: u64, now: u64) -> u64 {
    let behind = now - deadline;
    deadline + (behind / period + 1) * period
}
