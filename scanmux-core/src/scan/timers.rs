use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// One-shot timers owned by the schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// Clears the emergency-scan signal after the grace period.
    EmergencyScanEnd,
    /// Next software PNO scan.
    SoftwarePnoScan,
    /// Deadline for an inexact software PNO alarm.
    SoftwarePnoUpperBound,
}

/// Posted back into the message stream when a timer expires. Stale
/// generations are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

/// When a timer should fire. A window marks the alarm as inexact: it may be
/// delivered anywhere in `[delay, delay + window]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSpec {
    pub delay: Duration,
    pub window: Option<Duration>,
}

impl AlarmSpec {
    pub fn exact(delay: Duration) -> Self {
        Self {
            delay,
            window: None,
        }
    }

    pub fn inexact(delay: Duration, window: Duration) -> Self {
        Self {
            delay,
            window: Some(window),
        }
    }
}

/// Arms deferred callbacks that post [`TimerFired`] into the core's inbox.
pub trait TimerBackend: Send {
    fn arm(&mut self, fired: TimerFired, spec: AlarmSpec);
    fn disarm(&mut self, key: TimerKey);
}

/// Generation-checked timer table. A fire is accepted only for the most
/// recent arming of a key that has not been cancelled since.
pub struct Timers {
    backend: Box<dyn TimerBackend>,
    generations: HashMap<TimerKey, u64>,
    armed: HashMap<TimerKey, u64>,
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("armed", &self.armed)
            .finish()
    }
}

impl Timers {
    pub fn new(backend: Box<dyn TimerBackend>) -> Self {
        Self {
            backend,
            generations: HashMap::new(),
            armed: HashMap::new(),
        }
    }

    /// Arms `key`, replacing any earlier arming.
    pub fn arm(&mut self, key: TimerKey, spec: AlarmSpec) {
        let generation = self.generations.entry(key).or_default();
        *generation += 1;
        let fired = TimerFired {
            key,
            generation: *generation,
        };
        self.armed.insert(key, fired.generation);
        self.backend.arm(fired, spec);
    }

    pub fn cancel(&mut self, key: TimerKey) {
        if self.armed.remove(&key).is_some() {
            self.backend.disarm(key);
        }
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    /// Consumes a fire, returning false when it is stale.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.key) {
            Some(generation) if *generation == fired.generation => {
                self.armed.remove(&fired.key);
                true
            }
            _ => false,
        }
    }
}

/// Backend for cores driven without a runtime: arming is a no-op and fires
/// must be dispatched by hand.
#[derive(Debug, Default)]
pub struct ManualTimerBackend;

impl TimerBackend for ManualTimerBackend {
    fn arm(&mut self, _fired: TimerFired, _spec: AlarmSpec) {}

    fn disarm(&mut self, _key: TimerKey) {}
}
