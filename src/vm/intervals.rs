//! Interval timers and pause state

use crate::error::VmError;
use crate::value::{AvmString, Value};

use super::VirtualMachine;

/// A repeating callback registered with `setInterval`
#[derive(Debug, Clone)]
pub struct IntervalState {
    /// Clock time of the last activation (or of creation)
    pub last_fire: u64,
    pub period: u64,
    pub callable: Value,
    pub this_obj: Value,
    pub args: Vec<Value>,
}

impl VirtualMachine {
    /// Register (or replace) an interval. It first fires `duration_ms` after
    /// the last tick.
    pub fn create_interval(
        &mut self,
        name: impl Into<AvmString>,
        duration_ms: u64,
        callable: Value,
        this_obj: Value,
        args: Vec<Value>,
    ) {
        let state = IntervalState {
            last_fire: self.last_tick,
            period: duration_ms,
            callable,
            this_obj,
            args,
        };
        self.intervals.insert(name.into(), state);
    }

    /// Fresh interval name for `setInterval`
    pub(crate) fn next_interval_name(&mut self) -> (u32, AvmString) {
        let id = self.next_interval_id;
        self.next_interval_id = self.next_interval_id.wrapping_add(1);
        (id, AvmString::from(id.to_string()))
    }

    pub fn clear_interval(&mut self, name: &str) -> bool {
        self.intervals.shift_remove(name).is_some()
    }

    pub fn interval(&self, name: &str) -> Option<&IntervalState> {
        self.intervals.get(name)
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Queue one activation per interval whose period has elapsed by `now`,
    /// then run everything queued. Does nothing while paused.
    pub fn update_intervals(&mut self, now: u64) -> Result<(), VmError> {
        if self.paused {
            return Ok(());
        }
        let mut due = Vec::new();
        for state in self.intervals.values_mut() {
            if now.saturating_sub(state.last_fire) >= state.period {
                state.last_fire = now;
                due.push((state.callable.clone(), state.this_obj.clone(), state.args.clone()));
            }
        }
        for (callable, this, args) in due {
            self.enqueue_call(&callable, &this, &args)?;
        }
        self.last_tick = now;
        self.execute_until_empty()
    }

    /// `update_intervals` at the time provider's current time
    pub fn tick(&mut self) -> Result<(), VmError> {
        let now = self.clock.now_millis();
        self.update_intervals(now)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Pause and resume
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.pause_started = Some(self.clock.now_millis());
        }
    }

    /// Resume, moving the tick reference and every interval forward by the
    /// time spent paused
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let Some(started) = self.pause_started.take() else {
            return;
        };
        let paused_for = self.clock.now_millis().saturating_sub(started);
        self.last_tick = self.last_tick.saturating_add(paused_for);
        for state in self.intervals.values_mut() {
            state.last_fire = state.last_fire.saturating_add(paused_for);
        }
    }
}
