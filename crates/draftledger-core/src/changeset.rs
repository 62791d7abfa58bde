//! Debounced change accumulation.
//!
//! [`ChangeSet`] accumulates pending field edits and decides when the
//! session should flush them into a single commit. It is a passive state
//! machine: it reads time through an injected [`Clock`] and reports timer
//! decisions as [`TimerAction`] values, while the actual sleeping and the
//! async commit callback stay with the session. That keeps every rule in
//! here testable without a runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use draftledger_model::{DraftPatch, PluginId};

use crate::clock::Clock;

/// Idle interval: a commit fires this long after the edit that armed it.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(10);

/// Coalescing window: edits arriving within this window of the last arm
/// keep the existing timer instead of restarting it.
pub const COALESCE_WINDOW: Duration = Duration::from_secs(2);

/// Debounce intervals.
///
/// The idle interval must exceed the coalescing window, otherwise every
/// edit re-arms and the debounce degenerates to per-edit commits.
#[derive(Debug, Clone, Copy)]
pub struct DebouncePolicy {
    /// Quiet period before a commit fires.
    pub idle: Duration,
    /// Window within which repeated edits keep the armed timer.
    pub coalesce: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            idle: IDLE_INTERVAL,
            coalesce: COALESCE_WINDOW,
        }
    }
}

impl DebouncePolicy {
    /// Creates a policy with the given intervals.
    #[must_use]
    pub fn new(idle: Duration, coalesce: Duration) -> Self {
        debug_assert!(idle > coalesce, "idle interval must exceed coalescing window");
        Self { idle, coalesce }
    }
}

/// What the caller must do with its debounce timer after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Cancel any existing timer and arm a new one for this deadline.
    Arm(Instant),
    /// A recently armed timer is still running; let it fire.
    AlreadyArmed,
}

/// Token for one in-flight commit.
///
/// Captures the edit generation at `begin_commit` time so completion can
/// tell whether new edits arrived while the write was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitToken {
    generation: u64,
}

/// Accumulator of not-yet-committed field edits with debounced flush.
pub struct ChangeSet {
    pending: DraftPatch,
    dirty: bool,
    armed_at: Option<Instant>,
    generation: u64,
    in_flight: bool,
    clock: Arc<dyn Clock>,
    policy: DebouncePolicy,
}

impl std::fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSet")
            .field("dirty", &self.dirty)
            .field("armed_at", &self.armed_at)
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: DebouncePolicy) -> Self {
        Self {
            pending: DraftPatch::default(),
            dirty: false,
            armed_at: None,
            generation: 0,
            in_flight: false,
            clock,
            policy,
        }
    }

    /// Merges `patch` into the pending edits (last-write-wins per field),
    /// marks the set dirty, and applies the debounce policy.
    ///
    /// If a timer is armed and was armed less than the coalescing window
    /// ago, the existing timer is kept; it will fire slightly early
    /// relative to a full idle period, on purpose, so a burst of
    /// keystrokes does not restart the timer on every edit. Otherwise the
    /// caller must cancel any existing timer and arm a new one for the
    /// returned deadline.
    pub fn add(&mut self, patch: DraftPatch) -> TimerAction {
        self.pending.merge(patch);
        self.dirty = true;
        self.generation += 1;

        let now = self.clock.now();
        match self.armed_at {
            Some(armed_at) if !self.clock.has_elapsed(armed_at, self.policy.coalesce) => {
                TimerAction::AlreadyArmed
            }
            _ => {
                self.armed_at = Some(now);
                TimerAction::Arm(now + self.policy.idle)
            }
        }
    }

    /// Adds a plugin metadata edit under its namespaced key.
    pub fn add_metadata(&mut self, plugin_id: PluginId, value: serde_json::Value) -> TimerAction {
        self.add(DraftPatch::new().metadata(plugin_id, value))
    }

    /// Returns `true` iff uncommitted changes exist.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns `true` while a debounce timer is considered armed.
    #[must_use]
    pub const fn is_timer_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Returns the pending edits.
    #[must_use]
    pub const fn pending(&self) -> &DraftPatch {
        &self.pending
    }

    /// Disarms the timer without discarding dirty state.
    ///
    /// Used during teardown to stop background activity without implying
    /// the changes were saved.
    pub fn cancel_commit(&mut self) {
        self.armed_at = None;
    }

    /// Starts a commit, if one is warranted.
    ///
    /// Returns `None` when the set is clean or a commit is already in
    /// flight (the dirty flag stays set in the latter case, so the edits
    /// are picked up by a later flush). Otherwise disarms the timer and
    /// returns a token the caller hands back to [`Self::finish_commit`].
    pub fn begin_commit(&mut self) -> Option<CommitToken> {
        if !self.dirty || self.in_flight {
            return None;
        }
        self.armed_at = None;
        self.in_flight = true;
        Some(CommitToken {
            generation: self.generation,
        })
    }

    /// Completes a commit started with [`Self::begin_commit`].
    ///
    /// On success, the dirty flag clears only if no edit arrived since the
    /// token was issued; the in-flight payload did not carry later edits,
    /// so they must stay pending. On failure the dirty flag stays set and
    /// a future edit or explicit commit retries; no retry happens here.
    pub fn finish_commit(&mut self, token: CommitToken, success: bool) {
        self.in_flight = false;
        if success && token.generation == self.generation {
            self.dirty = false;
            self.pending = DraftPatch::default();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn changeset(clock: &Arc<MockClock>) -> ChangeSet {
        ChangeSet::new(Arc::clone(clock) as Arc<dyn Clock>, DebouncePolicy::default())
    }

    fn subject(s: &str) -> DraftPatch {
        DraftPatch::new().subject(s)
    }

    #[test]
    fn first_add_arms_for_idle_interval() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        let start = clock.now();
        let action = cs.add(subject("a"));

        assert_eq!(action, TimerAction::Arm(start + IDLE_INTERVAL));
        assert!(cs.is_dirty());
        assert!(cs.is_timer_armed());
    }

    #[test]
    fn add_inside_coalescing_window_keeps_timer() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cs.add(subject("b")), TimerAction::AlreadyArmed);

        clock.advance(Duration::from_millis(900));
        assert_eq!(cs.add(subject("c")), TimerAction::AlreadyArmed);
    }

    #[test]
    fn add_after_coalescing_window_rearms() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        clock.advance(Duration::from_secs(3));

        let rearmed_at = clock.now();
        assert_eq!(
            cs.add(subject("b")),
            TimerAction::Arm(rearmed_at + IDLE_INTERVAL)
        );
    }

    #[test]
    fn pending_is_last_write_wins() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("Lunch?"));
        cs.add(subject("Lunch tomorrow?"));

        assert_eq!(cs.pending().subject.as_deref(), Some("Lunch tomorrow?"));
    }

    #[test]
    fn metadata_add_is_namespaced() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add_metadata(PluginId::new("tracker"), serde_json::json!(true));
        assert!(cs.is_dirty());
        assert!(cs.pending().metadata.contains_key(&PluginId::new("tracker")));
        assert!(cs.pending().subject.is_none());
    }

    #[test]
    fn begin_commit_on_clean_set_is_none() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);
        assert!(cs.begin_commit().is_none());
    }

    #[test]
    fn successful_commit_clears_dirty() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        let token = cs.begin_commit().unwrap();
        assert!(!cs.is_timer_armed());

        cs.finish_commit(token, true);
        assert!(!cs.is_dirty());
        assert!(cs.pending().is_empty());
    }

    #[test]
    fn failed_commit_keeps_dirty() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        let token = cs.begin_commit().unwrap();
        cs.finish_commit(token, false);

        assert!(cs.is_dirty());
        assert!(cs.begin_commit().is_some());
    }

    #[test]
    fn edit_during_flight_stays_dirty_after_success() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        let token = cs.begin_commit().unwrap();
        cs.add(subject("b"));
        cs.finish_commit(token, true);

        assert!(cs.is_dirty());
        assert_eq!(cs.pending().subject.as_deref(), Some("b"));
    }

    #[test]
    fn only_one_commit_in_flight() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        let _token = cs.begin_commit().unwrap();
        assert!(cs.begin_commit().is_none());

        cs.add(subject("b"));
        assert!(cs.begin_commit().is_none());
    }

    #[test]
    fn cancel_commit_keeps_dirty() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        cs.cancel_commit();

        assert!(cs.is_dirty());
        assert!(!cs.is_timer_armed());
    }

    #[test]
    fn timer_rearms_after_commit_disarmed_it() {
        let clock = MockClock::shared();
        let mut cs = changeset(&clock);

        cs.add(subject("a"));
        let token = cs.begin_commit().unwrap();
        cs.finish_commit(token, true);

        // Next edit arms a fresh timer even though the previous arm was
        // within the coalescing window.
        let now = clock.now();
        assert_eq!(cs.add(subject("b")), TimerAction::Arm(now + IDLE_INTERVAL));
    }
}
