use crate::error::ShellError;
use nix::unistd::Pid;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Number of background processes tracked when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 256;

/// Outcome of the most recent foreground command.
///
/// Exactly one of "exit code" or "terminating signal" is meaningful at a time,
/// so the two are variants rather than separate fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundStatus {
    Exited(i32),
    Signaled(i32),
}

impl Default for ForegroundStatus {
    fn default() -> Self {
        ForegroundStatus::Exited(0)
    }
}

impl fmt::Display for ForegroundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForegroundStatus::Exited(code) => write!(f, "exited with status {code}"),
            ForegroundStatus::Signaled(sig) => write!(f, "died by signal {sig}"),
        }
    }
}

/// Registry of live background processes plus the last foreground result.
///
/// Entries are kept in launch order until the reaper swap-removes them, after
/// which the order of the remaining entries is unspecified.
///
/// The background toggle lives in an atomic shared with the terminal-stop
/// handler; every other field is touched only by the main loop.
#[derive(Debug)]
pub struct JobTable {
    entries: Vec<Pid>,
    capacity: usize,
    last: ForegroundStatus,
    background_allowed: &'static AtomicBool,
}

impl JobTable {
    /// Create a table bound to the process-wide background toggle.
    pub fn new(capacity: usize) -> Self {
        Self::with_flag(capacity, crate::signals::background_flag())
    }

    /// Create a table bound to an explicit toggle.
    pub fn with_flag(capacity: usize, background_allowed: &'static AtomicBool) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            last: ForegroundStatus::default(),
            background_allowed,
        }
    }

    /// Track a freshly spawned background process.
    ///
    /// Returns the slot index the process was stored at. When the table is
    /// full nothing is modified.
    pub fn add(&mut self, pid: Pid) -> Result<usize, ShellError> {
        if self.is_full() {
            return Err(ShellError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.entries.push(pid);
        Ok(self.entries.len() - 1)
    }

    /// Remove the first entry equal to `pid`. Returns whether one was found.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.entries.iter().position(|p| *p == pid) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the entry at `index`, moving the last entry into its slot.
    pub(crate) fn swap_remove(&mut self, index: usize) -> Pid {
        self.entries.swap_remove(index)
    }

    /// Empty the table, handing back every tracked process in slot order.
    pub(crate) fn take_all(&mut self) -> Vec<Pid> {
        std::mem::take(&mut self.entries)
    }

    pub fn record_foreground_result(&mut self, value: i32, is_signal: bool) {
        self.last = if is_signal {
            ForegroundStatus::Signaled(value)
        } else {
            ForegroundStatus::Exited(value)
        };
    }

    pub fn last_status(&self) -> ForegroundStatus {
        self.last
    }

    /// Flip the background toggle and return its new value.
    pub fn toggle_background_allowed(&self) -> bool {
        !self.background_allowed.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn background_allowed(&self) -> bool {
        self.background_allowed.load(Ordering::SeqCst)
    }

    pub fn pids(&self) -> &[Pid] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<Pid> {
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_flag() -> &'static AtomicBool {
        Box::leak(Box::new(AtomicBool::new(true)))
    }

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn test_add_returns_launch_order_slots() {
        let mut table = JobTable::with_flag(4, local_flag());
        assert_eq!(table.add(pid(100)).unwrap(), 0);
        assert_eq!(table.add(pid(101)).unwrap(), 1);
        assert_eq!(table.add(pid(102)).unwrap(), 2);
        assert_eq!(table.pids(), &[pid(100), pid(101), pid(102)]);
    }

    #[test]
    fn test_add_at_capacity_is_rejected_without_mutation() {
        let mut table = JobTable::with_flag(2, local_flag());
        table.add(pid(10)).unwrap();
        table.add(pid(11)).unwrap();

        let err = table.add(pid(12)).unwrap_err();
        assert!(matches!(err, ShellError::CapacityExceeded { capacity: 2 }));
        assert_eq!(table.pids(), &[pid(10), pid(11)]);
        assert!(table.is_full());
    }

    #[test]
    fn test_count_tracks_adds_minus_removals() {
        let mut table = JobTable::with_flag(DEFAULT_CAPACITY, local_flag());
        for raw in 1..=20 {
            table.add(pid(raw)).unwrap();
        }
        for raw in [3, 7, 11, 19] {
            assert!(table.remove(pid(raw)));
        }
        assert_eq!(table.len(), 16);
        assert!(!table.pids().contains(&pid(7)));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut table = JobTable::with_flag(4, local_flag());
        table.add(pid(5)).unwrap();
        assert!(!table.remove(pid(6)));
        assert_eq!(table.pids(), &[pid(5)]);
    }

    #[test]
    fn test_remove_only_first_match() {
        let mut table = JobTable::with_flag(4, local_flag());
        table.add(pid(5)).unwrap();
        table.add(pid(5)).unwrap();
        assert!(table.remove(pid(5)));
        assert_eq!(table.pids(), &[pid(5)]);
    }

    #[test]
    fn test_swap_remove_moves_last_into_slot() {
        let mut table = JobTable::with_flag(4, local_flag());
        for raw in [1, 2, 3] {
            table.add(pid(raw)).unwrap();
        }
        assert_eq!(table.swap_remove(0), pid(1));
        assert_eq!(table.pids(), &[pid(3), pid(2)]);
    }

    #[test]
    fn test_foreground_result_keeps_one_meaningful_value() {
        let mut table = JobTable::with_flag(4, local_flag());
        assert_eq!(table.last_status(), ForegroundStatus::Exited(0));

        table.record_foreground_result(2, true);
        assert_eq!(table.last_status().to_string(), "died by signal 2");

        table.record_foreground_result(3, false);
        assert_eq!(table.last_status().to_string(), "exited with status 3");
    }

    #[test]
    fn test_toggle_twice_restores_value() {
        let table = JobTable::with_flag(4, local_flag());
        assert!(table.background_allowed());
        assert!(!table.toggle_background_allowed());
        assert!(!table.background_allowed());
        assert!(table.toggle_background_allowed());
        assert!(table.background_allowed());
    }

    #[test]
    fn test_take_all_empties_table() {
        let mut table = JobTable::with_flag(4, local_flag());
        table.add(pid(1)).unwrap();
        table.add(pid(2)).unwrap();
        assert_eq!(table.take_all(), vec![pid(1), pid(2)]);
        assert!(table.is_empty());
    }
}
