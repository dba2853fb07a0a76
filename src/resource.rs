//! Per-stage descriptor bookkeeping.
//!
//! Every pipeline stage owns one [`ResourcePlan`]: the descriptor remaps to
//! apply at spawn time plus the close obligations on each side of the fork.
//! Close lists are per process side — a pipe descriptor is registered once on
//! the child side of one stage and once on the parent side of the adjacent
//! stage, and each registered copy is closed exactly once. Parent-side
//! obligations that survive an error path are released on drop, so no exit
//! path can leak a descriptor.

use std::collections::BTreeMap;
use std::os::fd::RawFd;

use nix::unistd::{close, dup, dup2};

use crate::error::ShellError;

/// Descriptor remaps and close obligations for one pipeline stage.
#[derive(Debug)]
pub struct ResourcePlan {
    remaps: BTreeMap<RawFd, RawFd>,
    child_close: Vec<RawFd>,
    parent_close: Vec<RawFd>,
    /// When false, a built-in's captured output is handed to the caller
    /// instead of being replayed through the remaps. Set by command
    /// substitution, where nothing reads the other end of the remap.
    pub replay_builtin: bool,
}

impl ResourcePlan {
    pub fn new() -> Self {
        ResourcePlan {
            remaps: BTreeMap::new(),
            child_close: Vec::new(),
            parent_close: Vec::new(),
            replay_builtin: true,
        }
    }

    /// Resolve a descriptor through the remap table; unmapped descriptors
    /// come back unchanged.
    pub fn get(&self, fd: RawFd) -> RawFd {
        self.remaps.get(&fd).copied().unwrap_or(fd)
    }

    /// Record "duplicate `to` onto `from` at spawn time". A later call for
    /// the same `from` overwrites the earlier one.
    pub fn set(&mut self, from: RawFd, to: RawFd) {
        self.remaps.insert(from, to);
    }

    /// Register a descriptor the child must close after duplication.
    pub fn add_child_close(&mut self, fd: RawFd) {
        self.child_close.push(fd);
    }

    /// Register a descriptor the parent must close after spawning.
    pub fn add_parent_close(&mut self, fd: RawFd) {
        self.parent_close.push(fd);
    }

    /// No remaps recorded.
    pub fn is_empty(&self) -> bool {
        self.remaps.is_empty()
    }

    /// Run the plan inside a forked child: apply every remap, then close the
    /// child-side list. Errors are ignored — there is nobody to report them
    /// to, and a stale entry whose descriptor was already closed in the
    /// parent is expected.
    pub(crate) fn apply_in_child(&self) {
        for (&from, &to) in &self.remaps {
            if from != to {
                let _ = dup2(to, from);
            }
        }
        for &fd in &self.child_close {
            let _ = close(fd);
        }
    }

    /// Apply the remaps inside the interpreter process itself, saving each
    /// overwritten descriptor first. The returned guard restores the saved
    /// descriptors when dropped, on every exit path. Used only when a
    /// built-in's captured output must flow through a redirect; built-ins
    /// never fork.
    pub(crate) fn redirect_streams(&mut self) -> Result<StreamGuard, ShellError> {
        let mut guard = StreamGuard { saved: Vec::new() };
        for (&from, &to) in &self.remaps {
            if from == to {
                continue;
            }
            let saved = dup(from)?;
            if let Err(e) = dup2(to, from) {
                let _ = close(saved);
                return Err(e.into());
            }
            guard.saved.push((from, saved));
        }
        // a plan is applied at most once
        self.remaps.clear();
        Ok(guard)
    }

    /// Close and clear the child-side list. Idempotent.
    pub fn close_child(&mut self) {
        for fd in self.child_close.drain(..) {
            let _ = close(fd);
        }
    }

    /// Close and clear the parent-side list. Idempotent.
    pub fn close_parent(&mut self) {
        for fd in self.parent_close.drain(..) {
            let _ = close(fd);
        }
    }

    /// Fold another plan's remaps and close lists into this one. The other
    /// plan's remaps win on conflict; flags are untouched.
    pub fn merge(&mut self, mut other: ResourcePlan) {
        self.remaps.append(&mut other.remaps);
        self.child_close.append(&mut other.child_close);
        self.parent_close.append(&mut other.parent_close);
    }

    #[cfg(test)]
    pub(crate) fn parent_closes(&self) -> &[RawFd] {
        &self.parent_close
    }

    #[cfg(test)]
    pub(crate) fn child_closes(&self) -> &[RawFd] {
        &self.child_close
    }
}

impl Drop for ResourcePlan {
    fn drop(&mut self) {
        self.close_parent();
    }
}

/// Saved standard-stream state for an in-process redirect.
///
/// Dropping the guard duplicates each saved descriptor back onto its
/// original number and closes the temporary.
pub(crate) struct StreamGuard {
    saved: Vec<(RawFd, RawFd)>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        for (from, saved) in self.saved.drain(..).rev() {
            let _ = dup2(saved, from);
            let _ = close(saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys;

    #[test]
    fn get_resolves_remaps() {
        let mut plan = ResourcePlan::new();
        assert_eq!(plan.get(7), 7);
        plan.set(7, 12);
        plan.set(7, 13); // later call overwrites
        assert_eq!(plan.get(7), 13);
        assert_eq!(plan.get(12), 12);
    }

    #[test]
    fn merge_folds_remaps_and_lists() {
        let mut a = ResourcePlan::new();
        a.set(1, 10);
        a.add_parent_close(10);

        let mut b = ResourcePlan::new();
        b.set(1, 20);
        b.set(0, 21);
        b.add_child_close(22);

        a.merge(b);
        assert_eq!(a.get(1), 20);
        assert_eq!(a.get(0), 21);
        assert_eq!(a.parent_closes(), &[10]);
        assert_eq!(a.child_closes(), &[22]);
        // the fds here are bookkeeping-only; drop cleanup ignores EBADF
    }

    #[test]
    fn pipeline_wiring_registers_each_descriptor_once_per_side() {
        // the wiring the executor performs for `a < f | b`
        let (r, w) = sys::pipe().unwrap();
        let (f, f_other) = sys::pipe().unwrap(); // f stands in for an opened file

        let mut left = ResourcePlan::new();
        left.set(0, f);
        left.add_parent_close(f);
        left.add_child_close(f);
        left.set(1, w);
        left.add_child_close(r);
        left.add_parent_close(w);

        let mut right = ResourcePlan::new();
        right.set(0, r);
        right.add_parent_close(r);
        right.add_child_close(w);

        // one pipe and one file: the parent-side obligations cover 2N + M
        // distinct descriptors with no repeats
        let mut parent_side: Vec<RawFd> = Vec::new();
        parent_side.extend_from_slice(left.parent_closes());
        parent_side.extend_from_slice(right.parent_closes());
        parent_side.sort();
        let mut deduped = parent_side.clone();
        deduped.dedup();
        assert_eq!(parent_side.len(), 3);
        assert_eq!(parent_side, deduped);

        // each pipe descriptor appears once per side, never twice on one
        assert!(left.child_closes().contains(&r));
        assert!(right.parent_closes().contains(&r));
        assert!(left.parent_closes().contains(&w));
        assert!(right.child_closes().contains(&w));

        drop(left);
        drop(right);
        let _ = close(f_other);
    }

    #[test]
    fn redirect_streams_applies_and_guard_restores() {
        let (main_r, main_w) = sys::pipe().unwrap();
        let (side_r, side_w) = sys::pipe().unwrap();

        let mut plan = ResourcePlan::new();
        plan.set(main_w, side_w);

        {
            let _guard = plan.redirect_streams().unwrap();
            sys::write_all(main_w, b"redirected").unwrap();
        }

        // guard dropped: main_w talks to its own pipe again
        let _ = close(side_w);
        assert_eq!(sys::read_all(side_r).unwrap(), "redirected");
        sys::write_all(main_w, b"restored").unwrap();
        let _ = close(main_w);
        assert_eq!(sys::read_all(main_r).unwrap(), "restored");

        let _ = close(main_r);
        let _ = close(side_r);
    }

    #[test]
    fn close_lists_are_idempotent() {
        let (r, w) = sys::pipe().unwrap();
        let mut plan = ResourcePlan::new();
        plan.add_parent_close(r);
        plan.add_parent_close(w);
        plan.close_parent();
        plan.close_parent(); // second call is a no-op
        assert!(plan.parent_closes().is_empty());
    }
}
