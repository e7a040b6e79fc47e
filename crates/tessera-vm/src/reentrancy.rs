//! Call stack tracking for nested contract calls.
//!
//! Each invocation carries the frames of its ancestors. The host extends the
//! stack before handing a call to the chain, which is where depth limits and
//! reentrancy are enforced, and answers `reentrance_count` queries from it.

use tessera_types::Address;

use crate::error::HostError;

/// Maximum call depth
pub const MAX_CALL_DEPTH: u32 = 64;

/// A single frame in the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Contract whose storage the frame runs against
    pub account: Address,
    /// Whether the frame runs borrowed code via `delegate_call`
    pub delegated: bool,
    /// Whether the frame may be re-entered
    pub allows_reentry: bool,
}

impl CallFrame {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            delegated: false,
            allows_reentry: true,
        }
    }
}

/// The frames above the current invocation, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<CallFrame>) -> Self {
        Self { frames }
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Get the root frame (first in stack).
    pub fn root(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    /// Non-delegated frames executing as `account`.
    pub fn count(&self, account: &Address) -> u32 {
        self.frames
            .iter()
            .filter(|frame| !frame.delegated && frame.account == *account)
            .count() as u32
    }

    /// Check if an address is in the call stack.
    pub fn contains(&self, account: &Address) -> bool {
        self.frames.iter().any(|frame| frame.account == *account)
    }

    /// The stack a callee sees: these frames plus `current`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the callee would exceed `max_depth`
    /// - the callee is already executing and either side forbids reentry
    pub fn enter(
        &self,
        current: CallFrame,
        callee: Option<&Address>,
        allow_reentry: bool,
        max_depth: u32,
    ) -> Result<CallStack, HostError> {
        // The callee frame itself counts towards the depth.
        if self.frames.len() + 2 > max_depth as usize {
            return Err(HostError::MaxCallDepthReached);
        }

        if let Some(callee) = callee {
            let mut frames = self.frames.iter().chain(std::iter::once(&current));
            let blocked = frames.any(|frame| {
                frame.account == *callee && (!allow_reentry || !frame.allows_reentry)
            });
            if blocked {
                return Err(HostError::ReentranceDenied);
            }
        }

        let mut frames = self.frames.clone();
        frames.push(CallFrame {
            allows_reentry: current.allows_reentry && allow_reentry,
            ..current
        });
        Ok(CallStack { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    #[test]
    fn test_enter_extends_stack() {
        let stack = CallStack::new();
        let nested = stack.enter(CallFrame::new(addr(1)), Some(&addr(2)), false, 64).unwrap();
        assert_eq!(nested.depth(), 1);
        assert_eq!(nested.root().unwrap().account, addr(1));
        assert!(nested.contains(&addr(1)));
        assert!(!nested.contains(&addr(2)));
    }

    #[test]
    fn test_call_depth_limit() {
        let frames = (0..3).map(|i| CallFrame::new(addr(i))).collect();
        let stack = CallStack::from_frames(frames);
        // 3 ancestors + current + callee = 5 frames.
        assert!(stack.enter(CallFrame::new(addr(9)), Some(&addr(10)), true, 5).is_ok());
        assert_eq!(
            stack.enter(CallFrame::new(addr(9)), Some(&addr(10)), true, 4),
            Err(HostError::MaxCallDepthReached)
        );
    }

    #[test]
    fn test_reentrancy_blocked() {
        let stack = CallStack::from_frames(vec![CallFrame::new(addr(1))]);
        let current = CallFrame::new(addr(2));

        assert_eq!(
            stack.enter(current, Some(&addr(1)), false, 64),
            Err(HostError::ReentranceDenied)
        );
        // Calling yourself is reentrance too.
        assert_eq!(
            stack.enter(current, Some(&addr(2)), false, 64),
            Err(HostError::ReentranceDenied)
        );
        assert!(stack.enter(current, Some(&addr(1)), true, 64).is_ok());
    }

    #[test]
    fn test_frame_that_forbids_reentry() {
        let stack = CallStack::new();
        // addr(1) calls addr(2) without ALLOW_REENTRY.
        let nested = stack.enter(CallFrame::new(addr(1)), Some(&addr(2)), false, 64).unwrap();
        // addr(2) cannot come back to addr(1), even when it allows reentry itself.
        assert_eq!(
            nested.enter(CallFrame::new(addr(2)), Some(&addr(1)), true, 64),
            Err(HostError::ReentranceDenied)
        );
    }

    #[test]
    fn test_count_skips_delegated_frames() {
        let stack = CallStack::from_frames(vec![
            CallFrame::new(addr(1)),
            CallFrame { delegated: true, ..CallFrame::new(addr(1)) },
            CallFrame::new(addr(2)),
            CallFrame::new(addr(1)),
        ]);
        assert_eq!(stack.count(&addr(1)), 2);
        assert_eq!(stack.count(&addr(2)), 1);
        assert_eq!(stack.count(&addr(3)), 0);
    }
}
