//! Stack growth for deeply recursive compiler and executor paths.
//!
//! Expression lowering recurses once per nesting level and every interpreted
//! call recurses once in the host. Wrapping those paths in
//! [`ensure_sufficient_stack`] keeps deep programs from overflowing the host
//! thread's stack.
//!
//! - **Red zone**: 128KB; below this the stack is grown
//! - **Growth size**: 2MB per segment
//!
//! On wasm targets the closure is called directly.

const RED_ZONE: usize = 128 * 1024;

const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// Run `f` directly; wasm manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Remaining stack in bytes, if the platform can tell.
#[cfg(not(target_arch = "wasm32"))]
pub fn remaining_stack() -> Option<usize> {
    stacker::remaining_stack()
}

#[cfg(target_arch = "wasm32")]
pub fn remaining_stack() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nest(depth: u32) -> u32 {
        ensure_sufficient_stack(|| if depth == 0 { 0 } else { nest(depth - 1) + 1 })
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        assert_eq!(nest(200_000), 200_000);
    }

    #[test]
    fn test_passes_results_through() {
        let r: Result<u8, String> = ensure_sufficient_stack(|| Ok(7));
        assert_eq!(r, Ok(7));
    }

    #[test]
    fn test_remaining_stack_is_reported() {
        if let Some(bytes) = remaining_stack() {
            assert!(bytes > 0);
        }
    }
}
