//! Runtime invariant checks with contract-test support
//!
//! Production code asserts the lifecycle invariants it relies on; tests then
//! verify with [`contract_test`] that the paths they drove actually checked
//! them.
//!
//! ```rust,ignore
//! use crabsnap::assert_invariant;
//!
//! assert_invariant!(
//!     self.binding.is_none(),
//!     "at most one stream binding",
//!     "StreamController::start"
//! );
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and record that it was checked.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().insert(message.to_string());
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Check that the listed invariants were asserted on this thread.
///
/// # Panics
/// Panics naming every invariant that was never checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let log = INVARIANT_LOG.with(|log| log.borrow().clone());

    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !log.contains(*invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_invariant_satisfies_contract() {
        clear_invariant_log();
        crate::assert_invariant!(true, "at most one stream binding");
        contract_test("binding", &["at most one stream binding"]);
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_unchecked_invariant_fails_contract() {
        clear_invariant_log();
        contract_test("nothing checked", &["stable and reconnecting are exclusive"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [ctx]")]
    fn test_violation_panics_with_context() {
        crate::assert_invariant!(false, "always fails", "ctx");
    }
}
