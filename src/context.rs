//! Path context stack.
//!
//! Route declarations are usually grouped under a common URL prefix
//! (`/account`, `/account/keys`, ...). Instead of repeating the prefix on
//! every route, registration code opens a context and every path declared
//! inside it is resolved against the open prefixes.
//!
//! The stack is owned by the [`Registrar`](crate::Registrar) and only exists
//! while routes are being registered. Prefixes are pushed to the front, so
//! the most recently entered prefix comes first in the resolved path:
//!
//! ```text
//! enter("/a"); enter("/b"); enter("/c");
//! current_path("/s") == "/c/b/a/s"
//! ```

use std::collections::VecDeque;

/// Ordered URL prefixes, most recently entered first.
#[derive(Debug, Default)]
pub struct PathStack {
    entries: VecDeque<String>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `prefix` to the front of the stack.
    pub fn enter(&mut self, prefix: impl Into<String>) {
        self.entries.push_front(prefix.into());
    }

    /// Pops the most recently entered prefix.
    pub fn exit(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `suffix` against every open prefix.
    pub fn current_path(&self, suffix: &str) -> String {
        let mut path = String::with_capacity(
            self.entries.iter().map(String::len).sum::<usize>() + suffix.len(),
        );
        for prefix in &self.entries {
            path.push_str(prefix);
        }
        path.push_str(suffix);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_returns_suffix() {
        let stack = PathStack::new();
        assert_eq!(stack.current_path("/login"), "/login");
        assert_eq!(stack.current_path(""), "");
    }

    #[test]
    fn nested_prefixes_resolve_most_recent_first() {
        let mut stack = PathStack::new();
        stack.enter("a");
        stack.enter("b");
        stack.enter("c");
        assert_eq!(stack.current_path("s"), "cbas");
    }

    #[test]
    fn exit_removes_most_recent_prefix() {
        let mut stack = PathStack::new();
        stack.enter("/outer");
        stack.enter("/inner");
        assert_eq!(stack.exit().as_deref(), Some("/inner"));
        assert_eq!(stack.current_path("/x"), "/outer/x");
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn balanced_pairs_leave_stack_empty() {
        let mut stack = PathStack::new();
        for n in 0..5 {
            stack.enter(format!("/{n}"));
        }
        for _ in 0..5 {
            stack.exit();
        }
        assert!(stack.is_empty());
        assert_eq!(stack.exit(), None);
    }
}
