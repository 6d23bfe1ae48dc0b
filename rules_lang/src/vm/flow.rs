//! Control-flow results of statement evaluation

/// What a statement's evaluation asks its enclosing block to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the next statement
    Proceed,
    /// Re-evaluate the same statement; the shell uses this to repeat a
    /// submission without re-analyzing it
    Rerun,
    /// Leave the innermost loop, or the one with the matching label
    Break(Option<String>),
    /// Re-enter the innermost loop, or the one with the matching label
    Continue(Option<String>),
    /// Unwind to the enclosing function (or rule) boundary
    Return,
}

impl Flow {
    /// Check if a `break`/`continue` label targets a loop with this label
    pub fn matches_loop(target: &Option<String>, label: &Option<String>) -> bool {
        match target {
            None => true,
            Some(wanted) => label.as_deref() == Some(wanted.as_str()),
        }
    }
}
