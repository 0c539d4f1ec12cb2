use crate::jobs::DEFAULT_CAPACITY;

/// Session settings chosen at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Text shown before each line is read.
    pub prompt: String,
    /// Most background processes tracked at once.
    pub capacity: usize,
    /// Keep submitted lines in the line editor's history.
    pub history: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: String::from(": "),
            capacity: DEFAULT_CAPACITY,
            history: true,
        }
    }
}
