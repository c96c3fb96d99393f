/// Traversal control handed to every `walk` callback.
///
/// Both signals are one-shot: once set they stay set for the node the
/// callback was invoked with, and the walk driver honors them as soon as the
/// callback returns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Walker {
    exited: bool,
    skipped: bool,
}

impl Walker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the whole walk. No further callbacks fire.
    pub fn exit(&mut self) {
        self.exited = true;
    }

    /// Do not descend into the current node's children.
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }
}
