//! Two-step confirmation guard placed in front of every remote mutation.
//!
//! `stage` opens a prompt and parks an intent, `confirm` closes the prompt and hands the
//! intent back exactly once, `cancel` closes it and drops the intent. The gate knows
//! nothing about what the intent means.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub body: String,
}

impl Prompt {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug)]
pub struct ConfirmGate<A> {
    pending: Option<(Prompt, A)>,
}

impl<A> Default for ConfirmGate<A> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<A> ConfirmGate<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the prompt. A previously staged intent is discarded.
    pub fn stage(&mut self, prompt: Prompt, intent: A) {
        self.pending = Some((prompt, intent));
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.pending.as_ref().map(|(p, _)| p)
    }

    pub fn intent(&self) -> Option<&A> {
        self.pending.as_ref().map(|(_, a)| a)
    }

    pub fn confirm(&mut self) -> Option<A> {
        self.pending.take().map(|(_, intent)| intent)
    }

    /// Confirm and run `commit` on the staged intent. Returns `None` when nothing was staged.
    pub fn confirm_with<R>(&mut self, commit: impl FnOnce(A) -> R) -> Option<R> {
        self.confirm().map(commit)
    }

    /// Close the prompt without committing. Returns whether anything was staged.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
