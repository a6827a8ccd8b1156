use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const COPIED_WINDOW: Duration = Duration::from_secs(2);

/// System clipboard, opened on first use.
#[derive(Default)]
pub struct Clipboard {
    inner: Option<arboard::Clipboard>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copy(&mut self, text: &str) -> anyhow::Result<()> {
        if self.inner.is_none() {
            self.inner = Some(arboard::Clipboard::new()?);
        }
        if let Some(clipboard) = self.inner.as_mut() {
            clipboard.set_text(text.to_string())?;
        }
        Ok(())
    }
}

/// The transient "copied" marker shown next to a message.
///
/// Every copy schedules its own revert and reverts are never cancelled, so
/// an earlier copy's timer may clear a later copy's marker.
#[derive(Debug, Default)]
pub struct CopyMarker {
    copied: Option<String>,
    reverts: VecDeque<Instant>,
}

impl CopyMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: &str, now: Instant) {
        self.copied = Some(id.to_string());
        self.reverts.push_back(now + COPIED_WINDOW);
    }

    /// Fire every revert that is due at `now`.
    pub fn tick(&mut self, now: Instant) {
        while self.reverts.front().is_some_and(|due| *due <= now) {
            self.reverts.pop_front();
            self.copied = None;
        }
    }

    pub fn is_copied(&self, id: &str) -> bool {
        self.copied.as_deref() == Some(id)
    }
}
