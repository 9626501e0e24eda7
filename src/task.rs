use tokio::task::JoinHandle;

/// Holds at most one spawned task. Replacing or dropping the slot aborts
/// whatever task it held.
#[derive(Debug, Default)]
pub(crate) struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn replace(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.handle.replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&mut self) {
        if let Some(previous) = self.handle.take() {
            previous.abort();
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
