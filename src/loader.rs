use cliclack::{ProgressBar, spinner};

/// Terminal progress indicator drawn on stderr by a `cliclack` spinner.
///
/// [`Loader::stop`] clears the spinner line before returning, so the caller
/// can write to the terminal right away. Dropping a running loader clears
/// it too.
pub struct Loader {
    bar: Option<ProgressBar>,
}

impl Loader {
    pub fn start(message: &str) -> Self {
        let bar = spinner();
        bar.start(message);
        Self { bar: Some(bar) }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message);
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.bar.is_some()
    }

    /// Stops the spinner and waits until its line is cleared.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.clear();
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.shutdown();
    }
}
