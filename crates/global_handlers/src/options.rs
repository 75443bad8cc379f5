/// Which hooks [`crate::install`] attaches.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InstallOptions {
    /// Capture panics through the process panic hook.
    pub onerror: bool,
    /// Capture values passed to [`crate::report_unhandled_rejection`].
    pub onunhandledrejection: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            onerror: true,
            onunhandledrejection: true,
        }
    }
}

impl InstallOptions {
    pub fn onerror(mut self, enable: bool) -> Self {
        self.onerror = enable;
        self
    }

    pub fn onunhandledrejection(mut self, enable: bool) -> Self {
        self.onunhandledrejection = enable;
        self
    }
}
