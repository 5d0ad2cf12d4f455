//! Progress reporting for large receives.

/// Listener notified while a large payload is being received.
///
/// Implemented for every `FnMut(u32) + Send` closure.
pub trait Progress: Send {
    /// Called with a percentage between 0 and 100.
    ///
    /// The transport only calls this when the value changes.
    fn notify(&mut self, percentage: u32);
}

impl<F> Progress for F
where
    F: FnMut(u32) + Send,
{
    fn notify(&mut self, percentage: u32) {
        self(percentage)
    }
}
