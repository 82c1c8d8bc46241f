use crate::consumer::Consumer;

/// One reconciling daemon as seen by the event loop.
///
/// The loop owns one [`Consumer`] per entry of [`tables`](Self::tables) and
/// hands each to [`drain`](Self::drain) when its source signalled or on the
/// periodic tick. All work is synchronous; the agent must not block.
pub trait OrchAgent: Send {
    fn name(&self) -> &str;

    /// Inbound table names, in source-index order.
    fn tables(&self) -> &[&'static str];

    /// Process the pending entries of one source buffer. Entries the agent
    /// cannot handle yet are retained inside the consumer and retried on the
    /// next drain.
    fn drain(&mut self, consumer: &mut Consumer);
}
