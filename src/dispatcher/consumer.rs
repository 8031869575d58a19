use crate::channel::View;
use crate::dispatcher::payload::{Envelope, PayloadType};

/// MessageConsumer receives every payload of its declared type, and every view change, from the
/// dispatcher's receive loop.
///
/// Calls are sequential and follow the group's total order, so a consumer sees messages and views
/// in exactly the order every other member sees them. Implementations must not block: anything
/// long running belongs on another task.
pub trait MessageConsumer: Send + Sync {
    fn payload_type(&self) -> PayloadType;

    fn consume(&self, envelope: &Envelope);

    /// Called once for the view current at registration, then once per view change.
    fn view_accepted(&self, _view: &View) {}

    /// Called once when the dispatcher stops delivering to this consumer.
    fn detached(&self) {}
}
