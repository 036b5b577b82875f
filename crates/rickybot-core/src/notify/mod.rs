//! Live notification fan-out.
//!
//! [`broker::NotificationBroker`] keeps the set of live subscribers and
//! publishes tag-filtered payloads to them without ever blocking.
//! [`delivery::deliver`] drains one subscription into a transport.

pub mod broker;
pub mod delivery;

pub use broker::{NotificationBroker, Subscription};
pub use delivery::{CloseReason, DeliveryEnd, NotificationSink, deliver};
