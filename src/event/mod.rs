//! Event model: decoded track events, the merged timeline, and the relay filter.

pub mod filter;
pub mod timeline;
pub mod types;

pub use filter::{is_pedal, passes_relay_filter, PEDAL_CONTROLLERS, SOFT, SOSTENUTO, SUSTAIN};
pub use timeline::Timeline;
pub use types::{ChannelEvent, EventKind, MetaEvent, RawEvent, Subtype, TimedEvent};
