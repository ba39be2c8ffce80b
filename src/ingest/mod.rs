//! Market data ingest.
//!
//! Feed tasks ([`spawn_feed`]) normalize venue traffic into [`Tick`]s and
//! forward them to the engine. The engine runs every tick through the
//! [`Sequencer`] and tracks connection state in [`VenueHealth`].
//!
//! [`Tick`]: crate::domain::Tick

mod health;
mod reconnecting;
mod sequencer;
mod spawn;

pub use health::{DegradedReason, VenueHealth, VenueStatus};
pub use reconnecting::ReconnectingFeed;
pub use sequencer::{Admission, Sequencer};
pub use spawn::{spawn_feed, VenueEvent};
