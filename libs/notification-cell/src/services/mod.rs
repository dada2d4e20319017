pub mod dispatcher;
pub mod registry;
pub mod sequencer;
pub mod store;

pub use dispatcher::NotificationDispatcher;
pub use registry::{ChannelHandle, ConnectionRegistry};
pub use sequencer::{DeliveryGuard, DeliverySequencer};
pub use store::{InMemoryNotificationRepository, NotificationRepository, SupabaseNotificationRepository};
