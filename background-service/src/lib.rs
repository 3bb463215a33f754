pub mod clock;
pub mod notifier;
pub mod poller;
pub mod subscriber;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notifier::DesktopNotifier;
pub use poller::{AlertPoller, CycleReport, PollerConfig, SubscriptionId};
pub use subscriber::{ChannelSubscriber, StatusLog, StatusSubscriber};
