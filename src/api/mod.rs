pub mod broker;
pub mod feed;

pub use broker::{Broker, BrokerError, BrokerPosition, PaperBroker, RestBroker};
pub use feed::{MarketFeed, RestFeed};
