use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result},
};
use tokio::net::unix::OwnedWriteHalf;

pub type Subscriber = HashMap<SubscriptionID, HashMap<u32, OwnedWriteHalf>>;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum SubscriptionID {
    State,
    Connection,
}

impl Display for SubscriptionID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            SubscriptionID::State => write!(f, "State"),
            SubscriptionID::Connection => write!(f, "Connection"),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ClientInfo {
    pub subscription_id: SubscriptionID,
    pub process_id: u32,
}

impl ClientInfo {
    pub fn new(process_id: u32, subscription_id: SubscriptionID) -> Self {
        ClientInfo {
            subscription_id,
            process_id,
        }
    }
}
