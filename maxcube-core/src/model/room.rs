use serde::Serialize;

use crate::message::RfAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: u8,
    pub name: String,
    /// Group address the gateway uses for the whole room.
    pub rf_address: RfAddress,
    /// Members, in metadata order.
    pub devices: Vec<RfAddress>,
}

impl Room {
    /// Stand-in for a room id the metadata does not list.
    pub(crate) fn placeholder(id: u8) -> Self {
        Self {
            id,
            name: format!("Room {id}"),
            rf_address: RfAddress::new([0, 0, 0]),
            devices: Vec::new(),
        }
    }

    pub fn contains(&self, rf_address: RfAddress) -> bool {
        self.devices.contains(&rf_address)
    }
}
