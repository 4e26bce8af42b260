use bitflags::bitflags;

use crate::message::Mode;

bitflags! {
    /// Second flag byte of a live-status record.
    ///
    /// Bits 0-1 carry the device mode and are read through [`StatusFlags::mode`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u8 {
        const DST_ACTIVE = 0x08;
        const GATEWAY_KNOWN = 0x10;
        const PANEL_LOCKED = 0x20;
        const LINK_ERROR = 0x40;
        const BATTERY_LOW = 0x80;
    }
}

impl StatusFlags {
    pub const MODE_MASK: u8 = 0x03;

    /// Keep every bit, including the mode bits that have no named flag.
    pub fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    pub fn mode(self) -> Mode {
        Mode::from_bits(self.bits() & Self::MODE_MASK)
    }

    /// Window shutters report `0b10` in the mode bits while open.
    pub fn shutter_open(self) -> bool {
        self.bits() & Self::MODE_MASK == 0x02
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_and_mode_share_a_byte() {
        let flags = StatusFlags::from_byte(0x80 | 0x01);
        assert!(flags.contains(StatusFlags::BATTERY_LOW));
        assert!(!flags.contains(StatusFlags::LINK_ERROR));
        assert_eq!(flags.mode(), Mode::Manual);
    }

    #[test]
    fn shutter_open_bits() {
        assert!(StatusFlags::from_byte(0x12).shutter_open());
        assert!(!StatusFlags::from_byte(0x10).shutter_open());
    }
}
