//! Well-known item ids.
//!
//! Bootloaders and factory tooling agree on these ids for per-device data.
//! Any other 16-bit id is free for private use.

/// Device serial number.
pub const SERIAL_NUMBER: u16 = 1;
/// Wi-Fi MAC address.
pub const WIFI_MAC: u16 = 2;
/// Ethernet MAC address.
pub const LAN_MAC: u16 = 3;
/// Bluetooth MAC address.
pub const BT_MAC: u16 = 4;

/// Human-readable name of a well-known id.
pub fn name(id: u16) -> Option<&'static str> {
    match id {
        SERIAL_NUMBER => Some("serial-number"),
        WIFI_MAC => Some("wifi-mac"),
        LAN_MAC => Some("lan-mac"),
        BT_MAC => Some("bt-mac"),
        _ => None,
    }
}

/// Parses a well-known name, or a decimal or `0x` hex id.
pub fn parse(text: &str) -> Option<u16> {
    let text = text.trim();
    match text {
        "serial-number" => Some(SERIAL_NUMBER),
        "wifi-mac" => Some(WIFI_MAC),
        "lan-mac" => Some(LAN_MAC),
        "bt-mac" => Some(BT_MAC),
        _ => match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for id in [SERIAL_NUMBER, WIFI_MAC, LAN_MAC, BT_MAC] {
            assert_eq!(parse(name(id).unwrap()), Some(id));
        }
        assert_eq!(name(0x100), None);
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse("17"), Some(17));
        assert_eq!(parse("0x1f"), Some(0x1F));
        assert_eq!(parse(" 0XFFFF "), Some(0xFFFF));
        assert_eq!(parse("0x10000"), None);
        assert_eq!(parse("-1"), None);
        assert_eq!(parse("mac"), None);
    }
}
