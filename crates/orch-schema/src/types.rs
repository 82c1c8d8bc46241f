use std::fmt;
use std::str::FromStr;

use winnow::combinator::alt;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{literal, one_of, take_while};

// ---------------------------------------------------------------------------
// MacAddr
// ---------------------------------------------------------------------------

/// A 48-bit hardware address.
///
/// Parses `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff` (one separator style
/// per address). Displays in the canonical lowercase colon form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Uppercase hex with no separators, e.g. `AABBCCDDEEFF`.
    ///
    /// Used wherever a MAC participates in a table key.
    pub fn compact(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        mac_addr
            .parse(s)
            .map_err(|_| anyhow::anyhow!("invalid mac address: {s:?}"))
    }
}

fn hex_octet(input: &mut &str) -> ModalResult<u8> {
    let digits = take_while(2, |c: char| c.is_ascii_hexdigit()).parse_next(input)?;
    u8::from_str_radix(digits, 16).map_err(|_| ErrMode::Cut(ContextError::new()))
}

fn mac_addr(input: &mut &str) -> ModalResult<MacAddr> {
    let mut octets = [0u8; 6];
    octets[0] = hex_octet.parse_next(input)?;
    let sep = one_of([':', '-']).parse_next(input)?;
    octets[1] = hex_octet.parse_next(input)?;
    for slot in &mut octets[2..] {
        one_of(move |c: char| c == sep).parse_next(input)?;
        *slot = hex_octet.parse_next(input)?;
    }
    Ok(MacAddr(octets))
}

// ---------------------------------------------------------------------------
// VLAN id
// ---------------------------------------------------------------------------

/// Parse a VLAN interface name like `Vlan1000` into its id.
///
/// Valid ids are 1..=4094; `Vlan0` and `Vlan4095` are rejected.
pub fn parse_vlan(s: &str) -> anyhow::Result<u16> {
    vlan_id
        .parse(s)
        .map_err(|_| anyhow::anyhow!("invalid vlan interface: {s:?}"))
}

fn vlan_id(input: &mut &str) -> ModalResult<u16> {
    literal("Vlan").parse_next(input)?;
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let id: u32 = digits.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
    if id == 0 || id > 4094 {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    Ok(id as u16)
}

// ---------------------------------------------------------------------------
// PacketAction
// ---------------------------------------------------------------------------

/// Closed vocabulary of dataplane packet actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAction {
    Drop,
    Forward,
    Copy,
    CopyCancel,
    Trap,
    Log,
    Deny,
    Transit,
}

impl FromStr for PacketAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        packet_action
            .parse(s)
            .map_err(|_| anyhow::anyhow!("wrong packet action attribute value {s:?}"))
    }
}

fn packet_action(input: &mut &str) -> ModalResult<PacketAction> {
    alt((
        literal("drop").value(PacketAction::Drop),
        literal("forward").value(PacketAction::Forward),
        literal("copy_cancel").value(PacketAction::CopyCancel),
        literal("copy").value(PacketAction::Copy),
        literal("trap").value(PacketAction::Trap),
        literal("log").value(PacketAction::Log),
        literal("deny").value(PacketAction::Deny),
        literal("transit").value(PacketAction::Transit),
    ))
    .parse_next(input)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parse_colon() {
        let mac: MacAddr = "f4:93:9f:ef:c4:7e".parse().unwrap();
        assert_eq!(mac.octets(), [0xf4, 0x93, 0x9f, 0xef, 0xc4, 0x7e]);
        assert_eq!(mac.to_string(), "f4:93:9f:ef:c4:7e");
        assert_eq!(mac.compact(), "F4939FEFC47E");
    }

    #[test]
    fn mac_parse_dash() {
        let mac: MacAddr = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_rejects_mixed_separators() {
        assert!("aa:bb-cc:dd:ee:ff".parse::<MacAddr>().is_err());
    }

    #[test]
    fn mac_rejects_short_and_junk() {
        assert!("aa:bb:cc:dd:ee".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:fg".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn vlan_bounds() {
        assert_eq!(parse_vlan("Vlan1").unwrap(), 1);
        assert_eq!(parse_vlan("Vlan4094").unwrap(), 4094);
        assert!(parse_vlan("Vlan0").is_err());
        assert!(parse_vlan("Vlan4095").is_err());
        assert!(parse_vlan("Ethernet0").is_err());
        assert!(parse_vlan("Vlan").is_err());
    }

    #[test]
    fn packet_actions() {
        assert_eq!("drop".parse::<PacketAction>().unwrap(), PacketAction::Drop);
        assert_eq!(
            "copy_cancel".parse::<PacketAction>().unwrap(),
            PacketAction::CopyCancel
        );
        assert_eq!(
            "transit".parse::<PacketAction>().unwrap(),
            PacketAction::Transit
        );
        assert!("accept".parse::<PacketAction>().is_err());
        assert!("dropx".parse::<PacketAction>().is_err());
    }
}
