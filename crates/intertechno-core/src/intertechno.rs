use crate::bits::hex_value;
use crate::{DecodeError, EncodeError};
use std::sync::OnceLock;
use std::time::SystemTime;

/// Addresses with any of these bits set are framed in the large form.
pub const LARGE_ADDRESS_MASK: u32 = 0xFFFF_FC00;

/// Marker character that starts every received Intertechno line.
pub const LINE_MARKER: char = 'i';

/// Prefix of a transmit command line.
pub const TRANSMIT_MARKER: &str = "is";

/// Longest wire string a radio frame may carry.
pub const MAX_WIRE_LEN: usize = 128;

const MIN_LINE_LEN: usize = 7;
const SMALL_BODY_LEN: usize = 8;
const LARGE_BODY_LEN: usize = 18;
const LARGE_ADDRESS_SYMBOLS: usize = 13;

/// Symbol alphabet used for the address bits of a transmitted wire string.
///
/// The standard form writes `'1'`/`'0'`. Older CUL firmware expects the
/// small-form address bits as tri-state `'F'`/`'0'` instead; the bit
/// meaning is identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum WireDialect {
    #[default]
    Standard,
    CulLegacy,
}

/// Which received line layout a packet was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineForm {
    /// 8 symbols: 4 address symbols, one payload symbol, filler, RSSI.
    Small,
    /// 18 symbols: 13 address symbols, one payload symbol, 2 channel symbols, RSSI.
    Large,
}

/// An Intertechno remote-switch datagram.
///
/// Built either from a received line ([`IntertechnoPacket::decode_line`]) or
/// from an address and payload for transmission ([`IntertechnoPacket::new`]).
/// The wire string is computed on first use and cached.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntertechnoPacket {
    sender_address: u32,
    channel: Option<u8>,
    payload: String,
    rssi: u8,
    received_at: Option<SystemTime>,
    #[cfg_attr(feature = "serde", serde(skip))]
    wire: OnceLock<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    cul_wire: OnceLock<String>,
}

impl IntertechnoPacket {
    /// Creates a packet for transmission.
    pub fn new(sender_address: u32, payload: impl Into<String>) -> Self {
        Self {
            sender_address,
            channel: None,
            payload: payload.into(),
            rssi: 0,
            received_at: None,
            wire: OnceLock::new(),
            cul_wire: OnceLock::new(),
        }
    }

    /// Decodes one received line such as `"i1054510D\r\n"`.
    pub fn decode_line(line: &str) -> Result<Self, DecodeError> {
        let body = strip_line(line)?.as_bytes();
        let (sender_address, channel, payload) = match body.len() {
            SMALL_BODY_LEN => {
                let address = symbols_to_value(&body[..4], small_symbol)?;
                (address, None, small_payload(body[4])?)
            }
            LARGE_BODY_LEN => {
                let address = symbols_to_value(&body[..LARGE_ADDRESS_SYMBOLS], large_symbol)?;
                let payload = large_payload(body[LARGE_ADDRESS_SYMBOLS])?;
                let channel = symbols_to_value(&body[14..16], large_symbol)? as u8 + 1;
                (address, Some(channel), payload)
            }
            len => return Err(DecodeError::UnsupportedLength(len)),
        };

        let len = body.len();
        let reading = (hex_value(body[len - 2])? << 4) | hex_value(body[len - 1])?;

        Ok(Self {
            sender_address,
            channel,
            payload: payload.to_string(),
            rssi: rssi_magnitude(reading),
            received_at: Some(SystemTime::now()),
            wire: OnceLock::new(),
            cul_wire: OnceLock::new(),
        })
    }

    pub fn sender_address(&self) -> u32 {
        self.sender_address
    }

    /// 1-based channel, present only for large-form packets.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Signal strength as a positive magnitude below 0 dBm.
    pub fn rssi(&self) -> u8 {
        self.rssi
    }

    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }

    pub fn form(&self) -> LineForm {
        if self.channel.is_some() {
            LineForm::Large
        } else {
            LineForm::Small
        }
    }

    /// Address as it is framed for transmission. Large-form packets carry
    /// `channel - 1` in the low nibble.
    pub fn transmit_address(&self) -> u32 {
        match self.channel {
            Some(channel) => (self.sender_address << 4) | u32::from(channel.wrapping_sub(1) & 0x0F),
            None => self.sender_address,
        }
    }

    /// Canonical wire bit string.
    pub fn wire_form(&self) -> &str {
        self.wire_form_for(WireDialect::Standard)
    }

    pub fn wire_form_for(&self, dialect: WireDialect) -> &str {
        match dialect {
            WireDialect::Standard => self
                .wire
                .get_or_init(|| encode_wire(self.sender_address, &self.payload, '1')),
            WireDialect::CulLegacy => self
                .cul_wire
                .get_or_init(|| encode_wire(self.sender_address, &self.payload, 'F')),
        }
    }

    /// Command line written to a dongle: stack prefix, `"is"`, wire string,
    /// newline.
    pub fn transmit_line(&self, prefix: &str, dialect: WireDialect) -> String {
        format!("{prefix}{TRANSMIT_MARKER}{}\n", self.wire_form_for(dialect))
    }

    /// Wire bits packed MSB first for a radio FIFO, zero-padded to a whole
    /// byte. `'1'` and `'F'` are set bits.
    pub fn radio_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        pack_wire_bits(self.wire_form())
    }
}

pub fn pack_wire_bits(wire: &str) -> Result<Vec<u8>, EncodeError> {
    if wire.len() > MAX_WIRE_LEN {
        return Err(EncodeError::PayloadTooLong {
            len: wire.len(),
            max: MAX_WIRE_LEN,
        });
    }
    let mut out = vec![0u8; wire.len().div_ceil(8)];
    for (i, c) in wire.chars().enumerate() {
        match c {
            '1' | 'F' | 'f' => out[i / 8] |= 0x80 >> (i % 8),
            '0' => {}
            other => return Err(EncodeError::InvalidBit(other)),
        }
    }
    Ok(out)
}

impl PartialEq for IntertechnoPacket {
    fn eq(&self, other: &Self) -> bool {
        self.sender_address == other.sender_address
            && self.channel == other.channel
            && self.payload == other.payload
            && self.rssi == other.rssi
            && self.received_at == other.received_at
    }
}

impl Eq for IntertechnoPacket {}

/// Maps a raw receiver reading (0..=255) to a dBm magnitude.
pub fn rssi_magnitude(reading: u8) -> u8 {
    let reading = i32::from(reading);
    let dbm = if reading >= 128 {
        (reading - 256) / 2 - 74
    } else {
        reading / 2 - 74
    };
    (-dbm) as u8
}

fn strip_line(line: &str) -> Result<&str, DecodeError> {
    let body = line
        .strip_prefix(LINE_MARKER)
        .ok_or(DecodeError::InvalidMarker)?;
    if line.len() < MIN_LINE_LEN {
        return Err(DecodeError::InvalidLength);
    }
    let mut body = body;
    for _ in 0..2 {
        body = body
            .strip_suffix(|c: char| c == '\r' || c == '\n')
            .unwrap_or(body);
    }
    Ok(body)
}

fn symbols_to_value(
    symbols: &[u8],
    map: fn(u8) -> Result<u8, DecodeError>,
) -> Result<u32, DecodeError> {
    symbols
        .iter()
        .try_fold(0u32, |acc, &s| Ok((acc << 2) | u32::from(map(s)?)))
}

fn small_symbol(symbol: u8) -> Result<u8, DecodeError> {
    match symbol {
        b'0' => Ok(0),
        b'1' => Ok(1),
        b'4' => Ok(2),
        b'5' => Ok(3),
        other => Err(DecodeError::InvalidSymbol(other)),
    }
}

fn large_symbol(symbol: u8) -> Result<u8, DecodeError> {
    match symbol {
        b'5' => Ok(0),
        b'6' => Ok(1),
        b'9' => Ok(2),
        b'A' | b'a' => Ok(3),
        other => Err(DecodeError::InvalidSymbol(other)),
    }
}

fn small_payload(symbol: u8) -> Result<&'static str, DecodeError> {
    match symbol {
        b'0' => Ok("00"),
        b'1' => Ok("0F"),
        b'4' => Ok("F0"),
        b'5' => Ok("FF"),
        other => Err(DecodeError::InvalidSymbol(other)),
    }
}

fn large_payload(symbol: u8) -> Result<&'static str, DecodeError> {
    match symbol {
        b'5' => Ok("00"),
        b'6' => Ok("01"),
        b'9' => Ok("10"),
        b'A' | b'a' => Ok("11"),
        other => Err(DecodeError::InvalidSymbol(other)),
    }
}

fn encode_wire(address: u32, payload: &str, one: char) -> String {
    let bit = |i: u32, one: char| if address & (1 << i) != 0 { one } else { '0' };
    let mut out = String::with_capacity(30 + payload.len());
    if address & LARGE_ADDRESS_MASK != 0 {
        out.extend((4..=29).rev().map(|i| bit(i, '1')));
        out.push_str(payload);
        out.extend((0..=3).rev().map(|i| bit(i, '1')));
    } else {
        out.extend((0..=9).rev().map(|i| bit(i, one)));
        out.push_str(payload);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{pack_wire_bits, rssi_magnitude, IntertechnoPacket, LineForm, WireDialect};
    use crate::{DecodeError, EncodeError};
    use proptest::prelude::*;

    fn small_bits(symbol: char) -> &'static str {
        match symbol {
            '0' => "00",
            '1' => "01",
            '4' => "10",
            _ => "11",
        }
    }

    fn small_payload_bits(symbol: char) -> &'static str {
        match symbol {
            '0' => "00",
            '1' => "0F",
            '4' => "F0",
            _ => "FF",
        }
    }

    #[test]
    fn decodes_small_line() {
        let p = IntertechnoPacket::decode_line("i1054510D").unwrap();
        assert_eq!(p.sender_address(), 0b01_00_11_10);
        assert_eq!(p.payload(), "FF");
        assert_eq!(p.channel(), None);
        assert_eq!(p.form(), LineForm::Small);
        assert_eq!(p.rssi(), 68);
        assert!(p.received_at().is_some());
        assert_eq!(p.wire_form(), "0001001110FF");
        assert_eq!(p.wire_form_for(WireDialect::CulLegacy), "000F00FFF0FF");
    }

    #[test]
    fn line_terminator_is_stripped() {
        let a = IntertechnoPacket::decode_line("i1054510D\r\n").unwrap();
        let b = IntertechnoPacket::decode_line("i1054510D").unwrap();
        assert_eq!(a.sender_address(), b.sender_address());
        assert_eq!(a.payload(), b.payload());
        assert_eq!(a.rssi(), b.rssi());
    }

    #[test]
    fn decodes_large_line() {
        let p = IntertechnoPacket::decode_line("i565656565656595A80").unwrap();
        assert_eq!(p.form(), LineForm::Large);
        assert_eq!(p.channel(), Some(4));
        assert_eq!(p.payload(), "10");
        assert_eq!(p.rssi(), 138);
        assert_eq!(p.sender_address(), 0b00_01_00_01_00_01_00_01_00_01_00_01_00);

        let resend = IntertechnoPacket::new(p.transmit_address(), p.payload());
        assert_eq!(resend.wire_form(), "00010001000100010001000100100011");
    }

    #[test]
    fn rejects_unsupported_lengths_and_markers() {
        assert_eq!(
            IntertechnoPacket::decode_line("i12345678901\r\n").unwrap_err(),
            DecodeError::UnsupportedLength(11)
        );
        assert_eq!(
            IntertechnoPacket::decode_line("x1054510D").unwrap_err(),
            DecodeError::InvalidMarker
        );
        assert_eq!(
            IntertechnoPacket::decode_line("i105").unwrap_err(),
            DecodeError::InvalidLength
        );
        assert_eq!(
            IntertechnoPacket::decode_line("i1074510D").unwrap_err(),
            DecodeError::InvalidSymbol(b'7')
        );
    }

    #[test]
    fn large_address_framing_places_payload_before_low_nibble() {
        let p = IntertechnoPacket::new(0x0000_0401, "01");
        let wire = p.wire_form();
        assert_eq!(wire.len(), 26 + 2 + 4);
        assert_eq!(&wire[..26], "00000000000000000001000000");
        assert_eq!(&wire[26..28], "01");
        assert_eq!(&wire[28..], "0001");
        assert_eq!(p.wire_form_for(WireDialect::CulLegacy), wire);
    }

    #[test]
    fn wire_form_is_cached() {
        let p = IntertechnoPacket::new(5, "F0");
        let first = p.wire_form().as_ptr();
        assert_eq!(p.wire_form().as_ptr(), first);
        assert_eq!(p.wire_form(), "0000000101F0");
    }

    #[test]
    fn transmit_line_carries_prefix_and_marker() {
        let p = IntertechnoPacket::new(75, "FF");
        assert_eq!(p.transmit_line("", WireDialect::Standard), "is0001001011FF\n");
        assert_eq!(p.transmit_line("**", WireDialect::CulLegacy), "**is000F00F0FFFF\n");
    }

    #[test]
    fn packs_wire_bits_msb_first() {
        let p = IntertechnoPacket::new(75, "FF");
        assert_eq!(p.radio_bytes().unwrap(), vec![0b0001_0010, 0b1111_0000]);
        assert_eq!(pack_wire_bits("0x").unwrap_err(), EncodeError::InvalidBit('x'));
        let long = "0".repeat(129);
        assert_eq!(
            pack_wire_bits(&long).unwrap_err(),
            EncodeError::PayloadTooLong { len: 129, max: 128 }
        );
    }

    proptest! {
        #[test]
        fn small_lines_reencode_to_canonical_bits(
            address in "[0145]{4}",
            payload in "[0145]",
            filler in "[0-9A-F]",
            rssi in "[0-9A-F]{2}",
        ) {
            let line = format!("i{address}{payload}{filler}{rssi}\r\n");
            let packet = IntertechnoPacket::decode_line(&line).unwrap();
            let payload_symbol = payload.chars().next().unwrap();
            let address_bits: String = address.chars().map(small_bits).collect();
            let expected = format!("00{address_bits}{}", small_payload_bits(payload_symbol));
            prop_assert_eq!(packet.wire_form(), expected.as_str());

            let cul: String = expected
                .chars()
                .enumerate()
                .map(|(i, c)| if i < 10 && c == '1' { 'F' } else { c })
                .collect();
            prop_assert_eq!(packet.wire_form_for(WireDialect::CulLegacy), cul.as_str());
        }

        #[test]
        fn large_lines_have_one_based_channel(
            address in "[569A]{13}",
            payload in "[569A]",
            channel in "[569A]{2}",
            rssi in "[0-9A-F]{2}",
        ) {
            let line = format!("i{address}{payload}{channel}{rssi}");
            let packet = IntertechnoPacket::decode_line(&line).unwrap();
            let channel = packet.channel().unwrap();
            prop_assert!((1..=16).contains(&channel));
        }

        #[test]
        fn rssi_is_piecewise_linear_and_bounded(reading in any::<u8>()) {
            let magnitude = rssi_magnitude(reading);
            prop_assert!((11..=138).contains(&magnitude));
            if reading < 128 {
                prop_assert_eq!(i32::from(magnitude), 74 - i32::from(reading) / 2);
            } else {
                prop_assert!(magnitude >= 74);
            }
        }
    }
}
