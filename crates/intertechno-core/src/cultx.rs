use crate::bits::{decode_hex, BitReader};
use crate::DecodeError;
use std::time::SystemTime;

/// Marker character that starts every received CULTX line.
pub const LINE_MARKER: char = 't';

/// Sensor type carrying a temperature reading.
pub const SENSOR_TYPE_TEMPERATURE: u8 = 0;

const MIN_LINE_LEN: usize = 10;
const TEMPERATURE_OFFSET_TENTHS: i32 = 500;

/// A CULTX sensor beacon (temperature and similar readings).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CultxPacket {
    sender_address: u32,
    sensor_type: Option<u8>,
    payload: String,
    raw: String,
    received_at: Option<SystemTime>,
}

impl CultxPacket {
    /// Value carrier for a given address and payload. No fields are derived.
    pub fn new(sender_address: u32, payload: impl Into<String>) -> Self {
        Self {
            sender_address,
            sensor_type: None,
            payload: payload.into(),
            raw: String::new(),
            received_at: None,
        }
    }

    /// Decodes a received line such as `"tA01072172F"`.
    ///
    /// Fields are 4 bits wide at these bit offsets into the hex payload:
    /// type at 4, address at 8 and 12, reading digits at 16, 20 and 24.
    pub fn decode_line(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let hex = line
            .strip_prefix(LINE_MARKER)
            .ok_or(DecodeError::InvalidMarker)?;
        if line.len() < MIN_LINE_LEN {
            return Err(DecodeError::InvalidLength);
        }

        let bytes = decode_hex(hex)?;
        let r = BitReader::new(&bytes);
        let sensor_type = r.read_at(4, 4)?;
        let sender_address = (u32::from(r.read_at(8, 4)?) << 3) + u32::from(r.read_at(12, 4)? >> 1);

        let tens = i32::from(r.read_at(16, 4)?);
        let ones = i32::from(r.read_at(20, 4)?);
        let tenths = i32::from(r.read_at(24, 4)?);
        let mut value_tenths = tens * 100 + ones * 10 + tenths;
        if sensor_type == SENSOR_TYPE_TEMPERATURE {
            value_tenths -= TEMPERATURE_OFFSET_TENTHS;
        }

        Ok(Self {
            sender_address,
            sensor_type: Some(sensor_type),
            payload: format_tenths(value_tenths),
            raw: line.to_string(),
            received_at: Some(SystemTime::now()),
        })
    }

    /// 7-bit sender address.
    pub fn sender_address(&self) -> u32 {
        self.sender_address
    }

    pub fn sensor_type(&self) -> Option<u8> {
        self.sensor_type
    }

    pub fn is_temperature(&self) -> bool {
        self.sensor_type == Some(SENSOR_TYPE_TEMPERATURE)
    }

    /// Decoded reading as decimal text, e.g. `"22.1"`.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn value(&self) -> Option<f64> {
        self.payload.parse().ok()
    }

    /// CULTX beacons carry no signal strength.
    pub fn rssi(&self) -> u8 {
        0
    }

    /// The received line, empty for packets built with [`CultxPacket::new`].
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }
}

fn format_tenths(tenths: i32) -> String {
    let sign = if tenths < 0 { "-" } else { "" };
    let abs = tenths.unsigned_abs();
    format!("{sign}{}.{}", abs / 10, abs % 10)
}
