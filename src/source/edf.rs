//! EDF (ESRF Data Format) reading and writing.
//!
//! An EDF file is an ASCII header block `{ Key = Value ; ... }`, padded with spaces to a
//! multiple of 512 bytes, immediately followed by one binary array. The array layout comes
//! from the `Dim_n`, `DataType` and `ByteOrder` header keys.

use std::fs;
use std::path::Path;

use super::{SourceHeader, SourcePayload};
use crate::error::{ConvertError, ConvertResult};

const BLOCK_SIZE: usize = 512;

/// Element type of an EDF payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdfDataType {
    UnsignedByte,
    SignedByte,
    UnsignedShort,
    SignedShort,
    UnsignedInteger,
    SignedInteger,
    UnsignedLong,
    SignedLong,
    Unsigned64,
    Signed64,
    FloatValue,
    DoubleValue,
}

impl EdfDataType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "UnsignedByte" | "UnsignedChar" | "Unsigned8" => Some(Self::UnsignedByte),
            "SignedByte" | "SignedChar" | "Signed8" => Some(Self::SignedByte),
            "UnsignedShort" | "Unsigned16" => Some(Self::UnsignedShort),
            "SignedShort" | "Signed16" => Some(Self::SignedShort),
            "UnsignedInteger" | "UnsignedInt" | "Unsigned32" => Some(Self::UnsignedInteger),
            "SignedInteger" | "SignedInt" | "Signed32" => Some(Self::SignedInteger),
            "UnsignedLong" => Some(Self::UnsignedLong),
            "SignedLong" => Some(Self::SignedLong),
            "Unsigned64" => Some(Self::Unsigned64),
            "Signed64" => Some(Self::Signed64),
            "FloatValue" | "Float" | "FloatIEEE32" | "Float32" => Some(Self::FloatValue),
            "DoubleValue" | "Double" | "DoubleIEEE64" | "Float64" => Some(Self::DoubleValue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsignedByte => "UnsignedByte",
            Self::SignedByte => "SignedByte",
            Self::UnsignedShort => "UnsignedShort",
            Self::SignedShort => "SignedShort",
            Self::UnsignedInteger => "UnsignedInteger",
            Self::SignedInteger => "SignedInteger",
            Self::UnsignedLong => "UnsignedLong",
            Self::SignedLong => "SignedLong",
            Self::Unsigned64 => "Unsigned64",
            Self::Signed64 => "Signed64",
            Self::FloatValue => "FloatValue",
            Self::DoubleValue => "DoubleValue",
        }
    }

    /// Size of one element in bytes. EDF `Long` types are 32-bit.
    pub fn size(self) -> usize {
        match self {
            Self::UnsignedByte | Self::SignedByte => 1,
            Self::UnsignedShort | Self::SignedShort => 2,
            Self::UnsignedInteger
            | Self::SignedInteger
            | Self::UnsignedLong
            | Self::SignedLong
            | Self::FloatValue => 4,
            Self::Unsigned64 | Self::Signed64 | Self::DoubleValue => 8,
        }
    }

    fn decode(self, chunk: &[u8], little_endian: bool) -> f64 {
        macro_rules! read {
            ($t:ty) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(chunk);
                if little_endian {
                    <$t>::from_le_bytes(buf) as f64
                } else {
                    <$t>::from_be_bytes(buf) as f64
                }
            }};
        }
        match self {
            Self::UnsignedByte => read!(u8),
            Self::SignedByte => read!(i8),
            Self::UnsignedShort => read!(u16),
            Self::SignedShort => read!(i16),
            Self::UnsignedInteger => read!(u32),
            Self::SignedInteger => read!(i32),
            Self::UnsignedLong => read!(u32),
            Self::SignedLong => read!(i32),
            Self::Unsigned64 => read!(u64),
            Self::Signed64 => read!(i64),
            Self::FloatValue => read!(f32),
            Self::DoubleValue => read!(f64),
        }
    }

    fn encode(self, value: f64, out: &mut Vec<u8>) {
        match self {
            Self::UnsignedByte => out.extend_from_slice(&(value as u8).to_le_bytes()),
            Self::SignedByte => out.extend_from_slice(&(value as i8).to_le_bytes()),
            Self::UnsignedShort => out.extend_from_slice(&(value as u16).to_le_bytes()),
            Self::SignedShort => out.extend_from_slice(&(value as i16).to_le_bytes()),
            Self::UnsignedInteger => out.extend_from_slice(&(value as u32).to_le_bytes()),
            Self::SignedInteger => out.extend_from_slice(&(value as i32).to_le_bytes()),
            Self::UnsignedLong => out.extend_from_slice(&(value as u32).to_le_bytes()),
            Self::SignedLong => out.extend_from_slice(&(value as i32).to_le_bytes()),
            Self::Unsigned64 => out.extend_from_slice(&(value as u64).to_le_bytes()),
            Self::Signed64 => out.extend_from_slice(&(value as i64).to_le_bytes()),
            Self::FloatValue => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Self::DoubleValue => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

/// Parse an EDF file into its header and payload.
pub fn parse_source_from_path(
    path: impl AsRef<Path>,
) -> ConvertResult<(SourceHeader, SourcePayload)> {
    let bytes = fs::read(path)?;
    parse_source_from_bytes(&bytes)
}

/// Parse in-memory EDF bytes into their header and payload.
pub fn parse_source_from_bytes(bytes: &[u8]) -> ConvertResult<(SourceHeader, SourcePayload)> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| ConvertError::format("file is empty"))?;
    if bytes[start] != b'{' {
        return Err(ConvertError::format("file does not start with a header block"));
    }
    let close = bytes[start..]
        .iter()
        .position(|&b| b == b'}')
        .map(|p| start + p)
        .ok_or_else(|| ConvertError::format("header block is not terminated"))?;

    let header_text = std::str::from_utf8(&bytes[start + 1..close]).map_err(|err| {
        ConvertError::format(format!("header is not valid UTF-8 at byte {}", err.valid_up_to()))
    })?;
    if header_text.contains('{') {
        return Err(ConvertError::format("nested header block"));
    }
    let header = parse_header(header_text)?;

    let mut data_start = close + 1;
    if bytes.get(data_start) == Some(&b'\r') {
        data_start += 1;
    }
    if bytes.get(data_start) == Some(&b'\n') {
        data_start += 1;
    }

    let payload = read_payload(&header, &bytes[data_start..])?;
    Ok((header, payload))
}

fn parse_header(text: &str) -> ConvertResult<SourceHeader> {
    let mut header = SourceHeader::new();
    for statement in text.split([';', '\n']) {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        let (key, value) = statement
            .split_once('=')
            .ok_or_else(|| {
                ConvertError::format(format!("malformed header line '{statement}'"))
            })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConvertError::format(format!("header line without key '{statement}'")));
        }
        header.insert(key, value.trim())?;
    }
    Ok(header)
}

fn read_payload(header: &SourceHeader, data: &[u8]) -> ConvertResult<SourcePayload> {
    let type_name = header
        .get("DataType")
        .ok_or_else(|| ConvertError::format("header has no DataType"))?;
    let data_type = EdfDataType::from_name(type_name)
        .ok_or_else(|| ConvertError::format(format!("unsupported DataType '{type_name}'")))?;

    let little_endian = match header.get("ByteOrder").map(str::trim) {
        None | Some("LowByteFirst") => true,
        Some("HighByteFirst") => false,
        Some(other) => {
            return Err(ConvertError::format(format!("unsupported ByteOrder '{other}'")));
        }
    };

    let mut dims = Vec::new();
    for n in 1.. {
        let Some(raw) = header.get(&format!("Dim_{n}")) else {
            break;
        };
        let dim = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConvertError::format(format!("Dim_{n} is not a size: '{raw}'")))?;
        dims.push(dim);
    }
    if dims.is_empty() {
        return Err(ConvertError::format("header has no Dim_1"));
    }

    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| ConvertError::format("payload dimensions overflow"))?;
    let expected = count
        .checked_mul(data_type.size())
        .ok_or_else(|| ConvertError::format("payload dimensions overflow"))?;

    if let Some(size) = header.get("Size") {
        let declared = size
            .trim()
            .parse::<usize>()
            .map_err(|_| ConvertError::format(format!("Size is not a byte count: '{size}'")))?;
        if declared != expected {
            return Err(ConvertError::format(format!(
                "Size {declared} does not match dimensions ({expected} bytes)"
            )));
        }
    }

    if data.len() < expected {
        return Err(ConvertError::format(format!(
            "payload is truncated: expected {expected} bytes, found {}",
            data.len()
        )));
    }
    if data.len() > expected {
        let trailing = &data[expected..];
        let next = trailing.iter().find(|b| !b.is_ascii_whitespace());
        return Err(match next {
            Some(b'{') => ConvertError::format("file contains more than one header block"),
            Some(_) => ConvertError::format(format!(
                "payload has {} unexpected trailing bytes",
                trailing.len()
            )),
            None => ConvertError::format("payload is followed by padding"),
        });
    }

    let values = data
        .chunks_exact(data_type.size())
        .map(|chunk| data_type.decode(chunk, little_endian))
        .collect();

    Ok(SourcePayload::new(values, dims, data_type))
}

/// Serialize a header and payload as an EDF file.
///
/// Layout keys (`Dim_n`, `DataType`, `ByteOrder`, `Size`) are derived from the payload and
/// take precedence over same-named keys in `header`. Values are written little-endian.
pub fn encode_edf(header: &SourceHeader, payload: &SourcePayload) -> Vec<u8> {
    let mut layout: Vec<(String, String)> = vec![
        ("ByteOrder".to_string(), "LowByteFirst".to_string()),
        ("DataType".to_string(), payload.data_type.as_str().to_string()),
        (
            "Size".to_string(),
            (payload.values.len() * payload.data_type.size()).to_string(),
        ),
    ];
    for (i, d) in payload.dims.iter().enumerate() {
        layout.push((format!("Dim_{}", i + 1), d.to_string()));
    }

    let mut text = String::from("{\n");
    for (k, v) in &layout {
        text.push_str(&format!("{k} = {v} ;\n"));
    }
    for (k, v) in header.iter() {
        if layout.iter().any(|(lk, _)| lk == k) {
            continue;
        }
        text.push_str(&format!("{k} = {v} ;\n"));
    }

    let closing = "}\n";
    let used = text.len() + closing.len();
    let padded = used.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    text.push_str(&" ".repeat(padded - used));
    text.push_str(closing);

    let mut out = text.into_bytes();
    out.reserve(payload.values.len() * payload.data_type.size());
    for &v in &payload.values {
        payload.data_type.encode(v, &mut out);
    }
    out
}
