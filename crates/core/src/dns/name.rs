//! Domain name label codec
//!
//! Names are written uncompressed. Decoding follows compression pointers
//! (RFC 1035 §4.1.4) so names inside full DNS messages can be read.

use super::{DnsError, WireBuffer};
use bdxnet_common::dns::{MAX_LABEL_LEN, MAX_NAME_WIRE_LEN, MAX_POINTER_HOPS};

const POINTER_MASK: u8 = 0xC0;

/// Write `name` as a sequence of labels followed by the root label
///
/// A trailing dot is optional; `""` and `"."` encode the root name.
pub fn encode_name(buf: &mut WireBuffer, name: &str) -> Result<(), DnsError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    let labels: Vec<&str> = if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    };

    let mut wire_len = 1;
    for label in &labels {
        if label.is_empty() {
            return Err(DnsError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsError::LabelTooLong(label.len()));
        }
        wire_len += label.len() + 1;
    }
    if wire_len > MAX_NAME_WIRE_LEN {
        return Err(DnsError::NameTooLong(wire_len));
    }

    for label in labels {
        buf.put_u8(label.len() as u8)?;
        buf.put_slice(label.as_bytes())?;
    }
    buf.put_u8(0)
}

/// Read a name at the cursor, returning it dot-terminated (`"."` for root)
///
/// On success the cursor sits after the terminating root label, or after
/// the first compression pointer if the name used one.
pub fn decode_name(buf: &mut WireBuffer) -> Result<String, DnsError> {
    let mut name = String::new();
    let mut pos = buf.cursor();
    let mut resume_at = None;
    let mut hops = 0;
    let mut wire_len = 1;

    loop {
        let len = buf.byte_at(pos)?;

        match len & POINTER_MASK {
            0x00 if len == 0 => {
                pos += 1;
                break;
            }
            0x00 => {
                let len = len as usize;
                wire_len += len + 1;
                if wire_len > MAX_NAME_WIRE_LEN {
                    return Err(DnsError::NameTooLong(wire_len));
                }

                let label = buf.slice_at(pos + 1, len)?;
                let label = std::str::from_utf8(label).map_err(|_| DnsError::InvalidLabel)?;
                name.push_str(label);
                name.push('.');
                pos += 1 + len;
            }
            POINTER_MASK => {
                let low = buf.byte_at(pos + 1)?;
                let target = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
                if target >= pos {
                    return Err(DnsError::BadPointer(target));
                }

                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(DnsError::PointerLoop);
                }

                resume_at.get_or_insert(pos + 2);
                pos = target;
            }
            _ => return Err(DnsError::ReservedLabelType(len)),
        }
    }

    buf.seek(resume_at.unwrap_or(pos))?;

    if name.is_empty() {
        name.push('.');
    }
    Ok(name)
}
