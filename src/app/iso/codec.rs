use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::app::error::GatewayError;

use super::bitmap::Bitmap;
use super::dictionary::{FieldSpec, MessageDictionary};
use super::types::{FieldValue, IsoMessage, IsoType};

/// Fixed wire widths for the types that don't carry an explicit declared
/// length in the dictionary: AMOUNT, DATE10, DATE4, and TIME are always
/// these sizes.
fn fixed_len(iso_type: IsoType, declared: Option<usize>) -> usize {
    match iso_type {
        IsoType::Amount => 12,
        IsoType::Date10 => 10,
        IsoType::Date4 => 4,
        IsoType::Time => 6,
        IsoType::Alpha(n) | IsoType::Numeric(n) | IsoType::Binary(n) => n,
        _ => declared.unwrap_or(0),
    }
}

/// Byte-oriented duplex framing plus ISO-8583 parse/pack.
///
/// Framing: 2-byte big-endian length prefix, then exactly that many payload
/// bytes. [`WireCodec::read_frame`] fails with [`GatewayError::FrameIncomplete`]
/// if EOF arrives before the declared length is satisfied.
#[derive(Clone)]
pub struct WireCodec {
    dictionary: Arc<MessageDictionary>,
    pub use_binary_bitmap: bool,
    pub ignore_trailing_missing_field: bool,
}

impl WireCodec {
    pub fn new(dictionary: Arc<MessageDictionary>) -> Self {
        Self {
            dictionary,
            use_binary_bitmap: true,
            ignore_trailing_missing_field: true,
        }
    }

    pub async fn read_frame<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Vec<u8>, GatewayError> {
        let mut len_buf = [0u8; 2];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(GatewayError::FrameIncomplete)
            }
            Err(e) => return Err(GatewayError::Io(e)),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload).await {
            Ok(_) => Ok(payload),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(GatewayError::FrameIncomplete)
            }
            Err(e) => Err(GatewayError::Io(e)),
        }
    }

    pub async fn write_frame<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        payload: &[u8],
    ) -> Result<(), GatewayError> {
        let len = u16::try_from(payload.len())
            .map_err(|_| GatewayError::Internal("payload exceeds 65535 bytes".into()))?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn decode(&self, payload: &[u8]) -> Result<IsoMessage, GatewayError> {
        if payload.len() < 4 {
            return Err(GatewayError::FrameIncomplete);
        }
        let mti_str = std::str::from_utf8(&payload[..4])
            .map_err(|_| GatewayError::FrameMalformed("MTI is not ASCII".into()))?;
        let mti: u16 = mti_str
            .parse()
            .map_err(|_| GatewayError::FrameMalformed(format!("invalid MTI: {mti_str}")))?;

        let mut msg = IsoMessage::new(mti);
        self.decode_fields(&payload[4..], &mut msg, |n| self.dictionary.lookup(n))?;
        Ok(msg)
    }

    /// Parses `bitmap + fields` (no MTI) into `target`, used both for the
    /// top-level message body and recursively for a nested field-127
    /// payload. `lookup` resolves a field number to its [`FieldSpec`] in
    /// whichever dictionary scope applies.
    fn decode_fields<'a>(
        &self,
        data: &'a [u8],
        target: &mut IsoMessage,
        lookup: impl Fn(u8) -> Option<&'a FieldSpec>,
    ) -> Result<(), GatewayError> {
        let (bitmap, consumed) = Bitmap::parse(data, self.use_binary_bitmap)?;
        let mut pos = consumed;

        let mut fields: Vec<u8> = bitmap.set_bits().into_iter().filter(|&de| de != 1).collect();
        fields.sort_unstable();

        for (idx, de) in fields.iter().copied().enumerate() {
            if pos >= data.len() {
                let is_last = idx == fields.len() - 1;
                if is_last && self.ignore_trailing_missing_field {
                    break;
                }
                return Err(GatewayError::FrameIncomplete);
            }

            let spec = lookup(de)
                .ok_or_else(|| GatewayError::FrameMalformed(format!("no dictionary entry for field {de}")))?;

            let (value, read) = self.decode_field(&data[pos..], spec)?;
            target.set(de, value);
            pos += read;
        }

        Ok(())
    }

    fn decode_field(&self, data: &[u8], spec: &FieldSpec) -> Result<(FieldValue, usize), GatewayError> {
        let de = spec.number;
        if de == 127 {
            let (len, prefix_len) = read_len_prefix(data, 3, de)?;
            if data.len() < prefix_len + len {
                return Err(GatewayError::FrameIncomplete);
            }
            let blob = &data[prefix_len..prefix_len + len];
            let mut nested = IsoMessage::new(0);
            self.decode_fields(blob, &mut nested, |n| self.dictionary.lookup_127(n))?;
            return Ok((FieldValue::Composite(Box::new(nested)), prefix_len + len));
        }

        match spec.iso_type {
            IsoType::Alpha(_) | IsoType::Numeric(_) | IsoType::Amount | IsoType::Date10
            | IsoType::Date4 | IsoType::Time => {
                let len = fixed_len(spec.iso_type, None);
                if data.len() < len {
                    return Err(GatewayError::FrameIncomplete);
                }
                let text = std::str::from_utf8(&data[..len])
                    .map_err(|_| GatewayError::FrameMalformed(format!("field {de} is not ASCII")))?
                    .to_string();
                Ok((FieldValue::text(spec.iso_type, len, text), len))
            }
            IsoType::Binary(n) => {
                if data.len() < n {
                    return Err(GatewayError::FrameIncomplete);
                }
                Ok((FieldValue::bytes(spec.iso_type, n, data[..n].to_vec()), n))
            }
            IsoType::Llvar | IsoType::Lllvar | IsoType::Llllvar => {
                let prefix_digits = spec.iso_type.prefix_digits().unwrap();
                let (len, prefix_len) = read_len_prefix(data, prefix_digits, de)?;
                let max = spec.iso_type.max_len().unwrap();
                if len > max {
                    return Err(GatewayError::FrameMalformed(format!(
                        "field {de} length {len} exceeds max {max}"
                    )));
                }
                if data.len() < prefix_len + len {
                    return Err(GatewayError::FrameIncomplete);
                }
                let text = std::str::from_utf8(&data[prefix_len..prefix_len + len])
                    .map_err(|_| GatewayError::FrameMalformed(format!("field {de} is not ASCII")))?
                    .to_string();
                Ok((FieldValue::text(spec.iso_type, len, text), prefix_len + len))
            }
            IsoType::Llbin | IsoType::Lllbin => {
                let prefix_digits = spec.iso_type.prefix_digits().unwrap();
                let (len, prefix_len) = read_len_prefix(data, prefix_digits, de)?;
                let max = spec.iso_type.max_len().unwrap();
                if len > max {
                    return Err(GatewayError::FrameMalformed(format!(
                        "field {de} length {len} exceeds max {max}"
                    )));
                }
                if data.len() < prefix_len + len {
                    return Err(GatewayError::FrameIncomplete);
                }
                let bytes = data[prefix_len..prefix_len + len].to_vec();
                Ok((FieldValue::bytes(spec.iso_type, len, bytes), prefix_len + len))
            }
        }
    }

    pub fn encode(&self, msg: &IsoMessage) -> Result<Vec<u8>, GatewayError> {
        let mut out = Vec::new();
        out.extend_from_slice(msg.mti_str().as_bytes());

        let mut field_numbers: Vec<u8> = msg.field_numbers().into_iter().filter(|&n| n != 1).collect();
        field_numbers.sort_unstable();
        let bitmap = Bitmap::from_fields(&field_numbers);
        out.extend_from_slice(&bitmap.encode(self.use_binary_bitmap));

        for de in field_numbers {
            let value = msg
                .get(de)
                .ok_or_else(|| GatewayError::Internal(format!("field {de} vanished during encode")))?;
            out.extend(self.encode_field(de, value)?);
        }

        Ok(out)
    }

    fn encode_field(&self, de: u8, value: &FieldValue) -> Result<Vec<u8>, GatewayError> {
        if let FieldValue::Composite(nested) = value {
            let mut field_numbers: Vec<u8> =
                nested.field_numbers().into_iter().filter(|&n| n != 1).collect();
            field_numbers.sort_unstable();
            let bitmap = Bitmap::from_fields(&field_numbers);
            let mut inner = bitmap.encode(self.use_binary_bitmap);
            for sub in field_numbers {
                let sub_value = nested
                    .get(sub)
                    .ok_or_else(|| GatewayError::Internal(format!("subfield {sub} vanished")))?;
                inner.extend(self.encode_field(sub, sub_value)?);
            }
            let mut out = format!("{:03}", inner.len()).into_bytes();
            out.extend(inner);
            return Ok(out);
        }

        let iso_type = value.iso_type().expect("scalar field has a type");
        match iso_type {
            IsoType::Numeric(_) | IsoType::Amount | IsoType::Date10 | IsoType::Date4 | IsoType::Time => {
                let len = fixed_len(iso_type, value.declared_len());
                let digits = value.as_text().unwrap_or("");
                Ok(pad_numeric(digits, len).into_bytes())
            }
            IsoType::Alpha(_) => {
                let len = fixed_len(iso_type, value.declared_len());
                let text = value.as_text().unwrap_or("");
                Ok(pad_alpha(text, len).into_bytes())
            }
            IsoType::Binary(n) => {
                let bytes = value.as_bytes().unwrap_or(&[]);
                Ok(pad_bytes(bytes, n))
            }
            IsoType::Llvar | IsoType::Lllvar | IsoType::Llllvar => {
                let prefix_digits = iso_type.prefix_digits().unwrap();
                let text = value.as_text().unwrap_or("");
                let mut out = format!("{:0width$}", text.len(), width = prefix_digits).into_bytes();
                out.extend_from_slice(text.as_bytes());
                Ok(out)
            }
            IsoType::Llbin | IsoType::Lllbin => {
                let prefix_digits = iso_type.prefix_digits().unwrap();
                let bytes = value.as_bytes().unwrap_or(&[]);
                let mut out = format!("{:0width$}", bytes.len(), width = prefix_digits).into_bytes();
                out.extend_from_slice(bytes);
                Ok(out)
            }
        }
    }
}

fn read_len_prefix(data: &[u8], digits: usize, field: u8) -> Result<(usize, usize), GatewayError> {
    if data.len() < digits {
        return Err(GatewayError::FrameIncomplete);
    }
    let prefix = std::str::from_utf8(&data[..digits])
        .map_err(|_| GatewayError::FrameMalformed(format!("field {field} length prefix not ASCII")))?;
    let len: usize = prefix
        .parse()
        .map_err(|_| GatewayError::FrameMalformed(format!("field {field} length prefix not numeric")))?;
    Ok((len, digits))
}

fn pad_numeric(digits: &str, len: usize) -> String {
    if digits.len() >= len {
        digits[digits.len() - len..].to_string()
    } else {
        format!("{:0>width$}", digits, width = len)
    }
}

fn pad_alpha(text: &str, len: usize) -> String {
    if text.len() >= len {
        text[..len].to_string()
    } else {
        format!("{:<width$}", text, width = len)
    }
}

fn pad_bytes(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let n = bytes.len().min(len);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> WireCodec {
        WireCodec::new(Arc::new(MessageDictionary::standard()))
    }

    #[test]
    fn round_trips_a_simple_financial_request() {
        let codec = codec();
        let mut msg = IsoMessage::new(0200);
        msg.set(3, FieldValue::digits(IsoType::Numeric(6), 6, "000000"));
        msg.set(4, FieldValue::digits(IsoType::Amount, 12, "000000050000"));
        msg.set(11, FieldValue::digits(IsoType::Numeric(6), 6, "000001"));

        let encoded = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&encoded).unwrap();

        assert_eq!(decoded.mti, 200);
        assert_eq!(decoded.get(3).unwrap().as_text(), Some("000000"));
        assert_eq!(decoded.get(4).unwrap().as_text(), Some("000000050000"));
        assert_eq!(decoded.get(11).unwrap().as_text(), Some("000001"));

        let re_encoded = codec.encode(&decoded).unwrap();
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn unknown_field_in_bitmap_is_malformed() {
        let codec = codec();
        // Field 9 has no dictionary entry in the standard table, so a
        // bitmap that addresses it must fail decoding rather than panic.
        let mut bad = b"0200".to_vec();
        let mut bitmap = Bitmap::new();
        bitmap.set(9);
        bad.extend(bitmap.to_hex().into_bytes());
        bad.extend(b"00000000");
        assert!(matches!(codec.decode(&bad), Err(GatewayError::FrameMalformed(_))));
    }

    #[test]
    fn composite_127_round_trips_and_strips_forbidden_subfields() {
        let codec = codec();
        let mut nested = IsoMessage::new(0);
        nested.set(2, FieldValue::text(IsoType::Llvar, 0, "4123456789012"));
        nested.set(22, FieldValue::digits(IsoType::Numeric(3), 3, "051"));
        nested.set(25, FieldValue::digits(IsoType::Numeric(2), 2, "00"));

        let mut msg = IsoMessage::new(0200);
        msg.set(127, FieldValue::Composite(Box::new(nested)));

        super::super::dictionary::strip_forbidden_127_subfields(&mut msg);
        let composite = msg.get(127).unwrap().as_composite().unwrap();
        assert!(!composite.has(22));
        assert!(!composite.has(25));
        assert!(composite.has(2));

        let encoded = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        let decoded_composite = decoded.get(127).unwrap().as_composite().unwrap();
        assert!(decoded_composite.has(2));
        assert!(!decoded_composite.has(22));
    }

    #[test]
    fn trailing_missing_field_at_end_is_tolerated() {
        let codec = codec();
        // Bitmap claims field 41 (8 bytes ALPHA) but the payload ends early.
        let mut bitmap = Bitmap::new();
        bitmap.set(3);
        bitmap.set(41);
        let mut payload = b"0200".to_vec();
        payload.extend(bitmap.to_hex().into_bytes());
        payload.extend(b"000000"); // field 3 only; field 41 (last) is absent.
        let decoded = codec.decode(&payload).unwrap();
        assert_eq!(decoded.get(3).unwrap().as_text(), Some("000000"));
        assert!(decoded.get(41).is_none());
    }
}
