use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// The eleven field encodings the dictionary can declare for a data element.
///
/// `ALPHA`/`NUMERIC` carry their fixed declared length inline; the `LL*`
/// variants are length-prefixed and only carry the *maximum* length allowed
/// by the prefix width (2/3/4 digits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoType {
    Alpha(usize),
    Numeric(usize),
    Amount,
    Date10,
    Date4,
    Time,
    Llvar,
    Lllvar,
    Llllvar,
    Binary(usize),
    Llbin,
    Lllbin,
}

impl IsoType {
    /// True for the length-prefixed variable encodings (text or binary).
    pub fn is_variable(self) -> bool {
        matches!(
            self,
            IsoType::Llvar | IsoType::Lllvar | IsoType::Llllvar | IsoType::Llbin | IsoType::Lllbin
        )
    }

    /// True when the payload bytes are raw octets rather than ASCII text.
    pub fn is_binary(self) -> bool {
        matches!(self, IsoType::Binary(_) | IsoType::Llbin | IsoType::Lllbin)
    }

    /// Width, in digits, of the length prefix for variable fields.
    pub fn prefix_digits(self) -> Option<usize> {
        match self {
            IsoType::Llvar | IsoType::Llbin => Some(2),
            IsoType::Lllvar | IsoType::Lllbin => Some(3),
            IsoType::Llllvar => Some(4),
            _ => None,
        }
    }

    /// Maximum payload length a prefix of this width can express.
    pub fn max_len(self) -> Option<usize> {
        self.prefix_digits().map(|d| 10usize.pow(d as u32) - 1)
    }
}

/// A scalar payload carried by a leaf field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Digits(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Scalar {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) | Scalar::Digits(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Scalar::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// One populated data element: its wire encoding plus the value itself.
///
/// Field 127 is the sole composite: its value is a nested [`IsoMessage`]
/// parsed under the 127 sub-dictionary (see [`crate::app::iso::dictionary`]).
#[derive(Debug, Clone)]
pub enum FieldValue {
    Scalar {
        iso_type: IsoType,
        declared_len: usize,
        value: Scalar,
    },
    Composite(Box<IsoMessage>),
}

impl FieldValue {
    pub fn text(iso_type: IsoType, declared_len: usize, value: impl Into<String>) -> Self {
        FieldValue::Scalar {
            iso_type,
            declared_len,
            value: Scalar::Text(value.into()),
        }
    }

    pub fn digits(iso_type: IsoType, declared_len: usize, value: impl Into<String>) -> Self {
        FieldValue::Scalar {
            iso_type,
            declared_len,
            value: Scalar::Digits(value.into()),
        }
    }

    pub fn bytes(iso_type: IsoType, declared_len: usize, value: Vec<u8>) -> Self {
        FieldValue::Scalar {
            iso_type,
            declared_len,
            value: Scalar::Bytes(value),
        }
    }

    pub fn iso_type(&self) -> Option<IsoType> {
        match self {
            FieldValue::Scalar { iso_type, .. } => Some(*iso_type),
            FieldValue::Composite(_) => None,
        }
    }

    pub fn declared_len(&self) -> Option<usize> {
        match self {
            FieldValue::Scalar { declared_len, .. } => Some(*declared_len),
            FieldValue::Composite(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar { value, .. } => Some(value),
            FieldValue::Composite(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_scalar().and_then(Scalar::as_bytes)
    }

    pub fn as_composite(&self) -> Option<&IsoMessage> {
        match self {
            FieldValue::Composite(msg) => Some(msg),
            FieldValue::Scalar { .. } => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut IsoMessage> {
        match self {
            FieldValue::Composite(msg) => Some(msg),
            FieldValue::Scalar { .. } => None,
        }
    }
}

/// An ISO-8583 message: an MTI plus a sparse map of field number (1..=128)
/// to value. Field 0 (the MTI) is never present in the map.
#[derive(Debug, Clone)]
pub struct IsoMessage {
    pub mti: u16,
    fields: BTreeMap<u8, FieldValue>,
}

impl IsoMessage {
    pub fn new(mti: u16) -> Self {
        Self {
            mti,
            fields: BTreeMap::new(),
        }
    }

    pub fn mti_str(&self) -> String {
        format!("{:04}", self.mti)
    }

    pub fn set(&mut self, field: u8, value: FieldValue) {
        debug_assert!(field >= 1 && field <= 128, "field {field} out of range");
        self.fields.insert(field, value);
    }

    pub fn get(&self, field: u8) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn get_mut(&mut self, field: u8) -> Option<&mut FieldValue> {
        self.fields.get_mut(&field)
    }

    pub fn remove(&mut self, field: u8) -> Option<FieldValue> {
        self.fields.remove(&field)
    }

    pub fn has(&self, field: u8) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn field_numbers(&self) -> Vec<u8> {
        self.fields.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u8, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
