use std::collections::BTreeMap;

use super::types::{FieldValue, IsoType};

/// One dictionary row: a field's name and wire encoding.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub number: u8,
    pub name: &'static str,
    pub iso_type: IsoType,
}

/// The field table every MTI this gateway handles (0200/0210/0231/0420/0430/
/// 0800/0810) draws from, plus the nested sub-dictionary for composite
/// field 127. The dictionary is immutable once built and is shared (behind
/// an `Arc`) across every connection.
#[derive(Debug, Clone)]
pub struct MessageDictionary {
    fields: BTreeMap<u8, FieldSpec>,
    sub127: BTreeMap<u8, FieldSpec>,
}

/// Subfields of field 127 that must never appear on an outbound nested
/// message; parsed in but always stripped before a response is packed.
pub const FORBIDDEN_127_SUBFIELDS: [u8; 2] = [22, 25];

macro_rules! spec {
    ($number:expr, $name:expr, $ty:expr) => {
        ($number, FieldSpec { number: $number, name: $name, iso_type: $ty })
    };
}

impl MessageDictionary {
    /// Build the standard dictionary used across all recognized MTIs.
    pub fn standard() -> Self {
        use IsoType::*;

        let fields = BTreeMap::from([
            spec!(2, "PAN", Llvar),
            spec!(3, "ProcessingCode", Numeric(6)),
            spec!(4, "Amount", Amount),
            spec!(7, "TransmissionDate", Date10),
            spec!(11, "STAN", Numeric(6)),
            spec!(12, "LocalTime", Numeric(6)),
            spec!(13, "LocalDate", Numeric(4)),
            spec!(14, "ExpirationDate", Numeric(4)),
            spec!(22, "PosEntryMode", Numeric(3)),
            spec!(25, "PosConditionCode", Numeric(2)),
            spec!(32, "AcquiringInstitutionId", Llvar),
            spec!(33, "ForwardingInstitutionId", Llvar),
            spec!(35, "Track2Data", Llvar),
            spec!(37, "RRN", Alpha(12)),
            spec!(38, "AuthCode", Alpha(6)),
            spec!(39, "ResponseCode", Alpha(2)),
            spec!(41, "TerminalId", Alpha(8)),
            spec!(42, "MerchantId", Alpha(15)),
            spec!(44, "AdditionalData", Llvar),
            spec!(48, "AdditionalDataPrivate", Lllvar),
            spec!(49, "Currency", Numeric(3)),
            spec!(54, "AdditionalAmounts", Lllvar),
            spec!(55, "IccData", Lllbin),
            spec!(62, "AdditionalDataPrivate2", Lllvar),
            spec!(64, "MAC", Binary(8)),
            spec!(70, "NetworkManagementCode", Numeric(3)),
            spec!(99, "AccountIdentification1", Llvar),
            spec!(100, "ReceivingInstitutionId", Llvar),
            spec!(101, "FileName", Llvar),
            spec!(102, "FromAccount", Llvar),
            spec!(103, "ToAccount", Llvar),
            spec!(104, "TransactionDescription", Lllvar),
            spec!(123, "PrivateData", Lllvar),
            spec!(127, "Composite127", Lllvar),
        ]);

        let sub127 = BTreeMap::from([
            spec!(2, "NestedPAN", Llvar),
            spec!(3, "NestedProcessingCode", Numeric(6)),
            spec!(4, "NestedAmount", Amount),
            spec!(22, "NestedPosEntryMode", Numeric(3)),
            spec!(25, "NestedPosConditionCode", Numeric(2)),
            spec!(41, "NestedTerminalId", Alpha(8)),
            spec!(44, "NestedAdditionalData", Llvar),
            spec!(123, "NestedPrivateData", Lllvar),
        ]);

        Self { fields, sub127 }
    }

    pub fn lookup(&self, field: u8) -> Option<&FieldSpec> {
        self.fields.get(&field)
    }

    pub fn lookup_127(&self, subfield: u8) -> Option<&FieldSpec> {
        self.sub127.get(&subfield)
    }

    /// The blank wire-level default for a field: the codec zero-fills
    /// numeric/amount/date/time types and space-fills ALPHA on encode, so an
    /// empty scalar of the field's own type is enough to produce that. No
    /// default exists for composite field 127.
    pub fn default_value(&self, field: u8) -> Option<FieldValue> {
        if field == 127 {
            return None;
        }
        self.lookup(field).map(|spec| blank_value(spec.iso_type))
    }

    /// The MTIs this gateway accepts on ingress.
    pub fn accepted_mtis() -> [u16; 3] {
        [0200, 0420, 0800]
    }

    /// The MTIs this gateway may emit.
    pub fn emitted_mtis() -> [u16; 4] {
        [0210, 0231, 0430, 0810]
    }
}

impl Default for MessageDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

fn blank_value(iso_type: IsoType) -> FieldValue {
    match iso_type {
        IsoType::Binary(_) | IsoType::Llbin | IsoType::Lllbin => FieldValue::bytes(iso_type, 0, Vec::new()),
        _ => FieldValue::text(iso_type, 0, ""),
    }
}

/// Strip field 127's forbidden subfields from a message, idempotently: safe
/// to call on a message that has already been stripped, or that carries no
/// field 127 at all.
pub fn strip_forbidden_127_subfields(msg: &mut super::types::IsoMessage) {
    if let Some(field) = msg.get_mut(127).and_then(|v| v.as_composite_mut()) {
        for sub in FORBIDDEN_127_SUBFIELDS {
            field.remove(sub);
        }
    }
}
