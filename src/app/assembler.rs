use std::collections::BTreeSet;

use crate::app::iso::dictionary::strip_forbidden_127_subfields;
use crate::app::iso::{FieldValue, IsoMessage, MessageDictionary, Scalar};

/// Fields whose values are reduced to digits-only (capped to the field's
/// declared length) just before wire encoding. 35 and 70 are deliberately
/// excluded: Track-2 sentinels and the network-management code are left as-is.
const NUMERIC_LL_FIELDS: [u8; 9] = [2, 32, 33, 99, 100, 101, 102, 103, 104];

/// Builds the final outbound message from exactly the allowed fields, each
/// taken from the highest-precedence source that carries it: the original
/// request first, then the ESB-derived message, then a blank template value
/// synthesized from the dictionary. An allowed field with no dictionary
/// entry and no value in either source is never emitted.
pub struct ResponseAssembler;

impl ResponseAssembler {
    pub fn assemble(
        response_mti: u16,
        allowed_fields: &BTreeSet<u8>,
        request: &IsoMessage,
        esb_derived: Option<&IsoMessage>,
        dictionary: &MessageDictionary,
    ) -> IsoMessage {
        let mut resp = IsoMessage::new(response_mti);
        for &field in allowed_fields {
            if let Some(value) = request.get(field) {
                resp.set(field, value.clone());
                continue;
            }
            if let Some(value) = esb_derived.and_then(|m| m.get(field)) {
                resp.set(field, value.clone());
                continue;
            }
            if let Some(value) = dictionary.default_value(field) {
                resp.set(field, value);
            }
        }
        strip_forbidden_127_subfields(&mut resp);
        sanitize_numeric_ll_fields(&mut resp);
        resp
    }

    /// Field set a non-reversal financial response is confined to: every
    /// field the request carried, plus 38/39/44/54, plus 48 when the
    /// request's processing code identifies the mini-statement family.
    pub fn financial_allowed_fields(request: &IsoMessage) -> BTreeSet<u8> {
        let mut allowed: BTreeSet<u8> = request.field_numbers().into_iter().collect();
        allowed.extend([38, 39, 44, 54]);
        let processing_code = request.get(3).and_then(|v| v.as_text()).unwrap_or("");
        if processing_code.starts_with("32") || processing_code.starts_with("38") {
            allowed.insert(48);
        }
        allowed
    }

    /// Reversals and network-management echoes carry exactly the request's
    /// field set; no ESB-derived field survives assembly.
    pub fn echo_allowed_fields(request: &IsoMessage) -> BTreeSet<u8> {
        request.field_numbers().into_iter().collect()
    }
}

/// Strips every non-digit character out of the listed fields' text, then
/// caps the result to the field's declared length. Leaves composite and
/// binary fields untouched.
fn sanitize_numeric_ll_fields(msg: &mut IsoMessage) {
    for &field in NUMERIC_LL_FIELDS.iter() {
        let Some(value) = msg.get_mut(field) else { continue };
        let FieldValue::Scalar { iso_type, declared_len, value: scalar } = value else {
            continue;
        };
        let Some(text) = scalar.as_text() else { continue };
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        let cap = iso_type.max_len().map_or(*declared_len, |max| (*declared_len).min(max));
        let capped: String = digits.chars().take(cap).collect();
        *scalar = Scalar::Digits(capped);
    }
}
