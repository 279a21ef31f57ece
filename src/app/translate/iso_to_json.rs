use base64::Engine;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::app::iso::{FieldValue, IsoMessage};

/// Consumed directly into a named top-level key; everything else present in
/// the message falls through into `rawFields`.
const CONSUMED: [u8; 15] = [2, 3, 4, 7, 11, 12, 13, 32, 37, 38, 39, 41, 42, 44, 49];
/// Consumed into balance/mini-statement/account/private keys.
const CONSUMED_EXTRA: [u8; 6] = [54, 48, 62, 55, 64, 123];
const CONSUMED_ACCOUNTS: [u8; 1] = [102];

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Maps field 3's first two digits to a coarse transaction class, per the
/// table in the ESB JSON contract.
pub fn transaction_type_for(processing_code: &str) -> &'static str {
    match processing_code.get(0..2).unwrap_or("") {
        "00" => "PURCHASE",
        "01" => "WITHDRAWAL",
        "02" | "21" => "DEPOSIT",
        "03" => "TRANSFER",
        "31" => "BALANCE_INQUIRY",
        "32" | "38" => "MINI_STATEMENT",
        _ => "OTHER",
    }
}

fn mask_pan(pan: &str) -> String {
    if pan.len() <= 10 {
        return "*".repeat(pan.len());
    }
    format!("{}******{}", &pan[..6], &pan[pan.len() - 4..])
}

/// Expands a raw field-7 value into an ISO-8601 timestamp. Accepts either an
/// already-formed timestamp string or 10 digits interpreted as
/// `MMddHHmmss`, combined with the current year.
fn expand_transmission_date_time(raw: &str) -> Option<String> {
    if raw.len() == 10 && raw.chars().all(|c| c.is_ascii_digit()) {
        let year = chrono::Utc::now().year();
        let month = &raw[0..2];
        let day = &raw[2..4];
        let hour = &raw[4..6];
        let minute = &raw[6..8];
        let second = &raw[8..10];
        return Some(format!(
            "{year:04}-{month}-{day}T{hour}:{minute}:{second}"
        ));
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.to_rfc3339())
        .ok()
}

fn field_as_raw_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar { value, iso_type, .. } => {
            if iso_type.is_binary() {
                b64(value.as_bytes().unwrap_or(&[]))
            } else {
                value.as_text().unwrap_or("").to_string()
            }
        }
        FieldValue::Composite(_) => String::new(),
    }
}

/// Converts a parsed ISO message into the canonical JSON document sent to
/// the ESB. Every key is present iff its source field was present on `msg`.
pub fn to_json(msg: &IsoMessage) -> Value {
    let mut out = Map::new();
    out.insert("messageType".into(), json!(msg.mti_str()));

    if let Some(pan) = msg.get(2).and_then(|v| v.as_text()) {
        out.insert("cardNumber".into(), json!(mask_pan(pan)));
        out.insert("accountNumber".into(), json!(pan));
    }

    if let Some(pc) = msg.get(3).and_then(|v| v.as_text()) {
        out.insert("processingCode".into(), json!(pc));
        out.insert("transactionType".into(), json!(transaction_type_for(pc)));
    }

    if let Some(amount) = msg.get(4).and_then(|v| v.as_text()) {
        out.insert("amountMinor".into(), json!(amount));
        if let Ok(minor) = amount.parse::<i64>() {
            let major = Decimal::new(minor, 2);
            out.insert("amount".into(), json!(major.to_string()));
            out.insert("amountValue".into(), json!(major.to_string()));
        }
    }

    if let Some(date) = msg.get(7).and_then(|v| v.as_text()) {
        if let Some(expanded) = expand_transmission_date_time(date) {
            out.insert("transmissionDateTime".into(), json!(expanded));
        }
    }

    simple_str(msg, 11, "stan", &mut out);
    simple_str(msg, 12, "timeLocal", &mut out);
    simple_str(msg, 13, "dateLocal", &mut out);
    simple_str(msg, 32, "acquiringInstitutionId", &mut out);
    simple_str(msg, 37, "rrn", &mut out);
    simple_str(msg, 38, "authorizationCode", &mut out);
    simple_str(msg, 39, "responseCode", &mut out);
    simple_str(msg, 42, "merchantId", &mut out);
    simple_str(msg, 44, "additionalResponseData", &mut out);
    simple_str(msg, 49, "currencyCode", &mut out);
    simple_str(msg, 123, "privateData", &mut out);

    if let Some(term) = msg.get(41).and_then(|v| v.as_text()) {
        out.insert("terminalId".into(), json!(term.trim()));
    }
    if let Some(info) = msg.get(43).and_then(|v| v.as_text()) {
        out.insert("merchantInfo".into(), json!(info.trim()));
    }
    if let Some(balance) = msg.get(54).and_then(|v| v.as_text()) {
        out.insert("balanceData".into(), json!(balance));
    }
    if let Some(mini) = msg.get(48).and_then(|v| v.as_text()) {
        out.insert("miniStatement".into(), json!(mini));
    } else if let Some(mini) = msg.get(62).and_then(|v| v.as_text()) {
        out.insert("miniStatement".into(), json!(mini));
    }
    if let Some(icc) = msg.get(55).and_then(|v| v.as_bytes()) {
        out.insert("emvDataBase64".into(), json!(b64(icc)));
    }
    if let Some(mac) = msg.get(64).and_then(|v| v.as_bytes()) {
        out.insert("macBase64".into(), json!(b64(mac)));
    }
    if let Some(from) = msg.get(102).and_then(|v| v.as_text()) {
        out.insert("fromAccount".into(), json!(from));
    }

    let mut raw = Map::new();
    let consumed: Vec<u8> = CONSUMED
        .iter()
        .chain(CONSUMED_EXTRA.iter())
        .chain(CONSUMED_ACCOUNTS.iter())
        .copied()
        .chain([43])
        .collect();

    for (&field, value) in msg.iter() {
        if consumed.contains(&field) {
            continue;
        }
        match value {
            FieldValue::Scalar { .. } => {
                raw.insert(field.to_string(), json!(field_as_raw_string(value)));
            }
            FieldValue::Composite(nested) => {
                for (&sub, sub_value) in nested.iter() {
                    raw.insert(format!("{field}.{sub}"), json!(field_as_raw_string(sub_value)));
                }
            }
        }
    }
    out.insert("rawFields".into(), Value::Object(raw));

    Value::Object(out)
}

fn simple_str(msg: &IsoMessage, field: u8, key: &str, out: &mut Map<String, Value>) {
    if let Some(v) = msg.get(field).and_then(|v| v.as_text()) {
        out.insert(key.into(), json!(v));
    }
}
