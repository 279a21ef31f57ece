use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::app::esb::dto::{EsbResponse, MiniStatementRecord};
use crate::app::iso::{FieldValue, IsoMessage, IsoType};

fn b64_decode(s: &str) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .unwrap_or_default()
}

/// Maps an ESB response code (two digits verbatim, or a known textual
/// code) onto the ISO-8583 two-digit response code space. Unknown textual
/// codes default to "96" (unavailable / system error).
pub fn normalize_response_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }
    match trimmed.to_uppercase().as_str() {
        "OK" | "SUCCESS" | "APPROVED" | "APPROVAL" => "00",
        "INSUFFICIENT_FUNDS" | "INSUFFICIENT FUNDS" | "NOT_ENOUGH_FUNDS" => "51",
        "INVALID_ACCOUNT" | "ACCOUNT_NOT_FOUND" | "NO_ACCOUNT" => "14",
        "EXCEEDS_LIMIT" | "LIMIT_EXCEEDED" => "61",
        "AUTH_FAILED" | "DECLINED" => "05",
        "DUPLICATE" => "94",
        "TIMEOUT" | "UNAVAILABLE" | "SERVICE_UNAVAILABLE" => "96",
        _ => "96",
    }
    .to_string()
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// A short-form error response: MTI = request MTI + 10, field 39 = "96",
/// field 44 = a truncated reason.
pub fn error_response(request: &IsoMessage, reason: &str) -> IsoMessage {
    let mut resp = IsoMessage::new(request.mti + 10);
    resp.set(39, FieldValue::text(IsoType::Alpha(2), 2, "96"));
    resp.set(44, FieldValue::text(IsoType::Llvar, 0, truncate(reason, 25)));
    resp
}

/// Builds the ESB-derived portion of an ISO response: every field this ESB
/// reply justifies, at the request's MTI + 10. Does not consider the
/// request's own fields or dictionary defaults — [`crate::app::assembler`]
/// combines those per the source-precedence rule.
pub fn build(request: &IsoMessage, esb: &EsbResponse) -> IsoMessage {
    let raw_code = esb.response_code.as_deref().unwrap_or("");
    let normalized = normalize_response_code(raw_code);

    if raw_code.eq_ignore_ascii_case("SYSTEM_ERROR") || normalized == "96" {
        let reason = esb.message.as_deref().unwrap_or("service unavailable");
        return error_response(request, reason);
    }

    let mut resp = IsoMessage::new(request.mti + 10);
    resp.set(39, FieldValue::text(IsoType::Alpha(2), 2, normalized));

    if let Some(tx_id) = &esb.transaction_id {
        resp.set(37, FieldValue::text(IsoType::Alpha(12), 12, truncate(tx_id, 12)));
    }

    if let Some(stan) = &esb.stan {
        let digits: String = stan.chars().filter(|c| c.is_ascii_digit()).collect();
        let last6 = if digits.len() > 6 {
            digits[digits.len() - 6..].to_string()
        } else {
            digits
        };
        resp.set(11, FieldValue::digits(IsoType::Numeric(6), 6, format!("{last6:0>6}")));
    }

    if let Some(minor) = amount_minor(esb) {
        resp.set(4, FieldValue::digits(IsoType::Amount, 12, format!("{minor:0>12}")));
    }

    let request_currency = request.get(49).and_then(|v| v.as_text()).map(str::to_string);
    let currency = esb.currency.clone().or_else(|| request_currency.clone());
    if let Some(currency) = &currency {
        let iso_type = if currency.chars().all(|c| c.is_ascii_digit()) {
            IsoType::Numeric(3)
        } else {
            IsoType::Alpha(3)
        };
        resp.set(49, FieldValue::text(iso_type, 3, currency.clone()));
    }

    if esb.available_balance.is_some() || esb.ledger_balance.is_some() {
        let currency_code = currency.clone().unwrap_or_else(|| "800".to_string());
        let segment = |amount: Option<Decimal>, tt: &str| -> String {
            let amount = amount.unwrap_or_default();
            let sign = if amount.is_sign_negative() { 'D' } else { 'C' };
            let minor = (amount.abs() * Decimal::new(100, 0)).round();
            format!("00{tt}{currency_code:0>3}{sign}{minor:0>12}")
        };
        let ledger = esb.ledger_balance.or(esb.available_balance);
        let available = esb.available_balance.or(esb.ledger_balance);
        let value = format!("{}{}", segment(ledger, "01"), segment(available, "02"));
        resp.set(54, FieldValue::text(IsoType::Lllvar, value.len(), value));
    }

    if esb.mini_statement_text.is_some() || esb.mini_statement.is_some() {
        let text = render_mini_statement(esb);
        let request_pc = request.get(3).and_then(|v| v.as_text()).unwrap_or("");
        let is_mini_family = request_pc.starts_with("32") || request_pc.starts_with("38");
        let field = if is_mini_family { 48 } else { 62 };
        resp.set(field, FieldValue::text(IsoType::Lllvar, text.len(), text));
    }

    if let Some(message) = &esb.message {
        resp.set(44, FieldValue::text(IsoType::Llvar, 0, truncate(message, 25)));
    }

    if let Some(auth) = esb.authorization_code.as_ref().or(esb.approval_code.as_ref()) {
        resp.set(38, FieldValue::text(IsoType::Alpha(6), 6, pad_or_truncate_alpha(auth, 6)));
    }

    if let Some(mac_b64) = &esb.mac_base64 {
        let mut bytes = b64_decode(mac_b64);
        bytes.resize(8, 0);
        resp.set(64, FieldValue::bytes(IsoType::Binary(8), 8, bytes));
    }

    if let Some(from) = &esb.from_account {
        resp.set(102, FieldValue::text(IsoType::Llvar, 0, truncate(from, 28)));
    }
    if let Some(to) = &esb.to_account {
        resp.set(103, FieldValue::text(IsoType::Llvar, 0, truncate(to, 28)));
    }

    apply_raw_fields(&mut resp, &esb.raw_fields);

    resp
}

fn pad_or_truncate_alpha(s: &str, len: usize) -> String {
    if s.len() >= len {
        s[..len].to_string()
    } else {
        format!("{s:<len$}")
    }
}

fn amount_minor(esb: &EsbResponse) -> Option<String> {
    if let Some(minor) = &esb.amount_minor {
        return Some(minor.clone());
    }
    esb.amount.map(|major| {
        let minor = (major * Decimal::new(100, 0)).round();
        minor.to_string()
    })
}

/// ESB key→arbitrary field population: a key with no dot sets that field
/// number's text value directly (only if the response doesn't already carry
/// it); dotted keys "N.M" group into a JSON object that is serialized and
/// stored as field N's value.
fn apply_raw_fields(resp: &mut IsoMessage, raw_fields: &std::collections::HashMap<String, Value>) {
    let mut groups: std::collections::BTreeMap<u8, Map<String, Value>> = std::collections::BTreeMap::new();
    let mut direct: std::collections::BTreeMap<u8, String> = std::collections::BTreeMap::new();

    for (key, value) in raw_fields {
        if let Some((n, m)) = key.split_once('.') {
            if let Ok(n) = n.parse::<u8>() {
                groups.entry(n).or_default().insert(m.to_string(), value.clone());
                continue;
            }
        }
        if let Ok(n) = key.parse::<u8>() {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            direct.insert(n, text);
        }
    }

    for (field, text) in direct {
        if !resp.has(field) && field >= 1 && field <= 128 {
            resp.set(field, FieldValue::text(IsoType::Llvar, text.len(), text));
        }
    }
    for (field, object) in groups {
        if !resp.has(field) && field >= 1 && field <= 128 {
            let text = Value::Object(object).to_string();
            resp.set(field, FieldValue::text(IsoType::Lllvar, text.len(), text));
        }
    }
}

fn parse_record_date(raw: &str) -> String {
    if let Ok(dt) = chrono::NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return dt.format("%Y%m%d000000").to_string();
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y%m%d%H%M%S").to_string();
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return dt.format("%Y%m%d%H%M%S").to_string();
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 14 {
        digits[..14].to_string()
    } else {
        format!("{digits:0<14}")
    }
}

fn render_record(record: &MiniStatementRecord) -> String {
    let date = parse_record_date(record.date.as_deref().unwrap_or(""));
    let minor = record
        .amount_minor
        .clone()
        .or_else(|| record.amount.map(|a| (a.abs() * Decimal::new(100, 0)).round().to_string()))
        .unwrap_or_else(|| "0".to_string());
    let currency = record.currency.clone().unwrap_or_else(|| "000".to_string());
    let type_code = record.type_code.clone().unwrap_or_else(|| "CSH".to_string());
    let dr_cr = record.dr_cr.clone().unwrap_or_else(|| "D".to_string());
    format!("{date}|{minor:0>12}|{currency} {type_code} {dr_cr}|{currency}")
}

/// Renders a mini-statement into the plain-text block the wire field
/// carries: `miniStatementText` verbatim when present, else up to 10
/// records rendered one per line, `~`-terminated and capped at 999 bytes.
fn render_mini_statement(esb: &EsbResponse) -> String {
    if let Some(text) = &esb.mini_statement_text {
        return truncate_bytes(text, 999);
    }
    let records = esb.mini_statement.as_deref().unwrap_or(&[]);
    let mut lines: Vec<String> = records.iter().take(10).map(render_record).collect();
    lines.push(String::new());
    let block = lines.join("\n") + "~";
    truncate_bytes(&block, 999)
}

fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s[..cut].to_string()
}
