use crate::app::iso::IsoMessage;

/// Structural validation for an inbound 0200 financial request.
pub struct Validator;

const REQUIRED_FIELDS: [u8; 7] = [2, 3, 4, 7, 11, 41, 49];

impl Validator {
    /// Checks field presence, field-4 digit discipline, field-7 date
    /// validity, field-49 width, and PAN length. Only called for MTI 0200.
    pub fn validate_financial(msg: &IsoMessage) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for &field in REQUIRED_FIELDS.iter() {
            let present = msg
                .get(field)
                .and_then(|v| v.as_text())
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false);
            if !present {
                errors.push(format!("field {field} is missing or empty"));
            }
        }

        if let Some(amount) = msg.get(4).and_then(|v| v.as_text()) {
            if amount.len() != 12 || !amount.chars().all(|c| c.is_ascii_digit()) {
                errors.push("field 4 must be 12 ASCII digits".into());
            }
        }

        if let Some(date) = msg.get(7).and_then(|v| v.as_text()) {
            if !is_valid_date10(date) {
                errors.push("field 7 is not a valid MMDDHHmmss timestamp".into());
            }
        }

        if let Some(currency) = msg.get(49).and_then(|v| v.as_text()) {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_digit()) {
                errors.push("field 49 must be exactly 3 digits".into());
            }
        }

        if let Some(pan) = msg.get(2).and_then(|v| v.as_text()) {
            if pan.len() < 13 {
                errors.push("field 2 (PAN) must be at least 13 characters".into());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_date10(date: &str) -> bool {
    if date.len() != 10 || !date.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let month: u32 = date[0..2].parse().unwrap_or(0);
    let day: u32 = date[2..4].parse().unwrap_or(0);
    let hour: u32 = date[4..6].parse().unwrap_or(99);
    let minute: u32 = date[6..8].parse().unwrap_or(99);
    let second: u32 = date[8..10].parse().unwrap_or(99);
    (1..=12).contains(&month)
        && (1..=31).contains(&day)
        && hour < 24
        && minute < 60
        && second < 60
}
