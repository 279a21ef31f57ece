use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body sent to the ESB. A plain data record — the core only
/// depends on this JSON shape, never on any ESB-side object model.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EsbRequest {
    pub message_type: Option<String>,
    pub transaction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    pub amount_minor: Option<String>,
    pub currency: Option<String>,
    pub currency_code: Option<String>,
    pub stan: Option<String>,
    pub terminal_id: Option<String>,
    pub processing_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_account: Option<String>,
    pub transmission_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrn: Option<String>,
    pub external_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub charges: Vec<ChargeDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<ChargeDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    pub raw_fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDto {
    pub amount: Decimal,
    pub description: String,
    pub to_account: String,
}

/// ESB reply. Every field is optional: the core tolerates a sparse reply
/// and only acts on the keys it recognizes.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EsbResponse {
    pub response_code: Option<String>,
    pub message: Option<String>,
    pub authorization_code: Option<String>,
    pub approval_code: Option<String>,
    pub stan: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_minor: Option<String>,
    pub currency: Option<String>,
    pub available_balance: Option<Decimal>,
    pub ledger_balance: Option<Decimal>,
    pub mini_statement: Option<Vec<MiniStatementRecord>>,
    pub mini_statement_text: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub mac_base64: Option<String>,
    #[serde(default)]
    pub raw_fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniStatementRecord {
    pub date: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_minor: Option<String>,
    pub currency: Option<String>,
    #[serde(rename = "type")]
    pub type_code: Option<String>,
    pub dr_cr: Option<String>,
}
