use std::sync::Arc;

use chrono::Months;
use tracing::{info, instrument, warn};

use crate::app::assembler::ResponseAssembler;
use crate::app::charges::{ChargeEngine, ChargeOutcome, ChargeableTransaction};
use crate::app::esb::client::{EsbGateway, EsbOperation};
use crate::app::esb::dto::{ChargeDto, EsbRequest};
use crate::app::iso::{FieldValue, IsoMessage, IsoType, MessageDictionary};
use crate::app::translate::{iso_to_json, json_to_iso};
use crate::app::validator::Validator;

/// Orchestrates one request/response round trip. Stateless: everything it
/// needs travels in through `esb`/`charges`/`dictionary`, constructed once in
/// `main` and shared across every connection.
pub struct Processor {
    esb: Arc<dyn EsbGateway>,
    charges: ChargeEngine,
    dictionary: Arc<MessageDictionary>,
}

impl Processor {
    pub fn new(esb: Arc<dyn EsbGateway>, charges: ChargeEngine, dictionary: Arc<MessageDictionary>) -> Self {
        Self { esb, charges, dictionary }
    }

    #[instrument(skip(self, request), fields(mti = request.mti))]
    pub async fn handle(&self, request: &IsoMessage) -> IsoMessage {
        match request.mti {
            0800 => self.handle_network_management(request),
            0420 => self.handle_reversal(request).await,
            0200 => self.handle_financial(request).await,
            other => {
                warn!(mti = other, "MTI not in the accepted set; continuing on the generic financial path");
                self.handle_financial(request).await
            }
        }
    }

    fn handle_network_management(&self, request: &IsoMessage) -> IsoMessage {
        let allowed = ResponseAssembler::echo_allowed_fields(request);
        ResponseAssembler::assemble(request.mti + 10, &allowed, request, None, &self.dictionary)
    }

    async fn handle_reversal(&self, request: &IsoMessage) -> IsoMessage {
        let transaction_type = processing_code_transaction_type(request);
        let esb_request = self.build_esb_request(request, &transaction_type, None);

        if let Some(operation) = operation_for(&transaction_type) {
            if let Err(e) = self.esb.call(operation, &esb_request).await {
                warn!(error = %e, "ESB call failed during reversal; response still echoes the request verbatim");
            }
        }

        let allowed = ResponseAssembler::echo_allowed_fields(request);
        ResponseAssembler::assemble(request.mti + 10, &allowed, request, None, &self.dictionary)
    }

    async fn handle_financial(&self, request: &IsoMessage) -> IsoMessage {
        if let Err(errors) = Validator::validate_financial(request) {
            info!(?errors, "financial request failed structural validation");
            return validation_failure_response(&errors);
        }

        let transaction_type = processing_code_transaction_type(request);
        let amount_minor: i64 = request
            .get(4)
            .and_then(|v| v.as_text())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let customer_account = request.get(2).and_then(|v| v.as_text()).unwrap_or("");

        let charge_outcome = match ChargeableTransaction::from_transaction_type(&transaction_type) {
            Some(transaction) => {
                match self.charges.compute(transaction, amount_minor, customer_account) {
                    Ok(outcome) => Some(outcome),
                    Err(()) => return limit_exceeded_response(request, &self.dictionary),
                }
            }
            None => None,
        };

        let operation = match operation_for(&transaction_type) {
            Some(op) => op,
            None => return unsupported_transaction_response(request, &self.dictionary),
        };

        let esb_request = self.build_esb_request(request, &transaction_type, charge_outcome.as_ref());

        let esb_derived = match self.esb.call(operation, &esb_request).await {
            Ok(response) => json_to_iso::build(request, &response),
            Err(e) => json_to_iso::error_response(request, &e.short_message()),
        };

        let allowed = ResponseAssembler::financial_allowed_fields(request);
        let response =
            ResponseAssembler::assemble(request.mti + 10, &allowed, request, Some(&esb_derived), &self.dictionary);
        info!(
            transaction_type = %transaction_type,
            response_code = ?response.get(39).and_then(|v| v.as_text()),
            "financial request handled"
        );
        response
    }

    fn build_esb_request(
        &self,
        request: &IsoMessage,
        transaction_type: &str,
        charge_outcome: Option<&ChargeOutcome>,
    ) -> EsbRequest {
        let json = iso_to_json::to_json(request);
        let get_str = |key: &str| json.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let mut charges = Vec::new();
        let mut commission = None;
        let mut from_account = get_str("fromAccount");
        let mut to_account = None;

        if let Some(outcome) = charge_outcome {
            charges = outcome
                .charges
                .iter()
                .map(|c| ChargeDto {
                    amount: c.amount,
                    description: c.description.clone(),
                    to_account: c.to_account.clone(),
                })
                .collect();
            commission = outcome.commission.as_ref().map(|c| ChargeDto {
                amount: c.amount,
                description: c.description.clone(),
                to_account: c.to_account.clone(),
            });
            from_account = Some(outcome.routing.from_account.clone());
            to_account = Some(outcome.routing.to_account.clone());
        }

        let raw_fields = json
            .get("rawFields")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let (from_date, to_date) = if transaction_type == "MINI_STATEMENT" {
            let today = chrono::Utc::now().date_naive();
            let from = today.checked_sub_months(Months::new(3)).unwrap_or(today);
            (
                Some(from.format("%d/%m/%Y").to_string()),
                Some(today.format("%d/%m/%Y").to_string()),
            )
        } else {
            (None, None)
        };

        let stan = get_str("stan").unwrap_or_default();
        let terminal_id = get_str("terminalId").unwrap_or_default();

        EsbRequest {
            message_type: get_str("messageType"),
            transaction_type: Some(transaction_type.to_string()),
            card_number: get_str("cardNumber"),
            account_number: get_str("accountNumber"),
            amount: json
                .get("amount")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            amount_minor: get_str("amountMinor"),
            currency: get_str("currencyCode"),
            currency_code: get_str("currencyCode"),
            stan: Some(stan.clone()),
            terminal_id: get_str("terminalId"),
            processing_code: get_str("processingCode"),
            from_account,
            to_account,
            target_account: None,
            transmission_date_time: get_str("transmissionDateTime"),
            rrn: get_str("rrn"),
            external_ref: external_reference(&stan, &terminal_id),
            fee: charge_outcome.map(|o| o.charges.iter().map(|c| c.amount).sum()),
            narration: None,
            phone_no: None,
            service_id: None,
            charges,
            commission,
            from_date,
            to_date,
            raw_fields,
        }
    }
}

fn processing_code_transaction_type(request: &IsoMessage) -> String {
    let pc = request.get(3).and_then(|v| v.as_text()).unwrap_or("");
    iso_to_json::transaction_type_for(pc).to_string()
}

fn operation_for(transaction_type: &str) -> Option<EsbOperation> {
    match transaction_type {
        "WITHDRAWAL" => Some(EsbOperation::Withdrawal),
        "DEPOSIT" => Some(EsbOperation::Deposit),
        "PURCHASE" => Some(EsbOperation::Purchase),
        "BALANCE_INQUIRY" => Some(EsbOperation::BalanceInquiry),
        "MINI_STATEMENT" => Some(EsbOperation::MiniStatement),
        // TRANSFER has no dedicated ESB endpoint; OTHER is unclassified.
        _ => None,
    }
}

/// `"Ref " + yyyyMMddHHmmssSSS + 5 uppercase letters + 5 digits`, derived
/// deterministically from the terminal id and STAN rather than random, so a
/// retried request produces a stable reference.
fn external_reference(stan: &str, terminal_id: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f").to_string();
    let letters: String = terminal_id
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .chain(std::iter::repeat('X'))
        .take(5)
        .collect();
    let digits_only: String = stan.chars().filter(|c| c.is_ascii_digit()).collect();
    let last5: String = digits_only.chars().rev().take(5).collect::<String>().chars().rev().collect();
    format!("Ref {timestamp}{letters}{:0>5}", last5)
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn validation_failure_response(errors: &[String]) -> IsoMessage {
    let mut resp = IsoMessage::new(0231);
    resp.set(39, FieldValue::text(IsoType::Alpha(2), 2, "30"));
    let summary = truncate(&errors.join("; "), 25);
    resp.set(44, FieldValue::text(IsoType::Llvar, summary.len(), summary));
    resp
}

fn limit_exceeded_response(request: &IsoMessage, dictionary: &MessageDictionary) -> IsoMessage {
    let mut derived = IsoMessage::new(request.mti + 10);
    derived.set(39, FieldValue::text(IsoType::Alpha(2), 2, "61"));
    let msg = truncate("Transaction amount exceeds allowed limit", 25);
    derived.set(44, FieldValue::text(IsoType::Llvar, msg.len(), msg));
    let allowed = ResponseAssembler::financial_allowed_fields(request);
    ResponseAssembler::assemble(request.mti + 10, &allowed, request, Some(&derived), dictionary)
}

fn unsupported_transaction_response(request: &IsoMessage, dictionary: &MessageDictionary) -> IsoMessage {
    let mut derived = IsoMessage::new(request.mti + 10);
    derived.set(39, FieldValue::text(IsoType::Alpha(2), 2, "96"));
    let msg = "unsupported transaction type";
    derived.set(44, FieldValue::text(IsoType::Llvar, msg.len(), msg.to_string()));
    let allowed = ResponseAssembler::financial_allowed_fields(request);
    ResponseAssembler::assemble(request.mti + 10, &allowed, request, Some(&derived), dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_reference_has_the_expected_shape() {
        let r = external_reference("000001", "ATM00001");
        assert!(r.starts_with("Ref "));
        assert!(r.ends_with("00001"));
    }

    fn dictionary() -> Arc<MessageDictionary> {
        Arc::new(MessageDictionary::standard())
    }

    #[test]
    fn network_management_echoes_exactly_the_request_fields() {
        let mut request = IsoMessage::new(0800);
        request.set(70, FieldValue::digits(IsoType::Numeric(3), 3, "001"));

        // handle_network_management doesn't touch self, so a minimal
        // Processor-free path is enough to exercise it via the assembler.
        let allowed = ResponseAssembler::echo_allowed_fields(&request);
        let resp = ResponseAssembler::assemble(request.mti + 10, &allowed, &request, None, &dictionary());
        assert_eq!(resp.mti, 0810);
        assert_eq!(resp.field_numbers(), vec![70]);
    }

    #[test]
    fn validation_failure_uses_fixed_mti_0231() {
        let resp = validation_failure_response(&["field 2 is missing".to_string()]);
        assert_eq!(resp.mti, 231);
        assert_eq!(resp.get(39).unwrap().as_text(), Some("30"));
    }

    #[test]
    fn limit_exceeded_keeps_request_fields_and_adds_39_44() {
        let mut request = IsoMessage::new(0200);
        request.set(11, FieldValue::digits(IsoType::Numeric(6), 6, "000001"));
        let resp = limit_exceeded_response(&request, &dictionary());
        assert_eq!(resp.mti, 0210);
        assert_eq!(resp.get(39).unwrap().as_text(), Some("61"));
        assert_eq!(resp.get(11).unwrap().as_text(), Some("000001"));
    }

    #[test]
    fn operation_for_has_no_route_for_transfer() {
        assert!(operation_for("TRANSFER").is_none());
        assert!(operation_for("WITHDRAWAL").is_some());
    }

    struct StubGateway {
        response: crate::app::esb::dto::EsbResponse,
    }

    #[async_trait::async_trait]
    impl EsbGateway for StubGateway {
        async fn call(
            &self,
            _operation: EsbOperation,
            _request: &EsbRequest,
        ) -> Result<crate::app::esb::dto::EsbResponse, crate::app::error::GatewayError> {
            Ok(self.response.clone())
        }
    }

    fn charge_settings() -> crate::app::config::settings::ChargeSettings {
        crate::app::config::settings::ChargeSettings {
            base_initial: rust_decimal::Decimal::new(250000, 2),
            band_size: rust_decimal::Decimal::new(50000000, 2),
            band_increment: rust_decimal::Decimal::new(100000, 2),
            excise_rate: rust_decimal::Decimal::ZERO,
            pride_share_percent: rust_decimal::Decimal::new(20, 2),
            inter_switch_commission: rust_decimal::Decimal::new(1, 3),
            tax_account: "TAX".into(),
            pride_charge_account: "PRIDE".into(),
            inter_switch_charge_account: "ISW_CHARGE".into(),
            inter_switch_commissions_account: "ISW_COMM".into(),
            pride_commissions_settlement_account: "PRIDE_COMM".into(),
            inter_switch_settlement_account: "SETTLEMENT".into(),
        }
    }

    fn withdrawal_request() -> IsoMessage {
        let mut msg = IsoMessage::new(0200);
        msg.set(2, FieldValue::text(IsoType::Llvar, 13, "4123456789012"));
        msg.set(3, FieldValue::digits(IsoType::Numeric(6), 6, "010000"));
        msg.set(4, FieldValue::digits(IsoType::Amount, 12, "000000050000"));
        msg.set(7, FieldValue::digits(IsoType::Date10, 10, "0731120000"));
        msg.set(11, FieldValue::digits(IsoType::Numeric(6), 6, "000001"));
        msg.set(41, FieldValue::text(IsoType::Alpha(8), 8, "ATM00001"));
        msg.set(49, FieldValue::digits(IsoType::Numeric(3), 3, "800"));
        msg
    }

    #[tokio::test]
    async fn successful_withdrawal_carries_auth_code_and_balance() {
        let gateway = StubGateway {
            response: crate::app::esb::dto::EsbResponse {
                response_code: Some("00".into()),
                authorization_code: Some("AUTH01".into()),
                available_balance: Some(rust_decimal::Decimal::new(123456, 2)),
                ledger_balance: Some(rust_decimal::Decimal::new(123456, 2)),
                transaction_id: Some("RRN000000001".into()),
                ..Default::default()
            },
        };
        let processor = Processor::new(Arc::new(gateway), ChargeEngine::new(charge_settings()), dictionary());
        let response = processor.handle(&withdrawal_request()).await;

        assert_eq!(response.mti, 0210);
        assert_eq!(response.get(39).unwrap().as_text(), Some("00"));
        assert_eq!(response.get(38).unwrap().as_text(), Some("AUTH01"));
        let balance = response.get(54).unwrap().as_text().unwrap();
        assert_eq!(balance, "0001800C0000001234560002800C000000123456");
        // every request field survives into the response
        assert_eq!(response.get(2).unwrap().as_text(), Some("4123456789012"));
    }

    #[tokio::test]
    async fn declined_withdrawal_with_a_sparse_esb_reply_still_carries_38_and_54_blank() {
        let gateway = StubGateway {
            response: crate::app::esb::dto::EsbResponse {
                response_code: Some("05".into()),
                ..Default::default()
            },
        };
        let processor = Processor::new(Arc::new(gateway), ChargeEngine::new(charge_settings()), dictionary());
        let response = processor.handle(&withdrawal_request()).await;

        assert_eq!(response.mti, 0210);
        assert_eq!(response.get(39).unwrap().as_text(), Some("05"));
        assert!(response.has(38), "field 38 must be present even when the ESB omits authorizationCode");
        assert_eq!(response.get(38).unwrap().as_text(), Some(""));
        assert!(response.has(54), "field 54 must be present even when the ESB omits both balances");
        assert_eq!(response.get(54).unwrap().as_text(), Some(""));
    }

    #[tokio::test]
    async fn validation_failure_skips_the_esb_call_entirely() {
        struct PanicGateway;
        #[async_trait::async_trait]
        impl EsbGateway for PanicGateway {
            async fn call(
                &self,
                _operation: EsbOperation,
                _request: &EsbRequest,
            ) -> Result<crate::app::esb::dto::EsbResponse, crate::app::error::GatewayError> {
                panic!("ESB must not be called for a request that fails validation");
            }
        }
        let mut request = withdrawal_request();
        request.remove(2);

        let processor = Processor::new(Arc::new(PanicGateway), ChargeEngine::new(charge_settings()), dictionary());
        let response = processor.handle(&request).await;
        assert_eq!(response.mti, 231);
        assert_eq!(response.get(39).unwrap().as_text(), Some("30"));
    }

    #[tokio::test]
    async fn amount_over_the_limit_short_circuits_before_the_esb_call() {
        struct PanicGateway;
        #[async_trait::async_trait]
        impl EsbGateway for PanicGateway {
            async fn call(
                &self,
                _operation: EsbOperation,
                _request: &EsbRequest,
            ) -> Result<crate::app::esb::dto::EsbResponse, crate::app::error::GatewayError> {
                panic!("ESB must not be called once the limit gate rejects the amount");
            }
        }
        let mut request = withdrawal_request();
        request.set(4, FieldValue::digits(IsoType::Amount, 12, "500000000001"));

        let processor = Processor::new(Arc::new(PanicGateway), ChargeEngine::new(charge_settings()), dictionary());
        let response = processor.handle(&request).await;
        assert_eq!(response.mti, 0210);
        assert_eq!(response.get(39).unwrap().as_text(), Some("61"));
    }

    #[tokio::test]
    async fn network_management_never_calls_the_esb() {
        struct PanicGateway;
        #[async_trait::async_trait]
        impl EsbGateway for PanicGateway {
            async fn call(
                &self,
                _operation: EsbOperation,
                _request: &EsbRequest,
            ) -> Result<crate::app::esb::dto::EsbResponse, crate::app::error::GatewayError> {
                panic!("0800 must never reach the ESB");
            }
        }
        let mut request = IsoMessage::new(0800);
        request.set(70, FieldValue::digits(IsoType::Numeric(3), 3, "001"));

        let processor = Processor::new(Arc::new(PanicGateway), ChargeEngine::new(charge_settings()), dictionary());
        let response = processor.handle(&request).await;
        assert_eq!(response.mti, 0810);
        assert_eq!(response.field_numbers(), vec![70]);
    }
}
