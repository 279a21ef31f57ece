use rust_decimal::Decimal;
use serde::Serialize;

use crate::app::config::settings::ChargeSettings;

/// Transaction classes the charge engine decomposes fees for; every other
/// class (balance inquiry, mini-statement, transfer, reversal) is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeableTransaction {
    Deposit,
    Withdrawal,
    Purchase,
}

impl ChargeableTransaction {
    pub fn from_transaction_type(transaction_type: &str) -> Option<Self> {
        match transaction_type {
            "DEPOSIT" => Some(Self::Deposit),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            "PURCHASE" => Some(Self::Purchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub amount: Decimal,
    pub description: String,
    pub to_account: String,
}

/// Which side of the underlying transaction the inter-switch settlement
/// account sits on: the settlement account funds a deposit and absorbs a
/// withdrawal/purchase.
#[derive(Debug, Clone)]
pub struct SettlementRouting {
    pub from_account: String,
    pub to_account: String,
}

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub charges: Vec<Charge>,
    pub commission: Option<Charge>,
    pub routing: SettlementRouting,
}

/// Stateless fee/commission decomposition, applied before the ESB call for
/// DEPOSIT, WITHDRAWAL, and PURCHASE transactions.
pub struct ChargeEngine {
    settings: ChargeSettings,
}

const TRANSACTION_LIMIT_MINOR: i64 = 500_000_000;

impl ChargeEngine {
    pub fn new(settings: ChargeSettings) -> Self {
        Self { settings }
    }

    /// `amount_minor` is the transaction amount in minor units (as carried
    /// by field 4). Returns `Err(())` when the amount exceeds the
    /// transaction limit gate — callers should short-circuit with
    /// `responseCode=EXCEEDS_LIMIT`.
    pub fn compute(
        &self,
        transaction: ChargeableTransaction,
        amount_minor: i64,
        customer_account: &str,
    ) -> Result<ChargeOutcome, ()> {
        if amount_minor > TRANSACTION_LIMIT_MINOR {
            return Err(());
        }

        let amount_major = Decimal::new(amount_minor, 2);
        let base_charge = self.base_charge(amount_major);

        let pride_fee = (base_charge * self.settings.pride_share_percent).round_dp(2);
        let inter_switch_fee = (base_charge - pride_fee).round_dp(2);
        let excise_duty = (base_charge * self.settings.excise_rate).round_dp(2);

        let mut charges = Vec::new();
        if excise_duty > Decimal::ZERO {
            charges.push(Charge {
                amount: excise_duty,
                description: "excise_duty".into(),
                to_account: self.settings.tax_account.clone(),
            });
        }
        if pride_fee > Decimal::ZERO {
            charges.push(Charge {
                amount: pride_fee,
                description: "pride_fee".into(),
                to_account: self.settings.pride_charge_account.clone(),
            });
        }
        if inter_switch_fee > Decimal::ZERO {
            charges.push(Charge {
                amount: inter_switch_fee,
                description: "inter_switch_fee".into(),
                to_account: self.settings.inter_switch_charge_account.clone(),
            });
        }

        let commission = if transaction == ChargeableTransaction::Deposit {
            let amount = (amount_major * self.settings.inter_switch_commission).round_dp(2);
            (amount > Decimal::ZERO).then(|| Charge {
                amount,
                description: "inter_switch_commission".into(),
                to_account: self.settings.inter_switch_commissions_account.clone(),
            })
        } else {
            None
        };

        let routing = match transaction {
            ChargeableTransaction::Deposit => SettlementRouting {
                from_account: self.settings.inter_switch_settlement_account.clone(),
                to_account: customer_account.to_string(),
            },
            ChargeableTransaction::Withdrawal | ChargeableTransaction::Purchase => {
                SettlementRouting {
                    from_account: customer_account.to_string(),
                    to_account: self.settings.inter_switch_settlement_account.clone(),
                }
            }
        };

        Ok(ChargeOutcome { charges, commission, routing })
    }

    fn base_charge(&self, amount_major: Decimal) -> Decimal {
        let band_size = self.settings.band_size;
        if amount_major <= band_size {
            return self.settings.base_initial;
        }
        let excess = amount_major - band_size;
        let bands = (excess / band_size).ceil();
        self.settings.base_initial + self.settings.band_increment * bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChargeSettings {
        ChargeSettings {
            base_initial: Decimal::new(250000, 2),
            band_size: Decimal::new(50000000, 2),
            band_increment: Decimal::new(100000, 2),
            excise_rate: Decimal::ZERO,
            pride_share_percent: Decimal::new(20, 2),
            inter_switch_commission: Decimal::new(1, 3),
            tax_account: "TAX".into(),
            pride_charge_account: "PRIDE".into(),
            inter_switch_charge_account: "ISW_CHARGE".into(),
            inter_switch_commissions_account: "ISW_COMM".into(),
            pride_commissions_settlement_account: "PRIDE_COMM".into(),
            inter_switch_settlement_account: "SETTLEMENT".into(),
        }
    }

    #[test]
    fn base_band_applies_under_threshold() {
        let engine = ChargeEngine::new(settings());
        let outcome = engine
            .compute(ChargeableTransaction::Withdrawal, 5_000_000, "CUST")
            .unwrap();
        // No excise duty configured in this fixture, so only the
        // pride/inter-switch split is present.
        assert_eq!(outcome.charges.len(), 2);
        let total: Decimal = outcome.charges.iter().map(|c| c.amount).sum();
        assert_eq!(total, Decimal::new(250000, 2));
    }

    #[test]
    fn excise_duty_is_added_on_top_of_the_base_split() {
        let mut settings = settings();
        settings.excise_rate = Decimal::new(5, 3); // 0.5%
        let engine = ChargeEngine::new(settings);
        let outcome = engine
            .compute(ChargeableTransaction::Withdrawal, 5_000_000, "CUST")
            .unwrap();
        assert_eq!(outcome.charges.len(), 3);
        let excise = outcome
            .charges
            .iter()
            .find(|c| c.description == "excise_duty")
            .unwrap();
        assert_eq!(excise.amount, Decimal::new(1250, 2));
    }

    #[test]
    fn deposit_gets_a_commission_and_settlement_routes_in() {
        let engine = ChargeEngine::new(settings());
        let outcome = engine
            .compute(ChargeableTransaction::Deposit, 5_000_000, "CUST")
            .unwrap();
        assert!(outcome.commission.is_some());
        assert_eq!(outcome.routing.from_account, "SETTLEMENT");
        assert_eq!(outcome.routing.to_account, "CUST");
    }

    #[test]
    fn withdrawal_routes_settlement_as_destination() {
        let engine = ChargeEngine::new(settings());
        let outcome = engine
            .compute(ChargeableTransaction::Withdrawal, 5_000_000, "CUST")
            .unwrap();
        assert!(outcome.commission.is_none());
        assert_eq!(outcome.routing.from_account, "CUST");
        assert_eq!(outcome.routing.to_account, "SETTLEMENT");
    }

    #[test]
    fn amount_over_limit_is_rejected() {
        let engine = ChargeEngine::new(settings());
        assert!(engine
            .compute(ChargeableTransaction::Withdrawal, 500_000_000_01, "CUST")
            .is_err());
    }

    #[test]
    fn base_charge_increments_per_band_above_threshold() {
        let engine = ChargeEngine::new(settings());
        // 1,000,000.00 major units = one full band above the 500,000 band size.
        let outcome = engine
            .compute(ChargeableTransaction::Purchase, 100_000_000, "CUST")
            .unwrap();
        let total: Decimal = outcome.charges.iter().map(|c| c.amount).sum();
        assert_eq!(total, Decimal::new(350000, 2));
    }
}
