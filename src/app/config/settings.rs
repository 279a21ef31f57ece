use rust_decimal::Decimal;
use std::str::FromStr;

use crate::app::error::GatewayError;

/// TCP listen + worker pool configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub threads: usize,
    pub socket_timeout_ms: u64,
}

/// ESB HTTP endpoint, credentials, and per-operation path suffixes.
#[derive(Debug, Clone)]
pub struct EsbSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub withdrawal: String,
    pub deposit: String,
    pub purchase: String,
    pub balance_inquiry: String,
    pub mini_statement: String,
}

/// Fee parameters and the collection/settlement accounts they route to.
#[derive(Debug, Clone)]
pub struct ChargeSettings {
    pub base_initial: Decimal,
    pub band_size: Decimal,
    pub band_increment: Decimal,
    pub excise_rate: Decimal,
    pub pride_share_percent: Decimal,
    pub inter_switch_commission: Decimal,
    pub tax_account: String,
    pub pride_charge_account: String,
    pub inter_switch_charge_account: String,
    pub inter_switch_commissions_account: String,
    pub pride_commissions_settlement_account: String,
    pub inter_switch_settlement_account: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub esb: EsbSettings,
    pub charges: ChargeSettings,
}

impl Settings {
    /// Loads `.env` (best-effort) then layers `config::Environment` over a
    /// set of built-in defaults, so every key in the recognized-options
    /// table is overridable by an env var of the same name, upper-cased with
    /// `.` replaced by `__` (e.g. `server.port` => `SERVER__PORT`).
    pub fn load() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();

        let cfg = config::Config::builder()
            .set_default("server.port", 7790)?
            .set_default("server.threads", 20)?
            .set_default("server.socket.timeout.ms", 300_000)?
            .set_default("esb.base_url", "http://localhost:8080")?
            .set_default("esb.username", "")?
            .set_default("esb.password", "")?
            .set_default("esb.withdrawal", "/withdraw")?
            .set_default("esb.deposit", "/deposit")?
            .set_default("esb.purchase", "/purchase")?
            .set_default("esb.balance_inquiry", "/balance")?
            .set_default("esb.mini_statement", "/mini-statement")?
            .set_default("esb.tax_account", "TAX")?
            .set_default("esb.pride_charge_account", "PRIDE_CHARGE")?
            .set_default("esb.inter_switch_charge_account", "ISW_CHARGE")?
            .set_default("esb.inter_switch_commissions_account", "ISW_COMM")?
            .set_default("esb.pride_commissions_settlement_account", "PRIDE_SETTLEMENT")?
            .set_default("esb.inter_switch_settlement_account", "ISW_SETTLEMENT")?
            .set_default("esb.charges.base.initial", "2500.00")?
            .set_default("esb.charges.base.band_size", "500000.00")?
            .set_default("esb.charges.base.increment", "1000.00")?
            .set_default("esb.charges.excise.rate", "0.00")?
            .set_default("esb.charges.pride.share_percent", "0.20")?
            .set_default("esb.charges.inter_switch.commission", "0.001")?
            .add_source(config::Environment::default().separator("__").try_parsing(true))
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let get_string = |key: &str| -> Result<String, GatewayError> {
            cfg.get_string(key)
                .map_err(|e| GatewayError::Config(format!("{key}: {e}")))
        };
        let get_u16 = |key: &str| -> Result<u16, GatewayError> {
            cfg.get_int(key)
                .map_err(|e| GatewayError::Config(format!("{key}: {e}")))
                .and_then(|v| {
                    u16::try_from(v).map_err(|_| GatewayError::Config(format!("{key}: out of range for u16")))
                })
        };
        let get_u64 = |key: &str| -> Result<u64, GatewayError> {
            cfg.get_int(key)
                .map_err(|e| GatewayError::Config(format!("{key}: {e}")))
                .and_then(|v| {
                    u64::try_from(v).map_err(|_| GatewayError::Config(format!("{key}: out of range for u64")))
                })
        };
        let get_decimal = |key: &str| -> Result<Decimal, GatewayError> {
            let raw = get_string(key)?;
            Decimal::from_str(&raw).map_err(|e| GatewayError::Config(format!("{key}: {e}")))
        };

        let server = ServerSettings {
            port: get_u16("server.port")?,
            threads: get_u64("server.threads")? as usize,
            socket_timeout_ms: get_u64("server.socket.timeout.ms")?,
        };

        let esb = EsbSettings {
            base_url: get_string("esb.base_url")?,
            username: get_string("esb.username")?,
            password: get_string("esb.password")?,
            withdrawal: get_string("esb.withdrawal")?,
            deposit: get_string("esb.deposit")?,
            purchase: get_string("esb.purchase")?,
            balance_inquiry: get_string("esb.balance_inquiry")?,
            mini_statement: get_string("esb.mini_statement")?,
        };

        let charges = ChargeSettings {
            base_initial: get_decimal("esb.charges.base.initial")?,
            band_size: get_decimal("esb.charges.base.band_size")?,
            band_increment: get_decimal("esb.charges.base.increment")?,
            excise_rate: get_decimal("esb.charges.excise.rate")?,
            pride_share_percent: get_decimal("esb.charges.pride.share_percent")?,
            inter_switch_commission: get_decimal("esb.charges.inter_switch.commission")?,
            tax_account: get_string("esb.tax_account")?,
            pride_charge_account: get_string("esb.pride_charge_account")?,
            inter_switch_charge_account: get_string("esb.inter_switch_charge_account")?,
            inter_switch_commissions_account: get_string("esb.inter_switch_commissions_account")?,
            pride_commissions_settlement_account: get_string("esb.pride_commissions_settlement_account")?,
            inter_switch_settlement_account: get_string("esb.inter_switch_settlement_account")?,
        };

        Ok(Settings { server, esb, charges })
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(e: config::ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share one test function: `std::env::set_var` affects the
    // whole process, and cargo runs tests in this module on multiple threads
    // by default, so two separate tests racing on SERVER__PORT would be
    // flaky.
    #[test]
    fn settings_load_defaults_and_respect_env_overrides() {
        for key in ["SERVER__PORT", "ESB__BASE_URL", "ESB__USERNAME", "ESB__PASSWORD"] {
            std::env::remove_var(key);
        }
        let defaults = Settings::load().unwrap();
        assert_eq!(defaults.server.port, 7790);
        assert_eq!(defaults.server.threads, 20);
        assert_eq!(defaults.charges.base_initial, Decimal::new(250000, 2));

        std::env::set_var("SERVER__PORT", "9999");
        let overridden = Settings::load().unwrap();
        assert_eq!(overridden.server.port, 9999);
        std::env::remove_var("SERVER__PORT");
    }
}
