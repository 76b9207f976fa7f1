//! Which configured payment methods a given purchase may actually use.

use chrono::{Datelike, NaiveDate, Utc};

use crate::payment::{sort_by_display_priority, PaymentType};
use crate::settings::GatewayConfig;

/// Minimum order amount (minor units) for guaranteed methods.
pub const GUARANTEE_MIN_AMOUNT: i64 = 999;
/// Minimum order amount for instalment methods (two guarantee minimums).
pub const INSTALMENT_MIN_AMOUNT: i64 = 1998;

const GUARANTEE_COUNTRIES: &[&str] = &["AT", "DE", "CH"];
const GUARANTEE_B2B_COUNTRIES: &[&str] = &[
    "AT", "DE", "CH", "BE", "DK", "BG", "IT", "ES", "SE", "PT", "NL", "IE", "HU", "GR", "FR",
    "FI", "CZ",
];

/// The purchase facts the eligibility rules look at.
#[derive(Debug, Clone, Default)]
pub struct OrderContext {
    /// Order amount in minor units.
    pub amount: i64,
    /// ISO 4217 code, e.g. `EUR`.
    pub currency: String,
    /// ISO 3166-1 alpha-2 billing country.
    pub country: String,
    pub company: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub user_agent: Option<String>,
}

impl OrderContext {
    fn has_company(&self) -> bool {
        self.company
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Why a guaranteed method cannot be offered for this purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuaranteeRejection {
    AmountTooLow,
    CurrencyNotSupported,
    CountryNotSupported,
    CustomerUnderage,
}

/// Checks the payment-guarantee conditions for one method.
///
/// Instalment methods additionally require that the smallest configured cycle
/// still yields at least the guarantee minimum per instalment.
pub fn check_guarantee(
    ty: PaymentType,
    ctx: &OrderContext,
    config: &GatewayConfig,
) -> Result<(), GuaranteeRejection> {
    let min_amount = if ty.supports_instalment() {
        INSTALMENT_MIN_AMOUNT
    } else {
        GUARANTEE_MIN_AMOUNT
    };
    if ctx.amount < min_amount {
        return Err(GuaranteeRejection::AmountTooLow);
    }
    if ty.supports_instalment() {
        let cycles = &config.method(ty).instalment_cycles;
        let smallest = cycles.iter().copied().filter(|c| *c > 1).min();
        match smallest {
            Some(cycle) if ctx.amount / i64::from(cycle) >= GUARANTEE_MIN_AMOUNT => {}
            _ => return Err(GuaranteeRejection::AmountTooLow),
        }
    }
    if !ctx.currency.eq_ignore_ascii_case("EUR") {
        return Err(GuaranteeRejection::CurrencyNotSupported);
    }

    let b2b = ctx.has_company() && config.method(ty).allow_b2b;
    let countries = if b2b {
        GUARANTEE_B2B_COUNTRIES
    } else {
        GUARANTEE_COUNTRIES
    };
    if !countries
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&ctx.country))
    {
        return Err(GuaranteeRejection::CountryNotSupported);
    }

    // Consumers must be of age; company purchases skip the check.
    if !ctx.has_company() {
        if let Some(birth_date) = ctx.birth_date {
            if age_in_years(birth_date, Utc::now().date_naive()) < 18 {
                return Err(GuaranteeRejection::CustomerUnderage);
            }
        }
    }

    Ok(())
}

fn age_in_years(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Apple Pay only works in Safari on Apple hardware; this is a display hint,
/// not an enforcement point.
pub fn user_agent_supports_applepay(user_agent: &str) -> bool {
    let is_mac = user_agent.contains("Macintosh")
        || user_agent.contains("iPhone")
        || user_agent.contains("iPad");
    let chromium_family = ["Chrome", "CriOS", "FxiOS", "EdgiOS", "OPiOS"]
        .iter()
        .any(|marker| user_agent.contains(marker));
    is_mac && user_agent.contains("Safari") && !chromium_family
}

/// The configured methods this purchase may choose from, sorted in the fixed
/// checkout display order.
///
/// Guaranteed methods replace their plain counterparts when the guarantee
/// conditions hold; when they fail, the plain variant is offered only if the
/// merchant opted into the fallback.
pub fn eligible_methods(ctx: &OrderContext, config: &GatewayConfig) -> Vec<String> {
    let enabled = config.enabled_methods();
    let mut offered: Vec<String> = Vec::new();

    for ty in &enabled {
        let ty = *ty;
        match ty {
            _ if ty.supports_guarantee() || ty.supports_instalment() => {
                if check_guarantee(ty, ctx, config).is_ok() {
                    offered.push(ty.code().to_string());
                }
            }
            PaymentType::Applepay => {
                let visible = ctx
                    .user_agent
                    .as_deref()
                    .map(user_agent_supports_applepay)
                    .unwrap_or(true);
                if visible {
                    offered.push(ty.code().to_string());
                }
            }
            _ => offered.push(ty.code().to_string()),
        }
    }

    // A passing guarantee displaces the plain variant; a failing one restores
    // it only under the merchant's fallback flag.
    for (guaranteed, plain) in [
        (PaymentType::GuaranteedInvoice, PaymentType::Invoice),
        (
            PaymentType::GuaranteedDirectDebitSepa,
            PaymentType::DirectDebitSepa,
        ),
    ] {
        if !enabled.contains(&guaranteed) {
            continue;
        }
        if offered.iter().any(|code| code == guaranteed.code()) {
            offered.retain(|code| code != plain.code());
        } else if config.method(guaranteed).force_non_guarantee
            && enabled.contains(&plain)
            && !offered.iter().any(|code| code == plain.code())
        {
            offered.push(plain.code().to_string());
        }
    }

    sort_by_display_priority(&mut offered);
    offered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MethodSettings;

    fn config_with(methods: &[(&str, MethodSettings)]) -> GatewayConfig {
        let mut config: GatewayConfig = serde_json::from_value(serde_json::json!({
            "signature": "sig",
            "access_key": "key",
            "tariff": "1"
        }))
        .unwrap();
        for (code, settings) in methods {
            config.methods.insert((*code).to_string(), settings.clone());
        }
        config
    }

    fn enabled() -> MethodSettings {
        MethodSettings {
            enabled: true,
            ..Default::default()
        }
    }

    fn eur_order(amount: i64) -> OrderContext {
        OrderContext {
            amount,
            currency: "EUR".into(),
            country: "DE".into(),
            ..Default::default()
        }
    }

    #[test]
    fn guarantee_minimum_is_inclusive() {
        let config = config_with(&[("GUARANTEED_INVOICE", enabled())]);
        assert_eq!(
            check_guarantee(PaymentType::GuaranteedInvoice, &eur_order(998), &config),
            Err(GuaranteeRejection::AmountTooLow)
        );
        assert!(check_guarantee(PaymentType::GuaranteedInvoice, &eur_order(999), &config).is_ok());
    }

    #[test]
    fn instalment_needs_minimum_per_cycle() {
        let settings = MethodSettings {
            enabled: true,
            instalment_cycles: vec![2, 3],
            ..Default::default()
        };
        let config = config_with(&[("INSTALMENT_INVOICE", settings)]);
        assert_eq!(
            check_guarantee(PaymentType::InstalmentInvoice, &eur_order(1997), &config),
            Err(GuaranteeRejection::AmountTooLow)
        );
        assert!(
            check_guarantee(PaymentType::InstalmentInvoice, &eur_order(1998), &config).is_ok()
        );
    }

    #[test]
    fn guarantee_requires_eur() {
        let config = config_with(&[("GUARANTEED_INVOICE", enabled())]);
        let mut ctx = eur_order(1500);
        ctx.currency = "GBP".into();
        assert_eq!(
            check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config),
            Err(GuaranteeRejection::CurrencyNotSupported)
        );
    }

    #[test]
    fn b2b_country_set_needs_company_and_flag() {
        let mut settings = enabled();
        settings.allow_b2b = true;
        let config = config_with(&[("GUARANTEED_INVOICE", settings)]);

        let mut ctx = eur_order(1500);
        ctx.country = "FR".into();
        assert_eq!(
            check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config),
            Err(GuaranteeRejection::CountryNotSupported)
        );

        ctx.company = Some("ACME GmbH".into());
        assert!(check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config).is_ok());

        let config_no_b2b = config_with(&[("GUARANTEED_INVOICE", enabled())]);
        assert_eq!(
            check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config_no_b2b),
            Err(GuaranteeRejection::CountryNotSupported)
        );
    }

    #[test]
    fn underage_consumer_is_rejected_but_company_is_not() {
        let config = config_with(&[("GUARANTEED_INVOICE", enabled())]);
        let mut ctx = eur_order(1500);
        ctx.birth_date = Some(Utc::now().date_naive() - chrono::Duration::days(17 * 366));
        assert_eq!(
            check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config),
            Err(GuaranteeRejection::CustomerUnderage)
        );

        ctx.company = Some("ACME GmbH".into());
        assert!(check_guarantee(PaymentType::GuaranteedInvoice, &ctx, &config).is_ok());
    }

    #[test]
    fn passing_guarantee_displaces_plain_variant() {
        let config = config_with(&[
            ("GUARANTEED_INVOICE", enabled()),
            ("INVOICE", enabled()),
            ("PAYPAL", enabled()),
        ]);
        let offered = eligible_methods(&eur_order(1500), &config);
        assert_eq!(offered, ["GUARANTEED_INVOICE", "PAYPAL"]);
    }

    #[test]
    fn failed_guarantee_falls_back_only_when_forced() {
        let ctx = eur_order(500);

        let config = config_with(&[("GUARANTEED_INVOICE", enabled()), ("INVOICE", enabled())]);
        assert!(eligible_methods(&ctx, &config).is_empty());

        let mut forced = enabled();
        forced.force_non_guarantee = true;
        let config = config_with(&[("GUARANTEED_INVOICE", forced), ("INVOICE", enabled())]);
        assert_eq!(eligible_methods(&ctx, &config), ["INVOICE"]);
    }

    #[test]
    fn applepay_hidden_for_chromium_on_mac() {
        assert!(user_agent_supports_applepay(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
        ));
        assert!(!user_agent_supports_applepay(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        ));
        assert!(!user_agent_supports_applepay(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
        ));
    }

    #[test]
    fn offered_methods_follow_display_order() {
        let config = config_with(&[
            ("PAYPAL", enabled()),
            ("DIRECT_DEBIT_SEPA", enabled()),
            ("EPS", enabled()),
        ]);
        assert_eq!(
            eligible_methods(&eur_order(500), &config),
            ["DIRECT_DEBIT_SEPA", "EPS", "PAYPAL"]
        );
    }
}
