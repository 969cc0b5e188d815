//! AmiPay QR payment requests.
//!
//! Format: `amipay://?v=<int>&chain=<name>&merchant=<address>&token=<address>&amount=<decimal>&memo=<text>`
//!
//! Anything that does not parse as a complete request yields `None`; the
//! caller shows the raw scan text instead. No chain lookups happen here, the
//! token is checked against the configured stablecoin at settlement time.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::address::{lower_hex, parse_address};
use crate::units::is_positive_decimal;

pub const QR_SCHEME: &str = "amipay://";
pub const DEFAULT_VERSION: u32 = 1;
pub const DEFAULT_CHAIN: &str = "hoodi";

/// A payment request decoded from a scanned QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub version: u32,
    pub chain: String,
    pub merchant: Address,
    pub token: Address,
    /// Decimal amount in whole tokens ("12.50")
    pub amount: String,
    pub memo: Option<String>,
}

impl PaymentRequest {
    /// Canonical `amipay://` form of this request.
    pub fn to_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("v", &self.version.to_string())
            .append_pair("chain", &self.chain)
            .append_pair("merchant", &lower_hex(&self.merchant))
            .append_pair("token", &lower_hex(&self.token))
            .append_pair("amount", &self.amount);
        if let Some(memo) = &self.memo {
            query.append_pair("memo", memo);
        }
        format!("{}?{}", QR_SCHEME, query.finish())
    }
}

/// Parse scanned text into a [`PaymentRequest`].
pub fn parse_payment_qr(text: &str) -> Option<PaymentRequest> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }

    let prefix = raw.get(..QR_SCHEME.len())?;
    if !prefix.eq_ignore_ascii_case(QR_SCHEME) {
        return None;
    }

    // Rewrite onto a generic http URI so the query parser sees a normal
    // authority; whatever followed the scheme becomes the path.
    let generic = format!("http://amipay/{}", &raw[QR_SCHEME.len()..]);
    let url = match Url::parse(&generic) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(error = %e, "amipay QR is not a valid URI");
            return None;
        }
    };

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    let merchant = param("merchant").filter(|s| !s.is_empty())?;
    let token = param("token").filter(|s| !s.is_empty())?;
    let amount = param("amount").filter(|s| !s.is_empty())?;

    let merchant = match parse_address(&merchant) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::debug!(error = %e, "amipay QR has a malformed merchant");
            return None;
        }
    };
    let token = match parse_address(&token) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::debug!(error = %e, "amipay QR has a malformed token");
            return None;
        }
    };
    if !is_positive_decimal(&amount) {
        tracing::debug!(amount = %amount, "amipay QR amount is not a positive decimal");
        return None;
    }

    let version = param("v")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_VERSION);
    let chain = param("chain").unwrap_or_else(|| DEFAULT_CHAIN.to_string());
    let memo = param("memo").filter(|m| !m.is_empty());

    Some(PaymentRequest {
        version,
        chain,
        merchant,
        token,
        amount: amount.trim().to_string(),
        memo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERCHANT: &str = "0xc6b1ac76f1a697a3be5a56a9a0dd6d7e418bdca6";
    const TOKEN: &str = "0xCad6980d7c09EEcd20D4c12110C8b89755D9A227";

    fn qr(query: &str) -> String {
        format!("amipay://?{}", query)
    }

    #[test]
    fn parses_a_complete_request() {
        let text = qr(&format!(
            "v=2&chain=sepolia&merchant={MERCHANT}&token={TOKEN}&amount=12.50&memo=Lunch%20set"
        ));
        let req = parse_payment_qr(&text).unwrap();

        assert_eq!(req.version, 2);
        assert_eq!(req.chain, "sepolia");
        assert_eq!(req.merchant, parse_address(MERCHANT).unwrap());
        assert_eq!(req.token, parse_address(TOKEN).unwrap());
        assert_eq!(req.amount, "12.50");
        assert_eq!(req.memo.as_deref(), Some("Lunch set"));
    }

    #[test]
    fn defaults_version_and_chain() {
        let req = parse_payment_qr(&qr(&format!(
            "merchant={MERCHANT}&token={TOKEN}&amount=8"
        )))
        .unwrap();
        assert_eq!(req.version, 1);
        assert_eq!(req.chain, "hoodi");
        assert_eq!(req.memo, None);
    }

    #[test]
    fn non_numeric_version_falls_back_to_one() {
        let req = parse_payment_qr(&qr(&format!(
            "v=abc&merchant={MERCHANT}&token={TOKEN}&amount=8&memo="
        )))
        .unwrap();
        assert_eq!(req.version, 1);
        assert_eq!(req.memo, None);
    }

    #[test]
    fn missing_mandatory_fields_are_rejected() {
        assert!(parse_payment_qr(&qr(&format!("token={TOKEN}&amount=8"))).is_none());
        assert!(parse_payment_qr(&qr(&format!("merchant={MERCHANT}&amount=8"))).is_none());
        assert!(parse_payment_qr(&qr(&format!("merchant={MERCHANT}&token={TOKEN}"))).is_none());
        assert!(parse_payment_qr(&qr(&format!(
            "merchant={MERCHANT}&token={TOKEN}&amount="
        )))
        .is_none());
    }

    #[test]
    fn wrong_scheme_or_empty_input_is_rejected() {
        let body = format!("?merchant={MERCHANT}&token={TOKEN}&amount=8");
        assert!(parse_payment_qr(&format!("https://pay.example{body}")).is_none());
        assert!(parse_payment_qr(&format!("ethereum:{body}")).is_none());
        assert!(parse_payment_qr("").is_none());
        assert!(parse_payment_qr("   ").is_none());
        assert!(parse_payment_qr("amipay").is_none());
    }

    #[test]
    fn scheme_match_is_case_insensitive() {
        let text = format!("  AmiPay://?merchant={MERCHANT}&token={TOKEN}&amount=1.5\n");
        let req = parse_payment_qr(&text).unwrap();
        assert_eq!(req.amount, "1.5");
    }

    #[test]
    fn malformed_addresses_and_amounts_are_rejected() {
        assert!(parse_payment_qr(&qr(&format!(
            "merchant=shop&token={TOKEN}&amount=8"
        )))
        .is_none());
        assert!(parse_payment_qr(&qr(&format!(
            "merchant={MERCHANT}&token={TOKEN}&amount=-3"
        )))
        .is_none());
        assert!(parse_payment_qr(&qr(&format!(
            "merchant={MERCHANT}&token={TOKEN}&amount=0"
        )))
        .is_none());
    }

    #[test]
    fn parsing_is_idempotent_and_uri_form_round_trips() {
        let text = qr(&format!(
            "merchant={MERCHANT}&token={TOKEN}&amount=3.25&memo=table+4"
        ));
        let first = parse_payment_qr(&text).unwrap();
        let second = parse_payment_qr(&text).unwrap();
        assert_eq!(first, second);

        let again = parse_payment_qr(&first.to_uri()).unwrap();
        assert_eq!(again, first);
    }
}
