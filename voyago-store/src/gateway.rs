use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use voyago_core::payment::{
    CapturedPayment, ChargeLine, PaymentGateway, PaymentSession, PayoutLine, PayoutReceipt,
};

/// REST client for the external payment processor's two-phase checkout
/// and payout batch APIs.
pub struct RestPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
    return_url: String,
    cancel_url: String,
}

impl RestPaymentGateway {
    pub fn new(
        base_url: String,
        client_id: String,
        secret: String,
        return_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            client_id,
            secret,
            return_url,
            cancel_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    payer: Payer,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Payer {
    payer_info: PayerInfo,
}

#[derive(Debug, Deserialize)]
struct PayerInfo {
    email: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    amount: Amount,
    payee: Payee,
}

#[derive(Debug, Deserialize)]
struct Payee {
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Amount {
    total: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    batch_header: BatchHeader,
}

#[derive(Debug, Deserialize)]
struct BatchHeader {
    payout_batch_id: String,
}

/// "5400" cents → "54.00".
fn cents_to_decimal(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

fn decimal_to_cents(decimal: &str) -> Result<i64, String> {
    let value: f64 = decimal.parse().map_err(|_| format!("bad amount: {decimal}"))?;
    Ok((value * 100.0).round() as i64)
}

#[async_trait]
impl PaymentGateway for RestPaymentGateway {
    async fn create_session(
        &self,
        amount_cents: i64,
        currency: &str,
        lines: &[ChargeLine],
        description: &str,
    ) -> Result<PaymentSession, Box<dyn std::error::Error + Send + Sync>> {
        let items: Vec<serde_json::Value> = lines
            .iter()
            .map(|line| {
                json!({
                    "name": line.name,
                    "price": cents_to_decimal(line.price_cents),
                    "currency": line.currency,
                    "quantity": line.quantity,
                })
            })
            .collect();

        let body = json!({
            "intent": "sale",
            "payer": { "payment_method": "paypal" },
            "redirect_urls": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
            },
            "transactions": [{
                "item_list": { "items": items },
                "amount": {
                    "total": cents_to_decimal(amount_cents),
                    "currency": currency,
                },
                "description": description,
            }],
        });

        let response = self
            .http
            .post(format!("{}/v1/payments/payment", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<CreatePaymentResponse>()
            .await?;

        let approval = response
            .links
            .iter()
            .find(|link| link.rel == "approval_url")
            .ok_or("processor returned no approval_url")?;

        let payer_token = approval
            .href
            .split_once("token=")
            .map(|(_, token)| token.to_string())
            .ok_or("approval_url carries no token")?;

        Ok(PaymentSession {
            id: response.id,
            payer_token,
            redirect_url: approval.href.clone(),
            created_at: Utc::now(),
        })
    }

    async fn execute(
        &self,
        session_id: &str,
        payer_confirmation: &str,
        amount_cents: i64,
    ) -> Result<CapturedPayment, Box<dyn std::error::Error + Send + Sync>> {
        let body = json!({
            "payer_id": payer_confirmation,
            "transactions": [{
                "amount": {
                    "total": cents_to_decimal(amount_cents),
                    "currency": "USD",
                },
            }],
        });

        let response = self
            .http
            .post(format!("{}/v1/payments/payment/{session_id}/execute", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ExecuteResponse>()
            .await?;

        let transaction = response
            .transactions
            .first()
            .ok_or("execute response carries no transaction")?;

        Ok(CapturedPayment {
            session_id: session_id.to_string(),
            payer_email: response.payer.payer_info.email.clone(),
            payee_email: transaction.payee.email.clone(),
            amount_cents: decimal_to_cents(&transaction.amount.total)?,
            currency: transaction.amount.currency.clone(),
        })
    }

    async fn create_payout(
        &self,
        batch_id: &str,
        lines: &[PayoutLine],
    ) -> Result<PayoutReceipt, Box<dyn std::error::Error + Send + Sync>> {
        let items: Vec<serde_json::Value> = lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                json!({
                    "recipient_type": "EMAIL",
                    "amount": {
                        "value": cents_to_decimal(line.amount_cents),
                        "currency": line.currency,
                    },
                    "receiver": line.receiver,
                    "note": line.note,
                    "sender_item_id": format!("item_{index}"),
                })
            })
            .collect();

        let body = json!({
            "sender_batch_header": {
                "sender_batch_id": batch_id,
                "email_subject": "You have a new booking.",
            },
            "items": items,
        });

        let response = self
            .http
            .post(format!("{}/v1/payments/payouts?sync_mode=false", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<PayoutResponse>()
            .await?;

        // Async batch: the processor accepted the whole submission and
        // settles lines out of band.
        Ok(PayoutReceipt {
            batch_id: response.batch_header.payout_batch_id,
            accepted: lines.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_round_trip() {
        assert_eq!(cents_to_decimal(5_400), "54.00");
        assert_eq!(cents_to_decimal(9), "0.09");
        assert_eq!(cents_to_decimal(100_05), "100.05");
        assert_eq!(decimal_to_cents("54.00").unwrap(), 5_400);
        assert_eq!(decimal_to_cents("0.09").unwrap(), 9);
        assert!(decimal_to_cents("not-money").is_err());
    }
}
