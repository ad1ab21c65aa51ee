use serde::Deserialize;
use serde_json::Value;

/// Provider webhook envelope. Only `type` is inspected up front; the inner
/// object is parsed per event type.
#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: BillingEventData,
}

#[derive(Debug, Deserialize)]
pub struct BillingEventData {
    pub object: Value,
}

/// checkout.session.completed payload. Seat count and dealer identity ride
/// in the provider-side metadata map set at checkout creation time.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub customer_email: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutMetadata {
    pub dealer_name: Option<String>,
    pub dealer_number: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub plan: Option<String>,
    pub num_licenses: Option<String>,
}

/// customer.subscription.updated / .deleted payload.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// invoice.payment_failed / .payment_succeeded payload.
#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub subscription: Option<String>,
}
