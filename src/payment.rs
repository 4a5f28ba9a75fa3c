use actix_web::{web, Responder};
use chrono::Utc;
use log::error;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::order::Order;
use crate::response;

/// Payment method tag carried on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    BankTransfer,
    CreditCard,
    EWallet,
    Cod,
}

/// A concrete payment option shown at checkout. Processing is a stub; this
/// catalogue only drives the UI.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: PaymentKind,
    pub description: &'static str,
    pub is_active: bool,
}

pub fn payment_methods() -> Vec<PaymentMethod> {
    vec![
        PaymentMethod {
            id: "dana",
            name: "DANA",
            kind: PaymentKind::EWallet,
            description: "Pay with the DANA e-wallet",
            is_active: true,
        },
        PaymentMethod {
            id: "gopay",
            name: "GoPay",
            kind: PaymentKind::EWallet,
            description: "Pay with GoPay",
            is_active: true,
        },
        PaymentMethod {
            id: "ovo",
            name: "OVO",
            kind: PaymentKind::EWallet,
            description: "Pay with OVO",
            is_active: true,
        },
        PaymentMethod {
            id: "shopeepay",
            name: "ShopeePay",
            kind: PaymentKind::EWallet,
            description: "Pay with ShopeePay",
            is_active: true,
        },
        PaymentMethod {
            id: "bca",
            name: "BCA Virtual Account",
            kind: PaymentKind::BankTransfer,
            description: "Transfer to a BCA virtual account",
            is_active: true,
        },
        PaymentMethod {
            id: "bni",
            name: "BNI Virtual Account",
            kind: PaymentKind::BankTransfer,
            description: "Transfer to a BNI virtual account",
            is_active: true,
        },
        PaymentMethod {
            id: "mandiri",
            name: "Mandiri Virtual Account",
            kind: PaymentKind::BankTransfer,
            description: "Transfer to a Mandiri virtual account",
            is_active: true,
        },
        PaymentMethod {
            id: "cod",
            name: "Cash on Delivery (COD)",
            kind: PaymentKind::Cod,
            description: "Pay when the order arrives",
            is_active: true,
        },
    ]
}

pub fn find_method(id: &str) -> Option<PaymentMethod> {
    payment_methods()
        .into_iter()
        .find(|m| m.id == id && m.is_active)
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: String,
    pub payment_method_id: String,
}

/// GET /api/payments/methods
pub async fn list_methods() -> impl Responder {
    let methods: Vec<PaymentMethod> = payment_methods()
        .into_iter()
        .filter(|m| m.is_active)
        .collect();
    response::ok(methods, "Payment methods retrieved successfully")
}

/// POST /api/payments/process. A stub for checkout flow completeness: it
/// always reports success and never talks to a payment gateway.
pub async fn process_payment(
    data: web::Data<AppState>,
    payload: web::Json<ProcessPaymentRequest>,
) -> impl Responder {
    let method = match find_method(&payload.payment_method_id) {
        Some(method) => method,
        None => return response::bad_request("Invalid payment method"),
    };

    let orders = data.mongodb.db.collection::<Order>("orders");
    let order = match orders.find_one(doc! { "order_id": &payload.order_id }).await {
        Ok(Some(order)) => order,
        Ok(None) => return response::not_found("Order not found"),
        Err(e) => {
            error!("Error fetching order: {}", e);
            return response::internal("Failed to process payment");
        }
    };

    let now = Utc::now();
    response::ok(
        json!({
            "order_id": order.order_id,
            "payment_method": method.name,
            "amount": order.total_amount,
            "status": "success",
            "transaction_id": format!("TXN-{}", now.timestamp_millis()),
            "paid_at": now,
            "message": format!("Payment successful via {}", method.name),
        }),
        "Payment processed successfully",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_method_ids_resolve() {
        for id in ["dana", "gopay", "bca", "cod"] {
            assert!(find_method(id).is_some(), "{} should resolve", id);
        }
        assert!(find_method("paypal").is_none());
    }

    #[test]
    fn payment_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PaymentKind::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
        assert_eq!(serde_json::to_string(&PaymentKind::Cod).unwrap(), "\"cod\"");
        assert_eq!(
            serde_json::from_str::<PaymentKind>("\"e_wallet\"").unwrap(),
            PaymentKind::EWallet
        );
    }
}
