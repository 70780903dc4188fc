//! Identifier newtypes and the status/method vocabularies shared by storage, webhooks and the API.
//!
//! Statuses and payment methods are stored and transmitted as lowercase strings; the `Display` and
//! `FromStr` impls here are the single source of truth for that wire form.
use std::{fmt::Display, str::FromStr};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

fn random_id(prefix: &str) -> String {
    let tail: String = rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    format!("{prefix}{}", tail.to_lowercase())
}

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn random() -> Self {
                Self(random_id($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(OrderId, "ord_");
string_id!(ProductId, "prd_");
string_id!(UserId, "usr_");

//--------------------------------------     OrderStatus     ---------------------------------------------------------

/// The order lifecycle. `Completed`, `Cancelled`, `Refunded` and `Failed` are terminal; orders are
/// never deleted, so terminal orders form the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded | Self::Failed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            other => Err(ConversionError { kind: "order status", value: other.to_string() }),
        }
    }
}

//--------------------------------------    ProductStatus    ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    OutOfStock,
}

impl Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::OutOfStock => "out_of_stock",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ProductStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "out_of_stock" => Ok(Self::OutOfStock),
            other => Err(ConversionError { kind: "product status", value: other.to_string() }),
        }
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    TelegramStars,
    Cryptomus,
    Manual,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [Self::TelegramStars, Self::Cryptomus, Self::Manual];
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TelegramStars => "telegram_stars",
            Self::Cryptomus => "cryptomus",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram_stars" => Ok(Self::TelegramStars),
            "cryptomus" => Ok(Self::Cryptomus),
            "manual" => Ok(Self::Manual),
            other => Err(ConversionError { kind: "payment method", value: other.to_string() }),
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = OrderId::random();
        let b = OrderId::random();
        assert!(a.as_str().starts_with("ord_"));
        assert_ne!(a, b);
        assert!(ProductId::random().as_str().starts_with("prd_"));
        assert!(UserId::random().as_str().starts_with("usr_"));
    }

    #[test]
    fn statuses_round_trip_through_their_wire_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
            OrderStatus::Failed,
        ] {
            assert_eq!(OrderStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(OrderStatus::from_str("paid").unwrap(), OrderStatus::Paid);
        assert!(OrderStatus::from_str("Paid").is_err());
    }

    #[test]
    fn payment_methods_use_snake_case_wire_values() {
        assert_eq!(PaymentMethod::TelegramStars.to_string(), "telegram_stars");
        assert_eq!(PaymentMethod::from_str("cryptomus").unwrap(), PaymentMethod::Cryptomus);
        assert!(PaymentMethod::from_str("paypal").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
