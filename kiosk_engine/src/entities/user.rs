use chrono::{DateTime, Duration, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};

use crate::{db_types::UserId, traits::ShopError};

/// A customer account. Subscription time and lifetime spend are only touched when an order
/// completes, inside the same unit of work as the order update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// External messenger identity, used for referrer lookups.
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub subscription_until: Option<DateTime<Utc>>,
    pub total_spent: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(telegram_id: Option<i64>, username: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::random(),
            telegram_id,
            username,
            subscription_until: None,
            total_spent: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_active_subscription(&self) -> bool {
        self.subscription_until.map(|until| until > Utc::now()).unwrap_or(false)
    }

    /// Adds `days` to the subscription, counting from the current expiry if it is still in the
    /// future, otherwise from now. Lapsed time is never credited back.
    pub fn extend_subscription(&mut self, days: i64) {
        if days <= 0 {
            return;
        }
        let now = Utc::now();
        let base = match self.subscription_until {
            Some(until) if until > now => until,
            _ => now,
        };
        self.subscription_until = Some(base + Duration::days(days));
        self.updated_at = now;
    }

    /// Accumulates `amount` into the lifetime spend.
    pub fn record_purchase(&mut self, amount: Money) -> Result<(), ShopError> {
        let new_total = match self.total_spent {
            Some(total) => total.checked_add(amount)?,
            None => amount,
        };
        self.total_spent = Some(new_total);
        self.updated_at = Utc::now();
        Ok(())
    }
}
