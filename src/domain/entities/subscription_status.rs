use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle state of a subscription.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum SubscriptionStatus {
    #[default]
    GoodStanding,
    Trialing,
    TrialExpired,
    Suspended,
    SuspendedPaymentFailed,
    CancelAtEnd,
    Cancelled,
    CancelledPaymentFailed,
}

impl SubscriptionStatus {
    /// The owner is currently receiving service.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::GoodStanding
                | SubscriptionStatus::CancelAtEnd
                | SubscriptionStatus::Trialing
        )
    }

    /// Whether the cycle sweep should pick this subscription up once it is due.
    pub fn is_cycleable(&self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::Suspended
                | SubscriptionStatus::SuspendedPaymentFailed
                | SubscriptionStatus::Cancelled
                | SubscriptionStatus::CancelledPaymentFailed
                | SubscriptionStatus::TrialExpired
        )
    }

    pub fn cycleable() -> &'static [SubscriptionStatus] {
        &[
            SubscriptionStatus::GoodStanding,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::CancelAtEnd,
        ]
    }
}

/// Named status change. Each carries its own precondition on the current state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StatusTransition {
    CancelAtEnd,
    UncancelAtEnd,
    GoodStanding,
    Suspended,
    Cancelled,
    SuspendedPaymentFailed,
    CancelledPaymentFailed,
    Trialing,
    TrialExpired,
}

impl StatusTransition {
    pub fn target(&self) -> SubscriptionStatus {
        match self {
            StatusTransition::CancelAtEnd => SubscriptionStatus::CancelAtEnd,
            StatusTransition::UncancelAtEnd | StatusTransition::GoodStanding => {
                SubscriptionStatus::GoodStanding
            }
            StatusTransition::Suspended => SubscriptionStatus::Suspended,
            StatusTransition::Cancelled => SubscriptionStatus::Cancelled,
            StatusTransition::SuspendedPaymentFailed => SubscriptionStatus::SuspendedPaymentFailed,
            StatusTransition::CancelledPaymentFailed => SubscriptionStatus::CancelledPaymentFailed,
            StatusTransition::Trialing => SubscriptionStatus::Trialing,
            StatusTransition::TrialExpired => SubscriptionStatus::TrialExpired,
        }
    }

    /// Whether this transition may start from `from`.
    pub fn permits(&self, from: SubscriptionStatus) -> bool {
        match self {
            StatusTransition::CancelAtEnd => matches!(
                from,
                SubscriptionStatus::GoodStanding | SubscriptionStatus::Trialing
            ),
            StatusTransition::UncancelAtEnd => from == SubscriptionStatus::CancelAtEnd,
            StatusTransition::CancelledPaymentFailed => {
                from == SubscriptionStatus::SuspendedPaymentFailed
            }
            _ => true,
        }
    }
}
