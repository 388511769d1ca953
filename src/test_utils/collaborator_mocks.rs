//! Recording and scripted stand-ins for the engine's external collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_hooks::BillingHooks,
        clock::Clock,
        job_queue::{BillingJob, JobQueue},
        owner_directory::{OwnerDirectory, OwnerProfile},
        payment_gateway::{ChargeRequest, ChargeResult, PaymentGatewayPort, TokenInfo},
    },
    domain::entities::{
        invoice::{CardDetails, Invoice},
        subscription::Subscription,
        subscription_status::StatusTransition,
    },
};

// ============================================================================
// InMemoryOwnerDirectory
// ============================================================================

#[derive(Default)]
pub struct InMemoryOwnerDirectory {
    pub owners: Mutex<HashMap<Uuid, OwnerProfile>>,
}

impl InMemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, owner: OwnerProfile) {
        self.owners.lock().unwrap().insert(owner.id, owner);
    }
}

#[async_trait]
impl OwnerDirectory for InMemoryOwnerDirectory {
    async fn get_owner(&self, owner_id: Uuid) -> AppResult<Option<OwnerProfile>> {
        Ok(self.owners.lock().unwrap().get(&owner_id).cloned())
    }
}

// ============================================================================
// ScriptedPaymentGateway
// ============================================================================

enum ChargeScript {
    Fail(AppError),
    Hang,
}

struct GatewayState {
    charges: Vec<ChargeRequest>,
    refunds: Vec<(String, Option<i64>)>,
    script: VecDeque<ChargeScript>,
    token_state: Option<String>,
    refunds_accepted: bool,
}

/// Succeeds unless told otherwise. Charge ids are `ch_1`, `ch_2`, ... in call order.
pub struct ScriptedPaymentGateway {
    state: Mutex<GatewayState>,
}

impl Default for ScriptedPaymentGateway {
    fn default() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                charges: Vec::new(),
                refunds: Vec::new(),
                script: VecDeque::new(),
                token_state: None,
                refunds_accepted: true,
            }),
        }
    }
}

impl ScriptedPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_charge(&self, error: AppError) {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(ChargeScript::Fail(error));
    }

    /// The next charge never answers.
    pub fn hang_next_charge(&self) {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(ChargeScript::Hang);
    }

    pub fn set_token_state(&self, state: Option<&str>) {
        self.state.lock().unwrap().token_state = state.map(str::to_string);
    }

    pub fn reject_refunds(&self) {
        self.state.lock().unwrap().refunds_accepted = false;
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.state.lock().unwrap().charges.clone()
    }

    pub fn refunds(&self) -> Vec<(String, Option<i64>)> {
        self.state.lock().unwrap().refunds.clone()
    }

    fn test_card() -> CardDetails {
        CardDetails {
            brand: Some("Visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some("12".to_string()),
            exp_year: Some("2030".to_string()),
            name: None,
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for ScriptedPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult> {
        let (script, charge_number) = {
            let mut state = self.state.lock().unwrap();
            state.charges.push(request.clone());
            (state.script.pop_front(), state.charges.len())
        };

        match script {
            Some(ChargeScript::Fail(error)) => Err(error),
            Some(ChargeScript::Hang) => std::future::pending().await,
            None => Ok(ChargeResult {
                charge_id: format!("ch_{charge_number}"),
                card: Self::test_card(),
            }),
        }
    }

    async fn refund(&self, charge_id: &str, amount_cents: Option<i64>) -> AppResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.refunds.push((charge_id.to_string(), amount_cents));
        Ok(state.refunds_accepted)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> AppResult<ChargeResult> {
        Ok(ChargeResult {
            charge_id: charge_id.to_string(),
            card: Self::test_card(),
        })
    }

    async fn retrieve_token(&self, _token: &str) -> AppResult<TokenInfo> {
        Ok(TokenInfo {
            card_address_state: self.state.lock().unwrap().token_state.clone(),
        })
    }
}

// ============================================================================
// RecordingJobQueue
// ============================================================================

#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<BillingJob>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<BillingJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, job: BillingJob) -> AppResult<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

// ============================================================================
// FixedClock
// ============================================================================

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// RecordingHooks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Status(StatusTransition, Uuid),
    PaymentSucceeded(Uuid),
    PaymentFailed(Uuid),
}

#[derive(Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<HookCall>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    fn status(&self, transition: StatusTransition, subscription: &Subscription) {
        self.calls
            .lock()
            .unwrap()
            .push(HookCall::Status(transition, subscription.id));
    }
}

#[async_trait]
impl BillingHooks for RecordingHooks {
    async fn status_changed_to_good_standing(&self, subscription: &Subscription) {
        self.status(StatusTransition::GoodStanding, subscription);
    }

    async fn status_changed_to_suspended(&self, subscription: &Subscription) {
        self.status(StatusTransition::Suspended, subscription);
    }

    async fn status_changed_to_cancelled(&self, subscription: &Subscription) {
        self.status(StatusTransition::Cancelled, subscription);
    }

    async fn status_changed_to_cancel_at_end(&self, subscription: &Subscription) {
        self.status(StatusTransition::CancelAtEnd, subscription);
    }

    async fn status_changed_to_suspended_payment_failed(&self, subscription: &Subscription) {
        self.status(StatusTransition::SuspendedPaymentFailed, subscription);
    }

    async fn status_changed_to_cancelled_payment_failed(&self, subscription: &Subscription) {
        self.status(StatusTransition::CancelledPaymentFailed, subscription);
    }

    async fn status_changed_to_trialing(&self, subscription: &Subscription) {
        self.status(StatusTransition::Trialing, subscription);
    }

    async fn status_changed_to_trial_expired(&self, subscription: &Subscription) {
        self.status(StatusTransition::TrialExpired, subscription);
    }

    async fn status_reinstated(&self, subscription: &Subscription) {
        self.status(StatusTransition::UncancelAtEnd, subscription);
    }

    async fn payment_attempt_failed(&self, invoice: &Invoice) {
        self.calls
            .lock()
            .unwrap()
            .push(HookCall::PaymentFailed(invoice.id));
    }

    async fn payment_attempt_successful(&self, invoice: &Invoice) {
        self.calls
            .lock()
            .unwrap()
            .push(HookCall::PaymentSucceeded(invoice.id));
    }
}
