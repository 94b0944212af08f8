//! Replay dialog state and dispatch.
//!
//! A dialog is seeded from one delivery attempt. The user picks exactly one
//! of three strategies; submitting freezes that choice into a
//! [`ReplayRequest`] (the upper bound of the window is resolved at that
//! moment), sends exactly one API call, and folds the result back into the
//! dialog as a [`ReplayOutcome`].

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{client::ApiError, protocol::Attempt};

pub const FALLBACK_FAILURE_MESSAGE: &str = "An error occurred while trying to replay the message";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayStrategy {
    #[default]
    ResendOne,
    RecoverSince,
    ReplayMissingSince,
}

impl ReplayStrategy {
    pub const ALL: [ReplayStrategy; 3] = [
        ReplayStrategy::ResendOne,
        ReplayStrategy::RecoverSince,
        ReplayStrategy::ReplayMissingSince,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReplayStrategy::ResendOne => "Resend this message",
            ReplayStrategy::RecoverSince => "Recover all failed messages since this attempt",
            ReplayStrategy::ReplayMissingSince => "Replay missing messages since this attempt",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ReplayStrategy::ResendOne => ReplayStrategy::RecoverSince,
            ReplayStrategy::RecoverSince => ReplayStrategy::ReplayMissingSince,
            ReplayStrategy::ReplayMissingSince => ReplayStrategy::ResendOne,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            ReplayStrategy::ResendOne => ReplayStrategy::ReplayMissingSince,
            ReplayStrategy::RecoverSince => ReplayStrategy::ResendOne,
            ReplayStrategy::ReplayMissingSince => ReplayStrategy::RecoverSince,
        }
    }
}

/// Everything a dialog needs to know about the attempt that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayTarget {
    pub app_id: String,
    pub endpoint_id: String,
    pub msg_id: String,
    pub since: DateTime<Utc>,
}

impl ReplayTarget {
    pub fn from_attempt(app_id: &str, attempt: &Attempt) -> Self {
        Self {
            app_id: app_id.to_string(),
            endpoint_id: attempt.endpoint_id.clone(),
            msg_id: attempt.msg_id.clone(),
            since: attempt.timestamp,
        }
    }

    /// Last six characters of the message id, as shown in the dialog.
    pub fn short_msg_id(&self) -> &str {
        let start = self
            .msg_id
            .char_indices()
            .rev()
            .nth(5)
            .map(|(index, _)| index)
            .unwrap_or(0);
        &self.msg_id[start..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayRequest {
    ResendOne {
        app_id: String,
        endpoint_id: String,
        msg_id: String,
    },
    RecoverSince {
        app_id: String,
        endpoint_id: String,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    ReplayMissingSince {
        app_id: String,
        endpoint_id: String,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

impl ReplayRequest {
    /// Freezes `strategy` against `target`. `until` never precedes `since`,
    /// even when the attempt timestamp is ahead of the local clock.
    pub fn resolve(strategy: ReplayStrategy, target: &ReplayTarget, now: DateTime<Utc>) -> Self {
        let app_id = target.app_id.clone();
        let endpoint_id = target.endpoint_id.clone();
        let since = target.since;
        let until = now.max(since);

        match strategy {
            ReplayStrategy::ResendOne => ReplayRequest::ResendOne {
                app_id,
                endpoint_id,
                msg_id: target.msg_id.clone(),
            },
            ReplayStrategy::RecoverSince => ReplayRequest::RecoverSince {
                app_id,
                endpoint_id,
                since,
                until,
            },
            ReplayStrategy::ReplayMissingSince => ReplayRequest::ReplayMissingSince {
                app_id,
                endpoint_id,
                since,
                until,
            },
        }
    }

    pub fn strategy(&self) -> ReplayStrategy {
        match self {
            ReplayRequest::ResendOne { .. } => ReplayStrategy::ResendOne,
            ReplayRequest::RecoverSince { .. } => ReplayStrategy::RecoverSince,
            ReplayRequest::ReplayMissingSince { .. } => ReplayStrategy::ReplayMissingSince,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Accepted,
    Failed(String),
}

impl ReplayOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ReplayOutcome::Accepted)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ReplayOutcome::Accepted => None,
            ReplayOutcome::Failed(message) => Some(message),
        }
    }

    fn from_result(result: Result<(), ApiError>) -> Self {
        match result {
            Ok(()) => ReplayOutcome::Accepted,
            Err(ApiError::Rejected { detail, .. }) if !detail.trim().is_empty() => {
                ReplayOutcome::Failed(detail)
            }
            Err(ApiError::Rejected { .. }) => {
                ReplayOutcome::Failed(FALLBACK_FAILURE_MESSAGE.to_string())
            }
            Err(other) => ReplayOutcome::Failed(other.to_string()),
        }
    }
}

/// The three remote operations a replay can turn into.
pub trait ReplayApi {
    fn resend_message(
        &self,
        app_id: &str,
        endpoint_id: &str,
        msg_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn recover_endpoint(
        &self,
        app_id: &str,
        endpoint_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn replay_missing(
        &self,
        app_id: &str,
        endpoint_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Sends `request` through exactly one of the three operations. Failures
/// are folded into the outcome rather than returned.
pub async fn dispatch<A: ReplayApi>(api: &A, request: &ReplayRequest) -> ReplayOutcome {
    let result = match request {
        ReplayRequest::ResendOne {
            app_id,
            endpoint_id,
            msg_id,
        } => api.resend_message(app_id, endpoint_id, msg_id).await,
        ReplayRequest::RecoverSince {
            app_id,
            endpoint_id,
            since,
            until,
        } => api.recover_endpoint(app_id, endpoint_id, *since, *until).await,
        ReplayRequest::ReplayMissingSince {
            app_id,
            endpoint_id,
            since,
            until,
        } => api.replay_missing(app_id, endpoint_id, *since, *until).await,
    };

    let outcome = ReplayOutcome::from_result(result);
    match &outcome {
        ReplayOutcome::Accepted => info!(strategy = ?request.strategy(), "replay accepted"),
        ReplayOutcome::Failed(message) => {
            warn!(strategy = ?request.strategy(), %message, "replay failed")
        }
    }
    outcome
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogPhase {
    Choosing,
    Submitting,
    Failed(String),
    Closed,
}

/// What the host should do after an outcome has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEffect {
    CloseAndRefresh,
    ShowError(String),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ReplayDialog {
    target: ReplayTarget,
    strategy: ReplayStrategy,
    phase: DialogPhase,
}

impl ReplayDialog {
    pub fn new(target: ReplayTarget) -> Self {
        Self {
            target,
            strategy: ReplayStrategy::default(),
            phase: DialogPhase::Choosing,
        }
    }

    pub fn target(&self) -> &ReplayTarget {
        &self.target
    }

    pub fn strategy(&self) -> ReplayStrategy {
        self.strategy
    }

    pub fn phase(&self) -> &DialogPhase {
        &self.phase
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.phase, DialogPhase::Closed)
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.phase, DialogPhase::Submitting)
    }

    /// Ignored while a request is outstanding.
    pub fn select(&mut self, strategy: ReplayStrategy) {
        if self.accepts_input() {
            self.strategy = strategy;
        }
    }

    /// Starts a submission and returns the request to send, or `None` when
    /// one is already in flight or the dialog has closed.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Option<ReplayRequest> {
        if !self.accepts_input() {
            return None;
        }
        self.phase = DialogPhase::Submitting;
        Some(ReplayRequest::resolve(self.strategy, &self.target, now))
    }

    pub fn finish(&mut self, outcome: ReplayOutcome) -> DialogEffect {
        if !self.is_submitting() {
            return DialogEffect::Ignored;
        }

        match outcome {
            ReplayOutcome::Accepted => {
                self.phase = DialogPhase::Closed;
                DialogEffect::CloseAndRefresh
            }
            ReplayOutcome::Failed(message) => {
                self.phase = DialogPhase::Failed(message.clone());
                DialogEffect::ShowError(message)
            }
        }
    }

    /// Clears a shown error; the chosen strategy is kept for another try.
    pub fn dismiss_error(&mut self) {
        if matches!(self.phase, DialogPhase::Failed(_)) {
            self.phase = DialogPhase::Choosing;
        }
    }

    pub fn close(&mut self) {
        if !self.is_submitting() {
            self.phase = DialogPhase::Closed;
        }
    }

    /// Runs one full submission: dispatch, apply the outcome, and invoke
    /// `on_refresh` once when the replay was accepted.
    pub async fn submit<A, F>(&mut self, api: &A, on_refresh: F) -> Option<ReplayOutcome>
    where
        A: ReplayApi,
        F: FnOnce(),
    {
        let request = self.begin_submit(Utc::now())?;
        let outcome = dispatch(api, &request).await;
        if self.finish(outcome.clone()) == DialogEffect::CloseAndRefresh {
            on_refresh();
        }
        Some(outcome)
    }

    fn accepts_input(&self) -> bool {
        matches!(self.phase, DialogPhase::Choosing | DialogPhase::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Resend(String),
        Recover(DateTime<Utc>, DateTime<Utc>),
        Missing(DateTime<Utc>, DateTime<Utc>),
    }

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<Call>>,
        reject_with: Option<(String, String)>,
    }

    impl FakeApi {
        fn rejecting(code: &str, detail: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reject_with: Some((code.to_string(), detail.to_string())),
            }
        }

        fn respond(&self, call: Call) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(call);
            match &self.reject_with {
                Some((code, detail)) => Err(ApiError::Rejected {
                    status: 404,
                    code: code.clone(),
                    detail: detail.clone(),
                }),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReplayApi for FakeApi {
        async fn resend_message(&self, _: &str, _: &str, msg_id: &str) -> Result<(), ApiError> {
            self.respond(Call::Resend(msg_id.to_string()))
        }

        async fn recover_endpoint(
            &self,
            _: &str,
            _: &str,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<(), ApiError> {
            self.respond(Call::Recover(since, until))
        }

        async fn replay_missing(
            &self,
            _: &str,
            _: &str,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<(), ApiError> {
            self.respond(Call::Missing(since, until))
        }
    }

    fn target() -> ReplayTarget {
        ReplayTarget {
            app_id: "app_1".to_string(),
            endpoint_id: "ep_1".to_string(),
            msg_id: "msg_2bV1y8ZkQx3a".to_string(),
            since: Utc::now() - Duration::hours(2),
        }
    }

    #[test]
    fn defaults_to_resending_one_message() {
        let dialog = ReplayDialog::new(target());
        assert_eq!(dialog.strategy(), ReplayStrategy::ResendOne);
        assert!(dialog.is_open());
    }

    #[test]
    fn resolves_window_up_to_now() {
        let target = target();
        let now = target.since + Duration::minutes(30);

        let request = ReplayRequest::resolve(ReplayStrategy::RecoverSince, &target, now);

        assert_eq!(
            request,
            ReplayRequest::RecoverSince {
                app_id: "app_1".to_string(),
                endpoint_id: "ep_1".to_string(),
                since: target.since,
                until: now,
            }
        );
    }

    #[test]
    fn window_never_ends_before_it_starts() {
        let target = target();
        let skewed_now = target.since - Duration::seconds(5);

        match ReplayRequest::resolve(ReplayStrategy::ReplayMissingSince, &target, skewed_now) {
            ReplayRequest::ReplayMissingSince { since, until, .. } => assert_eq!(since, until),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn short_message_id_is_last_six_characters() {
        assert_eq!(target().short_msg_id(), "ZkQx3a");
        let mut short = target();
        short.msg_id = "abc".to_string();
        assert_eq!(short.short_msg_id(), "abc");
    }

    #[tokio::test]
    async fn each_strategy_dispatches_exactly_one_call() {
        for strategy in ReplayStrategy::ALL {
            let api = FakeApi::default();
            let mut dialog = ReplayDialog::new(target());
            dialog.select(strategy);

            let outcome = dialog.submit(&api, || {}).await;

            assert_eq!(outcome, Some(ReplayOutcome::Accepted));
            let calls = api.calls();
            assert_eq!(calls.len(), 1, "{:?} made {:?}", strategy, calls);
            match (strategy, &calls[0]) {
                (ReplayStrategy::ResendOne, Call::Resend(msg_id)) => {
                    assert_eq!(msg_id, "msg_2bV1y8ZkQx3a")
                }
                (ReplayStrategy::RecoverSince, Call::Recover(since, until))
                | (ReplayStrategy::ReplayMissingSince, Call::Missing(since, until)) => {
                    assert!(until >= since)
                }
                (strategy, call) => panic!("{:?} dispatched {:?}", strategy, call),
            }
        }
    }

    #[tokio::test]
    async fn structured_rejection_keeps_dialog_open() {
        let api = FakeApi::rejecting("endpoint_not_found", "no such endpoint");
        let mut dialog = ReplayDialog::new(target());
        dialog.select(ReplayStrategy::RecoverSince);
        let mut refreshed = 0;

        let outcome = dialog.submit(&api, || refreshed += 1).await;

        let outcome = outcome.expect("submission should run");
        assert!(!outcome.succeeded());
        assert_eq!(outcome.error_message(), Some("no such endpoint"));
        assert_eq!(refreshed, 0);
        assert!(dialog.is_open());
        assert_eq!(dialog.strategy(), ReplayStrategy::RecoverSince);
        assert_eq!(
            dialog.phase(),
            &DialogPhase::Failed("no such endpoint".to_string())
        );

        dialog.dismiss_error();
        assert_eq!(dialog.phase(), &DialogPhase::Choosing);
        assert_eq!(dialog.strategy(), ReplayStrategy::RecoverSince);
    }

    #[tokio::test]
    async fn accepted_replay_closes_and_refreshes_once() {
        let api = FakeApi::default();
        let mut dialog = ReplayDialog::new(target());
        let mut refreshed = 0;

        let outcome = dialog.submit(&api, || refreshed += 1).await;

        assert_eq!(outcome, Some(ReplayOutcome::Accepted));
        assert_eq!(refreshed, 1);
        assert!(!dialog.is_open());

        let again = dialog.submit(&api, || refreshed += 1).await;
        assert_eq!(again, None);
        assert_eq!(refreshed, 1);
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn second_submit_is_refused_while_in_flight() {
        let mut dialog = ReplayDialog::new(target());

        assert!(dialog.begin_submit(Utc::now()).is_some());
        assert!(dialog.begin_submit(Utc::now()).is_none());

        dialog.select(ReplayStrategy::ReplayMissingSince);
        assert_eq!(dialog.strategy(), ReplayStrategy::ResendOne);

        dialog.close();
        assert!(dialog.is_open());
    }

    #[test]
    fn late_outcomes_are_ignored() {
        let mut dialog = ReplayDialog::new(target());
        assert_eq!(dialog.finish(ReplayOutcome::Accepted), DialogEffect::Ignored);
        assert!(dialog.is_open());
    }

    #[test]
    fn transport_style_errors_use_their_message() {
        let outcome = ReplayOutcome::from_result(Err(ApiError::TaskNotRunning("finished".into())));
        assert_eq!(outcome.error_message(), Some("task did not start (status `finished`)"));

        let blank = ReplayOutcome::from_result(Err(ApiError::Rejected {
            status: 500,
            code: "internal".into(),
            detail: "  ".into(),
        }));
        assert_eq!(blank.error_message(), Some(FALLBACK_FAILURE_MESSAGE));
    }
}
