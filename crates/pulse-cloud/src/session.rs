//! Token handling, RR accumulation and submission to the remote analyzer.

use crate::client::{AccessToken, Analyzer};
use log::{debug, info, warn};
use pulse_lib::{metrics::stress::Classification, rr_interval_ms, Display, MonitorError};

/// Submission threshold used by the demo device. Real deployments should
/// collect about a minute of beats before submitting.
pub const DEFAULT_SUBMIT_THRESHOLD: usize = 10;

/// Token lifecycle. `Failed` is terminal for the process.
enum TokenState {
    Pending,
    Held(AccessToken),
    Failed,
}

pub struct AnalysisSession<A> {
    analyzer: A,
    token: TokenState,
    accumulated: Vec<u32>,
    classification: Option<Classification>,
}

impl<A: Analyzer> AnalysisSession<A> {
    pub fn new(analyzer: A) -> Self {
        Self {
            analyzer,
            token: TokenState::Pending,
            accumulated: Vec::new(),
            classification: None,
        }
    }

    pub fn has_token(&self) -> bool {
        matches!(self.token, TokenState::Held(_))
    }

    /// RR intervals (ms) waiting for the next submission.
    pub fn pending(&self) -> &[u32] {
        &self.accumulated
    }

    /// Latest successful classification, if any.
    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn is_analysis_available(&self) -> bool {
        self.classification.is_some()
    }

    /// Fetch a token once. A failed fetch is never retried.
    pub fn acquire_token(
        &mut self,
        connected: bool,
        display: &mut dyn Display,
    ) -> Result<(), MonitorError> {
        if !connected || !matches!(self.token, TokenState::Pending) {
            return Ok(());
        }
        match self.analyzer.fetch_token() {
            Ok(token) => {
                info!("access token acquired");
                self.token = TokenState::Held(token);
                Ok(())
            }
            Err(err) => {
                self.token = TokenState::Failed;
                let err = MonitorError::AuthFailure(err.to_string());
                warn!("{}; cloud analysis disabled for this session", err);
                display.show_status(err.status_text());
                Err(err)
            }
        }
    }

    /// Append the RR interval for `bpm` when connected and authenticated.
    /// Returns whether the beat was kept; otherwise it is dropped for good.
    pub fn record_beat(&mut self, bpm: u32, connected: bool) -> bool {
        if !connected || !self.has_token() {
            return false;
        }
        match rr_interval_ms(bpm) {
            Some(rr) => {
                self.accumulated.push(rr);
                true
            }
            None => false,
        }
    }

    /// Submit once more than `threshold` intervals are waiting.
    ///
    /// The accumulated list is cleared whenever a submission is due, whatever
    /// the outcome. Returns the new classification on success.
    pub fn maybe_submit(
        &mut self,
        threshold: usize,
        connected: bool,
        display: &mut dyn Display,
    ) -> Result<Option<Classification>, MonitorError> {
        if self.accumulated.len() <= threshold {
            return Ok(None);
        }
        let data = std::mem::take(&mut self.accumulated);
        let token = match (&self.token, connected) {
            (TokenState::Held(token), true) => token,
            _ => {
                warn!("discarding {} intervals: not connected", data.len());
                return Ok(None);
            }
        };
        debug!("submitting {} intervals", data.len());
        match self.analyzer.analyze(token, &data) {
            Ok(scores) => {
                let classification =
                    Classification::from_indices(scores.sns_index, scores.pns_index);
                info!(
                    "analysis: stress {} (sns {:.1}), recovery {} (pns {:.1})",
                    classification.stress,
                    classification.sns_index,
                    classification.recovery,
                    classification.pns_index
                );
                self.classification = Some(classification);
                Ok(Some(classification))
            }
            Err(err) => {
                let err = MonitorError::AnalysisFailure(err.to_string());
                warn!("{}; {} intervals discarded", err, data.len());
                display.show_status(err.status_text());
                Err(err)
            }
        }
    }

    /// Put the stress/recovery screen up, or explain that none exists yet.
    pub fn show_analysis(&self, display: &mut dyn Display) {
        match &self.classification {
            Some(classification) => display.show_classification(classification),
            None => display.show_status("Not enough\ndata to analyze\nyet..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AnalysisScores, CloudError};
    use pulse_lib::metrics::stress::{RecoveryLevel, StressLevel};
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeAnalyzer {
        token_fails: bool,
        analyze_result: RefCell<Option<Result<AnalysisScores, CloudError>>>,
        token_calls: Cell<u32>,
        submitted: RefCell<Vec<Vec<u32>>>,
    }

    impl FakeAnalyzer {
        fn answering(result: Result<AnalysisScores, CloudError>) -> Self {
            Self {
                analyze_result: RefCell::new(Some(result)),
                ..Self::default()
            }
        }
    }

    impl Analyzer for &FakeAnalyzer {
        fn fetch_token(&self) -> Result<AccessToken, CloudError> {
            self.token_calls.set(self.token_calls.get() + 1);
            if self.token_fails {
                Err(CloudError::Status(400))
            } else {
                Ok(AccessToken::new("tok"))
            }
        }

        fn analyze(&self, _token: &AccessToken, rr_ms: &[u32]) -> Result<AnalysisScores, CloudError> {
            self.submitted.borrow_mut().push(rr_ms.to_vec());
            self.analyze_result
                .borrow()
                .clone()
                .unwrap_or(Err(CloudError::Transport("unscripted".into())))
        }
    }

    #[derive(Default)]
    struct Screen {
        statuses: Vec<String>,
        shown: Vec<Classification>,
    }

    impl Display for Screen {
        fn show_bpm(&mut self, _bpm: u32) {}
        fn show_status(&mut self, text: &str) {
            self.statuses.push(text.to_string());
        }
        fn show_classification(&mut self, classification: &Classification) {
            self.shown.push(*classification);
        }
    }

    fn fill(session: &mut AnalysisSession<&FakeAnalyzer>, beats: usize) {
        for _ in 0..beats {
            assert!(session.record_beat(75, true));
        }
    }

    #[test]
    fn records_rr_interval_only_with_token_and_link() {
        let analyzer = FakeAnalyzer::default();
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        assert!(!session.record_beat(60, true));
        session.acquire_token(true, &mut screen).unwrap();
        assert!(!session.record_beat(60, false));
        assert!(session.record_beat(60, true));
        assert!(session.record_beat(75, true));
        assert_eq!(session.pending(), &[1000, 800]);
    }

    #[test]
    fn token_is_not_fetched_while_offline() {
        let analyzer = FakeAnalyzer::default();
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        session.acquire_token(false, &mut screen).unwrap();
        assert_eq!(analyzer.token_calls.get(), 0);
        assert!(!session.has_token());
    }

    #[test]
    fn auth_failure_is_permanent() {
        let analyzer = FakeAnalyzer {
            token_fails: true,
            ..FakeAnalyzer::default()
        };
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        let err = session.acquire_token(true, &mut screen).unwrap_err();
        assert!(matches!(err, MonitorError::AuthFailure(_)));
        assert!(!session.has_token());
        assert_eq!(screen.statuses, vec!["Error retrieving access token..."]);

        session.acquire_token(true, &mut screen).unwrap();
        session.acquire_token(true, &mut screen).unwrap();
        assert_eq!(analyzer.token_calls.get(), 1);
        assert!(!session.record_beat(70, true));
        assert!(session.pending().is_empty());
    }

    #[test]
    fn submits_after_threshold_and_clears_on_success() {
        let analyzer = FakeAnalyzer::answering(Ok(AnalysisScores {
            sns_index: 0.24,
            pns_index: -2.5,
        }));
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        session.acquire_token(true, &mut screen).unwrap();

        fill(&mut session, 10);
        assert_eq!(session.maybe_submit(10, true, &mut screen), Ok(None));
        assert_eq!(session.pending().len(), 10);

        fill(&mut session, 1);
        let classification = session.maybe_submit(10, true, &mut screen).unwrap().unwrap();
        assert_eq!(classification.stress, StressLevel::Low);
        assert_eq!(classification.recovery, RecoveryLevel::Poor);
        assert!(session.pending().is_empty());
        assert!(session.is_analysis_available());
        assert_eq!(analyzer.submitted.borrow()[0], vec![800; 11]);
    }

    #[test]
    fn clears_on_failure_and_keeps_previous_classification() {
        let analyzer = FakeAnalyzer::answering(Ok(AnalysisScores {
            sns_index: 6.0,
            pns_index: 0.1,
        }));
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        session.acquire_token(true, &mut screen).unwrap();
        fill(&mut session, 3);
        session.maybe_submit(2, true, &mut screen).unwrap();

        *analyzer.analyze_result.borrow_mut() = Some(Err(CloudError::Status(500)));
        fill(&mut session, 3);
        let err = session.maybe_submit(2, true, &mut screen).unwrap_err();
        assert!(matches!(err, MonitorError::AnalysisFailure(_)));
        assert!(session.pending().is_empty());
        assert_eq!(analyzer.submitted.borrow().len(), 2);
        assert_eq!(screen.statuses.last().unwrap(), "Error retrieving analysis...");

        let kept = session.classification().unwrap();
        assert_eq!(kept.stress, StressLevel::High);
        assert_eq!(kept.recovery, RecoveryLevel::Excellent);
    }

    #[test]
    fn failed_submission_is_not_retried() {
        let analyzer = FakeAnalyzer::answering(Err(CloudError::Rejected("error".into())));
        let mut screen = Screen::default();
        let mut session = AnalysisSession::new(&analyzer);
        session.acquire_token(true, &mut screen).unwrap();
        fill(&mut session, 4);
        assert!(session.maybe_submit(3, true, &mut screen).is_err());
        assert_eq!(session.maybe_submit(3, true, &mut screen), Ok(None));
        assert_eq!(analyzer.submitted.borrow().len(), 1);
        assert!(!session.is_analysis_available());
    }

    #[test]
    fn show_analysis_without_result_explains() {
        let analyzer = FakeAnalyzer::default();
        let mut screen = Screen::default();
        let session = AnalysisSession::new(&analyzer);
        session.show_analysis(&mut screen);
        assert!(screen.shown.is_empty());
        assert_eq!(screen.statuses, vec!["Not enough\ndata to analyze\nyet..."]);
    }
}
