//! Descriptor Extractor
//!
//! Wraps a [`ContentAnalyzer`] with a per-call timeout and the transient
//! retry policy. A stuck call counts as a timeout and is retried like any
//! other transient failure.

use std::sync::Arc;
use std::time::Duration;

use ambr_common::models::Descriptor;

use super::content_analyzer::{AnalysisOptions, ContentAnalyzer};
use crate::error::AnalysisError;
use crate::utils::retry::{retry_transient, Attempted, RetryPolicy};

pub struct DescriptorExtractor {
    analyzer: Arc<dyn ContentAnalyzer>,
    policy: RetryPolicy,
    call_timeout: Duration,
    options: AnalysisOptions,
}

impl DescriptorExtractor {
    pub fn new(
        analyzer: Arc<dyn ContentAnalyzer>,
        policy: RetryPolicy,
        call_timeout: Duration,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            analyzer,
            policy,
            call_timeout,
            options,
        }
    }

    pub fn options(&self) -> AnalysisOptions {
        self.options
    }

    pub fn analyzer_name(&self) -> &str {
        self.analyzer.name()
    }

    /// Extract a descriptor for one analysis window
    pub async fn extract(&self, text: &str) -> Attempted<Descriptor, AnalysisError> {
        retry_transient("analyze", &self.policy, |attempt| async move {
            tracing::trace!(attempt, analyzer = self.analyzer.name(), "Analyzing text window");
            match tokio::time::timeout(self.call_timeout, self.analyzer.analyze(text, &self.options)).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout),
            }
        })
        .await
    }
}

/// Descriptor to segment with after an extraction attempt
///
/// - success: the extracted descriptor
/// - invalid response: the neutral descriptor
/// - transient failure after all retries: the previous spread's descriptor,
///   so the failed spread does not open a scene of its own (neutral for the
///   first spread)
pub fn resolve_descriptor(
    result: &Result<Descriptor, AnalysisError>,
    previous: Option<&Descriptor>,
) -> Descriptor {
    match result {
        Ok(descriptor) => descriptor.clone(),
        Err(AnalysisError::InvalidResponse(_)) => Descriptor::neutral(),
        Err(_) => previous.cloned().unwrap_or_else(Descriptor::neutral),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambr_common::models::Intensity;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        results: Mutex<VecDeque<Result<Descriptor, AnalysisError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl Scripted {
        fn new(results: Vec<Result<Descriptor, AnalysisError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ContentAnalyzer for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, _text: &str, _options: &AnalysisOptions) -> Result<Descriptor, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AnalysisError::UpstreamUnavailable("script exhausted".into())))
        }
    }

    fn forest() -> Descriptor {
        Descriptor {
            setting: "forest".into(),
            mood: "calm".into(),
            intensity: Intensity::Low,
            ..Default::default()
        }
    }

    fn extractor(analyzer: Arc<Scripted>) -> DescriptorExtractor {
        DescriptorExtractor::new(
            analyzer,
            RetryPolicy::default(),
            Duration::from_secs(10),
            AnalysisOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limit_then_succeeds() {
        let analyzer = Arc::new(Scripted::new(vec![
            Err(AnalysisError::RateLimited),
            Err(AnalysisError::UpstreamUnavailable("503".into())),
            Ok(forest()),
        ]));

        let outcome = extractor(analyzer.clone()).extract("text").await;

        assert_eq!(outcome.result.unwrap(), forest());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_response_not_retried() {
        let analyzer = Arc::new(Scripted::new(vec![Err(AnalysisError::InvalidResponse(
            "missing mood".into(),
        ))]));

        let outcome = extractor(analyzer.clone()).extract("text").await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(resolve_descriptor(&outcome.result, Some(&forest())), Descriptor::neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_call_times_out_and_counts_as_transient() {
        let mut scripted = Scripted::new(vec![Ok(forest()), Ok(forest()), Ok(forest())]);
        scripted.delay = Duration::from_secs(60);
        let analyzer = Arc::new(scripted);

        let outcome = extractor(analyzer.clone()).extract("text").await;

        assert_eq!(outcome.result, Err(AnalysisError::Timeout));
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_exhausted_spread_inherits_previous() {
        let failed: Result<Descriptor, AnalysisError> = Err(AnalysisError::RateLimited);
        assert_eq!(resolve_descriptor(&failed, Some(&forest())), forest());
        assert_eq!(resolve_descriptor(&failed, None), Descriptor::neutral());
    }
}
