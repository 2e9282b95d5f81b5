//! Intent resolution: free text → gesture id.
//!
//! Local fuzzy scoring against the catalog answers high-confidence
//! queries without any network call; everything else goes to an external
//! LLM classifier with a compact catalog summary, degrading to the local
//! best (or no answer) on transport failure. Resolution runs on its own
//! worker and only ever services the most recent query.

use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::catalog::GestureMeta;
use crate::config::ResolverConfig;
use crate::error::{HandError, HandResult};
use crate::mailbox::Mailbox;
use crate::worker::RunFlag;

/// Accept the local best immediately at or above this score.
pub const HIGH_CONFIDENCE: f64 = 0.75;
/// After an unhelpful classifier answer, fall back to the local best
/// at or above this score.
pub const LOW_CONFIDENCE: f64 = 0.55;

const NAME_BONUS: f64 = 0.15;
const INTENT_BONUS: f64 = 0.1;
const INTENT_BONUS_CAP: f64 = 0.3;
const USAGE_TOKEN_BONUS: f64 = 0.05;
const USAGE_BONUS_CAP: f64 = 0.15;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[a-zA-Z]+").unwrap();
}

/// External gesture classifier. Answers with an exact id or "none".
pub trait Classifier: Send {
    fn classify(&self, prompt: &str) -> HandResult<String>;
}

/// Fuzzy score of `query` against one catalog entry.
pub fn local_score(query: &str, entry: &GestureMeta) -> f64 {
    let q = query.to_lowercase();
    let q = q.trim();

    let mut score = normalized_levenshtein(q, &entry.id.to_lowercase());

    let name = entry.name.to_lowercase();
    if !name.is_empty() && q.contains(&name) {
        score += NAME_BONUS;
    }

    let mut intent_bonus = 0.0;
    for intent in &entry.intents {
        if !intent.is_empty() && q.contains(&intent.to_lowercase()) {
            intent_bonus += INTENT_BONUS;
        }
    }
    score += intent_bonus.min(INTENT_BONUS_CAP);

    let usage = entry.usage.to_lowercase();
    let token_hits = WORD_RE
        .find_iter(&usage)
        .filter(|m| m.as_str().len() > 3 && q.contains(m.as_str()))
        .count();
    score += (token_hits as f64 * USAGE_TOKEN_BONUS).min(USAGE_BONUS_CAP);

    score
}

/// Resolves free-text queries to catalog gesture ids.
pub struct IntentResolver {
    entries: Vec<GestureMeta>,
    classifier: Box<dyn Classifier>,
}

impl IntentResolver {
    pub fn new(entries: Vec<GestureMeta>, classifier: Box<dyn Classifier>) -> Self {
        Self {
            entries,
            classifier,
        }
    }

    fn best_local(&self, query: &str) -> Option<(String, f64)> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), local_score(query, e)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn catalog_summary(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let intents = e
                    .intents
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}: {}; intents={}", e.id, e.description, intents)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolve a query to a known gesture id, or `None` if nothing fits.
    pub fn resolve(&self, query: &str) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let (local_id, score) = self.best_local(query)?;
        if score >= HIGH_CONFIDENCE {
            debug!("Local match '{}' (score {:.2})", local_id, score);
            return Some(local_id);
        }

        let prompt = format!(
            "You are a gesture type selector. Given a natural language user query \
             (maybe noisy ASR), choose the best gesture id from the catalog. \
             If nothing fits, answer None. Just output the id or None.\n\
             Catalog:\n{}\nQuery: {}\nAnswer:",
            self.catalog_summary(),
            query
        );

        let candidate = match self.classifier.classify(&prompt) {
            Ok(answer) => Some(answer.trim().to_string()),
            Err(e) => {
                warn!("Classifier call failed: {}", e);
                None
            }
        };

        if let Some(candidate) = candidate {
            if self.entries.iter().any(|e| e.id == candidate) {
                return Some(candidate);
            }
        }

        if score >= LOW_CONFIDENCE {
            debug!("Falling back to local match '{}' (score {:.2})", local_id, score);
            return Some(local_id);
        }
        None
    }
}

/// Resolution worker: polls the query mailbox at a relaxed interval
/// (gesture switches are rare next to continuous pose control) and
/// publishes resolved ids. A query arriving mid-flight overwrites the
/// pending one; superseded queries are never answered.
pub fn run_resolver_loop(
    resolver: IntentResolver,
    queries: Mailbox<String>,
    results: Mailbox<String>,
    poll_interval: Duration,
    run: RunFlag,
) {
    info!("Intent resolver running");
    while run.is_set() {
        if let Some(query) = queries.take_if_present() {
            info!("Resolving: '{}'", query);
            if let Some(id) = resolver.resolve(&query) {
                results.publish(id);
            }
        }
        thread::sleep(poll_interval);
    }
    info!("Intent resolver stopped");
}

/// OpenAI-compatible chat-completions classifier.
pub struct ChatClassifier {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatClassifier {
    pub fn new(cfg: &ResolverConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        }
    }
}

impl Classifier for ChatClassifier {
    fn classify(&self, prompt: &str) -> HandResult<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system",
                     "content": "You are a concise classifier returning only a gesture id or None."},
                    {"role": "user", "content": prompt}
                ],
                "stream": false
            }))
            .timeout(Duration::from_secs(10))
            .send()
            .map_err(|e| HandError::TransientIo(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| HandError::TransientIo(e.to_string()))?;

        if !status.is_success() {
            return Err(HandError::TransientIo(format!(
                "classifier API error ({}): {}",
                status, body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| HandError::TransientIo(format!("bad classifier response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HandError::TransientIo("classifier returned no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubClassifier {
        answer: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for StubClassifier {
        fn classify(&self, _prompt: &str) -> HandResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.to_string())
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _prompt: &str) -> HandResult<String> {
            Err(HandError::TransientIo("connection refused".into()))
        }
    }

    fn entry(id: &str, name: &str, usage: &str, intents: &[&str]) -> GestureMeta {
        GestureMeta {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{} pose", id),
            usage: usage.to_string(),
            intents: intents.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn catalog() -> Vec<GestureMeta> {
        vec![
            entry("boxgrasp", "box grasp", "grab medium rigid boxes", &["grab", "hold"]),
            entry("pinch", "pinch", "pick small delicate objects", &["pick", "pinch"]),
        ]
    }

    #[test]
    fn test_high_confidence_skips_classifier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = IntentResolver::new(
            catalog(),
            Box::new(StubClassifier {
                answer: "pinch",
                calls: Arc::clone(&calls),
            }),
        );

        // Near-exact id match scores above 0.75 locally.
        assert_eq!(resolver.resolve("boxgrasp").as_deref(), Some("boxgrasp"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_low_score_with_unhelpful_classifier_is_none() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = IntentResolver::new(
            vec![entry("boxgrasp", "", "", &[])],
            Box::new(StubClassifier {
                answer: "None",
                calls: Arc::clone(&calls),
            }),
        );

        assert_eq!(resolver.resolve("zzzzzz"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_classifier_answer_falls_back_to_local() {
        let resolver = IntentResolver::new(
            catalog(),
            Box::new(StubClassifier {
                answer: "not-a-gesture",
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        // "pinscher" scores between 0.55 and 0.75 against "pinch".
        assert_eq!(resolver.resolve("pinscher").as_deref(), Some("pinch"));
    }

    #[test]
    fn test_known_classifier_answer_wins() {
        let resolver = IntentResolver::new(
            catalog(),
            Box::new(StubClassifier {
                answer: "boxgrasp",
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        assert_eq!(
            resolver.resolve("something for that big rigid thing").as_deref(),
            Some("boxgrasp")
        );
    }

    #[test]
    fn test_transport_failure_degrades_not_crashes() {
        let resolver = IntentResolver::new(catalog(), Box::new(FailingClassifier));
        assert_eq!(resolver.resolve("zzzzzz"), None);
    }

    #[test]
    fn test_intent_keywords_lift_score() {
        let with_meta = entry("boxgrasp", "", "grab medium rigid boxes", &["grab", "hold"]);
        let bare = entry("boxgrasp", "", "", &[]);
        let query = "grab and hold it";
        // Same base similarity; two intent hits plus one usage token.
        assert!(local_score(query, &with_meta) > local_score(query, &bare) + 0.2);
    }

    #[test]
    fn test_intent_bonus_is_capped() {
        let e = entry("g", "", "", &["a1a1", "b2b2", "c3c3", "d4d4", "e5e5"]);
        let q = "a1a1 b2b2 c3c3 d4d4 e5e5";
        let base = normalized_levenshtein(q, "g");
        assert!(local_score(q, &e) <= base + INTENT_BONUS_CAP + 1e-9);
    }

    #[test]
    fn test_usage_tokens_require_length_over_three() {
        let short = entry("g", "", "cat dog owl", &[]);
        let long = entry("g", "", "delicate objects", &[]);

        // Three-letter usage words earn no bonus even when present.
        let q = "cat dog owl";
        assert!((local_score(q, &short) - normalized_levenshtein(q, "g")).abs() < 1e-9);

        let q = "pick delicate objects";
        assert!(local_score(q, &long) > normalized_levenshtein(q, "g") + 0.05);
    }

    #[test]
    fn test_empty_catalog_resolves_none() {
        let resolver = IntentResolver::new(vec![], Box::new(FailingClassifier));
        assert_eq!(resolver.resolve("anything"), None);
    }

    #[test]
    fn test_resolver_loop_services_latest_query_only() {
        let queries = Mailbox::new();
        let results = Mailbox::new();
        queries.publish("pick up the small thing with a pinch".to_string());

        let resolver = IntentResolver::new(
            catalog(),
            Box::new(StubClassifier {
                answer: "pinch",
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        let run = RunFlag::new();
        let loop_run = run.clone();
        let loop_queries = queries.clone();
        let loop_results = results.clone();
        let handle = std::thread::spawn(move || {
            run_resolver_loop(
                resolver,
                loop_queries,
                loop_results,
                Duration::from_millis(10),
                loop_run,
            );
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut resolved = None;
        while std::time::Instant::now() < deadline {
            if let Some(id) = results.take_if_present() {
                resolved = Some(id);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        run.clear();
        handle.join().unwrap();

        assert_eq!(resolved.as_deref(), Some("pinch"));
    }
}
