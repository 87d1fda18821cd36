//! Circuit breaker for external dependencies (LLM vendor APIs, subprocess
//! tools).
//!
//! Tracks consecutive failures per dependency name. When failures exceed a
//! configurable threshold the circuit *opens* and the dependency is
//! temporarily skipped. After a cooldown the circuit enters *half-open* to
//! probe recovery.

use std::collections::HashMap;

/// Circuit breaker state for a single dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy — requests allowed.
    Closed,
    /// Tripped — requests blocked until cooldown expires.
    Open,
    /// Cooldown expired — one probe request allowed.
    HalfOpen,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Tracks the probes dispatched and succeeded in the current half-open
/// window for one dependency. Created the first time a probe is let
/// through after cooldown, and torn down once the window resolves
/// (closed or reopened).
#[derive(Debug, Clone, Copy, Default)]
struct HalfOpenWindow {
    attempts: u32,
    successes: u32,
}

/// Per-dependency circuit breaker tracking consecutive failures.
///
/// Dependencies are named by the caller (`"anthropic_api"`, `"gemini_api"`,
/// `"playwright_subprocess"`, …) rather than a closed model enum, since the
/// set of external dependencies the orchestrator depends on is open-ended.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_failures: HashMap<String, u32>,
    last_failure_secs: HashMap<String, u64>,
    rate_limit_hits: HashMap<String, u32>,
    rate_limit_until: HashMap<String, u64>,
    half_open_windows: HashMap<String, HalfOpenWindow>,
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds after last failure before Open → HalfOpen.
    pub cooldown_secs: u64,
    /// Consecutive half-open successes needed to close the circuit again.
    pub success_threshold: u32,
    /// Probe calls let through per half-open window before the circuit
    /// decides whether to close or reopen.
    pub half_open_max_calls: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self::with_half_open_policy(failure_threshold, cooldown_secs, 2, 3)
    }

    pub fn with_half_open_policy(
        failure_threshold: u32,
        cooldown_secs: u64,
        success_threshold: u32,
        half_open_max_calls: u32,
    ) -> Self {
        Self {
            consecutive_failures: HashMap::new(),
            last_failure_secs: HashMap::new(),
            rate_limit_hits: HashMap::new(),
            rate_limit_until: HashMap::new(),
            half_open_windows: HashMap::new(),
            failure_threshold,
            cooldown_secs,
            success_threshold,
            half_open_max_calls,
        }
    }

    /// Record a success. During a half-open window this counts toward
    /// `success_threshold`; the circuit only fully closes once the window's
    /// `half_open_max_calls` probes have all resolved and enough of them
    /// succeeded. Outside a half-open window a success resets the circuit
    /// to Closed directly.
    pub fn record_success(&mut self, dependency: &str) {
        if let Some(window) = self.half_open_windows.get_mut(dependency) {
            window.successes += 1;
            if window.attempts >= self.half_open_max_calls {
                if window.successes >= self.success_threshold {
                    self.consecutive_failures.remove(dependency);
                    self.last_failure_secs.remove(dependency);
                } else {
                    self.last_failure_secs.insert(dependency.to_string(), unix_now());
                }
                self.half_open_windows.remove(dependency);
            }
            return;
        }
        self.consecutive_failures.remove(dependency);
        self.last_failure_secs.remove(dependency);
        self.rate_limit_hits.remove(dependency);
        self.rate_limit_until.remove(dependency);
    }

    /// Record a failure — may trip the circuit to Open. A failure that
    /// resolves the last probe of a half-open window reopens the circuit
    /// and restarts its cooldown clock.
    pub fn record_failure(&mut self, dependency: &str) -> u32 {
        let count = self
            .consecutive_failures
            .entry(dependency.to_string())
            .or_insert(0);
        *count += 1;
        let count = *count;
        self.last_failure_secs
            .insert(dependency.to_string(), unix_now());
        if let Some(window) = self.half_open_windows.get(dependency) {
            if window.attempts >= self.half_open_max_calls {
                self.half_open_windows.remove(dependency);
            }
        }
        count
    }

    /// Record a 429 rate-limit response with adaptive exponential backoff.
    ///
    /// Cooldown doubles each consecutive hit: 2s, 4s, 8s, ... capped at 120s.
    /// Also records a regular failure so normal circuit-breaker logic applies.
    pub fn record_rate_limit(&mut self, dependency: &str) {
        let hits = self
            .rate_limit_hits
            .entry(dependency.to_string())
            .or_insert(0);
        *hits += 1;
        let cooldown = 2u64
            .saturating_mul(2u64.saturating_pow((*hits).saturating_sub(1)))
            .min(120);
        self.rate_limit_until
            .insert(dependency.to_string(), unix_now() + cooldown);
        self.record_failure(dependency);
    }

    /// Remaining rate-limit cooldown seconds, or `None` if not rate-limited.
    pub fn rate_limit_cooldown(&self, dependency: &str) -> Option<u64> {
        let &until = self.rate_limit_until.get(dependency)?;
        let now = unix_now();
        if now < until {
            Some(until - now)
        } else {
            None
        }
    }

    pub fn state(&self, dependency: &str) -> CircuitState {
        if self.rate_limit_cooldown(dependency).is_some() {
            return CircuitState::Open;
        }
        if self.half_open_windows.contains_key(dependency) {
            return CircuitState::HalfOpen;
        }
        let failures = self
            .consecutive_failures
            .get(dependency)
            .copied()
            .unwrap_or(0);
        if failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        let last = self.last_failure_secs.get(dependency).copied().unwrap_or(0);
        if unix_now().saturating_sub(last) >= self.cooldown_secs {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Whether a call may be dispatched right now. Closed always allows it;
    /// Open never does; HalfOpen allows it only while the current window
    /// still has probe slots left (`half_open_max_calls`), and dispatching
    /// one here counts it against that cap — this is the mutating gate
    /// `call_with_policy` must check immediately before every attempt, not
    /// a read-only status query (use [`Self::state`] for that).
    pub fn is_available(&mut self, dependency: &str) -> bool {
        if self.rate_limit_cooldown(dependency).is_some() {
            return false;
        }
        if let Some(window) = self.half_open_windows.get_mut(dependency) {
            if window.attempts < self.half_open_max_calls {
                window.attempts += 1;
                return true;
            }
            return false;
        }
        let failures = self
            .consecutive_failures
            .get(dependency)
            .copied()
            .unwrap_or(0);
        if failures < self.failure_threshold {
            return true;
        }
        let last = self.last_failure_secs.get(dependency).copied().unwrap_or(0);
        if unix_now().saturating_sub(last) >= self.cooldown_secs {
            self.half_open_windows.insert(
                dependency.to_string(),
                HalfOpenWindow { attempts: 1, successes: 0 },
            );
            true
        } else {
            false
        }
    }

    pub fn failure_count(&self, dependency: &str) -> u32 {
        self.consecutive_failures
            .get(dependency)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, 60)
    }
}
