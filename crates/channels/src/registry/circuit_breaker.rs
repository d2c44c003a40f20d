//! Per-provider circuit breaker.
//!
//! Prevents hammering a vendor that is clearly down. Three states:
//!
//! - **Closed**: normal operation.
//! - **Open**: too many consecutive failures; calls are refused until the
//!   cooldown elapses.
//! - **HalfOpen**: cooldown elapsed; a probe call is allowed through. A
//!   success closes the circuit, a failure reopens it.
//!
//! State is in-memory per worker process and resets on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{info, warn};

/// Circuit state for one provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit refuses calls before probing.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-provider circuit breaker.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Whether a call to this provider is currently allowed.
    ///
    /// Transitions Open → HalfOpen once the cooldown has elapsed.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    info!("Circuit for '{}' entering half-open probe", provider);
                    circuit.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call; closes the circuit.
    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if circuit.state != CircuitState::Closed {
            info!("Circuit for '{}' closed after success", provider);
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
    }

    /// Record a failed call; may open the circuit.
    pub fn record_failure(&self, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.consecutive_failures += 1;

        let should_open = match circuit.state {
            // A failed half-open probe reopens immediately.
            CircuitState::HalfOpen => true,
            CircuitState::Closed => circuit.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            warn!(
                "Circuit for '{}' opened after {} consecutive failures",
                provider, circuit.consecutive_failures
            );
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
        }
    }

    /// Current state for a provider (Closed if never seen).
    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        });

        breaker.record_failure("POS");
        breaker.record_failure("POS");
        assert!(breaker.is_allowed("POS"));

        breaker.record_failure("POS");
        assert_eq!(breaker.state("POS"), CircuitState::Open);
        assert!(!breaker.is_allowed("POS"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(60),
        });

        breaker.record_failure("POS");
        breaker.record_success("POS");
        breaker.record_failure("POS");
        assert_eq!(breaker.state("POS"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::ZERO,
        });

        breaker.record_failure("POS");
        // Cooldown of zero: the next check probes immediately.
        assert!(breaker.is_allowed("POS"));
        assert_eq!(breaker.state("POS"), CircuitState::HalfOpen);

        breaker.record_success("POS");
        assert_eq!(breaker.state("POS"), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::ZERO,
        });

        breaker.record_failure("POS");
        assert!(breaker.is_allowed("POS"));
        breaker.record_failure("POS");
        assert_eq!(breaker.state("POS"), CircuitState::Open);
    }

    #[test]
    fn test_providers_do_not_share_circuits() {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        });

        breaker.record_failure("POS");
        assert!(!breaker.is_allowed("POS"));
        assert!(breaker.is_allowed("STOREFRONT"));
    }
}
