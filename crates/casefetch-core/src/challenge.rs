//! Local arithmetic challenge gate.
//!
//! A cheap, self-hosted human check that throttles query volume without
//! touching the remote portal. Challenges are single-use: the first
//! verification attempt consumes the challenge whether the answer was right
//! or wrong, so an id cannot be brute-forced or replayed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// How long an unanswered challenge stays verifiable.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
}

impl Operator {
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
        }
    }
}

/// A pending challenge held in the gate's registry. The expected answer
/// never leaves this struct.
#[derive(Debug)]
struct Challenge {
    expected_answer: i64,
    issued_at: Instant,
}

/// The outward-facing half of a challenge: operands and operator only,
/// answer withheld.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengePrompt {
    pub id: Uuid,
    pub operand_a: i64,
    pub operand_b: i64,
    pub operator: Operator,
}

impl ChallengePrompt {
    /// Question text like `3 + 4`.
    pub fn question(&self) -> String {
        format!("{} {} {}", self.operand_a, self.operator.symbol(), self.operand_b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Unknown, expired, or already-consumed challenge id.
    NotFound,
    WrongAnswer,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::NotFound => "not_found",
            RejectReason::WrongAnswer => "wrong_answer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Authorized,
    Rejected(RejectReason),
}

/// Process-wide registry of pending challenges.
///
/// An explicit store passed into whoever needs gating — no module-level
/// singleton. Expired entries are dropped lazily on verification and can
/// also be swept explicitly.
pub struct ChallengeGate {
    pending: Mutex<HashMap<Uuid, Challenge>>,
    ttl: Duration,
}

impl Default for ChallengeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeGate {
    pub fn new() -> Self {
        Self::with_ttl(CHALLENGE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Generate and register a new challenge, returning the prompt.
    pub fn issue(&self) -> ChallengePrompt {
        let mut rng = rand::thread_rng();
        let mut a: i64 = rng.gen_range(1..=12);
        let mut b: i64 = rng.gen_range(1..=12);
        let operator = match rng.gen_range(0..3) {
            0 => Operator::Add,
            1 => Operator::Sub,
            _ => Operator::Mul,
        };
        // Keep subtraction answers non-negative.
        if operator == Operator::Sub && a < b {
            std::mem::swap(&mut a, &mut b);
        }

        let id = Uuid::new_v4();
        let challenge = Challenge {
            expected_answer: operator.apply(a, b),
            issued_at: Instant::now(),
        };
        self.lock().insert(id, challenge);
        debug!(%id, "issued challenge");

        ChallengePrompt {
            id,
            operand_a: a,
            operand_b: b,
            operator,
        }
    }

    /// Verify an answer, consuming the challenge.
    ///
    /// The entry is removed under the registry lock before the answer is
    /// checked, so of any number of racing verifications on the same id at
    /// most one sees the challenge at all.
    pub fn verify(&self, id: Uuid, answer: i64) -> Verification {
        let consumed = self.lock().remove(&id);
        match consumed {
            None => Verification::Rejected(RejectReason::NotFound),
            Some(ch) if ch.issued_at.elapsed() > self.ttl => {
                debug!(%id, "challenge expired before verification");
                Verification::Rejected(RejectReason::NotFound)
            }
            Some(ch) if ch.expected_answer == answer => Verification::Authorized,
            Some(_) => Verification::Rejected(RejectReason::WrongAnswer),
        }
    }

    /// Drop all expired entries, returning how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, ch| ch.issued_at.elapsed() <= self.ttl);
        before - pending.len()
    }

    /// Number of challenges currently awaiting verification.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Challenge>> {
        // A poisoned registry is still structurally sound; keep serving.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recover the expected answer from a prompt (tests only; the gate
    /// itself never reveals it).
    fn answer_for(prompt: &ChallengePrompt) -> i64 {
        prompt.operator.apply(prompt.operand_a, prompt.operand_b)
    }

    #[test]
    fn correct_answer_authorizes() {
        let gate = ChallengeGate::new();
        let prompt = gate.issue();
        assert_eq!(
            gate.verify(prompt.id, answer_for(&prompt)),
            Verification::Authorized
        );
    }

    #[test]
    fn wrong_answer_rejected() {
        let gate = ChallengeGate::new();
        let prompt = gate.issue();
        assert_eq!(
            gate.verify(prompt.id, answer_for(&prompt) + 1),
            Verification::Rejected(RejectReason::WrongAnswer)
        );
    }

    #[test]
    fn unknown_id_rejected() {
        let gate = ChallengeGate::new();
        assert_eq!(
            gate.verify(Uuid::new_v4(), 0),
            Verification::Rejected(RejectReason::NotFound)
        );
    }

    #[test]
    fn consumed_id_never_reauthorizes() {
        let gate = ChallengeGate::new();
        let prompt = gate.issue();
        let answer = answer_for(&prompt);
        assert_eq!(gate.verify(prompt.id, answer), Verification::Authorized);
        // Same correct answer, already-consumed id.
        assert_eq!(
            gate.verify(prompt.id, answer),
            Verification::Rejected(RejectReason::NotFound)
        );
    }

    #[test]
    fn wrong_answer_also_consumes() {
        let gate = ChallengeGate::new();
        let prompt = gate.issue();
        let answer = answer_for(&prompt);
        gate.verify(prompt.id, answer + 1);
        // A second attempt with the right answer must not succeed.
        assert_eq!(
            gate.verify(prompt.id, answer),
            Verification::Rejected(RejectReason::NotFound)
        );
    }

    #[test]
    fn expired_challenge_rejected() {
        let gate = ChallengeGate::with_ttl(Duration::ZERO);
        let prompt = gate.issue();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            gate.verify(prompt.id, answer_for(&prompt)),
            Verification::Rejected(RejectReason::NotFound)
        );
    }

    #[test]
    fn sweep_evicts_only_expired() {
        let gate = ChallengeGate::with_ttl(Duration::ZERO);
        gate.issue();
        gate.issue();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(gate.sweep_expired(), 2);
        assert_eq!(gate.pending_count(), 0);

        let gate = ChallengeGate::new();
        gate.issue();
        assert_eq!(gate.sweep_expired(), 0);
        assert_eq!(gate.pending_count(), 1);
    }

    #[test]
    fn subtraction_never_negative() {
        let gate = ChallengeGate::new();
        for _ in 0..200 {
            let prompt = gate.issue();
            assert!(answer_for(&prompt) >= 0, "prompt {:?}", prompt.question());
        }
    }

    #[test]
    fn racing_verifications_authorize_at_most_once() {
        let gate = Arc::new(ChallengeGate::new());
        let prompt = gate.issue();
        let answer = answer_for(&prompt);
        let wins = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            let wins = Arc::clone(&wins);
            let id = prompt.id;
            handles.push(std::thread::spawn(move || {
                if gate.verify(id, answer) == Verification::Authorized {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
