//! Pairings and the rounds played inside them.

use serde::Serialize;
use tracing::{debug, warn};

use crate::{agent::FormalizationAgent, strategy::Strategy};

/// How accepted agents are paired.
#[derive(Debug, Clone)]
pub enum PairingMode {
    /// Every agent plays a shadow agent sharing its game rules but playing `counter_strategy`.
    Clones {
        /// Strategy of every shadow agent, e.g. the opposite of the default strategy.
        counter_strategy: Strategy,
    },
    /// Every agent plays every other agent.
    ///
    /// Set `symmetric = true` if A vs B is equivalent to B vs A.
    RoundRobin {
        /// Play each unordered pair once instead of both orders.
        symmetric: bool,
    },
}

/// One side of a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    /// Index into the tournament's accepted agents.
    Agent(usize),
    /// Index into the tournament's shadow agents.
    Clone(usize),
}

/// How a pairing ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    /// Every round was played.
    Completed,
    /// A round failed; later rounds were skipped.
    Disqualified {
        /// 1-based round that failed, 0 when the pairing never started.
        round: usize,
        /// What failed.
        reason: String,
    },
}

/// Result of one pairing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingOutcome {
    /// First side.
    pub first: Participant,
    /// Second side.
    pub second: Participant,
    /// Rounds fully played, both payoffs included.
    pub rounds_played: usize,
    /// Final status.
    pub status: PairingStatus,
}

impl PairingOutcome {
    /// Whether the pairing was disqualified.
    pub fn is_disqualified(&self) -> bool {
        matches!(self.status, PairingStatus::Disqualified { .. })
    }
}

/// Index pairs among `n` agents, self-play excluded.
pub fn round_robin_pairs(n: usize, symmetric: bool) -> Vec<(usize, usize)> {
    let mut pending = vec![];
    for i in 0..n {
        for j in i + 1..n {
            pending.push((i, j));
            if !symmetric {
                pending.push((j, i));
            }
        }
    }
    pending
}

/// Plays up to `num_rounds` rounds between `first` and `second`.
///
/// Each round both sides play, then both receive the other's move. The first failure stops the
/// pairing. Returns the number of completed rounds and the status.
pub fn play_pairing(
    first: &mut FormalizationAgent,
    second: &mut FormalizationAgent,
    num_rounds: usize,
) -> (usize, PairingStatus) {
    let disqualified = |round: usize, reason: String| {
        warn!("pairing disqualified at round {round}: {reason}");
        PairingStatus::Disqualified { round, reason }
    };

    let mut rounds_played = 0;
    for round in 1..=num_rounds {
        let first_move = first.play();
        let second_move = second.play();
        let (Some(first_move), Some(second_move)) = (&first_move, &second_move) else {
            let failed = failing_names(first, first_move.is_none(), second, second_move.is_none());
            return (
                rounds_played,
                disqualified(round, format!("no move from {failed}")),
            );
        };

        let first_updated = first.update_payoff(second_move);
        let second_updated = second.update_payoff(first_move);
        if !(first_updated && second_updated) {
            let failed = failing_names(first, !first_updated, second, !second_updated);
            return (
                rounds_played,
                disqualified(round, format!("no payoff for {failed}")),
            );
        }

        debug!(
            "round {round}: {} played {first_move}, {} played {second_move}",
            first.name(),
            second.name()
        );
        rounds_played = round;
    }
    (rounds_played, PairingStatus::Completed)
}

fn failing_names(
    first: &FormalizationAgent,
    first_failed: bool,
    second: &FormalizationAgent,
    second_failed: bool,
) -> String {
    [(first, first_failed), (second, second_failed)]
        .into_iter()
        .filter(|(_, failed)| *failed)
        .map(|(agent, _)| agent.name())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Two distinct mutable elements of `items`.
pub(crate) fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> Option<(&mut T, &mut T)> {
    if i == j || i >= items.len() || j >= items.len() {
        return None;
    }
    if i < j {
        let (head, tail) = items.split_at_mut(j);
        Some((&mut head[i], &mut tail[0]))
    } else {
        let (head, tail) = items.split_at_mut(i);
        Some((&mut tail[0], &mut head[j]))
    }
}
