//! Canonical tables of the supported game families.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent::quoted;

static FAMILY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)_").expect("family pattern"));

/// An ordered pair of actions, row player first.
pub type Cell = (&'static str, &'static str);

/// Two-player two-action game families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameFamily {
    /// Battle of the sexes (`bs`), actions `F` and `O`.
    BattleOfTheSexes,
    /// Prisoner's dilemma (`pd`), actions `C` and `D`.
    PrisonersDilemma,
    /// Matching pennies (`mp`), actions `H` and `T`.
    MatchingPennies,
    /// Stag hunt (`sh`), actions `S` and `H`.
    StagHunt,
    /// Hawk-dove (`hd`), actions `S` and `D`.
    HawkDove,
}

impl GameFamily {
    /// Every family.
    pub const ALL: [GameFamily; 5] = [
        GameFamily::BattleOfTheSexes,
        GameFamily::PrisonersDilemma,
        GameFamily::MatchingPennies,
        GameFamily::StagHunt,
        GameFamily::HawkDove,
    ];

    /// Two-letter code used in instance names.
    pub fn code(self) -> &'static str {
        match self {
            GameFamily::BattleOfTheSexes => "bs",
            GameFamily::PrisonersDilemma => "pd",
            GameFamily::MatchingPennies => "mp",
            GameFamily::StagHunt => "sh",
            GameFamily::HawkDove => "hd",
        }
    }

    /// Family of a code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.code() == code)
    }

    /// Family of an instance name such as `pd_canonic_1.txt`.
    pub fn from_instance(name: &str) -> Option<Self> {
        FAMILY_PREFIX
            .captures(name)
            .and_then(|caps| Self::from_code(&caps[1]))
    }

    /// Cells in the order the ground-truth matrices list their payoffs.
    pub fn matrix_cells(self) -> [Cell; 4] {
        match self {
            GameFamily::BattleOfTheSexes => [("F", "F"), ("O", "O"), ("O", "F"), ("F", "O")],
            GameFamily::PrisonersDilemma => [("C", "C"), ("D", "C"), ("C", "D"), ("D", "D")],
            GameFamily::MatchingPennies => [("H", "H"), ("T", "H"), ("T", "T"), ("H", "T")],
            GameFamily::StagHunt => [("S", "S"), ("S", "H"), ("H", "S"), ("H", "H")],
            GameFamily::HawkDove => [("S", "S"), ("D", "S"), ("S", "D"), ("D", "D")],
        }
    }

    /// Cells in the order a canonical pairing visits them.
    pub fn action_cycle(self) -> [Cell; 4] {
        match self {
            GameFamily::BattleOfTheSexes => [("O", "O"), ("O", "F"), ("F", "F"), ("F", "O")],
            GameFamily::PrisonersDilemma => [("C", "C"), ("C", "D"), ("D", "D"), ("D", "C")],
            GameFamily::MatchingPennies => [("H", "H"), ("H", "T"), ("T", "T"), ("T", "H")],
            GameFamily::StagHunt => [("S", "S"), ("S", "H"), ("H", "H"), ("H", "S")],
            GameFamily::HawkDove => [("S", "S"), ("S", "D"), ("D", "D"), ("D", "S")],
        }
    }

    /// Queries for the row player's payoff of each cell of the cycle rotated by `shift`.
    pub fn payoff_queries(self, shift: usize) -> Vec<String> {
        rotate_right(&self.action_cycle(), shift)
            .into_iter()
            .map(|(own, opponent)| format!("payoff({}, {}, X, _)", quoted(own), quoted(opponent)))
            .collect()
    }
}

impl fmt::Display for GameFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Moves the last `positions` items to the front.
pub fn rotate_right<T: Clone>(items: &[T], positions: usize) -> Vec<T> {
    if items.is_empty() {
        return vec![];
    }
    let mut rotated = items.to_vec();
    rotated.rotate_right(positions % items.len());
    rotated
}

/// Ground-truth payoffs of an instance, one `[row, column]` pair per cell in
/// [`GameFamily::matrix_cells`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoffMatrix(pub [[i64; 2]; 4]);

impl PayoffMatrix {
    /// `assertz` goals loading the matrix as `payoff/4` facts.
    pub fn assertions(&self, family: GameFamily) -> Vec<String> {
        family
            .matrix_cells()
            .into_iter()
            .zip(self.0)
            .map(|((own, opponent), [row, column])| {
                format!(
                    "assertz(payoff({}, {}, {row}, {column}))",
                    quoted(own),
                    quoted(opponent)
                )
            })
            .collect()
    }

    /// Distinct payoffs, highest first.
    pub fn distinct_values(&self) -> Vec<i64> {
        let mut values: Vec<i64> = self.0.iter().flatten().copied().collect();
        values.sort_unstable_by(|a, b| b.cmp(a));
        values.dedup();
        values
    }

    /// Goal of the family's structural validator, seeded with this matrix.
    ///
    /// The highest distinct values seed the goal. `None` when the matrix has fewer distinct
    /// values than the family needs, or for matching pennies, neither 2 nor 4.
    pub fn normalization_goal(&self, family: GameFamily) -> Option<String> {
        let code = family.code();
        match (family, self.distinct_values().as_slice()) {
            (
                GameFamily::PrisonersDilemma | GameFamily::StagHunt | GameFamily::HawkDove,
                &[a, b, c, d, ..],
            ) => Some(format!("{code}({a},{b},{c},{d},C,D)")),
            (GameFamily::MatchingPennies, &[a, b, c, d]) => {
                Some(format!("{code}({a},{b},{c},{d},H,T)"))
            }
            (GameFamily::MatchingPennies, &[a, b]) => Some(format!("{code}({a},{a},{b},{b},H,T)")),
            (GameFamily::BattleOfTheSexes, &[a, b, c, ..]) => {
                Some(format!("{code}({a},{b},{c},F,O)"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_is_read_from_the_instance_prefix() {
        assert_eq!(
            GameFamily::from_instance("pd_noncanonic_test.txt"),
            Some(GameFamily::PrisonersDilemma)
        );
        assert_eq!(
            GameFamily::from_instance("hd_canonic_3"),
            Some(GameFamily::HawkDove)
        );
        assert_eq!(GameFamily::from_instance("xx_canonic_3"), None);
        assert_eq!(GameFamily::from_instance("pd"), None);
    }

    #[test]
    fn rotating_the_pd_cycle_by_two_starts_with_mutual_defection() {
        let rotated = rotate_right(&GameFamily::PrisonersDilemma.action_cycle(), 2);
        assert_eq!(rotated, [("D", "D"), ("D", "C"), ("C", "C"), ("C", "D")]);
        assert_eq!(rotate_right(&rotated, 2), GameFamily::PrisonersDilemma.action_cycle());
    }

    #[test]
    fn queries_follow_the_rotated_cycle() {
        assert_eq!(
            GameFamily::PrisonersDilemma.payoff_queries(2)[0],
            "payoff('D', 'D', X, _)"
        );
    }

    #[test]
    fn matrices_are_asserted_in_cell_order() {
        let matrix = PayoffMatrix([[3, 3], [5, 0], [0, 5], [1, 1]]);
        assert_eq!(
            matrix.assertions(GameFamily::PrisonersDilemma),
            [
                "assertz(payoff('C', 'C', 3, 3))",
                "assertz(payoff('D', 'C', 5, 0))",
                "assertz(payoff('C', 'D', 0, 5))",
                "assertz(payoff('D', 'D', 1, 1))",
            ]
        );
    }

    #[test]
    fn normalization_goals_per_family() {
        let pd = PayoffMatrix([[3, 3], [5, 0], [0, 5], [1, 1]]);
        assert_eq!(
            pd.normalization_goal(GameFamily::PrisonersDilemma).as_deref(),
            Some("pd(5,3,1,0,C,D)")
        );

        let mp = PayoffMatrix([[1, -1], [-1, 1], [1, -1], [-1, 1]]);
        assert_eq!(
            mp.normalization_goal(GameFamily::MatchingPennies).as_deref(),
            Some("mp(1,1,-1,-1,H,T)")
        );

        let bs = PayoffMatrix([[3, 2], [2, 3], [0, 0], [0, 0]]);
        assert_eq!(
            bs.normalization_goal(GameFamily::BattleOfTheSexes).as_deref(),
            Some("bs(3,2,0,F,O)")
        );

        // a degenerate dilemma has too few distinct payoffs
        let flat = PayoffMatrix([[1, 1], [1, 1], [0, 0], [0, 0]]);
        assert_eq!(flat.normalization_goal(GameFamily::PrisonersDilemma), None);
    }

    #[test]
    fn extra_distinct_values_keep_the_highest_ones() {
        let bs = PayoffMatrix([[4, 2], [2, 4], [1, 1], [0, 0]]);
        assert_eq!(
            bs.normalization_goal(GameFamily::BattleOfTheSexes).as_deref(),
            Some("bs(4,2,1,F,O)")
        );

        let pd = PayoffMatrix([[3, 3], [5, 0], [0, 6], [1, 1]]);
        assert_eq!(
            pd.normalization_goal(GameFamily::PrisonersDilemma).as_deref(),
            Some("pd(6,5,3,1,C,D)")
        );

        // matching pennies only accepts 2 or 4 distinct values
        let mp = PayoffMatrix([[3, -3], [-1, 1], [2, -2], [0, 0]]);
        assert_eq!(mp.normalization_goal(GameFamily::MatchingPennies), None);
    }

    #[test]
    fn matrices_deserialize_from_nested_arrays() {
        let matrix: PayoffMatrix = serde_json::from_str("[[3,3],[5,0],[0,5],[1,1]]").unwrap();
        assert_eq!(matrix.0[1], [5, 0]);
    }
}
