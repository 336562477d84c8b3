//! The game being formalized.

/// A game description together with what has been extracted from its formal rules.
///
/// `legal_moves` and `players` always come from the same accepted session: they are set
/// together by [`GameModel::set_extracted`] and cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameModel {
    description: String,
    rules: Option<String>,
    legal_moves: Vec<String>,
    players: Option<(String, String)>,
}

impl GameModel {
    /// A game known only by its natural-language description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// A game whose formal rules are already known.
    pub fn with_rules(description: impl Into<String>, rules: impl Into<String>) -> Self {
        let mut game = Self::new(description);
        game.set_rules(rules);
        game
    }

    /// Natural-language description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Formal rules, once generated or supplied.
    pub fn rules(&self) -> Option<&str> {
        self.rules.as_deref()
    }

    /// Replaces the formal rules. Extracted facts no longer hold and are cleared.
    pub fn set_rules(&mut self, rules: impl Into<String>) {
        self.rules = Some(rules.into());
        self.clear_extracted();
    }

    /// Records the moves and players read from an accepted session.
    ///
    /// Duplicated moves are kept once, in first-seen order.
    pub fn set_extracted(&mut self, moves: Vec<String>, players: (String, String)) {
        let mut unique: Vec<String> = Vec::with_capacity(moves.len());
        for m in moves {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        self.legal_moves = unique;
        self.players = Some(players);
    }

    /// Forgets extracted moves and players.
    pub fn clear_extracted(&mut self) {
        self.legal_moves.clear();
        self.players = None;
    }

    /// Legal moves, without duplicates.
    pub fn legal_moves(&self) -> &[String] {
        &self.legal_moves
    }

    /// Whether `m` is one of the legal moves.
    pub fn is_legal(&self, m: &str) -> bool {
        self.legal_moves.iter().any(|legal| legal == m)
    }

    /// Own and opponent player identifiers.
    pub fn players(&self) -> Option<(&str, &str)> {
        self.players
            .as_ref()
            .map(|(own, opponent)| (own.as_str(), opponent.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_are_unique_and_ordered() {
        let mut game = GameModel::new("prisoner's dilemma");
        game.set_extracted(
            vec!["C".into(), "D".into(), "C".into()],
            ("p1".into(), "p2".into()),
        );
        assert_eq!(game.legal_moves(), ["C", "D"]);
        assert!(game.is_legal("D"));
        assert!(!game.is_legal("X"));
        assert_eq!(game.players(), Some(("p1", "p2")));
    }

    #[test]
    fn new_rules_invalidate_extracted_facts() {
        let mut game = GameModel::with_rules("pd", "player(p1).");
        game.set_extracted(vec!["C".into()], ("p1".into(), "p2".into()));
        game.set_rules("player(p2).");
        assert!(game.legal_moves().is_empty());
        assert_eq!(game.players(), None);
        assert_eq!(game.rules(), Some("player(p2)."));
    }
}
