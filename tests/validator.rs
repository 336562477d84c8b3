use std::{collections::HashMap, fs, sync::Arc};

use formal_tournament::{
    prelude::*,
    session::engine::{Bindings, EngineError},
    validator::{
        family::{GameFamily, PayoffMatrix},
        load_matrices, load_target_payoffs, validators_from_dir, SequenceMatch, Validator,
    },
};
use regex::Regex;
use serde_json::json;

use crate::doubles::*;

mod doubles;

const INSTANCE: &str = "pd_canonic_1.txt";
const PD_MATRIX: PayoffMatrix = PayoffMatrix([[3, 3], [5, 0], [0, 5], [1, 1]]);
const PD_VALIDATOR: &str = "pd(T, R, P, S, C, D) :- T > R, R > P, P > S.\n";
const PD_PAYOFF_RULES: &str = "\
payoff('C', 'C', 3, 3).
payoff('D', 'C', 5, 0).
payoff('C', 'D', 0, 5).
payoff('D', 'D', 1, 1).
";

fn payoff_facts(text: &str) -> Vec<(String, String, i64)> {
    let re = Regex::new(r"payoff\('([^']*)', '([^']*)', (-?\d+), (-?\d+)\)").unwrap();
    re.captures_iter(text)
        .map(|caps| {
            (
                caps[1].to_string(),
                caps[2].to_string(),
                caps[3].parse().unwrap(),
            )
        })
        .collect()
}

/// Answers payoff queries from consulted or asserted facts, and accepts a family goal when its
/// values are the distinct payoffs of the consulted rules.
fn payoff_world(world: &World, goal: &str) -> Result<Vec<Bindings>, EngineError> {
    if goal.starts_with("assertz(") {
        return yes();
    }
    let known = format!("{}{}", world.program(), world.applied.join("\n"));
    if goal.starts_with("payoff(") {
        let atoms = quoted_atoms(goal);
        let found = payoff_facts(&known)
            .into_iter()
            .find(|(own, opponent, _)| atoms.as_slice() == [own.clone(), opponent.clone()]);
        return match found {
            Some((_, _, payoff)) => values("X", &[json!(payoff)]),
            None => no(),
        };
    }
    if goal.starts_with("pd(") && world.defines("pd") {
        let numbers: Vec<i64> = Regex::new(r"-?\d+")
            .unwrap()
            .find_iter(goal)
            .map(|m| m.as_str().parse().unwrap())
            .collect();
        let re = Regex::new(r"payoff\('[^']*', '[^']*', (-?\d+), (-?\d+)\)").unwrap();
        let mut payoffs: Vec<i64> = re
            .captures_iter(&world.program())
            .flat_map(|caps| [caps[1].parse::<i64>().unwrap(), caps[2].parse::<i64>().unwrap()])
            .collect();
        payoffs.sort_unstable_by(|a, b| b.cmp(a));
        payoffs.dedup();
        return if numbers == payoffs { yes() } else { no() };
    }
    no()
}

fn snapshot(status: AgentStatus, rules: &str, payoffs: &[f64]) -> AgentSnapshot {
    AgentSnapshot {
        name: "Kafo".to_string(),
        strategy_name: "tit-for-tat".to_string(),
        strategy: "strategy(P, H, S, M).\n".to_string(),
        game_rules: Some(rules.to_string()),
        game_moves: vec!["C".to_string(), "D".to_string()],
        game_players: vec!["p1".to_string(), "p2".to_string()],
        status,
        moves: vec![],
        opponent_moves: vec![],
        payoffs: payoffs.to_vec(),
        total_payoff: payoffs.iter().sum(),
        default_move: Some("C".to_string()),
        trace_messages: vec![],
    }
}

fn validator(engines: &ScriptedEngines, target: f64) -> Validator {
    Validator::new(
        Arc::new(engines.clone()),
        SOLVER,
        "strategy(P, H, S, M).\n",
        HashMap::from([(INSTANCE.to_string(), PD_MATRIX)]),
        HashMap::from([(INSTANCE.to_string(), target)]),
        HashMap::from([("pd".to_string(), PD_VALIDATOR.to_string())]),
    )
}

#[test]
fn canonical_cycle_passes_every_check() {
    init_test_logger();
    let engines = ScriptedEngines::new(payoff_world);
    let row = validator(&engines, 9.0).validate_agent(
        INSTANCE,
        &snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[3.0, 0.0, 1.0, 5.0]),
    );

    assert!(row.tournament);
    assert!(row.constraints);
    assert!(row.final_verdict);
    assert_eq!(row.agent_name, "Kafo");
    assert_eq!(row.filename, INSTANCE);
}

#[test]
fn rotated_cycle_is_accepted() {
    let engines = ScriptedEngines::new(payoff_world);
    let validator = validator(&engines, 9.0);
    let snapshot = snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[1.0, 5.0, 3.0, 0.0]);

    assert_eq!(
        validator.sequence_match(GameFamily::PrisonersDilemma, INSTANCE, &snapshot),
        SequenceMatch::Rotated
    );
    assert!(validator.validate_agent(INSTANCE, &snapshot).tournament);
}

#[test]
fn sequence_in_another_order_fails_the_tournament_check() {
    let engines = ScriptedEngines::new(payoff_world);
    let validator = validator(&engines, 9.0);
    let snapshot = snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[3.0, 1.0, 0.0, 5.0]);

    assert_eq!(
        validator.sequence_match(GameFamily::PrisonersDilemma, INSTANCE, &snapshot),
        SequenceMatch::Mismatch
    );
    let row = validator.validate_agent(INSTANCE, &snapshot);
    assert!(!row.tournament);
    assert!(row.constraints);
    assert!(!row.final_verdict);
}

#[test]
fn missed_target_skips_the_sequence_check() {
    let engines = ScriptedEngines::new(payoff_world);
    let row = validator(&engines, 10.0).validate_agent(
        INSTANCE,
        &snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[3.0, 0.0, 1.0, 5.0]),
    );

    assert!(!row.tournament);
    assert!(row.constraints);
    // only the constraint check loaded a program
    assert_eq!(engines.spawned(), 1);
}

#[test]
fn rules_with_other_payoffs_fail_the_constraint_check() {
    let engines = ScriptedEngines::new(payoff_world);
    let rules = PD_PAYOFF_RULES.replace("5, 0", "4, 0").replace("0, 5", "0, 4");
    let row = validator(&engines, 8.0).validate_agent(
        INSTANCE,
        &snapshot(AgentStatus::Correct, &rules, &[3.0, 0.0, 1.0, 4.0]),
    );

    assert!(row.tournament);
    assert!(!row.constraints);
    assert!(!row.final_verdict);
}

#[test]
fn agents_that_did_not_formalize_fail_everything() {
    let engines = ScriptedEngines::new(payoff_world);
    let row = validator(&engines, 9.0).validate_agent(
        INSTANCE,
        &snapshot(AgentStatus::SyntacticError, PD_PAYOFF_RULES, &[]),
    );

    assert_eq!(row.status, AgentStatus::SyntacticError);
    assert!(!row.tournament && !row.constraints && !row.final_verdict);
    assert_eq!(engines.spawned(), 0);
}

#[test]
fn reference_program_reads_payoffs_from_the_ground_truth() {
    let engines = ScriptedEngines::new(payoff_world);
    let validator = validator(&engines, 9.0).with_reference_program("reference_agent.\n");
    // the agent's own rules have no payoff at all
    let snapshot = snapshot(
        AgentStatus::Correct,
        "rules_without_payoffs.\n",
        &[3.0, 0.0, 1.0, 5.0],
    );

    assert_eq!(
        validator.sequence_match(GameFamily::PrisonersDilemma, INSTANCE, &snapshot),
        SequenceMatch::Canonical
    );
    let worlds = engines.worlds();
    let world = worlds[0].lock().unwrap();
    assert!(world.program().contains("reference_agent."));
    assert!(world
        .applied
        .contains(&"assertz(payoff('D', 'C', 5, 0))".to_string()));
}

#[test]
fn directories_are_validated_per_known_instance() {
    let engines = ScriptedEngines::new(payoff_world);
    let validator = validator(&engines, 9.0);
    let dir = tempfile::tempdir().unwrap();

    let pd = dir.path().join("pd_canonic_1_gpt4o");
    fs::create_dir(&pd).unwrap();
    snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[3.0, 0.0, 1.0, 5.0])
        .save_json(pd.join("agent_Kafo.json"))
        .unwrap();
    fs::write(pd.join("notes.txt"), "ignored").unwrap();

    // no structural validator for hawk-dove
    let hd = dir.path().join("hd_canonic_1_gpt4o");
    fs::create_dir(&hd).unwrap();
    snapshot(AgentStatus::Correct, PD_PAYOFF_RULES, &[])
        .save_json(hd.join("agent_Lumi.json"))
        .unwrap();

    let rows = validator.validate_dir(dir.path()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].filename, INSTANCE);
    assert_eq!(rows[0].agent_name, "Kafo");
    assert!(rows[0].final_verdict);
}

#[test]
fn inputs_are_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let matrices = dir.path().join("matrices.json");
    fs::write(&matrices, r#"{"pd_canonic_1.txt": [[3,3],[5,0],[0,5],[1,1]]}"#).unwrap();
    let targets = dir.path().join("targets.json");
    fs::write(&targets, r#"{"pd_canonic_1.txt": 9.0}"#).unwrap();
    let validators = dir.path().join("validators");
    fs::create_dir(&validators).unwrap();
    fs::write(validators.join("pd.pl"), PD_VALIDATOR).unwrap();
    fs::write(validators.join("README"), "ignored").unwrap();

    assert_eq!(load_matrices(&matrices).unwrap()[INSTANCE], PD_MATRIX);
    assert_eq!(load_target_payoffs(&targets).unwrap()[INSTANCE], 9.0);
    let validators = validators_from_dir(&validators).unwrap();
    assert_eq!(validators.len(), 1);
    assert_eq!(validators["pd"], PD_VALIDATOR);
}
