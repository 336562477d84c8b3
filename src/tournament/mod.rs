//! Tournaments between formalization agents.
//!
//! A [`Tournament`] is used in three steps:
//!
//! 1. [`create_agents`](Tournament::create_agents) builds one agent per configured strategy.
//!    Agents that are not accepted are kept aside in
//!    [`invalid_agents`](Tournament::invalid_agents) and never play.
//! 2. [`play_tournament`](Tournament::play_tournament) pairs the accepted agents according to the
//!    [`PairingMode`] and plays the rounds. A failing pairing is disqualified without stopping the
//!    others.
//! 3. [`get_winners`](Tournament::get_winners) reads the accumulated payoffs.

use std::{collections::HashSet, io::Write, path::Path, thread};

use anyhow::{bail, Context};
use tracing::{error, info, instrument, warn};

use crate::{
    agent::{AgentStatus, Collaborators, FormalizationAgent, GameSource},
    configuration::Configuration,
    logger,
    naming::generate_agent_name,
    strategy::Strategy,
};

pub mod pairing;
pub mod sources;

use pairing::{
    pair_mut, play_pairing, round_robin_pairs, Participant, PairingMode, PairingOutcome,
    PairingStatus,
};
use sources::StrategySource;

/// Largest number of agents in one tournament.
pub const MAX_AGENTS: usize = 50;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Agents, their pairings and the outcome of each pairing.
pub struct Tournament {
    config: Configuration,
    collaborators: Collaborators,
    game: GameSource,
    strategies: StrategySource,
    mode: PairingMode,
    target_payoffs: Option<Vec<f64>>,
    agents: Vec<FormalizationAgent>,
    construction_order: Vec<usize>,
    invalid_agents: Vec<FormalizationAgent>,
    clones: Vec<FormalizationAgent>,
    outcomes: Vec<PairingOutcome>,
    created: bool,
}

impl Tournament {
    /// Checks the agent count and installs the file logger when configured.
    ///
    /// `config.max_attempts()` overrides the attempt budget of `collaborators`.
    pub fn new(
        config: Configuration,
        collaborators: Collaborators,
        game: GameSource,
        strategies: StrategySource,
        mode: PairingMode,
    ) -> anyhow::Result<Self> {
        let num_agents = strategies.len();
        if !(1..=MAX_AGENTS).contains(&num_agents) {
            bail!("num_agents must be between 1 and {MAX_AGENTS}, {num_agents} provided");
        }

        if config.log {
            if let Err(e) = logger::init_logger(".") {
                eprintln!("{YELLOW}file logging disabled: {e:#}{RESET}");
            }
        }

        Ok(Self {
            config,
            collaborators: collaborators.with_max_attempts(config.max_attempts),
            game,
            strategies,
            mode,
            target_payoffs: None,
            agents: vec![],
            construction_order: vec![],
            invalid_agents: vec![],
            clones: vec![],
            outcomes: vec![],
            created: false,
        })
    }

    /// Expected total payoff of each agent, in construction order.
    pub fn with_target_payoffs(mut self, targets: Vec<f64>) -> anyhow::Result<Self> {
        if targets.len() != self.strategies.len() {
            bail!(
                "{} target payoffs provided for {} agents",
                targets.len(),
                self.strategies.len()
            );
        }
        self.target_payoffs = Some(targets);
        Ok(self)
    }

    /// Builds one agent per configured strategy.
    ///
    /// Construction failures never abort: failed agents are kept in
    /// [`invalid_agents`](Self::invalid_agents).
    #[instrument(skip_all)]
    pub fn create_agents(&mut self) -> anyhow::Result<()> {
        self.agents.clear();
        self.construction_order.clear();
        self.invalid_agents.clear();
        self.clones.clear();
        self.outcomes.clear();

        let verbose = self.config.verbose;
        if verbose {
            println!("Formalizing agents...");
        }

        // names double as snapshot file names, so they must not collide
        let mut taken = HashSet::new();
        let mut unique_name = || loop {
            let name = generate_agent_name(3);
            if taken.insert(name.clone()) {
                break name;
            }
        };
        let builds: Vec<(String, Build)> = match &self.strategies {
            StrategySource::Default { strategy, copies } => (0..*copies)
                .map(|_| (unique_name(), Build::Strategy(strategy.clone())))
                .collect(),
            StrategySource::Programs(strategies) | StrategySource::Descriptions(strategies) => {
                strategies
                    .iter()
                    .map(|strategy| (unique_name(), Build::Strategy(strategy.clone())))
                    .collect()
            }
            StrategySource::Snapshots(snapshots) => snapshots
                .iter()
                .map(|snapshot| (snapshot.name.clone(), Build::Snapshot(snapshot.clone())))
                .collect(),
        };
        let longest_name = builds.iter().fold(0, |acu, (name, _)| acu.max(name.len())) + 3; // at least 3 dots

        for (index, (name, build)) in builds.into_iter().enumerate() {
            if verbose {
                print!("Formalizing {name:·<longest_name$} ");
                let _ = std::io::stdout().flush(); // try to flush stdout
            }

            let agent = match build {
                Build::Strategy(strategy) => Ok(FormalizationAgent::new(
                    &name,
                    self.game.clone(),
                    strategy,
                    &self.collaborators,
                )),
                Build::Snapshot(snapshot) => {
                    FormalizationAgent::from_snapshot(&snapshot, &self.collaborators)
                }
            };

            let agent = match agent {
                Ok(agent) => agent,
                Err(e) => {
                    error!("agent '{name}' could not be built: {e:#}");
                    if verbose {
                        println!("{RED}{e}{RESET}");
                    }
                    continue;
                }
            };

            if agent.status() == AgentStatus::Correct {
                info!("agent '{name}' accepted after {} attempt(s)", agent.attempts());
                if verbose {
                    println!("{GREEN}Ok{RESET}");
                }
                self.agents.push(agent);
                self.construction_order.push(index);
            } else {
                warn!("agent '{name}' rejected: {}", agent.status());
                if verbose {
                    println!("{RED}{}{RESET}", agent.status());
                }
                self.invalid_agents.push(agent);
            }
        }

        self.created = true;
        Ok(())
    }

    /// Pairs the accepted agents and plays every pairing.
    #[instrument(skip_all)]
    pub fn play_tournament(&mut self) -> anyhow::Result<&[PairingOutcome]> {
        if !self.created {
            bail!("agents must be created before playing the tournament");
        }
        self.clones.clear();
        self.outcomes.clear();

        match self.mode.clone() {
            PairingMode::Clones { counter_strategy } => self.play_clones(counter_strategy),
            PairingMode::RoundRobin { symmetric } => self.play_round_robin(symmetric),
        }

        if self.config.verbose {
            for outcome in &self.outcomes {
                let first = self.participant_name(outcome.first);
                let second = self.participant_name(outcome.second);
                match &outcome.status {
                    PairingStatus::Completed => println!(
                        "{first} vs {second}: {GREEN}{} rounds{RESET}",
                        outcome.rounds_played
                    ),
                    PairingStatus::Disqualified { round, reason } => println!(
                        "{first} vs {second}: {RED}disqualified at round {round} ({reason}){RESET}"
                    ),
                }
            }
        }

        Ok(&self.outcomes)
    }

    fn play_clones(&mut self, counter_strategy: Strategy) {
        let num_rounds = self.config.num_rounds;

        for agent in &self.agents {
            let game = match agent.game().rules() {
                Some(rules) => GameSource::Rules {
                    description: agent.game().description().to_string(),
                    rules: rules.to_string(),
                },
                None => GameSource::Description(agent.game().description().to_string()),
            };
            let clone = FormalizationAgent::new(
                format!("{}_clone", agent.name()),
                game,
                counter_strategy.clone(),
                &self.collaborators,
            );
            self.clones.push(clone);
        }

        let mut results: Vec<Option<(usize, PairingStatus)>> = vec![None; self.agents.len()];
        let mut playable = vec![];
        for (index, (agent, clone)) in self.agents.iter_mut().zip(&self.clones).enumerate() {
            if clone.status() == AgentStatus::Correct {
                playable.push(index);
            } else {
                let reason = format!("shadow agent is {}", clone.status());
                warn!("{} cannot play: {reason}", agent.name());
                agent.set_status(AgentStatus::Disqualified);
                results[index] = Some((0, PairingStatus::Disqualified { round: 0, reason }));
            }
        }

        let mut pairs: Vec<(usize, &mut FormalizationAgent, &mut FormalizationAgent)> = self
            .agents
            .iter_mut()
            .zip(self.clones.iter_mut())
            .enumerate()
            .filter(|(index, _)| playable.contains(index))
            .map(|(index, (agent, clone))| (index, agent, clone))
            .collect();

        if self.config.parallel {
            let threads = num_cpus::get().max(1);
            info!("playing clone pairings on {threads} threads");
            for chunk in pairs.chunks_mut(threads) {
                let played = thread::scope(|s| {
                    let handles = chunk
                        .iter_mut()
                        .map(|(index, agent, clone)| {
                            let index = *index;
                            (index, s.spawn(move || play_pairing(agent, clone, num_rounds)))
                        })
                        .collect::<Vec<_>>();
                    handles
                        .into_iter()
                        .map(|(index, handle)| {
                            let result = handle.join().unwrap_or_else(|_| {
                                error!("pairing {index} panicked");
                                (
                                    0,
                                    PairingStatus::Disqualified {
                                        round: 0,
                                        reason: "pairing thread panicked".to_string(),
                                    },
                                )
                            });
                            (index, result)
                        })
                        .collect::<Vec<_>>()
                });
                for (index, result) in played {
                    results[index] = Some(result);
                }
            }
        } else {
            for (index, agent, clone) in pairs.iter_mut() {
                results[*index] = Some(play_pairing(agent, clone, num_rounds));
            }
        }

        self.outcomes = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| {
                result.map(|(rounds_played, status)| PairingOutcome {
                    first: Participant::Agent(index),
                    second: Participant::Clone(index),
                    rounds_played,
                    status,
                })
            })
            .collect();
    }

    fn play_round_robin(&mut self, symmetric: bool) {
        let num_rounds = self.config.num_rounds;
        for (i, j) in round_robin_pairs(self.agents.len(), symmetric) {
            let Some((first, second)) = pair_mut(&mut self.agents, i, j) else {
                continue;
            };

            let unable = [&*first, &*second]
                .into_iter()
                .find(|agent| agent.status() != AgentStatus::Correct)
                .map(|agent| format!("{} is {}", agent.name(), agent.status()));
            let (rounds_played, status) = match unable {
                Some(reason) => (0, PairingStatus::Disqualified { round: 0, reason }),
                None => play_pairing(first, second, num_rounds),
            };

            self.outcomes.push(PairingOutcome {
                first: Participant::Agent(i),
                second: Participant::Agent(j),
                rounds_played,
                status,
            });
        }
    }

    /// Agents whose total payoff equals their target, or, without targets, the agents tied at
    /// the highest total payoff.
    pub fn get_winners(&self) -> Vec<&FormalizationAgent> {
        let totals: Vec<f64> = self.agents.iter().map(FormalizationAgent::total_payoff).collect();
        let targets: Option<Vec<f64>> = self.target_payoffs.as_ref().map(|targets| {
            self.construction_order
                .iter()
                .map(|&index| targets.get(index).copied().unwrap_or(f64::NAN))
                .collect()
        });
        select_winners(&totals, targets.as_deref())
            .into_iter()
            .map(|index| &self.agents[index])
            .collect()
    }

    /// Writes `agent_<name>.json` for every accepted and rejected agent into `dir`.
    pub fn save_agents(&self, dir: impl AsRef<Path>) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;
        for agent in self.agents.iter().chain(&self.invalid_agents) {
            agent
                .snapshot()
                .save_json(dir.join(format!("agent_{}.json", agent.name())))?;
        }
        Ok(())
    }

    fn participant_name(&self, participant: Participant) -> &str {
        let agent = match participant {
            Participant::Agent(index) => self.agents.get(index),
            Participant::Clone(index) => self.clones.get(index),
        };
        agent.map_or("?", FormalizationAgent::name)
    }

    /// Accepted agents, in construction order.
    pub fn agents(&self) -> &[FormalizationAgent] {
        &self.agents
    }

    /// Agents that never reached an accepted session.
    pub fn invalid_agents(&self) -> &[FormalizationAgent] {
        &self.invalid_agents
    }

    /// Shadow agents of clone mode, one per accepted agent.
    pub fn clones(&self) -> &[FormalizationAgent] {
        &self.clones
    }

    /// Outcome of every pairing of the last played tournament.
    pub fn outcomes(&self) -> &[PairingOutcome] {
        &self.outcomes
    }
}

enum Build {
    Strategy(Strategy),
    Snapshot(crate::snapshot::AgentSnapshot),
}

/// Winner indices for the given totals.
///
/// Payoffs are compared with exact equality.
pub fn select_winners(totals: &[f64], targets: Option<&[f64]>) -> Vec<usize> {
    match targets {
        Some(targets) => totals
            .iter()
            .zip(targets)
            .enumerate()
            .filter(|(_, (total, target))| total == target)
            .map(|(index, _)| index)
            .collect(),
        None => {
            let best = totals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            totals
                .iter()
                .enumerate()
                .filter(|(_, total)| **total == best)
                .map(|(index, _)| index)
                .collect()
        }
    }
}
