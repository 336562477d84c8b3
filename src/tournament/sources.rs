//! Where the strategies of a tournament come from.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::{snapshot::AgentSnapshot, strategy::Strategy};

/// Strategy configuration of a tournament.
#[derive(Debug, Clone)]
pub enum StrategySource {
    /// The same strategy for every agent.
    Default {
        /// Strategy replicated.
        strategy: Strategy,
        /// Number of agents.
        copies: usize,
    },
    /// One formal strategy per agent.
    Programs(Vec<Strategy>),
    /// One described strategy per agent, formalized by the agent.
    Descriptions(Vec<Strategy>),
    /// Previously persisted agents, reloaded without formalization.
    Snapshots(Vec<AgentSnapshot>),
}

impl StrategySource {
    /// Number of agents this source yields.
    pub fn len(&self) -> usize {
        match self {
            StrategySource::Default { copies, .. } => *copies,
            StrategySource::Programs(strategies) | StrategySource::Descriptions(strategies) => {
                strategies.len()
            }
            StrategySource::Snapshots(snapshots) => snapshots.len(),
        }
    }

    /// Whether no agent would be created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `.pl` file of `dir`, by file name. The strategy name is the file stem.
    pub fn programs_from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let strategies = read_files(dir.as_ref(), "pl")?
            .into_iter()
            .map(|(name, text)| Strategy::program(name, text))
            .collect();
        Ok(StrategySource::Programs(strategies))
    }

    /// Every `.txt` file of `dir`, by file name. The strategy name is the file stem.
    pub fn descriptions_from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let strategies = read_files(dir.as_ref(), "txt")?
            .into_iter()
            .map(|(name, text)| Strategy::description(name, text))
            .collect();
        Ok(StrategySource::Descriptions(strategies))
    }

    /// Every `.json` snapshot of `dir`, by file name.
    pub fn snapshots_from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let snapshots = list_files(dir.as_ref(), "json")?
            .iter()
            .map(AgentSnapshot::load_json)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(StrategySource::Snapshots(snapshots))
    }
}

fn list_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("'{dir:?}' is not a valid directory");
    }
    let mut files = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {dir:?}"))? {
        let Ok(entry) = entry else {
            warn!("one entry cannot be read in {dir:?}");
            continue;
        };
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    info!(?files, "collected from {dir:?}");
    Ok(files)
}

fn read_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<(String, String)>> {
    list_files(dir, extension)?
        .into_iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text =
                std::fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
            Ok((name, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::strategy::StrategyKind;

    #[test]
    fn programs_are_named_after_their_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tit-for-tat.pl"), "tft.").unwrap();
        fs::write(dir.path().join("random.pl"), "rnd.").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let StrategySource::Programs(strategies) =
            StrategySource::programs_from_dir(dir.path()).unwrap()
        else {
            panic!("expected programs");
        };
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].name(), "random");
        assert_eq!(strategies[0].kind(), StrategyKind::Random);
        assert_eq!(strategies[1].name(), "tit-for-tat");
        assert_eq!(strategies[1].text(), "tft.");
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(StrategySource::descriptions_from_dir("/definitely/not/here").is_err());
    }

    #[test]
    fn default_source_counts_its_copies() {
        let source = StrategySource::Default {
            strategy: Strategy::program("tit-for-tat", "tft."),
            copies: 4,
        };
        assert_eq!(source.len(), 4);
        assert!(!source.is_empty());
    }
}
