//! Config for the tournament behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! Engine and generator settings live with their backends, see
//! [`SwiplConfig`](crate::session::swipl::SwiplConfig) and
//! [`ChatConfig`](crate::generation::ChatConfig).
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive: set them to `"true"` to enable them.
//!
//! - `AUTOFORMAL_VERBOSE`: print formalization progress to stdout (default: `true`)
//! - `AUTOFORMAL_LOG`: log to a file in the current directory (default: `false`)
//! - `AUTOFORMAL_PARALLEL`: run clone pairings on several threads (default: `false`)
//! - `AUTOFORMAL_MAX_ATTEMPTS`: generations allowed per agent (default: `5`)
//! - `AUTOFORMAL_NUM_ROUNDS`: rounds per pairing (default: `10`)

/// Configuration for tournament behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) parallel: bool,
    pub(crate) max_attempts: usize,
    pub(crate) num_rounds: usize,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Pairings are played one after the other.
    /// - Each agent gets 5 attempts.
    /// - Each pairing lasts 10 rounds.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            parallel: false,
            max_attempts: 5,
            num_rounds: 10,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable values keep their default.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_count(var: &str, default: usize) -> usize {
            std::env::var(var)
                .ok()
                .and_then(|val| val.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            verbose: get_env_flag("AUTOFORMAL_VERBOSE", true),
            log: get_env_flag("AUTOFORMAL_LOG", false),
            parallel: get_env_flag("AUTOFORMAL_PARALLEL", false),
            max_attempts: get_env_count("AUTOFORMAL_MAX_ATTEMPTS", 5),
            num_rounds: get_env_count("AUTOFORMAL_NUM_ROUNDS", 10),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable parallel clone pairings.
    ///
    /// Round-robin pairings share agents and are always played sequentially.
    pub fn with_parallel(mut self, value: bool) -> Self {
        self.parallel = value;
        self
    }

    /// Set the number of generations allowed per agent (at least one).
    pub fn with_max_attempts(mut self, value: usize) -> Self {
        self.max_attempts = value.max(1);
        self
    }

    /// Set the number of rounds per pairing.
    pub fn with_num_rounds(mut self, value: usize) -> Self {
        self.num_rounds = value;
        self
    }

    /// Generations allowed per agent.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Rounds per pairing.
    pub fn num_rounds(&self) -> usize {
        self.num_rounds
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
