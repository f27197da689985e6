//! Actor identity resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `TALLY_ACTOR` env > `actor` in the
//! user config > `USER` env (TTY only). Names are normalized to `@name`.
//! Mutating commands require an actor; read-only commands work without one.

use std::env;
use tally_core::config::resolve_actor;

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    user_config: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    let login = env.is_tty().then(|| env.get("USER")).flatten();
    resolve_actor(
        cli_flag,
        env.get("TALLY_ACTOR").as_deref(),
        user_config,
        login.as_deref(),
    )
}

/// Resolve the acting agent, or `None` if nothing identifies one.
pub fn current_actor(cli_flag: Option<&str>, user_config: Option<&str>) -> Option<String> {
    resolve_actor_with(cli_flag, user_config, &RealEnv)
}

/// Resolve the acting agent, returning an error if none is found.
pub fn require_actor(
    cli_flag: Option<&str>,
    user_config: Option<&str>,
) -> Result<String, ActorResolutionError> {
    current_actor(cli_flag, user_config).ok_or_else(missing_actor)
}

fn missing_actor() -> ActorResolutionError {
    ActorResolutionError {
        message: "Actor identity required for this command. \
                  Set --actor, TALLY_ACTOR, or `actor` in the user config."
            .to_string(),
        code: "missing_actor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockEnv {
        vars: HashMap<String, String>,
        tty: bool,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
                tty: false,
            }
        }

        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }

        fn tty(mut self) -> Self {
            self.tty = true;
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.is_empty()).cloned()
        }

        fn is_tty(&self) -> bool {
            self.tty
        }
    }

    #[test]
    fn cli_flag_takes_priority() {
        let env = MockEnv::new().var("TALLY_ACTOR", "env-bot");
        assert_eq!(
            resolve_actor_with(Some("alice"), Some("cfg"), &env).as_deref(),
            Some("@alice")
        );
    }

    #[test]
    fn env_beats_user_config() {
        let env = MockEnv::new().var("TALLY_ACTOR", "@ci-bot");
        assert_eq!(
            resolve_actor_with(None, Some("cfg"), &env).as_deref(),
            Some("@ci-bot")
        );
    }

    #[test]
    fn user_config_beats_login() {
        let env = MockEnv::new().var("USER", "bob").tty();
        assert_eq!(
            resolve_actor_with(None, Some("carol"), &env).as_deref(),
            Some("@carol")
        );
    }

    #[test]
    fn blank_flag_ignored() {
        let env = MockEnv::new().var("TALLY_ACTOR", "env-bot");
        assert_eq!(
            resolve_actor_with(Some("  "), None, &env).as_deref(),
            Some("@env-bot")
        );
    }

    #[test]
    fn login_only_in_tty() {
        let env = MockEnv::new().var("USER", "bob");
        assert_eq!(resolve_actor_with(None, None, &env), None);

        let env = MockEnv::new().var("USER", "bob").tty();
        assert_eq!(resolve_actor_with(None, None, &env).as_deref(), Some("@bob"));
    }

    #[test]
    fn missing_actor_error_shape() {
        let err = missing_actor();
        assert_eq!(err.code, "missing_actor");
        assert!(err.to_string().contains("TALLY_ACTOR"));
    }

    #[test]
    fn require_actor_succeeds_with_flag() {
        assert_eq!(require_actor(Some("test-agent"), None).unwrap(), "@test-agent");
    }
}
