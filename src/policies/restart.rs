//! # Restart policies for supervised services.
//!
//! [`RestartPolicy`] decides whether a service is relaunched after its instance exits.
//!
//! - [`RestartPolicy::Never`] the service runs once; any exit leaves it `Failed`.
//! - [`RestartPolicy::OnFailure`] relaunch only on a non-zero exit (default).
//! - [`RestartPolicy::Always`] relaunch on every exit, including a clean one.
//!
//! The policy only answers *whether* a restart is wanted. The restart budget
//! (`max_restarts`) and the delay ([`BackoffPolicy`](crate::BackoffPolicy)) are applied
//! by the service actor on top of it:
//! ```text
//! exit(code) ──► policy.allows_restart(code) && restart_count < max_restarts
//!                   ├─ yes ─► restart_count += 1, sleep(backoff), relaunch
//!                   └─ no  ─► Failed
//! ```
//!
//! In manifests the policy is spelled `never`, `on-failure` or `always`.

use std::fmt;

use serde::Deserialize;

/// Policy controlling whether a service is relaunched after it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    Never,
    /// Restart only when the exit code is non-zero (default).
    #[default]
    OnFailure,
    /// Restart on any exit.
    Always,
}

impl RestartPolicy {
    /// Returns `true` if an exit with `code` should trigger a restart
    /// (budget permitting).
    ///
    /// Launch errors and exhausted readiness probes are reported with a non-zero code.
    #[inline]
    pub fn allows_restart(&self, code: i32) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => code != 0,
            RestartPolicy::Always => true,
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestartPolicy::Never => "never",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_failure_ignores_clean_exit() {
        assert!(!RestartPolicy::OnFailure.allows_restart(0));
        assert!(RestartPolicy::OnFailure.allows_restart(1));
        assert!(RestartPolicy::OnFailure.allows_restart(-1));
    }

    #[test]
    fn always_and_never() {
        assert!(RestartPolicy::Always.allows_restart(0));
        assert!(RestartPolicy::Always.allows_restart(137));
        assert!(!RestartPolicy::Never.allows_restart(0));
        assert!(!RestartPolicy::Never.allows_restart(2));
    }

    #[test]
    fn parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            restart: RestartPolicy,
        }
        let w: Wrap = toml::from_str(r#"restart = "on-failure""#).unwrap();
        assert_eq!(w.restart, RestartPolicy::OnFailure);
        let w: Wrap = toml::from_str(r#"restart = "always""#).unwrap();
        assert_eq!(w.restart, RestartPolicy::Always);
        assert!(toml::from_str::<Wrap>(r#"restart = "sometimes""#).is_err());
    }
}
