//! Caller identity resolution for CLI commands.
//!
//! Staff: `--as-staff` flag > `HELPDESK_STAFF` env.
//! Requester: `--as-user` flag > `HELPDESK_USER` env > `USER` env (TTY only).
//!
//! Staff-only commands pass whatever was resolved to the engine, which
//! rejects a missing staff member itself.

use std::env;

pub const STAFF_ENV: &str = "HELPDESK_STAFF";
pub const USER_ENV: &str = "HELPDESK_USER";

/// Errors from identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityError {
    pub message: String,
    /// Machine error code.
    pub code: &'static str,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdentityError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn flag_value(flag: Option<&str>) -> Option<String> {
    flag.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_staff_with(flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    flag_value(flag).or_else(|| env.get(STAFF_ENV))
}

fn resolve_user_with(flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(user) = flag_value(flag) {
        return Some(user);
    }
    if let Some(user) = env.get(USER_ENV) {
        return Some(user);
    }
    if env.is_tty() {
        return env.get("USER");
    }
    None
}

/// Staff id to act as, if any.
pub fn resolve_staff(flag: Option<&str>) -> Option<String> {
    resolve_staff_with(flag, &RealEnv)
}

/// Requester id, required by requester commands.
pub fn require_user(flag: Option<&str>) -> Result<String, IdentityError> {
    resolve_user_with(flag, &RealEnv).ok_or_else(|| IdentityError {
        message: "Requester identity required for this command. \
                  Set --as-user or HELPDESK_USER."
            .to_string(),
        code: "missing_user",
    })
}
