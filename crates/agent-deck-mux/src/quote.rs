//! Argument validation and quoting for remote shell composition.
//!
//! Local execution passes arguments straight to the subprocess and needs no
//! quoting. Remote execution flattens every multiplexer command into a shell
//! string for the SSH bridge, so each embedded argument is checked against a
//! metacharacter deny-list before it is quoted.

use agent_deck_core::{Error, Result};

/// Characters that fail remote-argument validation. Tilde is permitted so
/// home-relative paths survive.
const DENIED: &[char] = &[
    ';', '&', '|', '$', '`', '\\', '(', ')', '{', '}', '[', ']', '<', '>', '!', '*', '?', '#',
    '\n', '\r',
];

/// Validate an argument destined for a remote shell string.
pub fn validate_remote_arg(arg: &str) -> Result<()> {
    if arg.chars().any(|c| DENIED.contains(&c)) {
        return Err(Error::UnsafeArgument(arg.to_string()));
    }
    Ok(())
}

/// Single-quote an already-validated argument for a remote shell string.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if !arg.contains('\'') && !arg.contains(' ') {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Compose a full remote command line, validating and quoting every part.
pub fn compose_remote_command(program: &str, args: &[String]) -> Result<String> {
    validate_remote_arg(program)?;
    let mut out = shell_quote(program);
    for arg in args {
        validate_remote_arg(arg)?;
        out.push(' ');
        out.push_str(&shell_quote(arg));
    }
    Ok(out)
}
