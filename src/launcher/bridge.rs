//! Bridge shell support
//!
//! On hosts where the CLI only exists inside a secondary OS context (e.g. a
//! Linux distribution reached through `wsl`), the CLI is started with
//! `<bridge> -e bash -c <script>`. Host paths are rewritten to the bridge's
//! mount convention and free-form text crosses the bridge base64-encoded, so
//! non-ASCII input never depends on the bridge's argument quoting.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DRIVE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]):(?:/|$)").unwrap());

/// When to go through the bridge shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Only on Windows hosts
    #[default]
    Auto,
    Always,
    Never,
}

impl BridgeMode {
    pub fn is_enabled(&self) -> bool {
        match self {
            BridgeMode::Auto => cfg!(windows),
            BridgeMode::Always => true,
            BridgeMode::Never => false,
        }
    }
}

/// One argument of the bridged command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeArg<'a> {
    /// Single-quoted as is; for identifiers and flags
    Plain(&'a str),
    /// Base64-encoded on this side, decoded by the far shell
    Encoded(&'a str),
}

/// Rewrite a host path to the bridge mount convention.
///
/// `C:\Users\me\proj` becomes `/mnt/c/Users/me/proj`. Paths without a drive
/// letter only get their separators normalized.
pub fn to_bridge_path(host_path: &str, mount_root: &str) -> String {
    let path = host_path.replace('\\', "/");
    match DRIVE_PATTERN.captures(&path) {
        Some(captures) => {
            let drive = captures[1].to_lowercase();
            let rest = path[2..].trim_start_matches('/');
            let root = mount_root.trim_end_matches('/');
            if rest.is_empty() {
                format!("{root}/{drive}")
            } else {
                format!("{root}/{drive}/{rest}")
            }
        }
        None => path,
    }
}

/// POSIX single-quote a string
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// Shell expression that expands to `text`, decoded from base64 on the far side
pub fn encoded_argument(text: &str) -> String {
    format!(
        "\"$(printf %s {} | base64 -d)\"",
        sh_quote(&STANDARD.encode(text.as_bytes()))
    )
}

/// Build the `bash -c` script run inside the bridge
pub fn bridge_script(cwd: Option<&str>, cli_path: &str, args: &[BridgeArg<'_>]) -> String {
    let mut script = String::from("export LANG=C.UTF-8 && export PATH=\"$HOME/.local/bin:$PATH\"");
    if let Some(cwd) = cwd {
        script.push_str(" && cd ");
        script.push_str(&sh_quote(cwd));
    }
    script.push_str(" && exec ");
    script.push_str(&sh_quote(cli_path));
    for arg in args {
        script.push(' ');
        match arg {
            BridgeArg::Plain(value) => script.push_str(&sh_quote(value)),
            BridgeArg::Encoded(value) => script.push_str(&encoded_argument(value)),
        }
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drive_letter_translation() {
        assert_eq!(to_bridge_path(r"C:\Users\me\proj", "/mnt"), "/mnt/c/Users/me/proj");
        assert_eq!(to_bridge_path("D:/work", "/mnt/"), "/mnt/d/work");
        assert_eq!(to_bridge_path(r"E:\", "/mnt"), "/mnt/e");
        assert_eq!(to_bridge_path("/home/me/proj", "/mnt"), "/home/me/proj");
        assert_eq!(to_bridge_path(r"\\server\share", "/mnt"), "//server/share");
    }

    #[test]
    fn test_sh_quote() {
        assert_eq!(sh_quote("agent"), "'agent'");
        assert_eq!(sh_quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn test_encoded_argument_roundtrips_non_ascii() {
        let expr = encoded_argument("안녕하세요 'quoted' $HOME");
        let b64 = expr
            .trim_start_matches("\"$(printf %s '")
            .trim_end_matches("' | base64 -d)\"");
        let decoded = STANDARD.decode(b64).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "안녕하세요 'quoted' $HOME");
        assert!(expr.is_ascii());
    }

    #[test]
    fn test_bridge_script() {
        let script = bridge_script(
            Some("/mnt/c/proj"),
            "kiro-cli",
            &[BridgeArg::Plain("chat"), BridgeArg::Plain("--agent"), BridgeArg::Plain("pm")],
        );
        assert_eq!(
            script,
            "export LANG=C.UTF-8 && export PATH=\"$HOME/.local/bin:$PATH\" && cd '/mnt/c/proj' && exec 'kiro-cli' 'chat' '--agent' 'pm'"
        );
    }
}
