use std::fmt;

/// Host platform an installer targets. Passed explicitly instead of being
/// read from process state so callers can pick a strategy for any host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }

    /// Name of the Splunk CLI executable under `<home>/bin`
    pub fn cli_executable(&self) -> &'static str {
        match self {
            Self::Windows => "splunk.exe",
            _ => "splunk",
        }
    }

    /// Quote one argument for the shell `ShellRunner` uses on this platform
    /// (`sh -c` or `cmd /C`) so it reaches the program as a single word.
    /// Plain words pass through untouched.
    pub fn quote_arg(&self, arg: &str) -> String {
        match self {
            Self::Windows => {
                if !arg.is_empty() && arg.chars().all(|c| is_plain(c) || c == '\\') {
                    return arg.to_string();
                }
                // cmd keeps quoted text literal; a doubled quote is one literal quote
                format!("\"{}\"", arg.replace('"', "\"\""))
            }
            _ => {
                if !arg.is_empty() && arg.chars().all(|c| is_plain(c) || c == '%') {
                    return arg.to_string();
                }
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        }
    }
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '=' | '@' | '+')
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::Windows => f.write_str("windows"),
            Self::Other(name) => f.write_str(name),
        }
    }
}
