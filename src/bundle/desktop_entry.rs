//! Reading and rewriting freedesktop `.desktop` manifests.
//!
//! Only the keys this crate touches are interpreted; every other line,
//! including comments, localized keys and action groups, is kept verbatim.

use crate::core::{ShelfError, ShelfResult};
use std::fmt;
use std::path::Path;

pub const MAIN_GROUP: &str = "Desktop Entry";

/// Vendor key carrying an explicit version string
pub const VERSION_KEY: &str = "X-Shelf-Version";
/// Version key commonly set by bundle authors themselves
pub const APPIMAGE_VERSION_KEY: &str = "X-AppImage-Version";
/// Vendor key pointing at the integrated bundle file
pub const BUNDLE_KEY: &str = "X-Shelf-Bundle";
/// Vendor key carrying the content hash of the integrated bundle
pub const HASH_KEY: &str = "X-Shelf-Hash";
/// Vendor key carrying the architecture tag of the integrated bundle
pub const ARCH_KEY: &str = "X-Shelf-Arch";
/// Vendor key carrying the integration timestamp (RFC 3339)
pub const INSTALLED_KEY: &str = "X-Shelf-Installed";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
    name: String,
    lines: Vec<Line>,
}

/// A parsed desktop manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    preamble: Vec<String>,
    groups: Vec<Group>,
    main: usize,
}

impl DesktopEntry {
    /// Parse manifest text. Fails when there is no `[Desktop Entry]` group.
    pub fn parse(content: &str) -> ShelfResult<Self> {
        let mut preamble = Vec::new();
        let mut groups: Vec<Group> = Vec::new();

        for raw in content.lines() {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                groups.push(Group {
                    name: trimmed[1..trimmed.len() - 1].to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let line = match trimmed.split_once('=') {
                Some((key, value)) if !trimmed.starts_with('#') && !key.trim().is_empty() => {
                    Line::Entry {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    }
                }
                _ => Line::Other(raw.to_string()),
            };

            match groups.last_mut() {
                Some(group) => group.lines.push(line),
                None => preamble.push(raw.to_string()),
            }
        }

        let main = groups
            .iter()
            .position(|g| g.name == MAIN_GROUP)
            .ok_or_else(|| {
                ShelfError::Extraction("Manifest has no [Desktop Entry] group".to_string())
            })?;

        Ok(Self {
            preamble,
            groups,
            main,
        })
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> ShelfResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn main_group(&self) -> &Group {
        &self.groups[self.main]
    }

    fn main_group_mut(&mut self) -> &mut Group {
        &mut self.groups[self.main]
    }

    /// Value of a key in the `[Desktop Entry]` group
    pub fn get(&self, key: &str) -> Option<&str> {
        self.main_group().lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set a key in the `[Desktop Entry]` group, appending it when absent
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let group = self.main_group_mut();
        for line in group.lines.iter_mut() {
            if let Line::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value;
                    return;
                }
            }
        }

        // Keep trailing blank lines after the new key
        let insert_at = group
            .lines
            .iter()
            .rposition(|l| !matches!(l, Line::Other(s) if s.trim().is_empty()))
            .map(|i| i + 1)
            .unwrap_or(0);
        group.lines.insert(
            insert_at,
            Line::Entry {
                key: key.to_string(),
                value,
            },
        );
    }

    /// Remove a key from the `[Desktop Entry]` group
    pub fn remove(&mut self, key: &str) {
        self.main_group_mut()
            .lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    pub fn comment(&self) -> Option<&str> {
        self.get("Comment")
    }

    pub fn icon(&self) -> Option<&str> {
        self.get("Icon")
    }

    pub fn exec(&self) -> Option<&str> {
        self.get("Exec")
    }

    pub fn terminal(&self) -> bool {
        self.get("Terminal")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Version declared by the manifest, vendor key first
    pub fn declared_version(&self) -> Option<&str> {
        self.get(VERSION_KEY)
            .or_else(|| self.get(APPIMAGE_VERSION_KEY))
            .filter(|v| !v.is_empty())
    }

    /// Rewrite `Exec` and `TryExec` in every group (including actions) so
    /// they launch `program`, keeping each line's own arguments.
    pub fn retarget_exec(&mut self, program: &Path, env: &[(&str, &str)], args: &[String]) {
        for group in self.groups.iter_mut() {
            for line in group.lines.iter_mut() {
                if let Line::Entry { key, value } = line {
                    if key == "Exec" {
                        let (_, rest) = split_exec(value);
                        let rebuilt = build_exec(program, env, args, rest);
                        *value = rebuilt;
                    } else if key == "TryExec" {
                        *value = program.display().to_string();
                    }
                }
            }
        }
    }
}

impl fmt::Display for DesktopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.preamble {
            writeln!(f, "{}", line)?;
        }
        for group in &self.groups {
            writeln!(f, "[{}]", group.name)?;
            for line in &group.lines {
                match line {
                    Line::Entry { key, value } => writeln!(f, "{}={}", key, value)?,
                    Line::Other(raw) => writeln!(f, "{}", raw)?,
                }
            }
        }
        Ok(())
    }
}

/// Split an `Exec` value into its program token and the remaining arguments
pub fn split_exec(exec: &str) -> (String, &str) {
    let exec = exec.trim_start();
    if let Some(stripped) = exec.strip_prefix('"') {
        let mut program = String::new();
        let mut chars = stripped.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        program.push(escaped);
                    }
                }
                '"' => return (program, stripped[i + 1..].trim_start()),
                _ => program.push(c),
            }
        }
        // Unterminated quote: treat the whole line as the program
        return (program, "");
    }

    match exec.find(char::is_whitespace) {
        Some(i) => (exec[..i].to_string(), exec[i..].trim_start()),
        None => (exec.to_string(), ""),
    }
}

/// Quote an argument for an `Exec` line when it contains reserved characters
pub fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn build_exec(program: &Path, env: &[(&str, &str)], args: &[String], rest: &str) -> String {
    let mut parts = Vec::new();
    if !env.is_empty() {
        parts.push("env".to_string());
        for (key, value) in env {
            parts.push(quote_exec_arg(&format!("{}={}", key, value)));
        }
    }
    parts.push(quote_exec_arg(&program.display().to_string()));
    parts.extend(args.iter().map(|a| quote_exec_arg(a)));
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts.join(" ")
}
