use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a run target definition came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    /// Authored by the user in the daemon config
    #[default]
    User,
    /// Found on PATH by the daemon
    Detected,
    /// Provided by a model catalog entry
    Model,
}

impl TargetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSource::User => "user",
            TargetSource::Detected => "detected",
            TargetSource::Model => "model",
        }
    }
}

/// How a target's command is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// Accepts a prompt appended to the command
    Promptable { command: String },
    /// Runs verbatim
    Command { command: String },
}

impl TargetKind {
    pub fn command(&self) -> &str {
        match self {
            TargetKind::Promptable { command } | TargetKind::Command { command } => command,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            TargetKind::Promptable { .. } => "promptable",
            TargetKind::Command { .. } => "command",
        }
    }
}

/// A named command template the daemon can spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RunTargetWire", into = "RunTargetWire")]
pub struct RunTarget {
    pub name: String,
    pub kind: TargetKind,
    pub source: TargetSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireType {
    Promptable,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunTargetWire {
    name: String,
    #[serde(rename = "type")]
    kind: WireType,
    command: String,
    #[serde(default)]
    source: TargetSource,
}

impl From<RunTargetWire> for RunTarget {
    fn from(wire: RunTargetWire) -> Self {
        let kind = match wire.kind {
            WireType::Promptable => TargetKind::Promptable {
                command: wire.command,
            },
            WireType::Command => TargetKind::Command {
                command: wire.command,
            },
        };
        Self {
            name: wire.name,
            kind,
            source: wire.source,
        }
    }
}

impl From<RunTarget> for RunTargetWire {
    fn from(target: RunTarget) -> Self {
        let (kind, command) = match target.kind {
            TargetKind::Promptable { command } => (WireType::Promptable, command),
            TargetKind::Command { command } => (WireType::Command, command),
        };
        Self {
            name: target.name,
            kind,
            command,
            source: target.source,
        }
    }
}

impl RunTarget {
    pub fn promptable(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Promptable {
                command: command.into(),
            },
            source: TargetSource::User,
        }
    }

    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Command {
                command: command.into(),
            },
            source: TargetSource::User,
        }
    }

    pub fn with_source(mut self, source: TargetSource) -> Self {
        self.source = source;
        self
    }

    pub fn requires_prompt(&self) -> bool {
        match self.kind {
            TargetKind::Promptable { .. } => true,
            TargetKind::Command { .. } => false,
        }
    }

    /// Full shell command for this target.
    ///
    /// Promptable targets get the prompt appended as one shell-quoted word;
    /// command targets ignore it.
    pub fn command_line(&self, prompt: &str) -> String {
        match &self.kind {
            TargetKind::Promptable { command } if !prompt.is_empty() => {
                format!("{} {}", command, shell_quote(prompt))
            }
            TargetKind::Promptable { command } | TargetKind::Command { command } => {
                command.clone()
            }
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// One `(target, index)` unit in a flattened spawn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnUnit {
    pub target: String,
    /// Zero-based repetition index within the target
    pub index: u32,
}

/// Ordered `target name -> count` map.
///
/// Serialized as a JSON object whose key order is the insertion order, so
/// the flattened unit expansion matches what the daemon sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetCounts(Vec<(String, u32)>);

impl TargetCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TargetCounts::set`].
    pub fn with(mut self, name: impl Into<String>, count: u32) -> Self {
        self.set(name, count);
        self
    }

    /// Set a count, keeping the target's original position. Zero removes it.
    pub fn set(&mut self, name: impl Into<String>, count: u32) {
        let name = name.into();
        match self.0.iter().position(|(n, _)| *n == name) {
            Some(idx) if count == 0 => {
                self.0.remove(idx);
            }
            Some(idx) => self.0[idx].1 = count,
            None if count == 0 => {}
            None => self.0.push((name, count)),
        }
    }

    pub fn get(&self, name: &str) -> u32 {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, c)| *c as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into one unit per repetition, in insertion order.
    pub fn units(&self) -> Vec<SpawnUnit> {
        self.0
            .iter()
            .flat_map(|(name, count)| {
                (0..*count).map(move |index| SpawnUnit {
                    target: name.clone(),
                    index,
                })
            })
            .collect()
    }
}

impl FromIterator<(String, u32)> for TargetCounts {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        let mut counts = TargetCounts::new();
        for (name, count) in iter {
            let total = counts.get(&name).saturating_add(count);
            counts.set(name, total);
        }
        counts
    }
}

impl Serialize for TargetCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, count) in &self.0 {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TargetCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountsVisitor;

        impl<'de> Visitor<'de> for CountsVisitor {
            type Value = TargetCounts;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of target name to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut counts = TargetCounts::new();
                while let Some((name, count)) = access.next_entry::<String, u32>()? {
                    counts.set(name, count);
                }
                Ok(counts)
            }
        }

        deserializer.deserialize_map(CountsVisitor)
    }
}

impl FromStr for TargetCounts {
    type Err = String;

    /// Parses `name=count[,name=count...]`; a bare `name` counts once.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut counts = TargetCounts::new();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, count) = match part.split_once('=') {
                Some((name, count)) => {
                    let count = count
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| format!("invalid count in '{}'", part))?;
                    (name.trim(), count)
                }
                None => (part, 1),
            };
            if name.is_empty() {
                return Err(format!("missing target name in '{}'", part));
            }
            let total = counts.get(name).saturating_add(count);
            counts.set(name, total);
        }
        Ok(counts)
    }
}
