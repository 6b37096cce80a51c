use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// The three memory operations a process can ask the memory manager for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Store,
    Lookup,
    Release,
}

impl FromStr for Operation {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STORE" => Ok(Operation::Store),
            "LOOKUP" => Ok(Operation::Lookup),
            "RELEASE" => Ok(Operation::Release),
            other => Err(SimError::malformed(format!("unrecognized command keyword '{}'", other))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Store => write!(f, "Store"),
            Operation::Lookup => write!(f, "Lookup"),
            Operation::Release => write!(f, "Release"),
        }
    }
}

/// A memory command read from the command stream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Command {
    Store { var: String, value: String },
    Lookup { var: String },
    Release { var: String },
}

impl Command {
    pub fn store(var: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Store { var: var.into(), value: value.into() }
    }

    pub fn lookup(var: impl Into<String>) -> Self {
        Command::Lookup { var: var.into() }
    }

    pub fn release(var: impl Into<String>) -> Self {
        Command::Release { var: var.into() }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::Store { .. } => Operation::Store,
            Command::Lookup { .. } => Operation::Lookup,
            Command::Release { .. } => Operation::Release,
        }
    }

    /// Target variable id.
    pub fn var(&self) -> &str {
        match self {
            Command::Store { var, .. } | Command::Lookup { var } | Command::Release { var } => var,
        }
    }
}

/// Parses one command line such as `Store 1 5` or `lookup 3`.
impl FromStr for Command {
    type Err = SimError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words
            .next()
            .ok_or_else(|| SimError::malformed("empty command line"))?;
        let op: Operation = keyword.parse()?;
        let var = words
            .next()
            .ok_or_else(|| SimError::malformed(format!("{} is missing a variable id", op)))?;
        let command = match op {
            Operation::Store => {
                let value = words
                    .next()
                    .ok_or_else(|| SimError::malformed(format!("Store {} is missing a value", var)))?;
                Command::store(var, value)
            }
            Operation::Lookup => Command::lookup(var),
            Operation::Release => Command::release(var),
        };
        if let Some(extra) = words.next() {
            return Err(SimError::malformed(format!(
                "unexpected operand '{}' after {} {}",
                extra, op, var
            )));
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Store { var, value } => write!(f, "Store {} {}", var, value),
            Command::Lookup { var } => write!(f, "Lookup {}", var),
            Command::Release { var } => write!(f, "Release {}", var),
        }
    }
}
