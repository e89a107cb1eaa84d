use std::ops::RangeInclusive;

use crate::error::{DriverError, Result};

/// Ordered list of quantity identifiers that defines the layout of a frame.
///
/// Names are instrument mnemonics such as `utrms` or `p3`. Value `i` of every
/// streamed frame belongs to name `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSelection {
    names: Vec<String>,
}

impl ValueSelection {
    /// Build a validated selection.
    ///
    /// Fails on an empty list, or on a name that is empty, contains
    /// whitespace, or contains `;` or `?` (those would break the action
    /// command).
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(DriverError::InvalidSelection(
                "at least one value is required".to_string(),
            ));
        }
        for name in &names {
            validate_name(name)?;
        }
        Ok(Self { names })
    }

    /// Expand `names` for every channel in `channels`, channel-major.
    ///
    /// `per_channel(&["p", "pf"], 1..=2)` gives `p1 pf1 p2 pf2`.
    pub fn per_channel(names: &[&str], channels: RangeInclusive<u8>) -> Self {
        let names = channels
            .flat_map(|c| names.iter().map(move |name| format!("{name}{c}")))
            .collect();
        Self { names }
    }

    pub(crate) fn from_static(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| (*name).to_string()).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The short-form action command that arms this selection.
    pub fn to_command(&self) -> String {
        let mut command = String::from("actn");
        for name in &self.names {
            command.push(';');
            command.push_str(name);
            command.push('?');
        }
        command
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DriverError::InvalidSelection("empty value name".to_string()));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == ';' || c == '?')
    {
        return Err(DriverError::InvalidSelection(format!(
            "value name {name:?} contains whitespace, ';' or '?'"
        )));
    }
    Ok(())
}
