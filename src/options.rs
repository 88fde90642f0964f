// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

use std::collections::BTreeMap;

/// Display options parsed from the snapshot's `status_options` string
///
/// The string is a space separated list of `key=value` tokens. Keys are
/// case-insensitive; a token without `=` sets its key to an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOptions {
    values: BTreeMap<String, String>,
}

impl StatusOptions {
    /// Parse an option string; `None` or an empty string yields no options
    pub fn parse(raw: Option<&str>) -> Self {
        let values = raw
            .unwrap_or_default()
            .split_whitespace()
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_lowercase(), value.to_string()),
                None => (token.to_lowercase(), String::new()),
            })
            .collect();
        Self { values }
    }

    /// Raw value of an option
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Whether the admin email address may be shown
    pub fn show_email(&self) -> bool {
        self.get("show_email") == Some("1")
    }

    /// Whether no options are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
