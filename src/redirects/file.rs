// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser for the line-based `_redirects` file.
//!
//! Each non-blank, non-comment line reads `from [key=value ...] to [status[!]]`.
//! A line without a status is a permanent redirect (301), matching how the
//! hosted platform reads this file.

use super::{RuleConfig, RuleError};

const FILE_DEFAULT_STATUS: u16 = 301;

/// Parse `content`. `origin` names the source in error messages.
pub fn parse_redirects(content: &str, origin: &str) -> Result<Vec<RuleConfig>, RuleError> {
    let mut rules = Vec::new();

    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let syntax = |message: String| RuleError::Syntax {
            origin: origin.to_string(),
            line: number + 1,
            message,
        };

        let mut tokens = line.split_whitespace();
        let Some(from) = tokens.next() else { continue };

        let mut conditions = Vec::new();
        let mut to = None;
        for token in tokens.by_ref() {
            if is_target(token) {
                to = Some(token);
                break;
            }
            if !token.contains('=') {
                return Err(syntax(format!("expected a target or key=value, found '{token}'")));
            }
            conditions.push(token);
        }
        let Some(to) = to else {
            return Err(syntax(format!("missing target for '{from}'")));
        };

        let mut status = FILE_DEFAULT_STATUS;
        let mut force = false;
        if let Some(token) = tokens.next() {
            let digits = match token.strip_suffix('!') {
                Some(d) => {
                    force = true;
                    d
                }
                None => token,
            };
            status = digits
                .parse()
                .map_err(|_| syntax(format!("invalid status '{token}'")))?;
        }

        let rest: Vec<&str> = tokens.collect();
        if !rest.is_empty() {
            log::warn!(
                "{}:{}: skipping rule with unsupported conditions: {}",
                origin,
                number + 1,
                rest.join(" ")
            );
            continue;
        }

        let from = if conditions.is_empty() {
            from.to_string()
        } else {
            format!("{} {}", from, conditions.join(" "))
        };

        rules.push(RuleConfig {
            from,
            to: to.to_string(),
            status,
            force,
            query: Default::default(),
        });
    }

    Ok(rules)
}

fn is_target(token: &str) -> bool {
    token.starts_with('/') || token.starts_with("http://") || token.starts_with("https://")
}
