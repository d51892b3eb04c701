// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ANSI SGR sequences to inline-styled HTML.

use once_cell::sync::Lazy;
use regex::Regex;

static SGR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[([0-9;]*)m").expect("sgr regex"));

const PALETTE: [&str; 16] = [
    "#000", "#A00", "#0A0", "#A50", "#00A", "#A0A", "#0AA", "#AAA",
    "#555", "#F55", "#5F5", "#FF5", "#55F", "#F5F", "#5FF", "#FFF",
];

/// Wrap a string in the escape codes for red foreground text.
pub fn red(text: &str) -> String {
    format!("\x1b[31m{text}\x1b[39m")
}

/// Escape the characters HTML treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn style_for(code: u8) -> Option<String> {
    let style = match code {
        1 => "font-weight:bold".to_string(),
        3 => "font-style:italic".to_string(),
        4 => "text-decoration:underline".to_string(),
        30..=37 => format!("color:{}", PALETTE[usize::from(code - 30)]),
        90..=97 => format!("color:{}", PALETTE[usize::from(code - 90 + 8)]),
        40..=47 => format!("background-color:{}", PALETTE[usize::from(code - 40)]),
        100..=107 => format!("background-color:{}", PALETTE[usize::from(code - 100 + 8)]),
        _ => return None,
    };
    Some(style)
}

/// Convert SGR sequences to `<span style>` elements. Text outside escape
/// codes is passed through untouched.
pub fn to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open = 0usize;
    let mut last = 0;

    for caps in SGR.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let params = &caps[1];
        let codes: Vec<u8> = if params.is_empty() {
            vec![0]
        } else {
            params.split(';').filter_map(|c| c.parse().ok()).collect()
        };

        for code in codes {
            match code {
                0 => {
                    out.push_str(&"</span>".repeat(open));
                    open = 0;
                }
                22 | 23 | 24 | 39 | 49 => {
                    if open > 0 {
                        out.push_str("</span>");
                        open -= 1;
                    }
                }
                _ => {
                    if let Some(style) = style_for(code) {
                        out.push_str(&format!("<span style=\"{style}\">"));
                        open += 1;
                    }
                }
            }
        }
    }

    out.push_str(&text[last..]);
    out.push_str(&"</span>".repeat(open));
    out
}
