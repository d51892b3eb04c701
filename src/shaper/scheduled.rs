// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Explanation page for scheduled functions invoked over HTTP.

use serde_json::Value;

use super::{ansi, parse_status};
use crate::core::{DevRequest, DevResponse};
use crate::functions::InvocationResult;
use crate::functions::schedule::SCHEDULER_USER_AGENT;

const STYLESHEET: &str =
    "<link rel=\"stylesheet\" href=\"https://cdn.jsdelivr.net/npm/water.css@2/out/water.css\">\n\n";

/// Key added by the local runtime rather than the function.
const RUNTIME_KEY: &str = "level";

struct Page {
    html: bool,
    body: String,
}

impl Page {
    fn paragraph(&mut self, text: &str) {
        let text = text.trim();
        if self.html {
            self.body.push_str(&ansi::to_html(&format!("<p>{text}</p>")));
        } else {
            let plain = text
                .replace("<pre><code>", "```\n")
                .replace("</code></pre>", "\n```")
                .replace("<code>", "`")
                .replace("</code>", "`");
            self.body.push_str(&plain);
            self.body.push_str("\n\n");
        }
    }
}

/// Build the help page for a scheduled function hit at `request.path`.
pub fn help_response(request: &DevRequest, result: &InvocationResult) -> DevResponse {
    let mut page = Page {
        html: request.accepts("text/html"),
        body: String::new(),
    };

    let from_scheduler =
        request.header(hyper::header::USER_AGENT) == Some(SCHEDULER_USER_AGENT);
    if !from_scheduler {
        let path = if page.html {
            ansi::escape_html(&request.path)
        } else {
            request.path.clone()
        };
        page.paragraph(&format!(
            "You performed an HTTP request to <code>{path}</code>, which is a scheduled function.\n\
             You can do this to test your functions locally, but it won't work in production."
        ));
    }

    match result {
        Err(error) => {
            let formatted = ansi::red(&format!("{}: {}", error.error_type, error.message));
            let formatted = if page.html {
                ansi::escape_html(&formatted)
            } else {
                formatted
            };
            page.paragraph(&format!(
                "There was an error during execution of your scheduled function:\n\n\
                 <pre><code>{formatted}</code></pre>"
            ));
        }
        Ok(Value::Object(object)) => {
            let status = object.get("statusCode").and_then(parse_status);
            if let Some(status) = status.filter(|s| *s >= 500) {
                page.paragraph(&format!(
                    "Your function returned a status code of <code>{status}</code>.\n\
                     At the moment, Netlify does nothing about that. \
                     In the future, there might be a retry mechanism based on this."
                ));
            }

            let ignored: Vec<String> = object
                .keys()
                .filter(|k| k.as_str() != "statusCode" && k.as_str() != RUNTIME_KEY)
                .map(|k| format!("<code>{k}</code>"))
                .collect();
            if !ignored.is_empty() {
                page.paragraph(&format!(
                    "Your function returned {}. Is this an accident? It won't be interpreted by Netlify.",
                    ignored.join(", ")
                ));
            }
        }
        Ok(_) => {}
    }

    let status = if result.is_err() { 500 } else { 200 };
    if page.html {
        DevResponse::html(status, format!("{STYLESHEET}{}", page.body))
    } else {
        DevResponse::text(status, page.body)
    }
}
