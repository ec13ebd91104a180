use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::session::CallSession;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}|\$([1-9])|\{(d|destination|caller|domain|context)\}").unwrap()
});

/// Values a template can refer to
pub trait TemplateSource {
    fn destination(&self) -> &str;
    fn caller(&self) -> &str;
    fn domain(&self) -> &str;
    fn context(&self) -> &str;
    fn variable(&self, name: &str) -> Option<&str>;
}

impl TemplateSource for CallSession {
    fn destination(&self) -> &str {
        CallSession::dialed(self)
    }
    fn caller(&self) -> &str {
        CallSession::caller(self)
    }
    fn domain(&self) -> &str {
        CallSession::domain(self)
    }
    fn context(&self) -> &str {
        CallSession::context(self)
    }
    fn variable(&self, name: &str) -> Option<&str> {
        CallSession::variable(self, name)
    }
}

/// Expand placeholders in an action argument.
///
/// * `{d}` / `{destination}`: the dialed extension, which follows transfers
/// * `{caller}`, `{domain}`, `{context}`
/// * `$1`..`$9`: captures of the matched rule, empty when absent
/// * `${name}`: session variable, empty when unset
pub fn expand<S: TemplateSource + ?Sized>(template: &str, source: &S, captures: &[String]) -> String {
    if !template.contains('{') && !template.contains('$') {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            if let Some(name) = caps.get(1) {
                return source.variable(name.as_str()).unwrap_or_default().to_string();
            }
            if let Some(index) = caps.get(2) {
                let n: usize = index.as_str().parse().unwrap_or(0);
                return captures.get(n.wrapping_sub(1)).cloned().unwrap_or_default();
            }
            match caps.get(3).map(|m| m.as_str()) {
                Some("d") | Some("destination") => source.destination().to_string(),
                Some("caller") => source.caller().to_string(),
                Some("domain") => source.domain().to_string(),
                Some("context") => source.context().to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}
