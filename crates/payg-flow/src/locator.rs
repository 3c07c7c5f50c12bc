//! Locators for the storefront's controls.
//!
//! A locator finds elements by ARIA role plus accessible name, or by tag plus
//! visible text. The same value is compiled to page-side JavaScript for the
//! CDP backend and matched directly against the simulated storefront, so
//! both backends agree on what "matches" means.
//!
//! Accessible name is `aria-label` when present, otherwise the element's
//! rendered text, with whitespace collapsed and trimmed.

use crate::result::{FlowError, FlowResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ARIA roles the flow needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// `button`, submit inputs, `[role=button]`
    Button,
    /// `a[href]`, `[role=link]`
    Link,
    /// `li`, `[role=listitem]`
    ListItem,
}

impl Role {
    /// CSS selecting elements that carry this role implicitly or explicitly
    #[must_use]
    pub const fn css(self) -> &'static str {
        match self {
            Self::Button => {
                "button, [role=\"button\"], input[type=\"button\"], input[type=\"submit\"]"
            }
            Self::Link => "a[href], [role=\"link\"]",
            Self::ListItem => "li, [role=\"listitem\"]",
        }
    }

    /// Role name as written in ARIA
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Link => "link",
            Self::ListItem => "listitem",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a name or text is compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "value")]
pub enum TextMatch {
    /// Whole normalized text equals the value (case-sensitive)
    Exact(String),
    /// Normalized text contains the value, ignoring case
    Contains(String),
    /// Normalized text matches the regular expression
    Pattern(String),
}

impl TextMatch {
    /// Exact match
    #[must_use]
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    /// Case-insensitive substring match
    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self::Contains(value.into())
    }

    /// Regular-expression match; the pattern is validated up front
    pub fn pattern(pattern: impl Into<String>) -> FlowResult<Self> {
        let pattern = pattern.into();
        Regex::new(&pattern)
            .map_err(|e| FlowError::config(format!("invalid pattern '{pattern}': {e}")))?;
        Ok(Self::Pattern(pattern))
    }

    /// Test a raw text, normalizing it first
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let text = normalize(text);
        match self {
            Self::Exact(v) => text == normalize(v),
            Self::Contains(v) => text.to_lowercase().contains(&normalize(v).to_lowercase()),
            Self::Pattern(p) => Regex::new(p).is_ok_and(|re| re.is_match(&text)),
        }
    }

    /// JavaScript arrow function `(t) => bool` over a normalized string
    #[must_use]
    pub fn to_js_predicate(&self) -> String {
        match self {
            Self::Exact(v) => format!("(t) => t === {}", js_string(&normalize(v))),
            Self::Contains(v) => format!(
                "(t) => t.toLowerCase().includes({})",
                js_string(&normalize(v).to_lowercase())
            ),
            Self::Pattern(p) => format!("(t) => new RegExp({}).test(t)", js_string(p)),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "={v:?}"),
            Self::Contains(v) => write!(f, "~{v:?}"),
            Self::Pattern(p) => write!(f, "/{p}/"),
        }
    }
}

/// Collapse runs of whitespace and trim
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "by")]
pub enum Selector {
    /// Role plus accessible name; elements hidden from assistive tech are skipped
    Role {
        /// ARIA role
        role: Role,
        /// Accessible-name match
        name: TextMatch,
    },
    /// CSS selector filtered by visible text
    Text {
        /// Base CSS selector
        css: String,
        /// Text match
        text: TextMatch,
    },
}

/// A locator for finding elements on the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    selector: Selector,
}

const NAME_OF: &str = "(el) => ((el.getAttribute('aria-label') || el.innerText || el.textContent || '').replace(/\\s+/g, ' ').trim())";

// Out of the accessibility tree: `hidden`, `aria-hidden`, `visibility: hidden`
// (inherited) or `display: none` on the element or any ancestor.
const ARIA_VISIBLE: &str = "(el) => { if (el.hidden || el.closest('[aria-hidden=\"true\"]') !== null) { return false; } if (getComputedStyle(el).visibility === 'hidden') { return false; } for (let n = el; n; n = n.parentElement) { if (getComputedStyle(n).display === 'none') { return false; } } return true; }";

const RENDERED: &str = "(el) => { const s = getComputedStyle(el); const r = el.getBoundingClientRect(); return s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0; }";

impl Locator {
    /// Locate by role and accessible name
    #[must_use]
    pub const fn role(role: Role, name: TextMatch) -> Self {
        Self {
            selector: Selector::Role { role, name },
        }
    }

    /// Locate by CSS selector and text
    #[must_use]
    pub fn text(css: impl Into<String>, text: TextMatch) -> Self {
        Self {
            selector: Selector::Text {
                css: css.into(),
                text,
            },
        }
    }

    /// Underlying selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Test an element described by its role, tag, accessible name and text
    #[must_use]
    pub fn matches(&self, role: Option<Role>, tag: &str, name: &str, text: &str) -> bool {
        match &self.selector {
            Selector::Role { role: want, name: m } => role == Some(*want) && m.matches(name),
            Selector::Text { css, text: m } => css.eq_ignore_ascii_case(tag) && m.matches(text),
        }
    }

    /// JavaScript expression evaluating to the array of matching elements
    #[must_use]
    pub fn to_elements_query(&self) -> String {
        match &self.selector {
            Selector::Role { role, name } => format!(
                "Array.from(document.querySelectorAll({css})).filter({ARIA_VISIBLE}).filter((el) => ({pred})(({NAME_OF})(el)))",
                css = js_string(role.css()),
                pred = name.to_js_predicate(),
            ),
            Selector::Text { css, text } => format!(
                "Array.from(document.querySelectorAll({css})).filter((el) => ({pred})((el.innerText || el.textContent || '').replace(/\\s+/g, ' ').trim()))",
                css = js_string(css),
                pred = text.to_js_predicate(),
            ),
        }
    }

    /// JavaScript expression evaluating to the match count
    #[must_use]
    pub fn to_count_query(&self) -> String {
        format!("({}).length", self.to_elements_query())
    }

    /// JavaScript that clicks the `index`-th match, yielding whether it existed
    #[must_use]
    pub fn to_click_query(&self, index: usize) -> String {
        format!(
            "(() => {{ const el = ({q})[{index}]; if (!el) {{ return false; }} el.scrollIntoView({{ block: 'center' }}); el.click(); return true; }})()",
            q = self.to_elements_query(),
        )
    }

    /// JavaScript testing whether the `index`-th match is rendered
    #[must_use]
    pub fn to_visible_query(&self, index: usize) -> String {
        format!(
            "(() => {{ const el = ({q})[{index}]; return !!el && ({RENDERED})(el); }})()",
            q = self.to_elements_query(),
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Role { role, name } => write!(f, "role={role}[name{name}]"),
            Selector::Text { css, text } => write!(f, "{css}[text{text}]"),
        }
    }
}
