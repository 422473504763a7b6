//! Page abstraction over the browser-control channel.
//!
//! [`SurfacePage`] is the seam between query execution and the live
//! browser: everything the executor does to a page goes through it, so
//! tests can script a surface without a browser. [`CdpSurface`] is the
//! production implementation over a chromiumoxide [`Page`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::CloseParams;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Raw Extraction Types
// ============================================================================

/// One hyperlink harvested from an answer container, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAnchor {
    /// Absolute link target.
    pub url: String,
    /// Link text, or the URL when the text is empty.
    pub title: String,
}

/// One reasoning step harvested from an answer container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStep {
    /// Step heading, e.g. `Step 2: gather sources`.
    pub header: String,
    /// Text of the element following the heading.
    pub text: String,
}

/// Raw in-page extraction result, before citation rewriting.
///
/// `text` carries placeholder tokens where anchors used to be: a private-use
/// sentinel pair wrapping the anchor's index into `anchors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtract {
    /// Answer text with anchor placeholders and block-level newlines.
    pub text: String,
    /// Anchors in first-seen document order.
    pub anchors: Vec<RawAnchor>,
    /// Reasoning steps, empty when the surface shows none.
    pub steps: Vec<RawStep>,
}

// ============================================================================
// SurfacePage Trait
// ============================================================================

/// Operations query execution performs against a page.
#[async_trait]
pub trait SurfacePage: Send + Sync {
    /// Navigates the page to a URL.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Returns the page's current URL, if it has one.
    async fn current_url(&self) -> Result<Option<String>>;

    /// Returns `true` if the selector matches at least one element.
    async fn query_exists(&self, selector: &str) -> Result<bool>;

    /// Returns how many elements the selector matches.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Returns the text content of the element at `index` among the
    /// selector's matches, or an empty string if the index is gone.
    async fn text_of(&self, selector: &str, index: usize) -> Result<String>;

    /// Clicks the first match and types text into it.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Presses Enter on the first match.
    async fn press_enter(&self, selector: &str) -> Result<()>;

    /// Clicks the first match.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Clicks every clickable element whose text matches the pattern.
    /// Returns how many were clicked.
    async fn click_text_matches(&self, pattern: &Regex) -> Result<usize>;

    /// Extracts text, anchors, and steps from the element at `index` among
    /// the selector's matches.
    async fn extract_raw(&self, selector: &str, index: usize) -> Result<RawExtract>;

    /// Closes the page.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// CdpSurface
// ============================================================================

/// [`SurfacePage`] implementation over a live browser page.
pub struct CdpSurface {
    page: Page,
    action_delay: Duration,
}

impl CdpSurface {
    /// Wraps a page, pausing `action_delay` after input actions.
    #[inline]
    #[must_use]
    pub fn new(page: Page, action_delay: Duration) -> Self {
        Self { page, action_delay }
    }

    /// Returns the underlying page.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn settle(&self) {
        if !self.action_delay.is_zero() {
            tokio::time::sleep(self.action_delay).await;
        }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T> {
        let result = self.page.evaluate(js).await?;
        result
            .into_value::<T>()
            .map_err(|e| Error::extraction(format!("evaluation result did not parse: {e}")))
    }
}

#[async_trait]
impl SurfacePage for CdpSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.page.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn query_exists(&self, selector: &str) -> Result<bool> {
        let sel = serde_json::to_string(selector)?;
        self.eval(format!("!!document.querySelector({sel})")).await
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let sel = serde_json::to_string(selector)?;
        self.eval(format!("document.querySelectorAll({sel}).length"))
            .await
    }

    async fn text_of(&self, selector: &str, index: usize) -> Result<String> {
        let sel = serde_json::to_string(selector)?;
        let js = format!(
            "(() => {{ const el = document.querySelectorAll({sel})[{index}]; \
             return el ? el.textContent : ''; }})()"
        );
        self.eval(js).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        element.type_str(text).await?;
        self.settle().await;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await?;
        element.press_key("Enter").await?;
        self.settle().await;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        self.settle().await;
        Ok(())
    }

    async fn click_text_matches(&self, pattern: &Regex) -> Result<usize> {
        // Candidate texts come out of the page; matching stays in Rust so
        // the configured pattern keeps its semantics.
        let candidates: Vec<String> = self
            .eval(String::from(
                "Array.from(document.querySelectorAll('button, [role=\"button\"], summary'))\
                 .map(el => (el.textContent || '').trim())",
            ))
            .await?;
        let matched: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, text)| pattern.is_match(text))
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            return Ok(0);
        }
        trace!(count = matched.len(), "clicking matched disclosures");
        let indexes = serde_json::to_string(&matched)?;
        let clicked: usize = self
            .eval(format!(
                "(() => {{ const els = document.querySelectorAll('button, [role=\"button\"], summary'); \
                 let n = 0; \
                 for (const i of {indexes}) {{ if (els[i]) {{ els[i].click(); n++; }} }} \
                 return n; }})()"
            ))
            .await?;
        self.settle().await;
        Ok(clicked)
    }

    async fn extract_raw(&self, selector: &str, index: usize) -> Result<RawExtract> {
        let sel = serde_json::to_string(selector)?;
        let js = format!(
            r#"(() => {{
    const el = document.querySelectorAll({sel})[{index}];
    if (!el) return null;
    const clone = el.cloneNode(true);
    const anchors = [];
    for (const a of clone.querySelectorAll('a[href]')) {{
        const url = a.href;
        const title = (a.textContent || '').trim() || url;
        const i = anchors.length;
        anchors.push({{ url, title }});
        a.replaceWith(document.createTextNode('{open}' + i + '{close}'));
    }}
    const stepRe = /^(Step|Paso|Étape|Schritt|步骤)\s*\d+/i;
    const steps = [];
    for (const h of clone.querySelectorAll('h1,h2,h3,h4,h5,h6,strong,b')) {{
        const header = (h.textContent || '').trim();
        if (!stepRe.test(header)) continue;
        const sib = h.nextElementSibling ||
            (h.parentElement && h.parentElement.nextElementSibling);
        steps.push({{ header, text: sib ? (sib.textContent || '').trim() : '' }});
    }}
    const BLOCK = new Set(['P','DIV','LI','UL','OL','PRE','H1','H2','H3','H4','H5','H6',
        'TR','BLOCKQUOTE','SECTION','ARTICLE','TABLE']);
    const textOf = node => {{
        let out = '';
        for (const child of node.childNodes) {{
            if (child.nodeType === Node.TEXT_NODE) {{
                out += child.textContent;
            }} else if (child.nodeType === Node.ELEMENT_NODE) {{
                if (child.tagName === 'BR') {{ out += '\n'; continue; }}
                out += textOf(child);
                if (BLOCK.has(child.tagName)) out += '\n';
            }}
        }}
        return out;
    }};
    return {{ text: textOf(clone), anchors, steps }};
}})()"#,
            open = crate::query::extract::ANCHOR_OPEN,
            close = crate::query::extract::ANCHOR_CLOSE,
        );
        let raw: Option<RawExtract> = self.eval(js).await?;
        raw.ok_or_else(|| {
            Error::extraction(format!("answer container {index} no longer present"))
        })
    }

    async fn close(&self) -> Result<()> {
        self.page.execute(CloseParams {}).await?;
        Ok(())
    }
}

// ============================================================================
// Test Fake
// ============================================================================

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{HashMap, HashSet, VecDeque};

    use parking_lot::Mutex;

    use super::*;

    /// Scripted in-memory surface for executor and pool tests.
    ///
    /// `counts` and `texts` are scripts consumed one read at a time; the
    /// last value repeats once a script runs dry.
    #[derive(Default)]
    pub(crate) struct FakeSurface {
        pub url: Mutex<Option<String>>,
        pub existing: Mutex<HashSet<String>>,
        pub probes: Mutex<Vec<String>>,
        pub counts: Mutex<HashMap<String, VecDeque<usize>>>,
        pub texts: Mutex<VecDeque<String>>,
        pub raw: Mutex<Option<RawExtract>>,
        pub reads: Mutex<Vec<usize>>,
        pub extracts: Mutex<Vec<usize>>,
        pub fills: Mutex<Vec<(String, String)>>,
        pub enters: Mutex<Vec<String>>,
        pub clicks: Mutex<Vec<String>>,
        pub navigations: Mutex<Vec<String>>,
        pub text_clicks: Mutex<Vec<String>>,
        pub closed: Mutex<bool>,
    }

    impl FakeSurface {
        pub(crate) fn with_url(url: &str) -> Self {
            let fake = Self::default();
            *fake.url.lock() = Some(url.to_string());
            fake
        }

        pub(crate) fn add_selector(&self, selector: &str) {
            self.existing.lock().insert(selector.to_string());
        }

        pub(crate) fn script_counts(&self, selector: &str, values: &[usize]) {
            self.counts
                .lock()
                .insert(selector.to_string(), values.iter().copied().collect());
        }

        pub(crate) fn script_texts(&self, values: &[&str]) {
            *self.texts.lock() = values.iter().map(|s| (*s).to_string()).collect();
        }

        fn next_scripted(queue: &mut VecDeque<usize>) -> usize {
            if queue.len() > 1 {
                queue.pop_front().unwrap_or(0)
            } else {
                queue.front().copied().unwrap_or(0)
            }
        }
    }

    #[async_trait]
    impl SurfacePage for FakeSurface {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.navigations.lock().push(url.to_string());
            *self.url.lock() = Some(url.to_string());
            Ok(())
        }

        async fn current_url(&self) -> Result<Option<String>> {
            Ok(self.url.lock().clone())
        }

        async fn query_exists(&self, selector: &str) -> Result<bool> {
            self.probes.lock().push(selector.to_string());
            Ok(self.existing.lock().contains(selector))
        }

        async fn count(&self, selector: &str) -> Result<usize> {
            let mut counts = self.counts.lock();
            match counts.get_mut(selector) {
                Some(queue) => Ok(Self::next_scripted(queue)),
                None => Ok(0),
            }
        }

        async fn text_of(&self, _selector: &str, index: usize) -> Result<String> {
            self.reads.lock().push(index);
            let mut texts = self.texts.lock();
            if texts.len() > 1 {
                Ok(texts.pop_front().unwrap_or_default())
            } else {
                Ok(texts.front().cloned().unwrap_or_default())
            }
        }

        async fn fill(&self, selector: &str, text: &str) -> Result<()> {
            self.fills
                .lock()
                .push((selector.to_string(), text.to_string()));
            Ok(())
        }

        async fn press_enter(&self, selector: &str) -> Result<()> {
            self.enters.lock().push(selector.to_string());
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<()> {
            self.clicks.lock().push(selector.to_string());
            Ok(())
        }

        async fn click_text_matches(&self, pattern: &Regex) -> Result<usize> {
            self.text_clicks.lock().push(pattern.as_str().to_string());
            Ok(0)
        }

        async fn extract_raw(&self, _selector: &str, index: usize) -> Result<RawExtract> {
            self.extracts.lock().push(index);
            self.raw
                .lock()
                .clone()
                .ok_or_else(|| Error::extraction("no scripted extraction"))
        }

        async fn close(&self) -> Result<()> {
            *self.closed.lock() = true;
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
