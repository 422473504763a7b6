//! Automation-fingerprint masking.
//!
//! Conversational surfaces fingerprint automated visitors and degrade or
//! block them. Every fresh page gets an init script, registered before any
//! document executes, that normalizes the most commonly probed signals.

// ============================================================================
// Imports
// ============================================================================

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use tracing::debug;

use crate::error::Result;

// ============================================================================
// Init Script
// ============================================================================

/// Script injected into every new document before site code runs.
///
/// Covers `navigator.webdriver`, plugin and language lists, hardware hints,
/// WebGL vendor strings, the `chrome` runtime object, and leftover
/// automation markers on `window` and `document`.
pub const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
    Object.defineProperty(navigator, 'webdriver', {
        get: () => false,
        configurable: true
    });

    Object.defineProperty(navigator, 'plugins', {
        get: () => {
            const plugins = [
                { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
                { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
                { name: 'Native Client', filename: 'internal-nacl-plugin' }
            ];
            plugins.item = i => plugins[i] || null;
            plugins.namedItem = n => plugins.find(p => p.name === n) || null;
            return plugins;
        },
        configurable: true
    });

    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });

    Object.defineProperty(navigator, 'hardwareConcurrency', {
        get: () => 8,
        configurable: true
    });

    Object.defineProperty(navigator, 'deviceMemory', {
        get: () => 8,
        configurable: true
    });

    const patchWebgl = proto => {
        if (!proto) return;
        const orig = proto.getParameter;
        proto.getParameter = function (param) {
            if (param === 37445) return 'Intel Inc.';
            if (param === 37446) return 'Intel Iris OpenGL Engine';
            return orig.call(this, param);
        };
    };
    if (window.WebGLRenderingContext) patchWebgl(WebGLRenderingContext.prototype);
    if (window.WebGL2RenderingContext) patchWebgl(WebGL2RenderingContext.prototype);

    if (!window.chrome) window.chrome = {};
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: () => ({ onMessage: { addListener: () => {} }, postMessage: () => {}, disconnect: () => {} }),
            sendMessage: () => {}
        };
    }

    const markers = [
        '__webdriver_evaluate', '__selenium_evaluate', '__webdriver_script_fn',
        '__driver_evaluate', '__webdriver_unwrapped', '__selenium_unwrapped',
        '__fxdriver_evaluate', '__fxdriver_unwrapped', '_Selenium_IDE_Recorder',
        '_selenium', 'calledSelenium', '$cdc_asdjflasutopfhvcZLmcfl_'
    ];
    for (const marker of markers) {
        try { delete window[marker]; } catch (e) {}
        try { delete document[marker]; } catch (e) {}
    }
})();
"#;

// ============================================================================
// Injection
// ============================================================================

/// Registers the masking script on a page so it runs before every new
/// document in that page.
///
/// # Errors
///
/// Returns [`Error::Cdp`](crate::Error::Cdp) if the browser rejects the
/// registration.
pub async fn inject(page: &Page) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        STEALTH_INIT_SCRIPT,
    ))
    .await?;
    debug!("registered fingerprint-masking init script");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
