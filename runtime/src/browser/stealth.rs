//! Automation-signal masking injected into every new document.

/// Patches the webdriver flag, plugins, languages, `chrome.runtime` and the
/// notifications permission query.
pub const STEALTH_SCRIPT: &str = r#"
(() => {
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true,
    });

    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
        configurable: true,
    });

    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true,
    });

    window.chrome = window.chrome || {};
    window.chrome.runtime = window.chrome.runtime || {
        connect: function() {},
        sendMessage: function() {},
    };

    if (window.navigator.permissions && window.navigator.permissions.query) {
        const query = window.navigator.permissions.query.bind(window.navigator.permissions);
        window.navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : query(parameters);
    }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_masks_expected_signals() {
        for needle in ["'webdriver'", "'plugins'", "'languages'", "chrome.runtime", "'notifications'"] {
            assert!(STEALTH_SCRIPT.contains(needle), "missing {needle}");
        }
    }
}
