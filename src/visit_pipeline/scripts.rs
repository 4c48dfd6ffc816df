//! Opaque script payload builders for the pipeline's injection steps.
//!
//! Each builder threads a per-session seed into a small config object the
//! injected script reads, without carrying any concrete evasion content,
//! which is out of scope here (§2).

/// Pre-navigation stealth payload (§4.7 step 3). Real content (navigator
/// property overrides, WebGL/audio spoofing) lives wherever the deployment
/// wires its own evasion scripts in; this returns the minimal, always-safe
/// marker every visit injects before the stealth scripts proper.
#[must_use]
pub fn stealth_payload() -> &'static str {
    "window.__dispatchStealthSeed = window.__dispatchStealthSeed || crypto.getRandomValues(new Uint32Array(1))[0];"
}

/// Analytics stub injected only when a tracking id is configured (§4.7 step 7).
#[must_use]
pub fn analytics_stub(tracking_id: &str) -> String {
    format!(
        "window.__dispatchAnalytics = {{ trackingId: {tracking_id:?}, events: [] }};\n\
         window.__dispatchTrack = (name) => window.__dispatchAnalytics.events.push(name);"
    )
}

/// Post-load canvas/audio/WebGL noise injection (§4.7 step 8).
#[must_use]
pub fn post_load_noise() -> &'static str {
    "window.__dispatchNoiseSeed = window.__dispatchNoiseSeed || crypto.getRandomValues(new Uint32Array(1))[0];"
}

/// Scripted scroll used alongside the Bézier mouse path for the behavioral
/// simulation step; scrolls in a few small increments rather than jumping to
/// the bottom of the page.
#[must_use]
pub fn scroll_script() -> String {
    "(async () => {\n\
       const steps = 4 + Math.floor(Math.random() * 3);\n\
       for (let i = 0; i < steps; i++) {\n\
         window.scrollBy(0, 150 + Math.random() * 250);\n\
         await new Promise(r => setTimeout(r, 120 + Math.random() * 200));\n\
       }\n\
     })();"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_stub_embeds_tracking_id() {
        let script = analytics_stub("UA-12345");
        assert!(script.contains("UA-12345"));
    }
}
