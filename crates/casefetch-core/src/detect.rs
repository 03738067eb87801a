//! Response classification against the portal's known markup markers.
//!
//! The portal's markup is not contractually stable, so detection works off
//! an updatable allow-list of case-insensitive substrings. Classification is
//! strictly ordered: a bad status is never inspected for markers, a CAPTCHA
//! marker out-ranks a clean marker, and a page matching neither list
//! degrades to `Unrecognized` — never to a guessed `Clean`.

use tracing::debug;

use crate::case::RawResponse;

/// Markers seen on the portal's CAPTCHA / challenge pages: the challenge
/// input field, its image-refresh control, and generic challenge wording.
const CAPTCHA_MARKERS: &[&str] = &[
    "enter captcha",
    "refresh image",
    "captcha_image",
    "captcha",
];

/// Structural markers of a valid case-result section.
const CLEAN_MARKERS: &[&str] = &["case details", "case history"];

/// Exactly one classification per raw response.
#[derive(Debug)]
pub enum Detection {
    /// A recognised result page; body is ready for extraction.
    Clean(String),
    /// The portal presented its own CAPTCHA challenge.
    RemoteCaptcha(String),
    /// Neither a result page nor a known challenge page.
    Unrecognized { body: String, reason: String },
}

/// Updatable marker allow-list for the target portal.
///
/// Markers are matched as case-insensitive substrings and are stored
/// lowercase. Swap in a new set when the portal's markup changes; pipeline
/// logic never hard-codes a marker.
#[derive(Debug, Clone)]
pub struct MarkerSet {
    pub captcha: Vec<String>,
    pub clean: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new(CAPTCHA_MARKERS, CLEAN_MARKERS)
    }
}

impl MarkerSet {
    pub fn new(captcha: &[&str], clean: &[&str]) -> Self {
        Self {
            captcha: captcha.iter().map(|m| m.to_lowercase()).collect(),
            clean: clean.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    /// Classify a raw response, consuming it.
    pub fn classify(&self, response: RawResponse) -> Detection {
        if !(200..300).contains(&response.http_status) {
            return Detection::Unrecognized {
                reason: format!("bad_status:{}", response.http_status),
                body: response.body,
            };
        }

        let haystack = response.body.to_lowercase();
        if let Some(marker) = self.captcha.iter().find(|m| haystack.contains(m.as_str())) {
            debug!(marker = %marker, "captcha marker matched");
            return Detection::RemoteCaptcha(response.body);
        }
        if let Some(marker) = self.clean.iter().find(|m| haystack.contains(m.as_str())) {
            debug!(marker = %marker, "clean marker matched");
            return Detection::Clean(response.body);
        }
        Detection::Unrecognized {
            body: response.body,
            reason: "no_known_markers".to_string(),
        }
    }
}
