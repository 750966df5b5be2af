//! Keyboard event derivation and dispatch over the protocol channel.
//!
//! Hostile rich-text editors (DraftJS, ProseMirror, TipTap, Slate, Quill)
//! reject synthetic events, so text is replayed as raw
//! `Input.dispatchKeyEvent` commands — down, char, up per unit — which the
//! browser delivers with `isTrusted: true`. Newlines become a dedicated
//! Enter unit rather than a literal `\n` character: editors distinguish
//! Enter-key semantics (paragraph break) from literal newline characters
//! (soft break).
//!
//! The full keystroke sequence is derived *before* anything is dispatched,
//! so unsupported input fails the operation up front instead of leaving a
//! half-typed editor behind.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::cdp::CdpSession;
use crate::error::{BridgeError, BridgeResult};

/// CDP modifier bitmask values.
pub const MODIFIER_ALT: u8 = 1;
/// Control key bit.
pub const MODIFIER_CTRL: u8 = 2;
/// Meta / Command key bit.
pub const MODIFIER_META: u8 = 4;
/// Shift key bit.
pub const MODIFIER_SHIFT: u8 = 8;

/// Characters produced while holding Shift on a US layout.
const SHIFTED_PUNCTUATION: &str = "!@#$%^&*()_+{}|:\"<>?~";

/// US-layout DOM `code` and virtual-key mapping for punctuation and space.
/// Shifted and unshifted characters on the same physical key share an entry.
static PUNCTUATION_KEYS: Lazy<HashMap<char, (&'static str, i64)>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let mut both = |a: char, b: char, code: &'static str, vk: i64| {
        m.insert(a, (code, vk));
        m.insert(b, (code, vk));
    };
    both('`', '~', "Backquote", 192);
    both('-', '_', "Minus", 189);
    both('=', '+', "Equal", 187);
    both('[', '{', "BracketLeft", 219);
    both(']', '}', "BracketRight", 221);
    both('\\', '|', "Backslash", 220);
    both(';', ':', "Semicolon", 186);
    both('\'', '"', "Quote", 222);
    both(',', '<', "Comma", 188);
    both('.', '>', "Period", 190);
    both('/', '?', "Slash", 191);
    m.insert(' ', ("Space", 32));
    // Shifted digit symbols live on the digit keys.
    for (sym, digit) in [
        ('!', '1'),
        ('@', '2'),
        ('#', '3'),
        ('$', '4'),
        ('%', '5'),
        ('^', '6'),
        ('&', '7'),
        ('*', '8'),
        ('(', '9'),
        (')', '0'),
    ] {
        m.insert(sym, digit_key(digit));
    }
    m
});

fn digit_key(digit: char) -> (&'static str, i64) {
    let code = match digit {
        '0' => "Digit0",
        '1' => "Digit1",
        '2' => "Digit2",
        '3' => "Digit3",
        '4' => "Digit4",
        '5' => "Digit5",
        '6' => "Digit6",
        '7' => "Digit7",
        '8' => "Digit8",
        '9' => "Digit9",
        _ => "",
    };
    (code, digit as i64)
}

/// How a stroke's down event is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeKind {
    /// Printable character: `keyDown` + `char` + `keyUp`.
    Char,
    /// Editing key (Enter, Tab): `rawKeyDown` (+ `char`) + `keyUp`.
    Key,
}

/// One down/char/up unit for a single input character or control key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    /// DOM `key` value.
    pub key: String,
    /// DOM `code` value (physical key); empty when unknown.
    pub code: String,
    /// Unicode payload for the `char` event, if one is emitted.
    pub text: Option<String>,
    /// Windows virtual key code.
    pub virtual_key_code: i64,
    /// CDP modifier bitmask.
    pub modifiers: u8,
    /// Wire framing for this stroke.
    pub kind: StrokeKind,
}

impl KeyStroke {
    fn enter() -> Self {
        Self {
            key: "Enter".to_string(),
            code: "Enter".to_string(),
            text: Some("\r".to_string()),
            virtual_key_code: 13,
            modifiers: 0,
            kind: StrokeKind::Key,
        }
    }

    fn tab() -> Self {
        Self {
            key: "Tab".to_string(),
            code: "Tab".to_string(),
            text: Some("\t".to_string()),
            virtual_key_code: 9,
            modifiers: 0,
            kind: StrokeKind::Key,
        }
    }

    fn printable_ascii(c: char) -> Self {
        let shifted = c.is_ascii_uppercase() || SHIFTED_PUNCTUATION.contains(c);
        let (code, vk) = if c.is_ascii_alphabetic() {
            let upper = c.to_ascii_uppercase();
            (format!("Key{upper}"), upper as i64)
        } else if c.is_ascii_digit() {
            let (code, vk) = digit_key(c);
            (code.to_string(), vk)
        } else {
            let (code, vk) = PUNCTUATION_KEYS.get(&c).copied().unwrap_or(("", 0));
            (code.to_string(), vk)
        };

        Self {
            key: c.to_string(),
            code,
            text: Some(c.to_string()),
            virtual_key_code: vk,
            modifiers: if shifted { MODIFIER_SHIFT } else { 0 },
            kind: StrokeKind::Char,
        }
    }

    /// Non-ASCII character within the basic multilingual plane. The browser
    /// inserts it from the `char` event's text payload; there is no
    /// meaningful physical key to name.
    fn bmp(c: char) -> Self {
        Self {
            key: c.to_string(),
            code: String::new(),
            text: Some(c.to_string()),
            virtual_key_code: 0,
            modifiers: 0,
            kind: StrokeKind::Char,
        }
    }

    /// Whether this stroke is a newline-boundary Enter unit.
    pub fn is_enter(&self) -> bool {
        self.key == "Enter"
    }
}

/// Derives the ordered keystroke sequence for `text`.
///
/// Deterministic: the same text always yields the same sequence. Newline
/// boundaries (`\n`, `\r`, `\r\n` — one boundary each) become Enter units.
/// Printable ASCII gets full key/code/virtual-key/shift mapping; other
/// single-code-unit characters are carried by their text payload alone.
///
/// Astral-plane characters (above U+FFFF, e.g. emoji) would need surrogate
/// handling the event stream cannot express faithfully, and control
/// characters other than tab have no keystroke equivalent — both fail with
/// [`BridgeError::UnsupportedCharacter`] rather than typing something
/// wrong.
pub fn keystrokes(text: &str) -> BridgeResult<Vec<KeyStroke>> {
    let mut strokes = Vec::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '\r' => {
                // CRLF is one boundary.
                if matches!(chars.peek(), Some((_, '\n'))) {
                    chars.next();
                }
                strokes.push(KeyStroke::enter());
            }
            '\n' => strokes.push(KeyStroke::enter()),
            '\t' => strokes.push(KeyStroke::tab()),
            c if c.is_ascii_control() => {
                return Err(BridgeError::UnsupportedCharacter { ch: c, index });
            }
            c if c.is_ascii() => strokes.push(KeyStroke::printable_ascii(c)),
            c if (c as u32) <= 0xFFFF => strokes.push(KeyStroke::bmp(c)),
            c => return Err(BridgeError::UnsupportedCharacter { ch: c, index }),
        }
    }

    Ok(strokes)
}

/// Summary of one completed typing run.
#[derive(Debug, Clone, Serialize)]
pub struct TypeOutcome {
    /// Keystroke units dispatched in total.
    pub units: usize,
    /// Non-Enter units (one per typed character).
    pub chars: usize,
    /// Enter units (one per newline boundary).
    pub newlines: usize,
    /// Wall-clock time spent dispatching.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Dispatches keystrokes over one session with inter-key pacing.
pub struct Keyboard<'a> {
    session: &'a CdpSession,
    key_delay: Duration,
    newline_delay: Duration,
}

impl<'a> Keyboard<'a> {
    /// Creates a dispatcher bound to the session.
    ///
    /// `key_delay` paces character units; `newline_delay` is the longer
    /// pause after Enter and after the clear sequence, giving editors time
    /// to finish block creation.
    pub fn new(session: &'a CdpSession, key_delay: Duration, newline_delay: Duration) -> Self {
        Self {
            session,
            key_delay,
            newline_delay,
        }
    }

    /// Types `text` as a strictly ordered sequence of trusted key events.
    ///
    /// Keystrokes are never parallelized: the protocol channel guarantees
    /// in-order delivery on one connection, and that ordering is the whole
    /// point. Does not verify that the text landed — that belongs to the
    /// orchestrating caller.
    pub async fn type_text(&self, text: &str) -> BridgeResult<TypeOutcome> {
        let strokes = keystrokes(text)?;
        let started = Instant::now();
        let mut newlines = 0usize;

        for stroke in &strokes {
            self.dispatch(stroke).await?;
            if stroke.is_enter() {
                newlines += 1;
                tokio::time::sleep(self.newline_delay).await;
            } else {
                tokio::time::sleep(self.key_delay).await;
            }
        }

        let outcome = TypeOutcome {
            units: strokes.len(),
            chars: strokes.len() - newlines,
            newlines,
            elapsed: started.elapsed(),
        };
        debug!(
            units = outcome.units,
            newlines = outcome.newlines,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "typed text"
        );
        Ok(outcome)
    }

    /// Empties the focused editable region through the trusted-event path:
    /// select-all followed by Backspace. Direct DOM mutation is exactly
    /// what hostile editors reject, so clearing must type like a human too.
    pub async fn select_all_and_delete(&self) -> BridgeResult<()> {
        for event_type in ["keyDown", "keyUp"] {
            self.session
                .send(
                    "Input.dispatchKeyEvent",
                    json!({
                        "type": event_type,
                        "key": "a",
                        "code": "KeyA",
                        "windowsVirtualKeyCode": 65,
                        "nativeVirtualKeyCode": 65,
                        "modifiers": MODIFIER_META,
                    }),
                )
                .await?;
        }
        tokio::time::sleep(self.newline_delay).await;

        for event_type in ["rawKeyDown", "keyUp"] {
            self.session
                .send(
                    "Input.dispatchKeyEvent",
                    json!({
                        "type": event_type,
                        "key": "Backspace",
                        "code": "Backspace",
                        "windowsVirtualKeyCode": 8,
                        "nativeVirtualKeyCode": 8,
                    }),
                )
                .await?;
        }
        tokio::time::sleep(self.newline_delay).await;

        debug!("cleared focused element");
        Ok(())
    }

    /// Sends the down/char/up triple for one stroke.
    async fn dispatch(&self, stroke: &KeyStroke) -> BridgeResult<()> {
        let down = match stroke.kind {
            StrokeKind::Char => "keyDown",
            StrokeKind::Key => "rawKeyDown",
        };

        for event_type in [down, "char", "keyUp"] {
            if event_type == "char" && stroke.text.is_none() {
                continue;
            }

            let mut params = json!({
                "type": event_type,
                "key": stroke.key,
                "code": stroke.code,
                "windowsVirtualKeyCode": stroke.virtual_key_code,
                "nativeVirtualKeyCode": stroke.virtual_key_code,
                "modifiers": stroke.modifiers,
            });
            // Character strokes carry their payload on every event, the way
            // real hardware input reports; editing keys only on `char`.
            match stroke.kind {
                StrokeKind::Char => params["text"] = json!(stroke.text),
                StrokeKind::Key => {
                    if event_type == "char" {
                        params["text"] = json!(stroke.text);
                    }
                }
            }

            self.session.send("Input.dispatchKeyEvent", params).await?;
        }

        Ok(())
    }
}

/// Converts literal `\n` escape sequences (as they arrive from shells and
/// JSON-free callers) into real newlines. Applied by the CLI and HTTP
/// layers before the request is built; the request text itself is never
/// mutated afterwards.
pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_counts_match_spec_scenario() {
        // "Hi\nThere" -> H, i, Enter, T, h, e, r, e
        let strokes = keystrokes("Hi\nThere").unwrap();
        assert_eq!(strokes.len(), 8);
        assert_eq!(strokes.iter().filter(|s| s.is_enter()).count(), 1);
        assert!(strokes[2].is_enter());

        let keys: Vec<&str> = strokes.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["H", "i", "Enter", "T", "h", "e", "r", "e"]);
    }

    #[test]
    fn test_counts_for_printable_ascii_with_newlines() {
        let text = "line one\nline two\nend";
        let strokes = keystrokes(text).unwrap();

        let enters = strokes.iter().filter(|s| s.is_enter()).count();
        let others = strokes.len() - enters;
        let newline_chars = text.chars().filter(|&c| c == '\n').count();
        let other_chars = text.chars().filter(|&c| c != '\n').count();

        assert_eq!(enters, newline_chars);
        assert_eq!(others, other_chars);
    }

    #[test]
    fn test_crlf_is_one_boundary() {
        let strokes = keystrokes("a\r\nb").unwrap();
        assert_eq!(strokes.len(), 3);
        assert!(strokes[1].is_enter());

        // Bare CR also counts as a boundary.
        let strokes = keystrokes("a\rb").unwrap();
        assert_eq!(strokes.len(), 3);
        assert!(strokes[1].is_enter());
    }

    #[test]
    fn test_shift_detection() {
        let strokes = keystrokes("aA1!").unwrap();
        assert_eq!(strokes[0].modifiers, 0);
        assert_eq!(strokes[1].modifiers, MODIFIER_SHIFT);
        assert_eq!(strokes[2].modifiers, 0);
        assert_eq!(strokes[3].modifiers, MODIFIER_SHIFT);
    }

    #[test]
    fn test_key_code_mapping() {
        let strokes = keystrokes("a5;! ").unwrap();

        assert_eq!(strokes[0].code, "KeyA");
        assert_eq!(strokes[0].virtual_key_code, 65);

        assert_eq!(strokes[1].code, "Digit5");
        assert_eq!(strokes[1].virtual_key_code, '5' as i64);

        assert_eq!(strokes[2].code, "Semicolon");
        assert_eq!(strokes[2].virtual_key_code, 186);

        // '!' sits on the 1 key.
        assert_eq!(strokes[3].code, "Digit1");
        assert_eq!(strokes[3].virtual_key_code, '1' as i64);

        assert_eq!(strokes[4].code, "Space");
    }

    #[test]
    fn test_tab_is_an_editing_key() {
        let strokes = keystrokes("\t").unwrap();
        assert_eq!(strokes[0].key, "Tab");
        assert_eq!(strokes[0].kind, StrokeKind::Key);
        assert_eq!(strokes[0].text.as_deref(), Some("\t"));
    }

    #[test]
    fn test_enter_carries_carriage_return_payload() {
        let strokes = keystrokes("\n").unwrap();
        assert_eq!(strokes[0].text.as_deref(), Some("\r"));
        assert_eq!(strokes[0].virtual_key_code, 13);
        assert_eq!(strokes[0].kind, StrokeKind::Key);
    }

    #[test]
    fn test_bmp_characters_ride_the_text_payload() {
        let strokes = keystrokes("café").unwrap();
        assert_eq!(strokes.len(), 4);
        assert_eq!(strokes[3].key, "é");
        assert_eq!(strokes[3].code, "");
        assert_eq!(strokes[3].text.as_deref(), Some("é"));
    }

    #[test]
    fn test_astral_characters_are_rejected_up_front() {
        let err = keystrokes("ok 🎉").unwrap_err();
        match err {
            BridgeError::UnsupportedCharacter { ch, index } => {
                assert_eq!(ch, '🎉');
                assert_eq!(index, 3);
            }
            other => panic!("expected UnsupportedCharacter, got {other:?}"),
        }
    }

    #[test]
    fn test_control_characters_are_rejected() {
        assert!(keystrokes("a\x08b").unwrap_err().kind() == "unsupported_character");
        assert!(keystrokes("a\x1bb").unwrap_err().kind() == "unsupported_character");
    }

    #[test]
    fn test_empty_text_yields_no_strokes() {
        assert!(keystrokes("").unwrap().is_empty());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = keystrokes("Mixed CASE, punct! And 123.").unwrap();
        let b = keystrokes("Mixed CASE, punct! And 123.").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unescape_newlines() {
        assert_eq!(unescape_newlines("a\\nb"), "a\nb");
        assert_eq!(unescape_newlines("plain"), "plain");
    }
}
