//! Left/right swap for instructions shown over a mirrored preview.
//!
//! The service words directions in the camera's frame of reference while the
//! user sees a mirrored feed, so "left" and "right" trade places. Every other
//! character is left untouched, which keeps the swap an involution.

const PAIRS: &[(&str, &str)] = &[
    ("left", "right"),
    ("Left", "Right"),
    ("LEFT", "RIGHT"),
    ("right", "left"),
    ("Right", "Left"),
    ("RIGHT", "LEFT"),
];

pub fn mirror_directions(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    let mut rest = text;
    let mut prev_alpha = false;

    while let Some(ch) = rest.chars().next() {
        if !prev_alpha {
            if let Some((from, to)) = whole_word_match(rest) {
                out.push_str(to);
                rest = &rest[from.len()..];
                prev_alpha = true;
                continue;
            }
        }
        out.push(ch);
        prev_alpha = ch.is_alphabetic();
        rest = &rest[ch.len_utf8()..];
    }

    out
}

/// Matches a direction word at the start of `text` that is not followed by
/// another letter. Mixed-case spellings are left alone.
fn whole_word_match(text: &str) -> Option<(&'static str, &'static str)> {
    PAIRS.iter().copied().find(|(from, _)| {
        text.starts_with(from)
            && !text[from.len()..]
                .chars()
                .next()
                .map(char::is_alphabetic)
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn swaps_direction_words() {
        assert_eq!(mirror_directions("Look Left"), "Look Right");
        assert_eq!(mirror_directions("Look Right"), "Look Left");
        assert_eq!(mirror_directions("turn your head left"), "turn your head right");
        assert_eq!(mirror_directions("TILT RIGHT"), "TILT LEFT");
    }

    #[test]
    fn leaves_other_instructions_alone() {
        assert_eq!(mirror_directions("Blink"), "Blink");
        assert_eq!(mirror_directions("Open your mouth"), "Open your mouth");
        assert_eq!(mirror_directions(""), "");
        assert_eq!(mirror_directions("Keep your eyes bright"), "Keep your eyes bright");
        assert_eq!(mirror_directions("leftover"), "leftover");
    }

    #[test]
    fn look_left_and_right_form_an_involution() {
        for text in ["Look Left", "Look Right"] {
            assert_ne!(mirror_directions(text), text);
            assert_eq!(mirror_directions(&mirror_directions(text)), text);
        }
    }

    proptest! {
        #[test]
        fn mirroring_twice_is_identity(text in "[a-zA-Z ,.éü]{0,40}") {
            prop_assert_eq!(mirror_directions(&mirror_directions(&text)), text);
        }

        #[test]
        fn text_without_directions_is_unchanged(text in "[a-dA-Dm-pM-P ]{0,30}") {
            prop_assert_eq!(mirror_directions(&text), text);
        }
    }
}
