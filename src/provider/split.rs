//! Body splitting for multipart SMS
//!
//! A body that fits the GSM 03.38 alphabet travels as 7-bit septets:
//! 160 per single message, 153 per part once a concatenation header is
//! needed. Anything else goes as UCS-2: 70 code units single, 67 per part.

const GSM_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

// Escaped through the extension table, two septets each
const GSM_EXTENDED: &str = "^{}\\[~]|€\u{0C}";

const GSM_SINGLE: usize = 160;
const GSM_PART: usize = 153;
const UCS2_SINGLE: usize = 70;
const UCS2_PART: usize = 67;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

fn gsm_septets(c: char) -> Option<usize> {
    if GSM_BASIC.contains(c) {
        Some(1)
    } else if GSM_EXTENDED.contains(c) {
        Some(2)
    } else {
        None
    }
}

pub fn encoding_for(body: &str) -> Encoding {
    if body.chars().all(|c| gsm_septets(c).is_some()) {
        Encoding::Gsm7
    } else {
        Encoding::Ucs2
    }
}

/// Split a body into network parts. An empty body yields no parts.
pub fn divide_message(body: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }

    match encoding_for(body) {
        Encoding::Gsm7 => split_weighted(body, GSM_SINGLE, GSM_PART, |c| {
            gsm_septets(c).unwrap_or(1)
        }),
        Encoding::Ucs2 => split_weighted(body, UCS2_SINGLE, UCS2_PART, char::len_utf16),
    }
}

// Never splits inside a character, so escapes and surrogate pairs stay whole.
fn split_weighted<F>(body: &str, single: usize, per_part: usize, weight: F) -> Vec<String>
where
    F: Fn(char) -> usize,
{
    let total: usize = body.chars().map(&weight).sum();
    if total <= single {
        return vec![body.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for c in body.chars() {
        let w = weight(c);
        if used + w > per_part {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += w;
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gsm_single_and_multipart_limits() {
        let exact = "a".repeat(160);
        assert_eq!(divide_message(&exact), vec![exact.clone()]);

        let over = "a".repeat(161);
        let parts = divide_message(&over);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 153);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts.concat(), over);
    }

    #[test]
    fn test_extended_chars_count_double() {
        assert_eq!(encoding_for("price: 5€ [ok]"), Encoding::Gsm7);

        // 80 euro signs = 160 septets, still one message
        let euros = "€".repeat(80);
        assert_eq!(divide_message(&euros).len(), 1);

        let euros = "€".repeat(81);
        let parts = divide_message(&euros);
        assert_eq!(parts.len(), 2);
        // 153 septets per part holds 76 two-septet characters
        assert_eq!(parts[0].chars().count(), 76);
    }

    #[test]
    fn test_ucs2_limits() {
        assert_eq!(encoding_for("привет"), Encoding::Ucs2);

        let exact = "ж".repeat(70);
        assert_eq!(divide_message(&exact).len(), 1);

        let over = "ж".repeat(71);
        let parts = divide_message(&over);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), 67);
        assert_eq!(parts[1].chars().count(), 4);
    }

    #[test]
    fn test_surrogate_pairs_are_not_split() {
        // each emoji is two UTF-16 units; 67 is odd so a naive split would cut one
        let body = "😀".repeat(40);
        let parts = divide_message(&body);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), 33);
        assert_eq!(parts.concat(), body);
    }

    #[test]
    fn test_empty_body_has_no_parts() {
        assert!(divide_message("").is_empty());
    }
}
