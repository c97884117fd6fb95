//! Plain-text helpers: whitespace cleanup, contact extraction, slugs.

use std::sync::LazyLock;

use regex::Regex;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern:?}: {e}"))
}

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| regex(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"));

/// Collapses whitespace runs to a single space and trims. With
/// `preserve_newlines`, a run containing a line break becomes one `\n`
/// instead of a space.
pub fn clean_text(text: &str, preserve_newlines: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Option<char> = None;
    for ch in text.chars() {
        if ch.is_whitespace() {
            let keep = if preserve_newlines && (ch == '\n' || ch == '\r') {
                '\n'
            } else {
                ' '
            };
            pending = match pending {
                Some('\n') => Some('\n'),
                _ => Some(keep),
            };
        } else {
            if let Some(ws) = pending.take() {
                if !out.is_empty() {
                    out.push(ws);
                }
            }
            out.push(ch);
        }
    }
    out
}

/// Phone-number-looking runs (`+1 555-123-4567`, `(555) 123-4567`,
/// `0102030405`), in order of appearance.
pub fn extract_phone_numbers(text: &str) -> Vec<String> {
    let numbers: Vec<String> = PHONE.find_iter(text).map(|m| m.as_str().to_string()).collect();
    log::debug!("Extracted {} phone numbers from text", numbers.len());
    numbers
}

pub fn extract_emails(text: &str) -> Vec<String> {
    let emails: Vec<String> = EMAIL.find_iter(text).map(|m| m.as_str().to_string()).collect();
    log::debug!("Extracted {} emails from text", emails.len());
    emails
}

/// Lowercase ASCII slug: Latin accents folded, every other run of
/// non-alphanumerics turned into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut dash = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = fold(ch);
        if !ch.is_ascii_alphanumeric() && folded.is_empty() {
            dash = true;
            continue;
        }
        if dash && !slug.is_empty() {
            slug.push('-');
        }
        dash = false;
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else {
            slug.push_str(folded);
        }
    }
    slug
}

/// ASCII spelling of a lowercase Latin letter, empty when there is none.
fn fold(ch: char) -> &'static str {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_whitespace() {
        assert_eq!(clean_text("  a \t b\n\nc  ", false), "a b c");
        assert_eq!(clean_text("  a \t b\n\nc  ", true), "a b\nc");
        assert_eq!(clean_text("", false), "");
    }

    #[test]
    fn finds_phone_numbers() {
        let text = "Call +1 555-123-4567 or (555) 123-4567, fax 0102030405.";
        assert_eq!(
            extract_phone_numbers(text),
            vec!["+1 555-123-4567", "(555) 123-4567", "0102030405"]
        );
        assert!(extract_phone_numbers("no digits here, 12 34").is_empty());
    }

    #[test]
    fn finds_emails() {
        let text = "Écrire à contact@soleil-sarl.fr, ou info@x.org.";
        assert_eq!(extract_emails(text), vec!["contact@soleil-sarl.fr", "info@x.org"]);
        assert!(extract_emails("user@localhost").is_empty());
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Pompe à Chaleur"), "pompe-a-chaleur");
        assert_eq!(slugify("  L'Œuvre -- Énergie 2024! "), "l-oeuvre-energie-2024");
        assert_eq!(slugify("***"), "");
    }
}
