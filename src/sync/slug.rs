//! Heading to file-stem normalization.

/// Stem used when a heading normalizes to nothing.
pub const DEFAULT_SLUG: &str = "untitled";

/// Longest stem produced, in characters.
const MAX_SLUG_CHARS: usize = 80;

/// Characters stripped from the start of a heading before normalizing.
const MARKER_CHARS: &[char] = &['#', '-', '*', '+', '>', '=', '`', '~', '_', '[', ']'];

/// Derive a filesystem-safe stem from a heading line.
///
/// ```
/// assert_eq!(gitnotes::sync::slugify("# Abc  Def!"), "abc_def");
/// assert_eq!(gitnotes::sync::slugify("   "), "untitled");
/// ```
#[must_use]
pub fn slugify(heading: &str) -> String {
    let trimmed = heading
        .trim()
        .trim_start_matches(|c: char| MARKER_CHARS.contains(&c) || c.is_whitespace());

    let mut slug = String::with_capacity(trimmed.len());
    let mut pending_sep = false;
    let mut chars = 0;
    for c in trimmed.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
                chars += 1;
            }
            pending_sep = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
                chars += 1;
            }
            if chars >= MAX_SLUG_CHARS {
                break;
            }
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

/// Split `abc_3` into `("abc", Some(3))`. Suffixes below 2 are not treated as
/// collision suffixes.
#[must_use]
pub fn split_suffix(stem: &str) -> (&str, Option<u64>) {
    if let Some((base, num)) = stem.rsplit_once('_')
        && !base.is_empty()
        && !num.is_empty()
        && num.bytes().all(|b| b.is_ascii_digit())
        && !num.starts_with('0')
        && let Ok(n) = num.parse::<u64>()
        && n >= 2
    {
        return (base, Some(n));
    }
    (stem, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_headings() {
        assert_eq!(slugify("# abc"), "abc");
        assert_eq!(slugify("# abc def"), "abc_def");
        assert_eq!(slugify("## Hello,   World!!"), "hello_world");
        assert_eq!(slugify("- [ ] buy milk"), "buy_milk");
        assert_eq!(slugify("> quoted"), "quoted");
        assert_eq!(slugify("__init__"), "init");
        assert_eq!(slugify("Crème Brûlée"), "crème_brûlée");
    }

    #[test]
    fn test_slugify_falls_back_to_default() {
        assert_eq!(slugify(""), DEFAULT_SLUG);
        assert_eq!(slugify("###"), DEFAULT_SLUG);
        assert_eq!(slugify("# !!!"), DEFAULT_SLUG);
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(slugify(&long).chars().count(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_split_suffix() {
        assert_eq!(split_suffix("abc_2"), ("abc", Some(2)));
        assert_eq!(split_suffix("abc_def"), ("abc_def", None));
        assert_eq!(split_suffix("abc_1"), ("abc_1", None));
        assert_eq!(split_suffix("abc_02"), ("abc_02", None));
        assert_eq!(split_suffix("_5"), ("_5", None));
        assert_eq!(split_suffix("todo_4294967296"), ("todo", Some(4_294_967_296)));
        assert_eq!(split_suffix("todo_99999999999999999999"), ("todo_99999999999999999999", None));
    }
}
