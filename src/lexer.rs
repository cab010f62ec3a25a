//! Splitting one input line into words.
//!
//! Words are separated by runs of spaces and tabs. A word that starts with `#`
//! begins a comment: it and everything after it are dropped.
//!
//! Quoting and escaping are not supported. `echo "a b"` yields the two words
//! `"a` and `b"`, and there is no way to embed a space in a word.

/// Split `line` into words, honoring `#` comments.
///
/// A trailing line terminator (`\n` or `\r\n`) is ignored. Blank input yields
/// an empty vector.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut tokens = Vec::new();
    for word in line.split([' ', '\t']).filter(|w| !w.is_empty()) {
        if word.starts_with('#') {
            break;
        }
        tokens.push(word.to_string());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_runs_of_spaces_and_tabs() {
        assert_eq!(tokenize("ls  -l\t\t/tmp "), ["ls", "-l", "/tmp"]);
    }

    #[test]
    fn comment_drops_rest_of_line() {
        assert_eq!(tokenize("get x # print it"), ["get", "x"]);
        assert_eq!(tokenize("get x #print it"), ["get", "x"]);
        assert!(tokenize("# whole line").is_empty());
    }

    #[test]
    fn hash_inside_a_word_is_literal() {
        assert_eq!(tokenize("echo a#b"), ["echo", "a#b"]);
    }

    #[test]
    fn blank_lines_are_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t  \n").is_empty());
        assert!(tokenize("\r\n").is_empty());
    }

    #[test]
    fn quotes_are_not_interpreted() {
        assert_eq!(tokenize("echo \"a b\""), ["echo", "\"a", "b\""]);
    }

    #[test]
    fn strips_line_terminator() {
        assert_eq!(tokenize("pwd\n"), ["pwd"]);
        assert_eq!(tokenize("pwd\r\n"), ["pwd"]);
    }
}
