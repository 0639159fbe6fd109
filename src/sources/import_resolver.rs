use super::SourceSet;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot resolve import `{import_path}` requested from `{requesting_file}`")]
pub struct UnresolvedImport {
    pub import_path: String,
    pub requesting_file: String,
}

/// Builds the transitive import closure of `entries` over the submitted
/// `files`, rewriting aliased import prefixes along the way.
///
/// Resolution order per import: relative to the importing file, then the
/// longest matching alias prefix, then an exact key in the file map, then a
/// unique base-name match. The first import that resolves by none of these
/// fails the whole resolution; no partial result is returned.
pub fn resolve(
    entries: &[String],
    files: &BTreeMap<String, String>,
    aliases: &BTreeMap<String, String>,
) -> Result<SourceSet, UnresolvedImport> {
    let mut resolved = SourceSet::default();
    let mut worklist: VecDeque<String> = entries.iter().cloned().collect();
    let mut seen: BTreeSet<String> = entries.iter().cloned().collect();

    while let Some(path) = worklist.pop_front() {
        let content = match files.get(&path) {
            Some(content) => content.clone(),
            None => {
                return Err(UnresolvedImport {
                    import_path: path.clone(),
                    requesting_file: path,
                })
            }
        };

        for import in scan_imports(&content) {
            let target = resolve_import(&path, &import, files, aliases).ok_or_else(|| {
                UnresolvedImport {
                    import_path: import.clone(),
                    requesting_file: path.clone(),
                }
            })?;
            if seen.insert(target.clone()) {
                worklist.push_back(target);
            }
        }

        resolved.insert(path, content);
    }

    Ok(resolved)
}

fn resolve_import(
    importer: &str,
    import: &str,
    files: &BTreeMap<String, String>,
    aliases: &BTreeMap<String, String>,
) -> Option<String> {
    if import.starts_with("./") || import.starts_with("../") {
        let joined = join_relative(importer, import);
        if files.contains_key(&joined) {
            return Some(joined);
        }
        return base_name_match(&joined, files);
    }

    // longest alias prefix wins, so "@openzeppelin/contracts" shadows
    // a plain "@openzeppelin" entry
    let alias = aliases
        .iter()
        .filter(|(prefix, _)| import.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len());
    if let Some((prefix, replacement)) = alias {
        let rewritten = format!("{}{}", replacement, &import[prefix.len()..]);
        if files.contains_key(&rewritten) {
            return Some(rewritten);
        }
        return base_name_match(&rewritten, files);
    }

    if files.contains_key(import) {
        return Some(import.to_string());
    }

    base_name_match(import, files)
}

/// Tolerant fallback for mismatched path structure: accepts a unique file
/// whose trailing name equals the import's.
fn base_name_match(import: &str, files: &BTreeMap<String, String>) -> Option<String> {
    let base = import.rsplit('/').next()?;
    let mut candidates = files
        .keys()
        .filter(|key| key.rsplit('/').next() == Some(base));
    let found = candidates.next()?;
    if candidates.next().is_some() {
        // ambiguous, refuse to guess
        return None;
    }
    Some(found.clone())
}

/// Joins a relative import against the importing file's directory and
/// normalizes `.`/`..` segments.
fn join_relative(importer: &str, import: &str) -> String {
    let mut segments: Vec<&str> = importer.split('/').collect();
    segments.pop(); // drop the file name

    for segment in import.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Extracts import path string literals from Solidity source, skipping
/// comments and string constants. Handles all statement forms: `import "p";`,
/// `import "p" as X;`, `import * as X from "p";` and `import {A, B} from "p";`,
/// each of which contains exactly one string literal, the path.
fn scan_imports(content: &str) -> Vec<String> {
    let stripped = strip_comments(content);
    // keyword and statement-end search happens on a view with string
    // contents blanked out, so `import` or `;` inside a string constant is
    // never mistaken for syntax; paths are read from the unblanked text
    let scannable = blank_strings(&stripped);
    let mut imports = Vec::new();

    let bytes = scannable.as_bytes();
    let mut search_from = 0;
    while let Some(found) = scannable[search_from..].find("import") {
        let start = search_from + found;
        let end = start + "import".len();
        search_from = end;

        // keyword boundaries: not part of a longer identifier
        let before_ok = start == 0 || !is_ident_char(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_ident_char(bytes[end]);
        if !before_ok || !after_ok {
            continue;
        }

        let statement_end = match scannable[end..].find(';') {
            Some(pos) => end + pos,
            None => scannable.len(),
        };
        if let Some(path) = first_string_literal(&stripped[end..statement_end]) {
            imports.push(path);
        }
        search_from = statement_end;
    }

    imports
}

/// Replaces the contents of string literals with spaces, byte for byte, so
/// offsets stay aligned with the input. The quotes themselves are kept.
fn blank_strings(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in content.chars() {
        match quote {
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut out, c);
                } else if c == '\\' {
                    escaped = true;
                    push_blank(&mut out, c);
                } else if c == q {
                    quote = None;
                    out.push(c);
                } else {
                    push_blank(&mut out, c);
                }
            }
        }
    }

    out
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn first_string_literal(s: &str) -> Option<String> {
    let mut chars = s.char_indices();
    let (start, quote) = chars.find(|(_, c)| *c == '"' || *c == '\'')?;
    let rest = &s[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn strip_comments(content: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Line,
        Block,
        Str(char),
    }

    let mut out = String::with_capacity(content.len());
    let mut state = State::Code;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::Line;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::Block;
                }
                '"' | '\'' => {
                    state = State::Str(c);
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::Line => {
                if c == '\n' {
                    out.push(c);
                    state = State::Code;
                }
            }
            State::Block => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push(' ');
                    state = State::Code;
                }
            }
            State::Str(quote) => {
                out.push(c);
                if c == quote {
                    state = State::Code;
                } else if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn scans_all_import_forms() {
        let source = r#"
            // SPDX-License-Identifier: MIT
            pragma solidity ^0.8.0;

            import "./A.sol";
            import './B.sol' as B;
            import * as C from "lib/C.sol";
            import {D, E} from "@oz/D.sol";
        "#;
        assert_eq!(
            scan_imports(source),
            vec!["./A.sol", "./B.sol", "lib/C.sol", "@oz/D.sol"]
        );
    }

    #[test]
    fn skips_imports_in_comments_and_strings() {
        let source = r#"
            // import "./Commented.sol";
            /* import "./Blocked.sol"; */
            contract A {
                string constant hint = "import \"./NotReal.sol\";";
            }
            import "./Real.sol";
        "#;
        assert_eq!(scan_imports(source), vec!["./Real.sol"]);
    }

    #[test]
    fn string_constants_do_not_hide_or_invent_imports() {
        let source = r#"
            contract A {
                string constant s = "no import here; import \"./Fake.sol\";";
            }
            import "./Actual.sol";
        "#;
        assert_eq!(scan_imports(source), vec!["./Actual.sol"]);
    }

    #[test]
    fn ignores_identifiers_containing_import() {
        let source = r#"
            uint256 important = 1;
            function reimport() public {}
            import "./A.sol";
        "#;
        assert_eq!(scan_imports(source), vec!["./A.sol"]);
    }

    #[test]
    fn relative_paths_are_normalized() {
        assert_eq!(join_relative("contracts/Token.sol", "./IERC20.sol"), "contracts/IERC20.sol");
        assert_eq!(join_relative("contracts/token/A.sol", "../utils/B.sol"), "contracts/utils/B.sol");
        assert_eq!(join_relative("A.sol", "./B.sol"), "B.sol");
        assert_eq!(join_relative("a/b/c.sol", ".././//d.sol"), "a/d.sol");
    }

    #[test]
    fn resolves_transitive_closure_only() {
        let files = files(&[
            ("Token.sol", r#"import "./IERC20.sol";"#),
            ("IERC20.sol", ""),
            ("Unrelated.sol", r#"import "./Missing.sol";"#),
        ]);
        let resolved = resolve(&["Token.sol".into()], &files, &BTreeMap::new()).unwrap();
        assert_eq!(
            resolved.paths().collect::<Vec<_>>(),
            vec!["IERC20.sol", "Token.sol"]
        );
    }

    #[test]
    fn missing_import_fails_with_path_and_requester() {
        let files = files(&[("Token.sol", r#"import "./IERC20.sol";"#)]);
        let err = resolve(&["Token.sol".into()], &files, &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            UnresolvedImport {
                import_path: "./IERC20.sol".into(),
                requesting_file: "Token.sol".into(),
            }
        );
    }

    #[test]
    fn alias_prefix_is_rewritten_longest_first() {
        let files = files(&[
            ("Token.sol", r#"import "@openzeppelin/contracts/token/ERC20.sol";"#),
            ("vendor/oz/token/ERC20.sol", ""),
        ]);
        let aliases = BTreeMap::from([
            ("@openzeppelin".to_string(), "vendor".to_string()),
            ("@openzeppelin/contracts".to_string(), "vendor/oz".to_string()),
        ]);
        let resolved = resolve(&["Token.sol".into()], &files, &aliases).unwrap();
        assert!(resolved.contains("vendor/oz/token/ERC20.sol"));
    }

    #[test]
    fn base_name_fallback_requires_uniqueness() {
        let files_unique = files(&[
            ("Token.sol", r#"import "some/other/layout/IERC20.sol";"#),
            ("interfaces/IERC20.sol", ""),
        ]);
        let resolved = resolve(&["Token.sol".into()], &files_unique, &BTreeMap::new()).unwrap();
        assert!(resolved.contains("interfaces/IERC20.sol"));

        let files_ambiguous = files(&[
            ("Token.sol", r#"import "some/other/layout/IERC20.sol";"#),
            ("interfaces/IERC20.sol", ""),
            ("legacy/IERC20.sol", ""),
        ]);
        let err = resolve(&["Token.sol".into()], &files_ambiguous, &BTreeMap::new()).unwrap_err();
        assert_eq!(err.import_path, "some/other/layout/IERC20.sol");
    }

    #[test]
    fn diamond_imports_are_visited_once() {
        let files = files(&[
            ("A.sol", r#"import "./B.sol"; import "./C.sol";"#),
            ("B.sol", r#"import "./D.sol";"#),
            ("C.sol", r#"import "./D.sol";"#),
            ("D.sol", ""),
        ]);
        let resolved = resolve(&["A.sol".into()], &files, &BTreeMap::new()).unwrap();
        assert_eq!(resolved.len(), 4);
    }
}
