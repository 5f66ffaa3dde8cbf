//! Policy DSL line parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ line loop (skip blanks and `#` comments)
//!          ├─ `@purpose:` → quoted string
//!          ├─ `@graph:`   → node names joined by `->`
//!          └─ `name: kind { key: "v", key2: ["a","b"] }` → OperatorDecl

use std::collections::BTreeMap;

use crate::{
  OperatorDecl, PolicyDocument, PropValue,
  error::{Error, Result},
};

// ─── Low-level helpers ───────────────────────────────────────────────────────

/// Find the first occurrence of `needle` that is not inside a double-quoted
/// string.
fn find_unquoted(s: &str, needle: char) -> Option<usize> {
  let mut in_quotes = false;
  let mut escaped = false;
  for (i, c) in s.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' if in_quotes => escaped = true,
      '"' => in_quotes = !in_quotes,
      c if c == needle && !in_quotes => return Some(i),
      _ => {}
    }
  }
  None
}

/// Split on `,` while respecting double-quoted strings and `[...]` brackets.
fn split_commas(s: &str) -> Vec<&str> {
  let mut result = Vec::new();
  let mut start = 0usize;
  let mut in_quotes = false;
  let mut escaped = false;
  let mut depth = 0usize;
  for (i, c) in s.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' if in_quotes => escaped = true,
      '"' => in_quotes = !in_quotes,
      '[' if !in_quotes => depth += 1,
      ']' if !in_quotes => depth = depth.saturating_sub(1),
      ',' if !in_quotes && depth == 0 => {
        result.push(&s[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  result.push(&s[start..]);
  result
}

/// Decode a double-quoted string literal, handling `\"` and `\\` escapes.
fn parse_quoted(s: &str, line: usize) -> Result<String> {
  let s = s.trim();
  let inner = s
    .strip_prefix('"')
    .ok_or(Error::UnterminatedString { line })?;

  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next() {
        Some('"') => out.push('"'),
        Some('\\') => out.push('\\'),
        Some(other) => {
          out.push('\\');
          out.push(other);
        }
        None => return Err(Error::UnterminatedString { line }),
      },
      '"' => {
        // Closing quote must end the literal.
        if chars.as_str().trim().is_empty() {
          return Ok(out);
        }
        return Err(Error::UnterminatedString { line });
      }
      c => out.push(c),
    }
  }
  Err(Error::UnterminatedString { line })
}

/// Node and property names: identifier characters only.
fn is_valid_name(s: &str) -> bool {
  !s.is_empty()
    && s
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ─── Property lists ──────────────────────────────────────────────────────────

/// Parse the `key: "v", key2: ["a","b"]` body of a declaration.
fn parse_props(
  inner: &str,
  line: usize,
) -> Result<BTreeMap<String, PropValue>> {
  let mut props = BTreeMap::new();
  let inner = inner.trim();
  if inner.is_empty() {
    return Ok(props);
  }

  for part in split_commas(inner) {
    let part = part.trim();
    if part.is_empty() {
      continue;
    }
    let colon = find_unquoted(part, ':')
      .ok_or_else(|| Error::BadProperties { line, text: part.to_string() })?;
    let key = part[..colon].trim();
    let value = part[colon + 1..].trim();
    if !is_valid_name(key) {
      return Err(Error::BadProperties { line, text: part.to_string() });
    }

    let value = if let Some(list_inner) =
      value.strip_prefix('[').and_then(|v| v.strip_suffix(']'))
    {
      let mut items = Vec::new();
      let list_inner = list_inner.trim();
      if !list_inner.is_empty() {
        for item in split_commas(list_inner) {
          items.push(parse_quoted(item, line)?);
        }
      }
      PropValue::List(items)
    } else if value.starts_with('"') {
      PropValue::Str(parse_quoted(value, line)?)
    } else {
      return Err(Error::BadProperties { line, text: part.to_string() });
    };

    props.insert(key.to_string(), value);
  }

  Ok(props)
}

// ─── Declarations ────────────────────────────────────────────────────────────

/// Parse one `name: kind { … }` line into `(name, decl)`.
fn parse_declaration(
  text: &str,
  line: usize,
) -> Result<(String, OperatorDecl)> {
  let bad = || Error::BadDeclaration { line, text: text.to_string() };

  let colon = find_unquoted(text, ':').ok_or_else(bad)?;
  let name = text[..colon].trim();
  if !is_valid_name(name) {
    return Err(bad());
  }

  let rest = text[colon + 1..].trim();
  let (kind, props) = match find_unquoted(rest, '{') {
    Some(open) => {
      let kind = rest[..open].trim();
      let body = rest[open + 1..]
        .trim_end()
        .strip_suffix('}')
        .ok_or_else(bad)?;
      (kind, parse_props(body, line)?)
    }
    // Props are optional: `finalize: stage` is a legal declaration.
    None => (rest, BTreeMap::new()),
  };

  if !is_valid_name(kind) {
    return Err(bad());
  }

  Ok((
    name.to_string(),
    OperatorDecl { kind: kind.to_string(), props },
  ))
}

// ─── Document ────────────────────────────────────────────────────────────────

pub(crate) fn parse_document(input: &str) -> Result<PolicyDocument> {
  let mut purpose: Option<String> = None;
  let mut graph: Option<Vec<String>> = None;
  let mut operators: BTreeMap<String, OperatorDecl> = BTreeMap::new();

  for (idx, raw) in input.lines().enumerate() {
    let line_no = idx + 1;
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    if let Some(rest) = line.strip_prefix("@purpose:") {
      if purpose.is_some() {
        return Err(Error::BadDeclaration {
          line: line_no,
          text: line.to_string(),
        });
      }
      purpose = Some(parse_quoted(rest, line_no)?);
    } else if let Some(rest) = line.strip_prefix("@graph:") {
      if graph.is_some() {
        return Err(Error::BadDeclaration {
          line: line_no,
          text: line.to_string(),
        });
      }
      let nodes: Vec<String> = rest
        .split("->")
        .map(str::trim)
        .map(str::to_string)
        .collect();
      if nodes.iter().any(|n| !is_valid_name(n)) {
        return Err(Error::BadDeclaration {
          line: line_no,
          text: line.to_string(),
        });
      }
      graph = Some(nodes);
    } else if line.starts_with('@') {
      return Err(Error::BadDeclaration {
        line: line_no,
        text: line.to_string(),
      });
    } else {
      let (name, decl) = parse_declaration(line, line_no)?;
      if operators.contains_key(&name) {
        return Err(Error::DuplicateNode(name));
      }
      operators.insert(name, decl);
    }
  }

  let purpose = purpose.ok_or(Error::MissingPurpose)?;
  let graph = graph.ok_or(Error::MissingGraph)?;
  if graph.is_empty() {
    return Err(Error::EmptyGraph);
  }

  Ok(PolicyDocument { purpose, graph, operators })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = r#"
@purpose: "Pull emails with common fields"
@graph: pull_emails -> select_fields
pull_emails: pull { source: "gmail", type: "email" }
select_fields: select { fields: ["title", "body", "labels"] }
"#;

  #[test]
  fn parses_the_canonical_example() {
    let doc = parse_document(EXAMPLE).unwrap();
    assert_eq!(doc.purpose, "Pull emails with common fields");
    assert_eq!(doc.graph, vec!["pull_emails", "select_fields"]);

    let pull = &doc.operators["pull_emails"];
    assert_eq!(pull.kind, "pull");
    assert_eq!(pull.str_prop("source"), Some("gmail"));
    assert_eq!(pull.str_prop("type"), Some("email"));

    let select = &doc.operators["select_fields"];
    assert_eq!(
      select.list_prop("fields"),
      Some(&["title".to_string(), "body".to_string(), "labels".to_string()][..])
    );
  }

  #[test]
  fn comments_and_blank_lines_are_skipped() {
    let text = "# a comment\n\n@purpose: \"p\"\n@graph: a\na: pull { source: \"x\" }\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.graph, vec!["a"]);
  }

  #[test]
  fn missing_purpose_fails() {
    let text = "@graph: a\na: pull { source: \"x\" }\n";
    assert_eq!(parse_document(text), Err(Error::MissingPurpose));
  }

  #[test]
  fn missing_graph_fails() {
    let text = "@purpose: \"p\"\na: pull { source: \"x\" }\n";
    assert_eq!(parse_document(text), Err(Error::MissingGraph));
  }

  #[test]
  fn duplicate_node_name_fails() {
    let text = "@purpose: \"p\"\n@graph: a\na: pull { source: \"x\" }\na: select { fields: [\"t\"] }\n";
    assert_eq!(
      parse_document(text),
      Err(Error::DuplicateNode("a".to_string()))
    );
  }

  #[test]
  fn unknown_property_keys_are_preserved_opaquely() {
    let text = "@purpose: \"p\"\n@graph: a\na: pull { source: \"x\", custom_knob: \"7\" }\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.operators["a"].str_prop("custom_knob"), Some("7"));
  }

  #[test]
  fn declaration_without_braces_has_empty_props() {
    let text = "@purpose: \"p\"\n@graph: finalize\nfinalize: stage\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.operators["finalize"].kind, "stage");
    assert!(doc.operators["finalize"].props.is_empty());
  }

  #[test]
  fn unterminated_string_fails() {
    let text = "@purpose: \"p\n@graph: a\na: pull { source: \"x\" }\n";
    assert!(matches!(
      parse_document(text),
      Err(Error::UnterminatedString { line: 1 })
    ));
  }

  #[test]
  fn escaped_quotes_in_values() {
    let text = r#"
@purpose: "say \"hi\""
@graph: a
a: pull { source: "x" }
"#;
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.purpose, "say \"hi\"");
  }

  #[test]
  fn graph_parsing_does_not_require_declarations_to_resolve() {
    // Resolution is validation's job, not the parser's.
    let text = "@purpose: \"p\"\n@graph: ghost_node\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.graph, vec!["ghost_node"]);
    assert!(doc.operators.is_empty());
  }

  #[test]
  fn inert_extra_declarations_are_legal() {
    let text = "@purpose: \"p\"\n@graph: a\na: pull { source: \"x\" }\nunused: select { fields: [\"t\"] }\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.operators.len(), 2);
  }

  #[test]
  fn commas_inside_quoted_values_do_not_split_props() {
    let text = "@purpose: \"p\"\n@graph: a\na: filter { field: \"title\", op: \"contains\", value: \"a, b\" }\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.operators["a"].str_prop("value"), Some("a, b"));
  }

  #[test]
  fn empty_list_value() {
    let text = "@purpose: \"p\"\n@graph: a\na: select { fields: [] }\n";
    let doc = parse_document(text).unwrap();
    assert_eq!(doc.operators["a"].list_prop("fields"), Some(&[][..]));
  }

  #[test]
  fn unquoted_value_fails() {
    let text = "@purpose: \"p\"\n@graph: a\na: pull { source: gmail }\n";
    assert!(matches!(
      parse_document(text),
      Err(Error::BadProperties { .. })
    ));
  }
}
