//! Field-list fragments such as
//!
//! ```text
//! fragment PostsList on Post {
//!   _id
//!   title
//!   author: user { displayName }
//! }
//! ```
//!
//! Only the top-level field names are of interest; they become the
//! projection of the statement that loads the documents.

use crate::error::{QueryError, Result};
use crate::options::Projection;
use crate::schema::{Table, ID_FIELD};

/// A parsed fragment header with its raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    name: String,
    type_name: String,
    body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    Punct(char),
    Spread,
    Literal,
}

impl Fragment {
    /// Parse `fragment <Name> on <Type> { … }`
    pub fn parse(source: &str) -> Result<Self> {
        let malformed = || QueryError::MalformedFragment(source.trim().to_string());

        let open = source.find('{').ok_or_else(malformed)?;
        let close = source.rfind('}').ok_or_else(malformed)?;
        if close < open || !strip_comment(&source[close + 1..]).trim().is_empty() {
            return Err(malformed());
        }

        let header: Vec<&str> = source[..open]
            .lines()
            .map(strip_comment)
            .flat_map(str::split_whitespace)
            .collect();
        let (name, type_name) = match header.as_slice() {
            ["fragment", name, "on", type_name] if is_name(name) && is_name(type_name) => {
                (*name, *type_name)
            }
            _ => return Err(malformed()),
        };

        Ok(Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            body: source[open + 1..close].to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Trimmed body lines, without comments or blank lines
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.body
            .lines()
            .map(|line| strip_comment(line).trim())
            .filter(|line| !line.is_empty())
    }

    /// Top-level field names in declaration order, deduplicated.
    ///
    /// Aliases resolve to the underlying field, arguments and sub-selections
    /// are skipped, and inline fragments contribute their own fields.
    pub fn field_names(&self) -> Result<Vec<String>> {
        let tokens = self.tokens()?;
        let mut names = Vec::new();
        let mut pos = 0;
        self.selection(&tokens, &mut pos, &mut names, false)?;
        Ok(names)
    }

    /// Inclusion projection of the referenced fields stored as columns;
    /// `_id` is always selected
    pub fn projection(&self, table: &Table) -> Result<Projection> {
        let mut columns = vec![ID_FIELD.to_string()];
        for name in self.field_names()? {
            if name != ID_FIELD && table.has_column(&name) {
                columns.push(name);
            }
        }
        Ok(Projection::Include(columns))
    }

    fn malformed(&self, detail: impl std::fmt::Display) -> QueryError {
        QueryError::MalformedFragment(format!("{} in fragment {}", detail, self.name))
    }

    fn tokens(&self) -> Result<Vec<Token<'_>>> {
        let mut tokens = Vec::new();

        for line in self.lines() {
            let bytes = line.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                let c = bytes[i] as char;
                match c {
                    c if c.is_whitespace() || c == ',' => i += 1,
                    '.' if line[i..].starts_with("...") => {
                        tokens.push(Token::Spread);
                        i += 3;
                    }
                    '"' => {
                        let end = closing_quote(&line[i + 1..])
                            .ok_or_else(|| self.malformed("unterminated string"))?;
                        tokens.push(Token::Literal);
                        i += end + 2;
                    }
                    c if c == '_' || c.is_ascii_alphanumeric() || c == '-' => {
                        let start = i;
                        while i < bytes.len() {
                            let c = bytes[i] as char;
                            if c == '_' || c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        let word = &line[start..i];
                        if is_name(word) {
                            tokens.push(Token::Name(word));
                        } else {
                            tokens.push(Token::Literal);
                        }
                    }
                    ':' | '(' | ')' | '{' | '}' | '[' | ']' | '@' | '$' | '=' | '!' => {
                        tokens.push(Token::Punct(c));
                        i += 1;
                    }
                    other => return Err(self.malformed(format!("unexpected '{}'", other))),
                }
            }
        }

        Ok(tokens)
    }

    fn selection(
        &self,
        tokens: &[Token<'_>],
        pos: &mut usize,
        names: &mut Vec<String>,
        nested: bool,
    ) -> Result<()> {
        loop {
            match tokens.get(*pos) {
                None if nested => return Err(self.malformed("unclosed '{'")),
                None => return Ok(()),
                Some(Token::Punct('}')) if nested => {
                    *pos += 1;
                    return Ok(());
                }
                Some(Token::Spread) => {
                    *pos += 1;
                    match tokens.get(*pos) {
                        // `... on Type { … }`
                        Some(Token::Name("on")) => {
                            *pos += 1;
                            match tokens.get(*pos) {
                                Some(Token::Name(_)) => *pos += 1,
                                _ => return Err(self.malformed("inline fragment without type")),
                            }
                            self.directives(tokens, pos)?;
                            self.expect(tokens, pos, '{')?;
                            self.selection(tokens, pos, names, true)?;
                        }
                        Some(Token::Punct('{')) | Some(Token::Punct('@')) => {
                            self.directives(tokens, pos)?;
                            self.expect(tokens, pos, '{')?;
                            self.selection(tokens, pos, names, true)?;
                        }
                        // named spread, resolved elsewhere
                        Some(Token::Name(_)) => {
                            *pos += 1;
                            self.directives(tokens, pos)?;
                        }
                        _ => return Err(self.malformed("dangling '...'")),
                    }
                }
                Some(Token::Name(name)) => {
                    *pos += 1;
                    let mut field = *name;
                    if tokens.get(*pos) == Some(&Token::Punct(':')) {
                        *pos += 1;
                        match tokens.get(*pos) {
                            Some(Token::Name(real)) => field = *real,
                            _ => return Err(self.malformed(format!("alias {} has no field", name))),
                        }
                        *pos += 1;
                    }
                    if tokens.get(*pos) == Some(&Token::Punct('(')) {
                        self.skip_balanced(tokens, pos, '(', ')')?;
                    }
                    self.directives(tokens, pos)?;
                    if tokens.get(*pos) == Some(&Token::Punct('{')) {
                        self.skip_balanced(tokens, pos, '{', '}')?;
                    }
                    if !names.iter().any(|n| n == field) {
                        names.push(field.to_string());
                    }
                }
                Some(token) => return Err(self.malformed(format!("unexpected {:?}", token))),
            }
        }
    }

    /// Skip `@name(args)` directives
    fn directives(&self, tokens: &[Token<'_>], pos: &mut usize) -> Result<()> {
        while tokens.get(*pos) == Some(&Token::Punct('@')) {
            *pos += 1;
            match tokens.get(*pos) {
                Some(Token::Name(_)) => *pos += 1,
                _ => return Err(self.malformed("directive without name")),
            }
            if tokens.get(*pos) == Some(&Token::Punct('(')) {
                self.skip_balanced(tokens, pos, '(', ')')?;
            }
        }
        Ok(())
    }

    fn expect(&self, tokens: &[Token<'_>], pos: &mut usize, punct: char) -> Result<()> {
        if tokens.get(*pos) == Some(&Token::Punct(punct)) {
            *pos += 1;
            Ok(())
        } else {
            Err(self.malformed(format!("expected '{}'", punct)))
        }
    }

    fn skip_balanced(
        &self,
        tokens: &[Token<'_>],
        pos: &mut usize,
        open: char,
        close: char,
    ) -> Result<()> {
        let mut depth = 0usize;
        while let Some(token) = tokens.get(*pos) {
            *pos += 1;
            match token {
                Token::Punct(c) if *c == open => depth += 1,
                Token::Punct(c) if *c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.malformed(format!("unclosed '{}'", open)))
    }
}

/// Byte offset of the quote ending a string literal, skipping `\"` escapes
fn closing_quote(rest: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Cut a line at its first `#` outside a string literal
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;

    const POSTS_LIST: &str = r#"
        fragment PostsList on Post {
          _id
          # shown in the list
          title
          url

          author: user {
            _id
            displayName
          }
          excerpt: contents(maxLength: 200) { htmlHighlight }
          tags @include(if: $withTags) { name }
          ...PostsBase
          ... on Post {
            baseScore
            title
          }
        }
    "#;

    #[test]
    fn test_parse_header() {
        let fragment = Fragment::parse(POSTS_LIST).unwrap();
        assert_eq!(fragment.name(), "PostsList");
        assert_eq!(fragment.type_name(), "Post");
    }

    #[test]
    fn test_lines_skip_comments_and_blanks() {
        let fragment = Fragment::parse("fragment A on B {\n  a # note\n\n  # only a comment\n  b\n}").unwrap();
        let lines: Vec<&str> = fragment.lines().collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_field_names() {
        let fragment = Fragment::parse(POSTS_LIST).unwrap();
        assert_eq!(
            fragment.field_names().unwrap(),
            vec!["_id", "title", "url", "user", "contents", "tags", "baseScore"]
        );
    }

    #[test]
    fn test_hash_inside_string_argument() {
        let fragment = Fragment::parse(
            "fragment UsersAvatar on User {\n  avatar(color: \"#fff\", label: \"a \\\" # b\") # size\n  slug\n}",
        )
        .unwrap();
        assert_eq!(
            fragment.lines().collect::<Vec<_>>(),
            vec!["avatar(color: \"#fff\", label: \"a \\\" # b\")", "slug"]
        );
        assert_eq!(fragment.field_names().unwrap(), vec!["avatar", "slug"]);
    }

    #[test]
    fn test_projection_keeps_columns_only() {
        let table = Table::new(
            "Posts",
            vec![
                ("title", SqlType::Text, true),
                ("userId", SqlType::Text, true),
                ("contents", SqlType::Json, true),
                ("baseScore", SqlType::Integer, true),
            ],
        )
        .unwrap();
        let fragment = Fragment::parse(POSTS_LIST).unwrap();

        assert_eq!(
            fragment.projection(&table).unwrap(),
            Projection::include(["_id", "title", "contents", "baseScore"])
        );
    }

    #[test]
    fn test_malformed_headers() {
        for source in [
            "PostsList on Post { _id }",
            "fragment PostsList Post { _id }",
            "fragment PostsList on Post  _id }",
            "fragment PostsList on Post { _id",
            "fragment PostsList on Post { _id } trailing",
            "fragment 1Posts on Post { _id }",
        ] {
            let err = Fragment::parse(source).unwrap_err();
            assert!(matches!(err, QueryError::MalformedFragment(_)), "{source}");
        }
    }

    #[test]
    fn test_malformed_error_quotes_input() {
        let err = Fragment::parse("fragment X { a }").unwrap_err();
        assert_eq!(err.to_string(), "Malformed fragment: fragment X { a }");
    }

    #[test]
    fn test_unbalanced_body() {
        let fragment = Fragment::parse("fragment A on B { a { b }").unwrap();
        assert!(fragment.field_names().is_err());
    }
}
