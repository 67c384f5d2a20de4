//! SQL identifier quoting.
//!
//! [`Ident`] represents a table or column reference as written by the caller
//! (`users`, `users.id`, `users.*`, `users as u`, `"CamelCase".id`) and renders it
//! with every part quoted for the target dialect.
//!
//! - Dotted parts are quoted individually: `users.id` → `"users"."id"`
//! - `*` is never quoted: `users.*` → `"users".*`
//! - `x as y` (any case) quotes both sides: `"x" as "y"`
//! - Already-quoted parts (`"a""b"`) are unescaped first, so they are not double-quoted
//! - The quote character inside a name is escaped by doubling it

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    Name(String),
    Star,
}

/// A SQL identifier (column, table, or schema-qualified name) with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
    pub alias: Option<String>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted, quoted and aliased forms.
    pub fn parse(s: &str) -> Self {
        let (name, alias) = split_alias(s.trim());
        Self {
            parts: split_parts(name),
            alias: alias.map(|a| unquote(a.trim())),
        }
    }

    /// The last name part (`users.id` → `id`, `users as u` → `u`).
    pub fn base_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        self.parts.iter().rev().find_map(|p| match p {
            IdentPart::Name(n) => Some(n.as_str()),
            IdentPart::Star => None,
        })
    }

    /// Render the identifier as SQL using `quote` as the quote character.
    pub fn to_sql(&self, quote: char) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, quote);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, quote: char) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Star => out.push('*'),
                IdentPart::Name(s) => push_quoted(out, s, quote),
            }
        }
        if let Some(alias) = &self.alias {
            out.push_str(" as ");
            push_quoted(out, alias, quote);
        }
    }
}

/// Quote a single name (no dot splitting).
pub fn quote_name(name: &str, quote: char) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    push_quoted(&mut out, name, quote);
    out
}

/// Quote a possibly dotted/aliased reference.
pub fn wrap(value: &str, quote: char) -> String {
    Ident::parse(value).to_sql(quote)
}

fn push_quoted(out: &mut String, name: &str, quote: char) {
    out.push(quote);
    for ch in name.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
}

fn split_alias(s: &str) -> (&str, Option<&str>) {
    let lower = s.to_ascii_lowercase();
    match lower.find(" as ") {
        Some(pos) => (s[..pos].trim_end(), Some(&s[pos + 4..])),
        None => (s, None),
    }
}

fn split_parts(s: &str) -> Vec<IdentPart> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    let mut in_quotes: Option<char> = None;

    while let Some(c) = chars.next() {
        match in_quotes {
            Some(q) if c == q => {
                // Escaped quote: ""
                if chars.peek() == Some(&q) {
                    chars.next();
                    current.push(q);
                } else {
                    in_quotes = None;
                }
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '`' => in_quotes = Some(c),
            None if c == '.' => parts.push(finish_part(std::mem::take(&mut current))),
            None => current.push(c),
        }
    }
    parts.push(finish_part(current));
    parts
}

fn finish_part(part: String) -> IdentPart {
    if part == "*" {
        IdentPart::Star
    } else {
        IdentPart::Name(part)
    }
}

fn unquote(s: &str) -> String {
    match split_parts(s).pop() {
        Some(IdentPart::Name(n)) => n,
        _ => s.to_string(),
    }
}
