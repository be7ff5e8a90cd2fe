//! `Link` header parsing (RFC 8288).

use core::iter::Peekable;
use core::str::Chars;
use std::collections::BTreeMap;

/// One link-value: `<target>; rel="a b"; param=value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub relations: Vec<String>,
    pub params: BTreeMap<String, String>,
}

/// A relation's target together with the parameters it was declared with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTarget {
    pub url: String,
    pub params: BTreeMap<String, String>,
}

/// Relations gathered from every `Link` header of a response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkRelations {
    relations: BTreeMap<String, LinkTarget>,
}

impl LinkRelations {
    /// Merges all header occurrences. The first target seen for a relation
    /// wins; later duplicates are ignored.
    pub fn from_headers<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut relations = BTreeMap::new();

        for link in values.into_iter().flat_map(parse) {
            for relation in &link.relations {
                let _ = relations
                    .entry(relation.clone())
                    .or_insert_with(|| LinkTarget {
                        url: link.target.clone(),
                        params: link.params.clone(),
                    });
            }
        }

        Self { relations }
    }

    #[must_use]
    pub fn get(&self, relation: &str) -> Option<&LinkTarget> {
        self.relations.get(&normalise_relation(relation))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LinkTarget)> {
        self.relations.iter().map(|(rel, target)| (rel.as_str(), target))
    }
}

/// Parses a single `Link` header value. Malformed link-values are skipped.
#[must_use]
pub fn parse(value: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut chars = value.chars().peekable();

    loop {
        skip_while(&mut chars, |c| c.is_whitespace() || c == ',');

        match chars.next() {
            None => break,
            Some('<') => {}
            Some(_) => {
                skip_link_value(&mut chars);
                continue;
            }
        }

        let mut target = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '>' {
                closed = true;
                break;
            }
            target.push(c);
        }
        if !closed {
            break;
        }

        let params = parse_params(&mut chars);
        skip_link_value(&mut chars);

        let relations = params
            .get("rel")
            .map(|rel| rel.split_whitespace().map(normalise_relation).collect())
            .unwrap_or_default();

        links.push(Link {
            target: target.trim().to_owned(),
            relations,
            params,
        });
    }

    links
}

fn parse_params(chars: &mut Peekable<Chars<'_>>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    loop {
        skip_while(chars, char::is_whitespace);
        if chars.peek() != Some(&';') {
            break;
        }
        let _ = chars.next();
        skip_while(chars, char::is_whitespace);

        let name = take_while(chars, |c| !matches!(c, '=' | ';' | ',') && !c.is_whitespace())
            .to_ascii_lowercase();
        skip_while(chars, char::is_whitespace);

        let value = if chars.peek() == Some(&'=') {
            let _ = chars.next();
            skip_while(chars, char::is_whitespace);
            if chars.peek() == Some(&'"') {
                let _ = chars.next();
                quoted_string(chars)
            } else {
                take_while(chars, |c| !matches!(c, ';' | ',') && !c.is_whitespace())
            }
        } else {
            String::new()
        };

        // RFC 8288 §3.3: only the first occurrence of a parameter counts.
        if !name.is_empty() {
            let _ = params.entry(name).or_insert(value);
        }
    }

    params
}

fn quoted_string(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();

    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            c => value.push(c),
        }
    }

    value
}

/// Consumes the rest of the current link-value, up to and including the
/// separating comma.
fn skip_link_value(chars: &mut Peekable<Chars<'_>>) {
    let mut in_quotes = false;
    let mut in_target = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes => {
                let _ = chars.next();
            }
            '"' if !in_target => in_quotes = !in_quotes,
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            ',' if !in_quotes && !in_target => break,
            _ => {}
        }
    }
}

fn skip_while(chars: &mut Peekable<Chars<'_>>, pred: impl Fn(char) -> bool) {
    while chars.next_if(|&c| pred(c)).is_some() {}
}

fn take_while(chars: &mut Peekable<Chars<'_>>, pred: impl Fn(char) -> bool) -> String {
    let mut taken = String::new();
    while let Some(c) = chars.next_if(|&c| pred(c)) {
        taken.push(c);
    }
    taken
}

/// Registered relation types are case-insensitive, extension (URI)
/// relation types are not.
fn normalise_relation(relation: &str) -> String {
    if relation.contains(':') {
        relation.to_owned()
    } else {
        relation.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_link() {
        let links = parse(r#"<https://pod.example/.meta>; rel="describedby""#);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "https://pod.example/.meta");
        assert_eq!(links[0].relations, vec!["describedby".to_owned()]);
    }

    #[test]
    fn splits_links_but_not_targets_or_quoted_values() {
        let links = parse(
            r#"<https://pod.example/a,b>; rel=type; title="x, y", </desc>; rel="describedby""#,
        );

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "https://pod.example/a,b");
        assert_eq!(links[0].params["title"], "x, y");
        assert_eq!(links[0].relations, vec!["type".to_owned()]);
        assert_eq!(links[1].target, "/desc");
    }

    #[test]
    fn splits_whitespace_separated_relations() {
        let links = parse(r#"</x>; rel="describedby http://www.w3.org/ns/solid/terms#storageDescription""#);

        assert_eq!(
            links[0].relations,
            vec![
                "describedby".to_owned(),
                "http://www.w3.org/ns/solid/terms#storageDescription".to_owned()
            ]
        );
    }

    #[test]
    fn honours_escapes_in_quoted_strings() {
        let links = parse(r#"</x>; rel=alternate; title="say \"hi\"""#);

        assert_eq!(links[0].params["title"], r#"say "hi""#);
    }

    #[test]
    fn skips_malformed_link_values() {
        let links = parse(r#"garbage; rel=x, </ok>; rel=next, <unterminated"#);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "/ok");
    }

    #[test]
    fn first_rel_parameter_wins() {
        let links = parse(r#"</x>; rel=first; rel=second"#);

        assert_eq!(links[0].relations, vec!["first".to_owned()]);
    }

    #[test]
    fn merged_headers_keep_first_seen_target() {
        let relations = LinkRelations::from_headers([
            r#"</first>; rel="describedby""#,
            r#"</second>; rel="DescribedBy", </acl>; rel=acl"#,
        ]);

        assert_eq!(relations.get("describedby").unwrap().url, "/first");
        assert_eq!(relations.get("DESCRIBEDBY").unwrap().url, "/first");
        assert_eq!(relations.get("acl").unwrap().url, "/acl");
        assert!(relations.get("type").is_none());
    }

    #[test]
    fn empty_headers_yield_no_relations() {
        assert!(LinkRelations::from_headers([""]).is_empty());
        assert!(LinkRelations::from_headers(Vec::<&str>::new()).is_empty());
    }
}
