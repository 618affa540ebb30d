//! Tag-tree shape as a flat token stream: `<tag>` on entry, `</tag>` on exit,
//! in document pre-order. Text and comments carry no tokens.

use scraper::{Html, Node};

use crate::error::ParseError;

use super::parse_markup;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSequence(Vec<String>);

impl TagSequence {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of elements the sequence describes.
    pub fn element_count(&self) -> usize {
        self.0.len() / 2
    }
}

enum Step<'a, N> {
    Enter(N),
    Leave(&'a str),
}

pub fn extract_tag_sequence(html: &str) -> Result<TagSequence, ParseError> {
    let document = parse_markup(html)?;
    Ok(extract_tag_sequence_from(&document))
}

/// Walks the tree with an explicit stack so depth is bounded by heap, not call stack.
pub fn extract_tag_sequence_from(document: &Html) -> TagSequence {
    let mut tokens = Vec::new();
    let mut stack = vec![Step::Enter(document.tree.root())];

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Leave(name) => {
                tokens.push(format!("</{}>", name));
                continue;
            }
            Step::Enter(node) => node,
        };

        match node.value() {
            Node::Element(el) => {
                tokens.push(format!("<{}>", el.name()));
                stack.push(Step::Leave(el.name()));
            }
            Node::Document | Node::Fragment => {}
            _ => continue,
        }

        // Reverse push so the first child is popped first.
        let mut child = node.last_child();
        while let Some(c) = child {
            stack.push(Step::Enter(c));
            child = c.prev_sibling();
        }
    }

    TagSequence(tokens)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn seq(html: &str) -> Vec<String> {
        extract_tag_sequence(html).unwrap().into_tokens()
    }

    #[test]
    fn pre_order_open_close() {
        let tokens = seq("<html><head></head><body><div><p>a</p><span>b</span></div></body></html>");
        assert_eq!(
            tokens,
            vec![
                "<html>", "<head>", "</head>", "<body>", "<div>", "<p>", "</p>", "<span>",
                "</span>", "</div>", "</body>", "</html>",
            ]
        );
    }

    #[test]
    fn implied_elements_are_tokenized() {
        let tokens = seq("<p>hello <!-- note --> world</p>");
        assert_eq!(
            tokens,
            vec!["<html>", "<head>", "</head>", "<body>", "<p>", "</p>", "</body>", "</html>"]
        );
    }

    #[test]
    fn same_shape_same_sequence() {
        let a = seq("<div><a href='x'>one</a></div>");
        let b = seq("<DIV><A HREF='y'>two</A></DIV>");
        assert_eq!(a, b);
    }

    #[test]
    fn balanced_and_twice_element_count() {
        let html = std::fs::read_to_string("tests/fixtures/login_form.html").unwrap();
        let document = parse_markup(&html).unwrap();
        let elements = document
            .tree
            .root()
            .descendants()
            .filter(|n| n.value().is_element())
            .count();
        let tokens = extract_tag_sequence_from(&document).into_tokens();
        assert_eq!(tokens.len(), 2 * elements);

        let mut balance: HashMap<String, i64> = HashMap::new();
        for t in &tokens {
            if let Some(name) = t.strip_prefix("</") {
                *balance.entry(name.to_string()).or_default() -= 1;
            } else {
                *balance.entry(t[1..].to_string()).or_default() += 1;
            }
        }
        assert!(balance.values().all(|v| *v == 0), "{balance:?}");
    }

    #[test]
    fn deep_nesting_does_not_overflow() {
        let depth = 10_000;
        let html = "<span>".repeat(depth);
        let tokens = extract_tag_sequence(&html).unwrap();
        assert_eq!(tokens.element_count(), depth + 3);
        assert_eq!(tokens.tokens()[4], "<span>");
        assert_eq!(tokens.tokens().last().map(String::as_str), Some("</html>"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(extract_tag_sequence(""), Err(ParseError::Empty));
    }
}
