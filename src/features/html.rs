//! Structural and behavioral features of one HTML document.
//!
//! Element statistics come from a single walk over the parsed tree; script idioms
//! (redirects, popups, right-click blocking) are matched against the raw markup
//! because they usually live inside `<script>` text or attribute values.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{Html, Node, Selector};
use serde::Serialize;

use crate::error::ParseError;
use crate::feature_vector;

use super::parse_markup;

static ONCLICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)onclick\s*=").unwrap());
static JS_REDIRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\.location|window\.open|location\.href").unwrap());
static POPUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"alert\s*\(|confirm\s*\(|prompt\s*\(").unwrap());
static MAILTO_FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)action\s*=\s*["']mailto:"#).unwrap());
static DIV_UPPER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<DIV[^>]*>").unwrap());
static BASE64_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data:image/[a-z]+;base64,").unwrap());
static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

const SUSPICIOUS_HREF_TOKENS: &[&str] = &["freehost", "phish", "login", "redirect"];

/// Elements whose text content is not rendered page text.
const NON_TEXT_ELEMENTS: &[&str] = &["script", "style", "template"];

feature_vector! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct HtmlFeatures {
        pub has_form: u8,
        pub form_count: u32,
        pub has_iframe: u8,
        pub iframe_count: u32,
        pub has_script: u8,
        pub script_count: u32,
        pub has_password_input: u8,
        pub password_input_count: u32,
        pub submit_input_count: u32,
        pub email_input_count: u32,
        pub hidden_tag_count: u32,
        pub anchor_count: u32,
        pub empty_href_count: u32,
        pub https_link_ratio: f64,
        pub external_link_count: u32,
        pub internal_link_count: u32,
        pub internal_to_total_ratio: f64,
        pub external_to_total_ratio: f64,
        pub suspicious_anchor_count: u32,
        pub onclick_event_count: u32,
        pub has_js_redirect: u8,
        pub js_redirect_count: u32,
        pub right_click_disabled: u8,
        pub has_popup: u8,
        pub popup_count: u32,
        pub submit_to_email: u8,
        pub has_favicon: u8,
        pub has_div_upper: u8,
        pub has_base64: u8,
        pub total_line_count: u32,
        pub total_text_length: u32,
        pub title: u8,
        pub title_length: u32,
        pub meta_description: u8,
        pub comment_count: u32,
        pub div_count: u32,
        pub span_count: u32,
        pub style_count: u32,
        pub meta_count: u32,
        pub img_count: u32,
        pub label_count: u32,
        pub select_count: u32,
        pub audio_count: u32,
        pub video_count: u32,
        pub table_count: u32,
        pub th_count: u32,
        pub tr_count: u32,
        pub td_count: u32,
        pub li_count: u32,
        pub ul_count: u32,
        pub p_count: u32,
        pub h1_count: u32,
        pub h2_count: u32,
        pub br_count: u32,
        pub option_count: u32,
        pub base_count: u32,
        pub address_count: u32,
        pub nav_count: u32,
        pub figure_count: u32,
        pub section_count: u32,
        pub canvas_count: u32,
        pub button_count: u32,
    }
}

impl HtmlFeatures {
    /// The ratio fields, for range checks.
    pub fn ratios(&self) -> [f64; 3] {
        [
            self.https_link_ratio,
            self.internal_to_total_ratio,
            self.external_to_total_ratio,
        ]
    }
}

pub fn extract_html_features(html: &str) -> Result<HtmlFeatures, ParseError> {
    let document = parse_markup(html)?;
    Ok(extract_html_features_from(&document, html))
}

/// Features from an already-parsed document. `raw` must be the source it was parsed from.
pub fn extract_html_features_from(document: &Html, raw: &str) -> HtmlFeatures {
    let mut f = HtmlFeatures::default();
    let mut https_links = 0u32;

    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Comment(_) => f.comment_count += 1,
            Node::Element(el) => {
                tally_element(&mut f, el);
                if el.name() == "a" {
                    tally_anchor(&mut f, el, &mut https_links);
                }
            }
            _ => {}
        }
    }

    f.has_form = flag(f.form_count > 0);
    f.has_iframe = flag(f.iframe_count > 0);
    f.has_script = flag(f.script_count > 0);
    f.has_password_input = flag(f.password_input_count > 0);

    f.https_link_ratio = ratio(https_links, f.anchor_count);
    f.internal_to_total_ratio = ratio(f.internal_link_count, f.anchor_count);
    f.external_to_total_ratio = ratio(f.external_link_count, f.anchor_count);

    f.onclick_event_count = ONCLICK_RE.find_iter(raw).count() as u32;
    f.js_redirect_count = JS_REDIRECT_RE.find_iter(raw).count() as u32;
    f.has_js_redirect = flag(f.js_redirect_count > 0);
    f.right_click_disabled = flag(raw.contains("contextmenu") || raw.contains("event.button==2"));
    f.popup_count = POPUP_RE.find_iter(raw).count() as u32;
    f.has_popup = flag(f.popup_count > 0);
    f.submit_to_email = flag(MAILTO_FORM_RE.is_match(raw));
    f.has_div_upper = flag(DIV_UPPER_RE.is_match(raw));
    f.has_base64 = flag(BASE64_IMAGE_RE.is_match(raw));
    f.total_line_count = raw.split('\n').count() as u32;
    f.total_text_length = rendered_text_length(document) as u32;

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();
    f.title = flag(!title.is_empty());
    f.title_length = title.chars().count() as u32;

    f
}

fn tally_element(f: &mut HtmlFeatures, el: &Element) {
    let counter = match el.name() {
        "form" => &mut f.form_count,
        "iframe" => &mut f.iframe_count,
        "script" => &mut f.script_count,
        "input" => {
            tally_input(f, el);
            return;
        }
        "link" => {
            if is_favicon(el) {
                f.has_favicon = 1;
            }
            return;
        }
        "meta" => {
            if el
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case("description"))
            {
                f.meta_description = 1;
            }
            &mut f.meta_count
        }
        "div" => &mut f.div_count,
        "span" => &mut f.span_count,
        "style" => &mut f.style_count,
        "img" => &mut f.img_count,
        "label" => &mut f.label_count,
        "select" => &mut f.select_count,
        "audio" => &mut f.audio_count,
        "video" => &mut f.video_count,
        "table" => &mut f.table_count,
        "th" => &mut f.th_count,
        "tr" => &mut f.tr_count,
        "td" => &mut f.td_count,
        "li" => &mut f.li_count,
        "ul" => &mut f.ul_count,
        "p" => &mut f.p_count,
        "h1" => &mut f.h1_count,
        "h2" => &mut f.h2_count,
        "br" => &mut f.br_count,
        "option" => &mut f.option_count,
        "base" => &mut f.base_count,
        "address" => &mut f.address_count,
        "nav" => &mut f.nav_count,
        "figure" => &mut f.figure_count,
        "section" => &mut f.section_count,
        "canvas" => &mut f.canvas_count,
        "button" => &mut f.button_count,
        _ => return,
    };
    *counter += 1;
}

fn tally_input(f: &mut HtmlFeatures, el: &Element) {
    let Some(kind) = el.attr("type") else {
        return;
    };
    let kind = kind.trim().to_ascii_lowercase();
    match kind.as_str() {
        "password" => f.password_input_count += 1,
        "submit" => f.submit_input_count += 1,
        "email" => f.email_input_count += 1,
        "hidden" => f.hidden_tag_count += 1,
        _ => {}
    }
}

fn tally_anchor(f: &mut HtmlFeatures, el: &Element, https_links: &mut u32) {
    f.anchor_count += 1;
    let href = el.attr("href");
    if matches!(href, None | Some("") | Some("#")) {
        f.empty_href_count += 1;
    }
    let href = href.unwrap_or("");
    if href.contains("https") {
        *https_links += 1;
    }
    if href.contains("http") {
        f.external_link_count += 1;
    } else {
        f.internal_link_count += 1;
    }
    if SUSPICIOUS_HREF_TOKENS.iter().any(|t| href.contains(t)) {
        f.suspicious_anchor_count += 1;
    }
}

fn is_favicon(el: &Element) -> bool {
    el.attr("rel")
        .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("icon")))
        .unwrap_or(false)
}

/// Length of visible text with each text node trimmed, as a reader would see it.
fn rendered_text_length(document: &Html) -> usize {
    let mut total = 0;
    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(t) => total += t.trim().chars().count(),
            Node::Element(el) if NON_TEXT_ELEMENTS.contains(&el.name()) => continue,
            _ => {}
        }
        stack.extend(node.children());
    }
    total
}

fn ratio(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn flag(b: bool) -> u8 {
    b as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureColumns;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn password_form() {
        let f =
            extract_html_features("<html><body><form><input type='password'></form></body></html>")
                .unwrap();
        assert_eq!(f.has_form, 1);
        assert_eq!(f.form_count, 1);
        assert_eq!(f.has_password_input, 1);
        assert_eq!(f.password_input_count, 1);
        assert_eq!(f.anchor_count, 0);
        assert_eq!(f.https_link_ratio, 0.0);
        assert_eq!(f.internal_to_total_ratio, 0.0);
        assert_eq!(f.external_to_total_ratio, 0.0);
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        assert_eq!(extract_html_features(""), Err(ParseError::Empty));
    }

    #[test]
    fn anchor_statistics() {
        let html = r##"<html><body>
            <a href="https://secure.example.com/login">a</a>
            <a href="http://freehost.example.net/">b</a>
            <a href="/about">c</a>
            <a href="#">d</a>
            <a>e</a>
        </body></html>"##;
        let f = extract_html_features(html).unwrap();
        assert_eq!(f.anchor_count, 5);
        assert_eq!(f.empty_href_count, 2);
        assert_eq!(f.external_link_count, 2);
        assert_eq!(f.internal_link_count, 3);
        assert_eq!(f.suspicious_anchor_count, 2);
        assert!((f.https_link_ratio - 0.2).abs() < 1e-12);
        assert!((f.external_to_total_ratio - 0.4).abs() < 1e-12);
        assert!((f.internal_to_total_ratio - 0.6).abs() < 1e-12);
    }

    #[test]
    fn script_idioms_from_raw_markup() {
        let html = r#"<html><head><script>
            window.location = "http://x"; location.href = 'y';
            alert ("hi"); confirm("sure?");
            document.addEventListener('contextmenu', e => e.preventDefault());
        </script></head>
        <body><DIV onClick="go()">x</DIV><button onclick = "a()">b</button>
        <form action="mailto:drop@example.com"></form>
        <img src="data:image/png;base64,AAAA"></body></html>"#;
        let f = extract_html_features(html).unwrap();
        assert_eq!(f.js_redirect_count, 2);
        assert_eq!(f.has_js_redirect, 1);
        assert_eq!(f.popup_count, 2);
        assert_eq!(f.has_popup, 1);
        assert_eq!(f.right_click_disabled, 1);
        assert_eq!(f.onclick_event_count, 2);
        assert_eq!(f.submit_to_email, 1);
        assert_eq!(f.has_div_upper, 1);
        assert_eq!(f.has_base64, 1);
        assert_eq!(f.div_count, 1);
        assert_eq!(f.button_count, 1);
    }

    #[test]
    fn structure_counts() {
        let html = "<html><head><title>Sign in</title>\
            <meta name=\"Description\" content=\"x\">\
            <link rel=\"shortcut icon\" href=\"/f.ico\"></head>\
            <body><!-- one --><!-- two -->\
            <table><tr><th>h</th></tr><tr><td>1</td><td>2</td></tr></table>\
            <ul><li>a</li><li>b</li></ul><h1>t</h1><p>p</p><br>\
            <input type=\"hidden\"><input type=\"EMAIL\"><input type=\"submit\"></body></html>";
        let f = extract_html_features(html).unwrap();
        assert_eq!(f.title, 1);
        assert_eq!(f.title_length, 7);
        assert_eq!(f.meta_description, 1);
        assert_eq!(f.meta_count, 1);
        assert_eq!(f.has_favicon, 1);
        assert_eq!(f.comment_count, 2);
        assert_eq!(f.table_count, 1);
        assert_eq!(f.tr_count, 2);
        assert_eq!(f.th_count, 1);
        assert_eq!(f.td_count, 2);
        assert_eq!(f.li_count, 2);
        assert_eq!(f.ul_count, 1);
        assert_eq!(f.h1_count, 1);
        assert_eq!(f.p_count, 1);
        assert_eq!(f.br_count, 1);
        assert_eq!(f.hidden_tag_count, 1);
        assert_eq!(f.email_input_count, 1);
        assert_eq!(f.submit_input_count, 1);
        assert_eq!(f.total_line_count, 1);
    }

    #[test]
    fn text_length_skips_scripts_and_whitespace() {
        let html = "<html><head><title>ab</title><script>var x = 1;</script>\
            <style>p { color: red }</style></head><body>\n  <p>  cd  </p>\n</body></html>";
        let f = extract_html_features(html).unwrap();
        assert_eq!(f.total_text_length, 4);
    }

    #[test]
    fn missing_title_is_zero() {
        let f = extract_html_features("<p>hello</p>").unwrap();
        assert_eq!(f.title, 0);
        assert_eq!(f.title_length, 0);
    }

    #[test]
    fn ratios_stay_in_unit_interval() {
        let docs = [
            fixture("login_form"),
            fixture("benign_article"),
            "<a href='https://x'>".to_string(),
            "<div><span>no anchors</span></div>".to_string(),
        ];
        for doc in &docs {
            let f = extract_html_features(doc).unwrap();
            for r in f.ratios() {
                assert!((0.0..=1.0).contains(&r), "ratio {r} out of range");
            }
            if f.anchor_count == 0 {
                assert_eq!(f.ratios(), [0.0; 3]);
            }
        }
    }

    #[test]
    fn login_fixture() {
        let f = extract_html_features(&fixture("login_form")).unwrap();
        assert_eq!(f.has_form, 1);
        assert_eq!(f.password_input_count, 1);
        assert_eq!(f.has_iframe, 1);
        assert!(f.anchor_count >= 2);
        assert_eq!(f.has_js_redirect, 1);
    }

    #[test]
    fn pure() {
        let doc = fixture("benign_article");
        assert_eq!(
            extract_html_features(&doc).unwrap(),
            extract_html_features(&doc).unwrap()
        );
    }

    #[test]
    fn column_count() {
        let f = HtmlFeatures::default();
        assert_eq!(HtmlFeatures::column_names().len(), f.values().len());
        assert_eq!(HtmlFeatures::column_names().len(), 62);
    }
}
