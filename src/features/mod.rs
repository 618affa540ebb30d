pub mod html;
pub mod sequence;
pub mod url;

use scraper::Html;

use crate::error::ParseError;

pub use self::html::{extract_html_features, extract_html_features_from, HtmlFeatures};
pub use self::sequence::{extract_tag_sequence, extract_tag_sequence_from, TagSequence};
pub use self::url::{extract_url_features, UrlFeatures};

/// One cell of the output feature table.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Zero of the same kind; used for sentinel rows.
    pub fn zeroed(&self) -> FeatureValue {
        match self {
            FeatureValue::Int(_) => FeatureValue::Int(0),
            FeatureValue::Float(_) => FeatureValue::Float(0.0),
            FeatureValue::Text(_) => FeatureValue::Text(String::new()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            FeatureValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for FeatureValue {
    fn from(v: u32) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<u8> for FeatureValue {
    fn from(v: u8) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<f32> for FeatureValue {
    fn from(v: f32) -> Self {
        FeatureValue::Float(f64::from(v))
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// Named, ordered columns of a fixed-size feature vector.
pub trait FeatureColumns {
    fn column_names() -> &'static [&'static str];
    fn values(&self) -> Vec<FeatureValue>;
}

/// Declares a feature struct together with its column order, so the struct
/// fields and the emitted table header can never drift apart.
#[macro_export]
macro_rules! feature_vector {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )+
        }
    ) => {
        $(#[$meta])*
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
        }

        impl $crate::features::FeatureColumns for $name {
            fn column_names() -> &'static [&'static str] {
                &[ $( stringify!($field), )+ ]
            }

            fn values(&self) -> Vec<$crate::features::FeatureValue> {
                vec![ $( $crate::features::FeatureValue::from(self.$field.clone()), )+ ]
            }
        }
    };
}

/// Parse a document leniently. Only input that is not markup at all is rejected;
/// malformed markup is repaired the way browsers do.
pub fn parse_markup(html: &str) -> Result<Html, ParseError> {
    if html.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if !html.contains('<') {
        return Err(ParseError::NotMarkup);
    }
    Ok(Html::parse_document(html))
}

/// Both HTML-derived outputs from a single parse.
#[derive(Debug, Clone)]
pub struct DocumentFeatures {
    pub html: HtmlFeatures,
    pub tags: TagSequence,
}

pub fn extract_document(html: &str) -> Result<DocumentFeatures, ParseError> {
    let document = parse_markup(html)?;
    Ok(DocumentFeatures {
        html: extract_html_features_from(&document, html),
        tags: extract_tag_sequence_from(&document),
    })
}
