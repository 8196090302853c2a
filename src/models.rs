use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::media::ImageData;

static AREA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d\s.,]*)\s*(m²|m2|m\^2|ha|ft²|sq\s?ft)?").unwrap()
});

static FIRST_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Floor area as shown on the portal, e.g. `85 m²`.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub value: f64,
    pub unit: String,
}

impl Area {
    /// Parse strings such as `85 m²`, `1 250,5 m²` or `120m2`. A missing unit
    /// is taken to be square metres.
    pub fn parse(text: &str) -> Option<Area> {
        let caps = AREA_RE.captures(text)?;
        let value = parse_portal_number(&caps[1])?;
        let unit = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
            None => "m²".to_string(),
            Some(u) if u == "m2" || u == "m^2" => "m²".to_string(),
            Some(u) if u.starts_with("sq") => "ft²".to_string(),
            Some(u) => u,
        };
        Some(Area { value, unit })
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.fract() == 0.0 {
            write!(f, "{} {}", self.value as i64, self.unit)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

/// Portuguese portals group thousands with spaces or dots and use a comma for
/// decimals: `1 250,5` and `1.250` are both valid.
fn parse_portal_number(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let compact = compact.trim_end_matches(['.', ',']);
    if compact.is_empty() {
        return None;
    }

    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        (None, Some(dot)) => {
            // A single dot followed by exactly three digits is a thousands separator.
            if compact.matches('.').count() > 1 || compact.len() - dot - 1 == 3 {
                compact.replace('.', "")
            } else {
                compact.to_string()
            }
        }
        (None, None) => compact.to_string(),
    };
    normalized.parse().ok()
}

/// First run of digits in `text`, e.g. `"3 quartos"` → 3.
pub fn parse_count(text: &str) -> Option<u8> {
    FIRST_INT_RE
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// One image reference of a listing. `data` is filled in once the bytes have
/// been downloaded and recognised.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub url: String,
    pub data: Option<ImageData>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        ImageRef {
            url: url.into(),
            data: None,
        }
    }
}

/// One real-estate advertisement's extracted data. Fields that could not be
/// located on the page stay empty.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub url: String,
    pub title: String,
    pub price: String,
    pub location: String,
    pub area: Option<Area>,
    pub typology: String,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub description: String,
    pub images: Vec<ImageRef>,
    /// Set when the page could not be fetched at all.
    pub failure: Option<String>,
}

impl Listing {
    pub fn empty(url: &str) -> Self {
        Listing {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn failed(url: &str, reason: impl Into<String>) -> Self {
        Listing {
            url: url.to_string(),
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn area_text(&self) -> String {
        self.area.as_ref().map(|a| a.to_string()).unwrap_or_default()
    }

    pub fn bedrooms_text(&self) -> String {
        self.bedrooms.map(|n| n.to_string()).unwrap_or_default()
    }

    pub fn bathrooms_text(&self) -> String {
        self.bathrooms.map(|n| n.to_string()).unwrap_or_default()
    }
}
