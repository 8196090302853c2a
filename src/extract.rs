use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::models::{parse_count, Area, ImageRef, Listing};

// ── Labels as shown on Portuguese portals ────────────────────────────────────

const TYPOLOGY_LABELS: &[&str] = &["Tipologia"];
const BEDROOM_LABELS: &[&str] = &["Quartos", "Nº de quartos", "Número de quartos"];
const BATHROOM_LABELS: &[&str] = &["Casas de banho", "WCs"];
const AREA_LABELS: &[&str] = &[
    "Área bruta",
    "Área útil",
    "Área",
    "Área (m²)",
    "Área bruta (m²)",
];

/// JSON-LD nodes describing the site or its people rather than the property.
const IGNORED_LD_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "WebSite",
    "BreadcrumbList",
    "Person",
    "RealEstateAgent",
    "SearchAction",
];

/// Lazy-loading attributes tried after `src`, in order.
const IMG_SRC_ATTRS: &[&str] = &["src", "data-src", "data-lazy"];

// ── Lazy static selectors and regexes ────────────────────────────────────────

static JSONLD_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static H1_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static PRICE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong[aria-label], span[aria-label]").unwrap());
static NAV_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("nav[aria-label]").unwrap());
static NAV_ITEM_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());
static DT_DD_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("dt, dd").unwrap());
static LI_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());
static LI_LABEL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("strong, span").unwrap());
static BLOCK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("div, span, p").unwrap());
static P_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static IMG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static META_IMAGE_SELS: Lazy<[Selector; 4]> = Lazy::new(|| {
    [
        r#"meta[property="og:image"]"#,
        r#"meta[property="og:image:secure_url"]"#,
        r#"meta[name="twitter:image"]"#,
        r#"meta[name="twitter:image:src"]"#,
    ]
    .map(|s| Selector::parse(s).unwrap())
});

static PRICE_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)preço").unwrap());
static TYPOLOGY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^T(\d+)").unwrap());

// ── JSON-LD ──────────────────────────────────────────────────────────────────

/// Fields recovered from schema.org data. The first non-empty value wins.
#[derive(Debug, Default)]
struct LdMeta {
    title: Option<String>,
    description: Option<String>,
    price: Option<String>,
    price_with_currency: Option<String>,
    location: Option<String>,
    bedrooms: Option<String>,
    bathrooms: Option<String>,
    area: Option<String>,
    images: Vec<String>,
}

fn set_default(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.is_empty());
    }
}

fn parse_json_ld(document: &Html) -> LdMeta {
    let mut meta = LdMeta::default();
    for script in document.select(&JSONLD_SEL) {
        let text = collect_text(script);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => merge_real_estate(&mut meta, &value),
            Err(e) => tracing::debug!("skipping malformed JSON-LD block: {}", e),
        }
    }
    meta
}

fn merge_real_estate(meta: &mut LdMeta, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                merge_real_estate(meta, item);
            }
        }
        Value::Object(obj) => merge_object(meta, obj),
        _ => {}
    }
}

fn merge_object(meta: &mut LdMeta, obj: &Map<String, Value>) {
    if let Some(graph) = obj.get("@graph") {
        merge_real_estate(meta, graph);
    }
    if is_ignored_type(obj) {
        return;
    }
    // The property wrapped in an Offer or WebPage node wins over the wrapper.
    for key in ["itemOffered", "mainEntity"] {
        if let Some(nested) = obj.get(key) {
            merge_real_estate(meta, nested);
        }
    }

    set_default(&mut meta.title, obj.get("name").and_then(scalar_text));
    set_default(&mut meta.description, obj.get("description").and_then(scalar_text));

    // An Offer node carries its price directly.
    let offer = obj
        .get("offers")
        .and_then(first_object)
        .or_else(|| obj.contains_key("price").then_some(obj));
    if let Some(offer) = offer {
        let price = offer
            .get("price")
            .or_else(|| offer.get("lowPrice"))
            .and_then(scalar_text);
        let currency = offer.get("priceCurrency").and_then(scalar_text);
        if let (Some(p), Some(c)) = (&price, &currency) {
            set_default(&mut meta.price_with_currency, Some(format!("{} {}", p, c)));
        }
        set_default(&mut meta.price, price);
    }

    if let Some(address) = obj.get("address") {
        set_default(&mut meta.location, address_text(address));
    }

    set_default(
        &mut meta.bedrooms,
        obj.get("numberOfRooms")
            .or_else(|| obj.get("numberOfBedrooms"))
            .and_then(scalar_text),
    );
    set_default(
        &mut meta.bathrooms,
        obj.get("numberOfBathroomsTotal")
            .or_else(|| obj.get("numberOfFullBathrooms"))
            .and_then(scalar_text),
    );

    if let Some(Value::Object(size)) = obj.get("floorSize") {
        let value = size.get("value").and_then(scalar_text);
        let unit = size
            .get("unitText")
            .and_then(scalar_text)
            .or_else(|| match size.get("unitCode").and_then(scalar_text).as_deref() {
                Some("MTK") => Some("m²".to_string()),
                _ => None,
            })
            .unwrap_or_default();
        set_default(&mut meta.area, value.map(|v| format!("{} {}", v, unit).trim().to_string()));
    }

    if let Some(image) = obj.get("image") {
        collect_ld_images(image, &mut meta.images);
    }

}

fn is_ignored_type(obj: &Map<String, Value>) -> bool {
    let ignored = |t: &Value| {
        t.as_str()
            .map(|s| IGNORED_LD_TYPES.contains(&s))
            .unwrap_or(false)
    };
    match obj.get("@type") {
        Some(Value::Array(types)) => !types.is_empty() && types.iter().all(ignored),
        Some(t) => ignored(t),
        None => false,
    }
}

fn first_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(obj) => Some(obj),
        Value::Array(items) => items.iter().find_map(|v| v.as_object()),
        _ => None,
    }
}

/// Strings and numbers as text; `{"value": ..}` and `{"name": ..}` unwrapped.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(normalize_text(s.to_string())).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj
            .get("value")
            .or_else(|| obj.get("name"))
            .and_then(scalar_text),
        _ => None,
    }
}

fn address_text(address: &Value) -> Option<String> {
    match address {
        Value::String(_) => scalar_text(address),
        Value::Object(obj) => {
            let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|key| obj.get(*key).and_then(scalar_text))
                .collect();
            Some(parts.join(" ")).filter(|s| !s.is_empty())
        }
        _ => None,
    }
}

fn collect_ld_images(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.trim().to_string()),
        Value::Array(items) => {
            for item in items {
                collect_ld_images(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(Value::String(u)) = obj.get("url").or_else(|| obj.get("contentUrl")) {
                out.push(u.trim().to_string());
            }
        }
        _ => {}
    }
}

// ── Main extraction pipeline ─────────────────────────────────────────────────

/// Pull the listing fields out of a rendered page. Never fails: anything that
/// cannot be located is left empty.
pub fn extract_listing(html: &str, url: &str, max_images: usize) -> Listing {
    let document = Html::parse_document(html);
    let base = Url::parse(url).ok();
    let meta = parse_json_ld(&document);

    let mut listing = Listing::empty(url);

    listing.title = meta
        .title
        .clone()
        .or_else(|| first_text(&document, &H1_SEL))
        .or_else(|| first_text(&document, &TITLE_SEL))
        .unwrap_or_default();

    listing.price = meta
        .price_with_currency
        .clone()
        .or_else(|| find_price(&document))
        .or_else(|| meta.price.clone())
        .unwrap_or_default();

    listing.location = meta
        .location
        .clone()
        .or_else(|| find_breadcrumb(&document))
        .unwrap_or_default();

    listing.typology = find_label_value(&document, TYPOLOGY_LABELS).unwrap_or_default();

    listing.bedrooms = meta
        .bedrooms
        .clone()
        .or_else(|| find_label_value(&document, BEDROOM_LABELS))
        .and_then(|s| parse_count(&s))
        .or_else(|| typology_bedrooms(&listing.typology));

    listing.bathrooms = find_label_value(&document, BATHROOM_LABELS)
        .or_else(|| meta.bathrooms.clone())
        .and_then(|s| parse_count(&s));

    listing.area = find_label_value(&document, AREA_LABELS)
        .or_else(|| meta.area.clone())
        .and_then(|s| Area::parse(&s));

    listing.description = meta
        .description
        .clone()
        .or_else(|| longest_paragraph(&document))
        .unwrap_or_default();

    listing.images = collect_images(&document, &meta, base.as_ref(), max_images)
        .into_iter()
        .map(ImageRef::new)
        .collect();

    tracing::debug!(
        url,
        title = %listing.title,
        images = listing.images.len(),
        "extracted listing"
    );
    listing
}

fn typology_bedrooms(typology: &str) -> Option<u8> {
    TYPOLOGY_RE
        .captures(typology.trim())
        .and_then(|caps| caps[1].parse().ok())
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(spaced_text)
        .find(|s| !s.is_empty())
}

fn find_price(document: &Html) -> Option<String> {
    document
        .select(&PRICE_SEL)
        .filter(|el| {
            el.value()
                .attr("aria-label")
                .map(|label| PRICE_LABEL_RE.is_match(label))
                .unwrap_or(false)
        })
        .map(spaced_text)
        .find(|s| !s.is_empty())
}

fn find_breadcrumb(document: &Html) -> Option<String> {
    let nav = document.select(&NAV_SEL).find(|el| {
        el.value()
            .attr("aria-label")
            .map(|label| label.eq_ignore_ascii_case("breadcrumb"))
            .unwrap_or(false)
    })?;

    let items: Vec<String> = nav
        .select(&NAV_ITEM_SEL)
        .map(spaced_text)
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        Some(spaced_text(nav)).filter(|s| !s.is_empty())
    } else {
        Some(items.join(" / "))
    }
}

fn longest_paragraph(document: &Html) -> Option<String> {
    document
        .select(&P_SEL)
        .map(spaced_text)
        .filter(|s| !s.is_empty())
        .fold(None, |best: Option<String>, p| match best {
            Some(b) if b.chars().count() >= p.chars().count() => Some(b),
            _ => Some(p),
        })
}

// ── Label/value detail lists ─────────────────────────────────────────────────

fn label_matches(text: &str, labels: &[&str]) -> bool {
    let text = text.trim().trim_end_matches(':').trim().to_lowercase();
    !text.is_empty() && labels.iter().any(|l| l.to_lowercase() == text)
}

/// Look up a value in the listing's detail section by its label. Tries
/// `<dt>/<dd>` pairs, then `<li>` items with a bold label, then any block
/// whose whole text is the label followed by a sibling holding the value.
fn find_label_value(document: &Html, labels: &[&str]) -> Option<String> {
    // <dt>Label</dt><dd>Value</dd>
    let mut pending = false;
    for el in document.select(&DT_DD_SEL) {
        match el.value().name() {
            "dt" => pending = pending || label_matches(&spaced_text(el), labels),
            _ if pending => {
                let value = spaced_text(el);
                if !value.is_empty() {
                    return Some(value);
                }
                pending = false;
            }
            _ => {}
        }
    }

    // <li><strong>Label:</strong> Value</li>
    for li in document.select(&LI_SEL) {
        let Some(label_el) = li.select(&LI_LABEL_SEL).next() else {
            continue;
        };
        let label = spaced_text(label_el);
        if !label_matches(&label, labels) {
            continue;
        }
        let value = spaced_text(li)
            .replacen(&label, "", 1)
            .trim_matches(|c: char| c == ' ' || c == ':' || c == '\u{a0}' || c == '-')
            .to_string();
        if !value.is_empty() {
            return Some(value);
        }
    }

    // <div>Label</div><div>Value</div>
    for node in document.select(&BLOCK_SEL) {
        if !label_matches(&spaced_text(node), labels) {
            continue;
        }
        let value = node
            .next_siblings()
            .find_map(ElementRef::wrap)
            .map(spaced_text)
            .filter(|s| !s.is_empty());
        if value.is_some() {
            return value;
        }
    }

    None
}

// ── Images ───────────────────────────────────────────────────────────────────

fn collect_images(
    document: &Html,
    meta: &LdMeta,
    base_url: Option<&Url>,
    max_images: usize,
) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let push = |candidate: &str, images: &mut Vec<String>| {
        if images.len() >= max_images {
            return;
        }
        if let Some(abs) = absolutize(candidate, base_url) {
            if !images.contains(&abs) {
                images.push(abs);
            }
        }
    };

    for img in document.select(&IMG_SEL) {
        if images.len() >= max_images {
            break;
        }
        if let Some(src) = resolve_img_src(img, base_url) {
            push(&src, &mut images);
        }
    }

    for src in &meta.images {
        push(src, &mut images);
    }

    if let Some(src) = extract_meta_image(document) {
        push(&src, &mut images);
    }

    images
}

/// Absolute `http(s)` URL for an image reference, or `None` for inline data,
/// SVG icons and other schemes.
fn absolutize(src: &str, base_url: Option<&Url>) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let resolved = if let Some(rest) = src.strip_prefix("//") {
        Url::parse(&format!("https://{}", rest)).ok()?
    } else {
        match base_url {
            Some(base) => base.join(src).ok()?,
            None => Url::parse(src).ok()?,
        }
    };
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if resolved.path().to_lowercase().ends_with(".svg") {
        return None;
    }
    Some(resolved.to_string())
}

fn resolve_img_src(el: ElementRef<'_>, base_url: Option<&Url>) -> Option<String> {
    let v = el.value();

    // Priority: src → data-src → data-lazy → largest srcset candidate.
    IMG_SRC_ATTRS
        .iter()
        .filter_map(|a| v.attr(a))
        .find_map(|s| absolutize(s, base_url))
        .or_else(|| {
            v.attr("srcset")
                .or_else(|| v.attr("data-srcset"))
                .and_then(best_src_from_srcset)
                .and_then(|s| absolutize(&s, base_url))
        })
}

fn best_src_from_srcset(srcset: &str) -> Option<String> {
    let mut candidates: Vec<(f64, usize, String)> = Vec::new();

    for (index, part) in srcset.split(',').enumerate() {
        let mut pieces = part.split_whitespace();
        let Some(url) = pieces.next() else {
            continue;
        };
        let score: f64 = pieces
            .next()
            .filter(|desc| desc.ends_with('w') || desc.ends_with('x'))
            .and_then(|desc| desc[..desc.len() - 1].parse().ok())
            .unwrap_or(0.0);
        candidates.push((score, index, url.to_string()));
    }

    candidates.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    candidates.last().map(|(_, _, url)| url.clone())
}

fn extract_meta_image(document: &Html) -> Option<String> {
    META_IMAGE_SELS.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(String::from)
    })
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

/// Recursively collect all text from an element and its descendants.
fn collect_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join("")
}

/// Text nodes joined with single spaces, so `a<br>b` reads `a b`.
fn spaced_text(el: ElementRef<'_>) -> String {
    normalize_text(el.text().collect::<Vec<_>>().join(" "))
}

/// Collapse whitespace and trim.
fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
