//! Presentation output: a branded cover slide followed by one slide per
//! listing, written as an Office Open XML (`.pptx`) package.

mod parts;
mod slide;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::str::FromStr;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{ACCENT_COLOR, COMPANY_NAME, DECK_TITLE, DESCRIPTION_MAX_CHARS};
use crate::media::ImageData;
use crate::models::Listing;

use slide::{Frame, Paragraph, Run, SlideBuilder};

pub(crate) const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";

pub(crate) const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
pub(crate) const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub(crate) const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

/// 16:9, 13.333in × 7.5in.
pub(crate) const SLIDE_CX: i64 = 12_192_000;
pub(crate) const SLIDE_CY: i64 = 6_858_000;

/// Thousandths of an inch to EMU.
const fn mils(value: i64) -> i64 {
    value * 9144 / 10
}

const WHITE: Rgb = Rgb(0xFF, 0xFF, 0xFF);
const DARK: Rgb = Rgb(0x26, 0x26, 0x26);
const GRAY: Rgb = Rgb(0x59, 0x59, 0x59);

// ── Listing slide layout ─────────────────────────────────────────────────────

const TITLE_BAR: Frame = Frame::new(0, 0, SLIDE_CX, mils(1000));
const TITLE_TEXT: Frame = Frame::new(mils(500), mils(150), mils(11000), mils(700));
const PRICE: Frame = Frame::new(mils(500), mils(1200), mils(5800), mils(700));
const LOCATION: Frame = Frame::new(mils(500), mils(1900), mils(5800), mils(500));
const DETAILS: Frame = Frame::new(mils(500), mils(2450), mils(5800), mils(900));
const DESCRIPTION: Frame = Frame::new(mils(500), mils(3400), mils(5800), mils(3200));
const IMAGE_MAIN: Frame = Frame::new(mils(6700), mils(1200), mils(6130), mils(3300));
const IMAGE_LEFT: Frame = Frame::new(mils(6700), mils(4600), mils(3015), mils(1900));
const IMAGE_RIGHT: Frame = Frame::new(mils(9815), mils(4600), mils(3015), mils(1900));
const FOOTER: Frame = Frame::new(mils(500), mils(6800), mils(11000), mils(400));
const LOGO_CORNER: Frame = Frame::new(mils(11800), mils(6750), mils(1200), mils(600));

// ── Cover slide layout ───────────────────────────────────────────────────────

const COVER_BAND: Frame = Frame::new(0, 0, SLIDE_CX, mils(4500));
const COVER_LOGO: Frame = Frame::new(mils(4920), mils(600), mils(3500), mils(1500));
const COVER_COMPANY: Frame = Frame::new(mils(500), mils(2300), mils(12330), mils(1000));
const COVER_TITLE: Frame = Frame::new(mils(500), mils(3300), mils(12330), mils(800));
const COVER_COUNT: Frame = Frame::new(mils(500), mils(5000), mils(12330), mils(600));

const IMAGE_SLOTS: [Frame; 3] = [IMAGE_MAIN, IMAGE_LEFT, IMAGE_RIGHT];

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("failed to write presentation: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

// ── Branding ─────────────────────────────────────────────────────────────────

/// An sRGB color, written as `RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("expected a RRGGBB color, got {s:?}"));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone)]
pub struct Branding {
    pub company_name: String,
    pub deck_title: String,
    pub accent: Rgb,
    pub logo: Option<ImageData>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: COMPANY_NAME.to_string(),
            deck_title: DECK_TITLE.to_string(),
            accent: ACCENT_COLOR.parse().unwrap_or(Rgb(0x00, 0x3D, 0xA5)),
            logo: None,
        }
    }
}

// ── Media parts ──────────────────────────────────────────────────────────────

/// Images stored under `ppt/media/`, plus the extensions the content types
/// part has to declare.
#[derive(Default)]
struct MediaStore {
    files: Vec<(String, Vec<u8>)>,
    extensions: BTreeMap<&'static str, &'static str>,
}

impl MediaStore {
    fn add(&mut self, stem: &str, image: &ImageData) -> String {
        let ext = image.format.extension();
        let name = format!("{}.{}", stem, ext);
        self.extensions.insert(ext, image.format.content_type());
        self.files.push((name.clone(), image.bytes.clone()));
        name
    }

    fn add_numbered(&mut self, image: &ImageData) -> String {
        let stem = format!("image{}", self.files.len() + 1);
        self.add(&stem, image)
    }
}

/// Logo shared by every slide that shows it.
struct Logo {
    media_name: String,
    aspect: Option<f64>,
}

// ── Deck ─────────────────────────────────────────────────────────────────────

pub struct Deck {
    branding: Branding,
}

impl Deck {
    pub fn new(branding: Branding) -> Self {
        Self { branding }
    }

    /// Serialize the deck into memory.
    pub fn build(&self, listings: &[Listing]) -> Result<Vec<u8>, DeckError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor, listings)?;
        Ok(cursor.into_inner())
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W, listings: &[Listing]) -> Result<(), DeckError> {
        let mut media = MediaStore::default();
        let logo = self.branding.logo.as_ref().map(|image| Logo {
            media_name: media.add("logo", image),
            aspect: image.aspect_ratio(),
        });

        let mut slides = vec![self.cover_slide(listings.len(), logo.as_ref())];
        for listing in listings {
            slides.push(self.listing_slide(listing, logo.as_ref(), &mut media));
        }

        let slide_count = slides.len();
        let media_types: Vec<(&str, &str)> =
            media.extensions.iter().map(|(e, t)| (*e, *t)).collect();

        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        // Already-compressed images are stored as is.
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

        let package_parts = [
            ("[Content_Types].xml", parts::content_types(slide_count, &media_types)),
            ("_rels/.rels", parts::root_rels()),
            ("docProps/core.xml", parts::core_props(&self.branding)),
            ("docProps/app.xml", parts::app_props(slide_count)),
            ("ppt/presentation.xml", parts::presentation(slide_count)),
            ("ppt/_rels/presentation.xml.rels", parts::presentation_rels(slide_count)),
            ("ppt/presProps.xml", parts::pres_props()),
            ("ppt/tableStyles.xml", parts::table_styles()),
            ("ppt/slideMasters/slideMaster1.xml", parts::slide_master()),
            ("ppt/slideMasters/_rels/slideMaster1.xml.rels", parts::slide_master_rels()),
            ("ppt/slideLayouts/slideLayout1.xml", parts::slide_layout()),
            ("ppt/slideLayouts/_rels/slideLayout1.xml.rels", parts::slide_layout_rels()),
            ("ppt/theme/theme1.xml", parts::theme(&self.branding)),
        ];
        for (name, xml) in &package_parts {
            put_part(&mut zip, name, xml.as_bytes(), options)?;
        }

        for (idx, (slide_xml, rels_xml)) in slides.iter().enumerate() {
            let n = idx + 1;
            let slide_name = format!("ppt/slides/slide{n}.xml");
            let rels_name = format!("ppt/slides/_rels/slide{n}.xml.rels");
            put_part(&mut zip, &slide_name, slide_xml.as_bytes(), options)?;
            put_part(&mut zip, &rels_name, rels_xml.as_bytes(), options)?;
        }

        for (name, bytes) in &media.files {
            put_part(&mut zip, &format!("ppt/media/{name}"), bytes, stored)?;
        }

        zip.finish()?;
        tracing::debug!("deck has {} slides and {} media files", slide_count, media.files.len());
        Ok(())
    }

    fn cover_slide(&self, listing_count: usize, logo: Option<&Logo>) -> (String, String) {
        let accent = self.branding.accent;
        let mut slide = SlideBuilder::new();

        slide.rect(COVER_BAND, accent);
        if let Some(logo) = logo {
            slide.picture(COVER_LOGO, &logo.media_name, logo.aspect);
        }
        slide.text(
            COVER_COMPANY,
            &[Paragraph::single(Run::new(&self.branding.company_name, 40).bold().color(WHITE)).centered()],
        );
        slide.text(
            COVER_TITLE,
            &[Paragraph::single(Run::new(&self.branding.deck_title, 24).color(WHITE)).centered()],
        );
        let count = match listing_count {
            1 => "1 imóvel".to_string(),
            n => format!("{} imóveis", n),
        };
        slide.text(
            COVER_COUNT,
            &[Paragraph::single(Run::new(count, 20).color(accent)).centered()],
        );

        slide.finish()
    }

    fn listing_slide(
        &self,
        listing: &Listing,
        logo: Option<&Logo>,
        media: &mut MediaStore,
    ) -> (String, String) {
        let accent = self.branding.accent;
        let mut slide = SlideBuilder::new();

        slide.rect(TITLE_BAR, accent);

        if let Some(reason) = &listing.failure {
            slide.text(
                TITLE_TEXT,
                &[Paragraph::single(Run::new("Anúncio indisponível", 28).bold().color(WHITE))],
            );
            slide.text(
                PRICE,
                &[Paragraph::single(
                    Run::new("Não foi possível obter este anúncio.", 20).color(DARK),
                )],
            );
            slide.text(
                DESCRIPTION,
                &[Paragraph::single(Run::new(reason, 12).color(GRAY))],
            );
        } else {
            slide.text(
                TITLE_TEXT,
                &[Paragraph::single(Run::new(&listing.title, 28).bold().color(WHITE))],
            );
            slide.text(
                PRICE,
                &[Paragraph::single(Run::new(&listing.price, 28).bold().color(accent))],
            );
            slide.text(
                LOCATION,
                &[Paragraph::single(Run::new(&listing.location, 16).color(GRAY))],
            );
            slide.text(DETAILS, &details_paragraphs(listing, accent));
            slide.text(
                DESCRIPTION,
                &[Paragraph::single(
                    Run::new(truncate_chars(&listing.description, DESCRIPTION_MAX_CHARS), 12)
                        .color(DARK),
                )],
            );

            let downloaded = listing.images.iter().filter_map(|img| img.data.as_ref());
            for (frame, image) in IMAGE_SLOTS.iter().zip(downloaded) {
                let name = media.add_numbered(image);
                slide.picture(*frame, &name, image.aspect_ratio());
            }
        }

        let link = slide.hyperlink(&listing.url);
        slide.text(
            FOOTER,
            &[Paragraph::single(Run::new(&listing.url, 10).color(GRAY).link(link))],
        );

        if let Some(logo) = logo {
            slide.picture(LOGO_CORNER, &logo.media_name, logo.aspect);
        }

        slide.finish()
    }
}

fn put_part<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    data: &[u8],
    options: FileOptions,
) -> Result<(), DeckError> {
    zip.start_file(name, options)?;
    zip.write_all(data)?;
    Ok(())
}

/// `Tipologia` / `Área` on one line, `Quartos` / `Casas de banho` on the
/// next. Labels stay even when the value is empty.
fn details_paragraphs(listing: &Listing, accent: Rgb) -> Vec<Paragraph> {
    let pair = |label: &str, value: String| {
        vec![
            Run::new(format!("{}: ", label), 14).bold().color(accent),
            Run::new(value, 14).color(DARK),
        ]
    };
    let line = |a: Vec<Run>, b: Vec<Run>| {
        let mut runs = a;
        runs.push(Run::new("    ", 14));
        runs.extend(b);
        Paragraph::new(runs)
    };
    vec![
        line(
            pair("Tipologia", listing.typology.clone()),
            pair("Área", listing.area_text()),
        ),
        line(
            pair("Quartos", listing.bedrooms_text()),
            pair("Casas de banho", listing.bathrooms_text()),
        ),
    ]
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Escape text for XML content and attributes, dropping characters XML 1.0
/// cannot carry and flattening line breaks.
pub(crate) fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control() && !matches!(*c, '\u{FFFE}' | '\u{FFFF}'))
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

pub fn write_deck(path: &Path, branding: Branding, listings: &[Listing]) -> Result<(), DeckError> {
    let file = std::fs::File::create(path)?;
    Deck::new(branding).write_to(std::io::BufWriter::new(file), listings)?;
    tracing::info!("wrote {} slides to {}", listings.len() + 1, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::png_header;
    use crate::models::{Area, ImageRef};
    use std::io::Read;
    use zip::ZipArchive;

    fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    fn read_part(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn slide_count(archive: &ZipArchive<Cursor<Vec<u8>>>) -> usize {
        archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .count()
    }

    fn listing(title: &str, with_image: bool) -> Listing {
        let mut images = vec![ImageRef::new("https://img.example.com/1.png")];
        if with_image {
            images[0].data = ImageData::from_bytes(png_header(800, 600));
        }
        Listing {
            url: "https://www.imovirtual.com/pt/anuncio/x".into(),
            title: title.into(),
            price: "250.000 €".into(),
            location: "Lisboa".into(),
            area: Area::parse("85 m²"),
            typology: "T2".into(),
            bedrooms: Some(2),
            bathrooms: None,
            description: "Apartamento renovado.".into(),
            images,
            failure: None,
        }
    }

    #[test]
    fn test_empty_input_has_only_cover() {
        let bytes = Deck::new(Branding::default()).build(&[]).unwrap();
        let mut archive = open(bytes);
        assert_eq!(slide_count(&archive), 1);
        let cover = read_part(&mut archive, "ppt/slides/slide1.xml");
        assert!(cover.contains("RE/MAX Oceanus"));
        assert!(cover.contains("0 imóveis"));
    }

    #[test]
    fn test_one_slide_per_listing_plus_cover() {
        let listings = vec![
            listing("T2 Apartment, Lisbon", true),
            Listing::failed("https://example.com/gone", "upstream returned HTTP 404"),
            listing("Moradia T4 & jardim", false),
        ];
        let bytes = Deck::new(Branding::default()).build(&listings).unwrap();
        let mut archive = open(bytes);

        assert_eq!(slide_count(&archive), 4);
        let presentation = read_part(&mut archive, "ppt/presentation.xml");
        assert_eq!(presentation.matches("<p:sldId ").count(), 4);

        let first = read_part(&mut archive, "ppt/slides/slide2.xml");
        assert!(first.contains("T2 Apartment, Lisbon"));
        assert!(first.contains("250.000 €"));
        assert!(first.contains("<a:blip r:embed="));

        let failed = read_part(&mut archive, "ppt/slides/slide3.xml");
        assert!(failed.contains("Anúncio indisponível"));
        assert!(failed.contains("upstream returned HTTP 404"));

        let third = read_part(&mut archive, "ppt/slides/slide4.xml");
        assert!(third.contains("Moradia T4 &amp; jardim"));
        assert!(!third.contains("<p:pic>"));

        assert!(archive.by_name("ppt/media/image1.png").is_ok());
        let content_types = read_part(&mut archive, "[Content_Types].xml");
        assert!(content_types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    }

    #[test]
    fn test_empty_fields_keep_their_labels() {
        let bytes = Deck::new(Branding::default())
            .build(&[Listing::empty("https://example.com/a")])
            .unwrap();
        let mut archive = open(bytes);
        let slide = read_part(&mut archive, "ppt/slides/slide2.xml");
        for label in ["Tipologia: ", "Área: ", "Quartos: ", "Casas de banho: "] {
            assert!(slide.contains(label), "missing {label}");
        }
    }

    #[test]
    fn test_logo_is_shared() {
        let branding = Branding {
            logo: ImageData::from_bytes(png_header(400, 100)),
            ..Branding::default()
        };
        let bytes = Deck::new(branding)
            .build(&[listing("A", false), listing("B", false)])
            .unwrap();
        let mut archive = open(bytes);
        let media: Vec<_> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/media/"))
            .map(String::from)
            .collect();
        assert_eq!(media, vec!["ppt/media/logo.png"]);
        let rels = read_part(&mut archive, "ppt/slides/_rels/slide3.xml.rels");
        assert!(rels.contains("../media/logo.png"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let listings = vec![listing("A", true)];
        let deck = Deck::new(Branding::default());
        assert_eq!(deck.build(&listings).unwrap(), deck.build(&listings).unwrap());
    }

    #[test]
    fn test_write_deck_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pptx");
        write_deck(&path, Branding::default(), &[listing("A", true)]).unwrap();
        let archive = ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(
            archive
                .file_names()
                .filter(|n| n.starts_with("ppt/slides/slide"))
                .count(),
            2
        );
    }

    #[test]
    fn test_rgb_parse() {
        assert_eq!("003DA5".parse::<Rgb>(), Ok(Rgb(0x00, 0x3D, 0xA5)));
        assert_eq!("#ff0000".parse::<Rgb>(), Ok(Rgb(0xFF, 0, 0)));
        assert!("red".parse::<Rgb>().is_err());
        assert_eq!(Rgb(0xDC, 0x1C, 0x2E).to_string(), "DC1C2E");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("curto", 10), "curto");
        assert_eq!(truncate_chars("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_xml_text() {
        assert_eq!(xml_text("a\nb\u{0008}c & <d>"), "a bc &amp; &lt;d&gt;");
    }
}
