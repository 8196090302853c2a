//! DrawingML shapes for a single slide and the slide's relationships.

use std::fmt::Write as _;

use super::{xml_text, Rgb, NS_A, NS_P, NS_R, REL_HYPERLINK, REL_IMAGE, REL_SLIDE_LAYOUT};

/// Position and size in EMU (914 400 per inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

impl Frame {
    pub const fn new(x: i64, y: i64, cx: i64, cy: i64) -> Self {
        Self { x, y, cx, cy }
    }

    /// Largest frame with the given width/height ratio that fits inside this
    /// one, centered.
    pub fn fit(self, aspect: Option<f64>) -> Frame {
        let Some(ratio) = aspect.filter(|r| r.is_finite() && *r > 0.0) else {
            return self;
        };
        let own = self.cx as f64 / self.cy as f64;
        if own > ratio {
            let cx = (self.cy as f64 * ratio).round() as i64;
            Frame::new(self.x + (self.cx - cx) / 2, self.y, cx, self.cy)
        } else {
            let cy = (self.cx as f64 / ratio).round() as i64;
            Frame::new(self.x, self.y + (self.cy - cy) / 2, self.cx, cy)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

impl Align {
    fn as_attr(self) -> &'static str {
        match self {
            Align::Left => "l",
            Align::Center => "ctr",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub text: String,
    /// Font size in points.
    pub size: u32,
    pub bold: bool,
    pub color: Option<Rgb>,
    /// Relationship id of an external hyperlink.
    pub link: Option<String>,
}

impl Run {
    pub fn new(text: impl Into<String>, size: u32) -> Self {
        Self {
            text: text.into(),
            size,
            bold: false,
            color: None,
            link: None,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn link(mut self, rel_id: String) -> Self {
        self.link = Some(rel_id);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Paragraph {
    pub runs: Vec<Run>,
    pub align: Align,
}

impl Paragraph {
    pub fn new(runs: Vec<Run>) -> Self {
        Self {
            runs,
            align: Align::Left,
        }
    }

    pub fn single(run: Run) -> Self {
        Self::new(vec![run])
    }

    pub fn centered(mut self) -> Self {
        self.align = Align::Center;
        self
    }
}

struct Relationship {
    id: String,
    rel_type: &'static str,
    target: String,
    external: bool,
}

/// Accumulates the shape tree of one slide.
pub struct SlideBuilder {
    shapes: String,
    next_shape_id: u32,
    rels: Vec<Relationship>,
}

impl SlideBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            shapes: String::new(),
            // id 1 is the group shape of the tree itself.
            next_shape_id: 2,
            rels: Vec::new(),
        };
        builder.add_rel(REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml".to_string(), false);
        builder
    }

    fn add_rel(&mut self, rel_type: &'static str, target: String, external: bool) -> String {
        let id = format!("rId{}", self.rels.len() + 1);
        self.rels.push(Relationship {
            id: id.clone(),
            rel_type,
            target,
            external,
        });
        id
    }

    fn shape_id(&mut self) -> u32 {
        let id = self.next_shape_id;
        self.next_shape_id += 1;
        id
    }

    /// Register an external link; use the returned id with [`Run::link`].
    pub fn hyperlink(&mut self, url: &str) -> String {
        self.add_rel(REL_HYPERLINK, url.to_string(), true)
    }

    pub fn rect(&mut self, frame: Frame, fill: Rgb) {
        let id = self.shape_id();
        let _ = write!(
            self.shapes,
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Rectangle {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{fill}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
            xfrm = xfrm(frame),
        );
    }

    pub fn text(&mut self, frame: Frame, paragraphs: &[Paragraph]) {
        let id = self.shape_id();
        let mut body = String::new();
        for paragraph in paragraphs {
            let _ = write!(body, r#"<a:p><a:pPr algn="{}"/>"#, paragraph.align.as_attr());
            for run in &paragraph.runs {
                body.push_str(&run_xml(run));
            }
            body.push_str("</a:p>");
        }
        if paragraphs.is_empty() {
            body.push_str("<a:p/>");
        }
        let _ = write!(
            self.shapes,
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" lIns="91440" tIns="45720" rIns="91440" bIns="45720" anchor="t"><a:normAutofit/></a:bodyPr><a:lstStyle/>{body}</p:txBody></p:sp>"#,
            xfrm = xfrm(frame),
        );
    }

    /// Place a picture stored at `ppt/media/{media_name}`, keeping its aspect
    /// ratio inside `frame` when known.
    pub fn picture(&mut self, frame: Frame, media_name: &str, aspect: Option<f64>) {
        let rel = self.add_rel(REL_IMAGE, format!("../media/{}", media_name), false);
        let id = self.shape_id();
        let _ = write!(
            self.shapes,
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{xfrm}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
            xfrm = xfrm(frame.fit(aspect)),
        );
    }

    /// Slide part and its relationships part.
    pub fn finish(self) -> (String, String) {
        let slide = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
            self.shapes
        );

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for rel in &self.rels {
            let mode = if rel.external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            let _ = write!(
                rels,
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                rel.id,
                rel.rel_type,
                xml_text(&rel.target),
                mode
            );
        }
        rels.push_str("</Relationships>");

        (slide, rels)
    }
}

fn xfrm(frame: Frame) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        frame.x, frame.y, frame.cx, frame.cy
    )
}

fn run_xml(run: &Run) -> String {
    let mut props = format!(r#"<a:rPr lang="pt-PT" sz="{}""#, run.size * 100);
    if run.bold {
        props.push_str(r#" b="1""#);
    }
    props.push_str(r#" dirty="0">"#);
    if let Some(color) = run.color {
        let _ = write!(props, r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#, color);
    }
    if let Some(ref rel) = run.link {
        let _ = write!(props, r#"<a:hlinkClick r:id="{}"/>"#, rel);
    }
    props.push_str("</a:rPr>");
    format!("<a:r>{}<a:t>{}</a:t></a:r>", props, xml_text(&run.text))
}
