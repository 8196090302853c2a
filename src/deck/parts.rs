//! Fixed package parts of the presentation: master, layout, theme and the
//! document-level XML that only depends on the slide count and branding.

use std::fmt::Write as _;

use super::{xml_text, Branding, NS_A, NS_P, NS_R, SLIDE_CX, SLIDE_CY};

const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const CT_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
const CT_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
const CT_PRES_PROPS: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presProps+xml";
const CT_TABLE_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.tableStyles+xml";
const CT_CORE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const CT_APP: &str = "application/vnd.openxmlformats-officedocument.extended-properties+xml";

const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_OFFICE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// `[Content_Types].xml`. `media` holds `(extension, content type)` pairs.
pub fn content_types(slide_count: usize, media: &[(&str, &str)]) -> String {
    let mut xml = format!(
        r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#
    );
    for (ext, content_type) in media {
        let _ = write!(xml, r#"<Default Extension="{ext}" ContentType="{content_type}"/>"#);
    }
    let overrides = [
        ("/ppt/presentation.xml", CT_PRESENTATION),
        ("/ppt/slideMasters/slideMaster1.xml", CT_MASTER),
        ("/ppt/slideLayouts/slideLayout1.xml", CT_LAYOUT),
        ("/ppt/theme/theme1.xml", CT_THEME),
        ("/ppt/presProps.xml", CT_PRES_PROPS),
        ("/ppt/tableStyles.xml", CT_TABLE_STYLES),
        ("/docProps/core.xml", CT_CORE),
        ("/docProps/app.xml", CT_APP),
    ];
    for (part, content_type) in overrides {
        let _ = write!(xml, r#"<Override PartName="{part}" ContentType="{content_type}"/>"#);
    }
    for n in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="{CT_SLIDE}"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

/// `_rels/.rels`
pub fn root_rels() -> String {
    format!(
        r#"{XML_DECL}
<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_OFFICE}/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL_OFFICE}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

/// `docProps/core.xml`. Carries no timestamps so reruns produce the same
/// content.
pub fn core_props(branding: &Branding) -> String {
    format!(
        r#"{XML_DECL}
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>{}</dc:creator></cp:coreProperties>"#,
        xml_text(&branding.deck_title),
        xml_text(&branding.company_name)
    )
}

/// `docProps/app.xml`
pub fn app_props(slide_count: usize) -> String {
    format!(
        r#"{XML_DECL}
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>{}</Application><Slides>{slide_count}</Slides><PresentationFormat>Widescreen</PresentationFormat></Properties>"#,
        env!("CARGO_PKG_NAME")
    )
}

/// `ppt/presentation.xml`
pub fn presentation(slide_count: usize) -> String {
    let mut ids = String::new();
    for n in 0..slide_count {
        // Slide ids start at 256; relationship ids 1 and 2 are master and theme.
        let _ = write!(ids, r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + n, n + 3);
    }
    format!(
        r#"{XML_DECL}
<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{SLIDE_CX}" cy="{SLIDE_CY}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
    )
}

/// `ppt/_rels/presentation.xml.rels`
pub fn presentation_rels(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}
<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_OFFICE}/slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId2" Type="{REL_OFFICE}/theme" Target="theme/theme1.xml"/>"#
    );
    for n in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{REL_OFFICE}/slide" Target="slides/slide{n}.xml"/>"#,
            n + 2
        );
    }
    let next = slide_count + 3;
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{next}" Type="{REL_OFFICE}/presProps" Target="presProps.xml"/><Relationship Id="rId{}" Type="{REL_OFFICE}/tableStyles" Target="tableStyles.xml"/></Relationships>"#,
        next + 1
    );
    xml
}

/// `ppt/presProps.xml`
pub fn pres_props() -> String {
    format!(r#"{XML_DECL}
<p:presentationPr xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"/>"#)
}

/// `ppt/tableStyles.xml`
pub fn table_styles() -> String {
    format!(
        r#"{XML_DECL}
<a:tblStyleLst xmlns:a="{NS_A}" def="{{5C22544A-7EE6-4342-B048-85BDC9FD1C3A}}"/>"#
    )
}

const EMPTY_TREE: &str = r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree>"#;

/// `ppt/slideMasters/slideMaster1.xml`
pub fn slide_master() -> String {
    format!(
        r#"{XML_DECL}
<p:sldMaster xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>{EMPTY_TREE}</p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle><a:lvl1pPr><a:defRPr sz="4400"/></a:lvl1pPr></p:titleStyle><p:bodyStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:bodyStyle><p:otherStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:otherStyle></p:txStyles></p:sldMaster>"#
    )
}

/// `ppt/slideMasters/_rels/slideMaster1.xml.rels`
pub fn slide_master_rels() -> String {
    format!(
        r#"{XML_DECL}
<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_OFFICE}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="{REL_OFFICE}/theme" Target="../theme/theme1.xml"/></Relationships>"#
    )
}

/// `ppt/slideLayouts/slideLayout1.xml`, an empty layout every slide uses.
pub fn slide_layout() -> String {
    format!(
        r#"{XML_DECL}
<p:sldLayout xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" type="blank" preserve="1"><p:cSld name="Blank">{EMPTY_TREE}</p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
    )
}

/// `ppt/slideLayouts/_rels/slideLayout1.xml.rels`
pub fn slide_layout_rels() -> String {
    format!(
        r#"{XML_DECL}
<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_OFFICE}/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
    )
}

/// `ppt/theme/theme1.xml`, an Office-like theme whose first accent is the
/// branding color.
pub fn theme(branding: &Branding) -> String {
    let accent = branding.accent;
    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = |w: u32| {
        format!(
            r#"<a:ln w="{w}" cap="flat" cmpd="sng" algn="ctr"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:prstDash val="solid"/></a:ln>"#
        )
    };
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        r#"{XML_DECL}
<a:theme xmlns:a="{NS_A}" name="{name}"><a:themeElements><a:clrScheme name="{name}"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F2A44"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="{accent}"/></a:accent1><a:accent2><a:srgbClr val="DC1C2E"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="{name}"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="{name}"><a:fillStyleLst>{fill}{fill}{fill}</a:fillStyleLst><a:lnStyleLst>{l1}{l2}{l3}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{fill}{fill}{fill}</a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#,
        name = xml_text(&branding.company_name),
        l1 = line(6350),
        l2 = line(12700),
        l3 = line(19050),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_lists_every_slide() {
        let xml = presentation(3);
        assert_eq!(xml.matches("<p:sldId ").count(), 3);
        assert!(xml.contains(r#"<p:sldId id="258" r:id="rId5"/>"#));

        let rels = presentation_rels(3);
        assert!(rels.contains(r#"Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide3.xml""#));
        assert!(rels.contains(r#"Id="rId6" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/presProps""#));
        assert!(rels.contains(r#"Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/tableStyles""#));
    }

    #[test]
    fn test_content_types() {
        let xml = content_types(2, &[("png", "image/png")]);
        assert!(xml.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
        assert!(xml.contains(r#"PartName="/ppt/slides/slide2.xml""#));
        assert!(!xml.contains("slide3.xml"));
    }

    #[test]
    fn test_theme_uses_accent() {
        let branding = Branding::default();
        assert!(theme(&branding).contains(&format!(
            r#"<a:accent1><a:srgbClr val="{}"/></a:accent1>"#,
            branding.accent
        )));
    }

    #[test]
    fn test_table_styles_guid() {
        assert!(table_styles().contains(r#"def="{5C22544A-7EE6-4342-B048-85BDC9FD1C3A}""#));
    }
}
